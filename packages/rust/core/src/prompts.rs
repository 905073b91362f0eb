//! Prompt templates for every generation stage.
//!
//! Templates are plain functions of their inputs; nothing here talks to the
//! service. Section lists, topics, criteria and rating anchors are exposed as
//! constants so tests and the ranking code share one source of truth.

use std::fmt::Write as _;

use rfqscope_shared::VendorId;

use crate::comparator::ComparisonResult;
use crate::ranking::{CRITERIA, RATING_MAX, RATING_MIN};

/// Phrase the model must use for any section absent from the documents.
pub const NOT_PRESENT: &str = "This section is not present";

/// Stand-in for an empty vendor summary in a comparison prompt.
pub const NO_RESPONSE_STATEMENT: &str = "No response documents were provided by this vendor; \
every section of the response is not present.";

/// Stand-in for an empty customer summary in a comparison prompt.
pub const NO_RFQ_STATEMENT: &str = "No customer RFQ documents were provided; \
the customer's requirements are not present.";

/// Sections of a customer RFQ summary, in order.
pub const CUSTOMER_SECTIONS: [&str; 5] = [
    "Overview of the Request: the primary objectives and goals of the RFQ, in detail",
    "Scope, Deliverables and Timelines: the services or products required, the deliverables \
expected from vendors, and key dates (submission deadline, project start and end)",
    "Key Requirements: technical, business, functional and non-functional requirements \
(security, performance, scalability, usability); the expected technology stack, platforms \
and expertise; the delivery methodology (e.g. Agile, Waterfall)",
    "Evaluation Criteria: the criteria and expectations the customer will score responses on \
(cost, technical competence, experience, innovation, timelines, SLAs, regulatory compliance)",
    "Expectations from the Provider: response format and required sections, length limits, \
submission method, and how pricing must be presented (itemized, milestones, total cost) \
including preferred payment terms",
];

/// Sections of a vendor response summary, in order.
pub const VENDOR_SECTIONS: [&str; 7] = [
    "Overview and Scope Understanding: the vendor's understanding of the scope, whether it is \
complete, and how the proposed solution aligns with the project goals",
    "Solution Approach and Methodology: a detailed account of the proposed technical solution \
(architecture, technology stack, integrations, innovative features), the delivery methodology, \
implementation strategy and committed milestones, noting anything missing or exceptional",
    "Pricing Structure and Cost Breakdown: proposed commercials, an itemized cost breakdown \
(hardware, software, services, licenses, labor, maintenance, support) and payment terms",
    "Differentiators: value-added services, unique features, potential cost savings, \
scalability or innovations that set the vendor apart",
    "Risk Management and Contingency Plans: identified risks with mitigation strategies, and \
SLAs or guarantees on performance, uptime or issue resolution",
    "Vendor Capabilities and Experience: evidence of capability on similar work, case studies \
and testimonials with the outcomes achieved",
    "Project Governance and Communication: governance structure, communication plan, reporting \
frequency and in-flight risk management",
];

/// Topics every vendor comparison must cover, in order.
pub const COMPARISON_TOPICS: [&str; 8] = [
    "Services and Deliverables: gaps, misalignments and additional offerings against the RFQ",
    "Fee Structure and Pricing: alignment with the RFQ's pricing model, transparency of the \
cost breakdown, and reasonableness of payment terms",
    "Capabilities: expertise, certifications and comparable project experience relative to the \
project's complexity",
    "Client Testimonials and References: relevance to the customer's industry and evaluation \
criteria",
    "Evaluation Criteria Alignment: where the response falls short of or exceeds each criterion \
the RFQ sets",
    "Additional Considerations: risk management; innovation and value additions; support and \
maintenance; timeline and delivery schedule; compliance and certifications",
    "Overall Comparison: strengths, weaknesses and critical gaps of the response",
    "Final Conclusion: whether the response sufficiently addresses the RFQ, with justification",
];

/// Meaning of each point on the rating scale.
pub const RATING_ANCHORS: [(u8, &str); 5] = [
    (1, "Did not meet expectations."),
    (2, "Approach provided."),
    (3, "Measurable approach."),
    (4, "Measurable, with mitigation provided for success."),
    (5, "Met all expectations, with investment in the customer's success and a mitigation with \
key success outcomes outlined."),
];

fn numbered(items: &[&str]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. {item}", i + 1);
    }
    out
}

fn context_block(preceding: Option<&str>) -> String {
    match preceding {
        Some(text) => format!(
            "\nFor continuity only, the end of the previous excerpt was (already summarized, \
do not summarize it again):\n<previous_excerpt_tail>\n{text}\n</previous_excerpt_tail>\n"
        ),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Rolling summaries
// ---------------------------------------------------------------------------

/// Prompt folding one chunk of the customer RFQ into the running summary.
pub fn customer_summary_prompt(existing: &str, chunk: &str, preceding: Option<&str>) -> String {
    format!(
        "You are producing a comprehensive, structured summary of a customer RFQ, RFI or RFP \
document. The summary must cover every element needed to understand the request, its \
requirements and its expectations.

You are given the summary produced so far:
<existing_summary>
{existing}
</existing_summary>
{context}
and the next excerpt of the document:
<document_excerpt>
{chunk}
</document_excerpt>

Update <existing_summary> using <document_excerpt>. The updated summary must contain these \
sections, in this order:
<required_sections>
{sections}</required_sections>

For any required section that the documents do not address, state explicitly: \
\"{NOT_PRESENT}.\" Keep the summary concise but detailed, addressing each section clearly. \
Return only the updated summary.",
        context = context_block(preceding),
        sections = numbered(&CUSTOMER_SECTIONS),
    )
}

/// Prompt folding one chunk of a vendor response into the running summary.
pub fn vendor_summary_prompt(
    vendor: &VendorId,
    existing: &str,
    chunk: &str,
    preceding: Option<&str>,
) -> String {
    format!(
        "You are producing a comprehensive, structured summary of the response that vendor \
\"{vendor}\" submitted to an RFQ, RFI or RFP. The summary must give a complete understanding of \
the proposed solution, pricing, delivery approach and overall capabilities.

You are given the summary produced so far:
<existing_summary>
{existing}
</existing_summary>
{context}
and the next excerpt of the response:
<document_excerpt>
{chunk}
</document_excerpt>

Update <existing_summary> using <document_excerpt>. The updated summary must contain these \
sections, in this order:
<required_sections>
{sections}</required_sections>

For any required section that the response does not address, state explicitly: \
\"{NOT_PRESENT}.\" Highlight the solution approach, differentiators, pricing, risk management \
and value additions. Return only the updated summary.",
        context = context_block(preceding),
        sections = numbered(&VENDOR_SECTIONS),
    )
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Prompt comparing one vendor summary against the customer summary.
///
/// `None` on either side means that party supplied no documents.
pub fn comparison_prompt(
    vendor: &VendorId,
    vendor_summary: Option<&str>,
    customer_summary: Option<&str>,
) -> String {
    let response = vendor_summary.unwrap_or(NO_RESPONSE_STATEMENT);
    let customer_summary = customer_summary.unwrap_or(NO_RFQ_STATEMENT);
    format!(
        "You are evaluating a vendor's response to a customer's RFQ.

The customer's RFQ, summarized:
<customer_rfq>
{customer_summary}
</customer_rfq>

The response from vendor \"{vendor}\", summarized:
<vendor_response>
{response}
</vendor_response>

Compare the response against the RFQ and evaluate it across the following areas, in order:
{topics}
Where the response does not address an area, say so explicitly. Be thorough and structured, \
and give actionable insight for the customer's decision.",
        topics = numbered(&COMPARISON_TOPICS),
    )
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Heading that opens the machine-readable ratings block instructions.
pub const RATINGS_BLOCK_HEADING: &str = "### Machine-readable ratings";

fn table_header(first: &str, vendors: &[VendorId], suffix: &str) -> String {
    let mut header = format!("| {first} |");
    let mut rule = String::from("|---|");
    for vendor in vendors {
        let _ = write!(header, " {vendor}{suffix} |");
        rule.push_str("---|");
    }
    format!("{header}\n{rule}\n")
}

fn table_rows(vendors: &[VendorId]) -> String {
    let mut out = String::new();
    for criterion in CRITERIA {
        let _ = write!(out, "| {criterion} |");
        for _ in vendors {
            out.push_str("  |");
        }
        out.push('\n');
    }
    out
}

/// Prompt producing the side-by-side comparison, ratings and ranking.
pub fn synthesis_prompt(comparisons: &[ComparisonResult], vendors: &[VendorId]) -> String {
    let mut results = String::new();
    for comparison in comparisons {
        let _ = write!(
            results,
            "<comparison vendor=\"{}\">\n{}\n</comparison>\n",
            comparison.vendor, comparison.text
        );
    }

    let anchors: String = RATING_ANCHORS
        .iter()
        .map(|(score, meaning)| format!("    {score} - {meaning}\n"))
        .collect();

    let example_scores: String = CRITERIA
        .iter()
        .map(|c| format!("\"{c}\": <{RATING_MIN}-{RATING_MAX}>"))
        .collect::<Vec<_>>()
        .join(", ");
    let vendor_list = vendors
        .iter()
        .map(VendorId::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You have the following comparison results, one per vendor, of each vendor's response \
against the customer's RFQ:
{results}
Produce a detailed side-by-side comparison of the vendors ({vendor_list}) as two tables, one of \
comments and one of ratings, then rank the vendors.

Study the responses closely. For every criterion and every vendor, call out what is good or \
outstanding and what is missing or lacking, so the customer can make a final decision.

Evaluation criteria:
{criteria}
### Table 1: Comments on Key Aspects
For each criterion, a detailed comment per vendor on strengths, weaknesses and performance.

{comments_header}{comments_rows}
### Table 2: Ratings on Key Aspects
Rate each vendor on each criterion from {RATING_MIN} to {RATING_MAX}:
{anchors}
{ratings_header}{ratings_rows}
Add a final row with each vendor's combined score: the sum of its ratings across all criteria. \
Rank the vendors from best to worst by combined score and justify the ranking with strengths, \
weaknesses and alignment with the customer's needs. A vendor whose comparison says no response \
documents were provided must receive {RATING_MIN} on every criterion.

{RATINGS_BLOCK_HEADING}
After the tables, repeat every rating in a fenced ```json block with exactly this shape, one \
entry per vendor, using the criterion names verbatim:
```json
{{\"ratings\": [{{\"vendor\": \"<vendor>\", \"scores\": {{{example_scores}}}}}]}}
```",
        criteria = numbered(&CRITERIA),
        comments_header = table_header("Key Aspect", vendors, ""),
        comments_rows = table_rows(vendors),
        ratings_header = table_header("Key Aspect", vendors, " (Score)"),
        ratings_rows = table_rows(vendors),
    )
}
