//! Per-format text extraction.

use std::path::Path;

use calamine::Reader;
use rfqscope_shared::{Result, RfqScopeError};

/// Document formats accepted in an input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Spreadsheet,
    Text,
}

impl DocumentFormat {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Extract the plain text of a file in the given format.
pub fn extract_text(path: &Path, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Pdf => extract_pdf(path),
        DocumentFormat::Docx => extract_docx(path),
        DocumentFormat::Spreadsheet => extract_spreadsheet(path),
        DocumentFormat::Text => {
            let bytes = std::fs::read(path).map_err(|e| RfqScopeError::io(path, e))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed inputs; a bad file must not abort the run.
    let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text(path));
    match outcome {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(RfqScopeError::load(path, format!("pdf: {e}"))),
        Err(_) => Err(RfqScopeError::load(path, "pdf: parser panicked")),
    }
}

fn extract_docx(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| RfqScopeError::io(path, e))?;
    let docx =
        docx_rs::read_docx(&bytes).map_err(|e| RfqScopeError::load(path, format!("docx: {e}")))?;

    let mut content = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                content.push_str(&paragraph_text(p));
                content.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(row) = row;
                    let cells: Vec<String> = row
                        .cells
                        .iter()
                        .map(|cell| {
                            let docx_rs::TableRowChild::TableCell(cell) = cell;
                            let text = cell
                                .children
                                .iter()
                                .filter_map(|c| match c {
                                    docx_rs::TableCellContent::Paragraph(p) => {
                                        Some(paragraph_text(p))
                                    }
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join(" ");
                            text
                        })
                        .collect();
                    content.push_str(&cells.join(" | "));
                    content.push('\n');
                }
            }
            _ => {}
        }
    }
    Ok(content)
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for rc in &run.children {
                if let docx_rs::RunChild::Text(t) = rc {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn extract_spreadsheet(path: &Path) -> Result<String> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| RfqScopeError::load(path, format!("spreadsheet: {e}")))?;

    let mut content = String::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(path = %path.display(), sheet = %sheet_name, error = %e, "unreadable sheet, skipping");
                continue;
            }
        };

        content.push_str(&format!("Sheet: {sheet_name}\n"));
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    calamine::Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect();
            if cells.iter().all(String::is_empty) {
                continue;
            }
            content.push_str(&cells.join(" | "));
            content.push('\n');
        }
        content.push('\n');
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/rfq_customer.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("resp.docx")),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("pricing.xlsx")),
            Some(DocumentFormat::Spreadsheet)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.txt")),
            Some(DocumentFormat::Text)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("deck.pptx")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    fn temp_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rfqscope_fmt_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir.join(name)
    }

    #[test]
    fn docx_paragraphs_and_tables_extracted() {
        let path = temp_file("response.docx");
        let file = std::fs::File::create(&path).expect("create docx");
        docx_rs::Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Executive summary")),
            )
            .add_table(docx_rs::Table::new(vec![docx_rs::TableRow::new(vec![
                docx_rs::TableCell::new().add_paragraph(
                    docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Licenses")),
                ),
                docx_rs::TableCell::new().add_paragraph(
                    docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("$12,000")),
                ),
            ])]))
            .build()
            .pack(file)
            .expect("pack docx");

        let text = extract_text(&path, DocumentFormat::Docx).expect("extract docx");
        assert!(text.contains("Executive summary"));
        assert!(text.contains("Licenses | $12,000"));
    }

    #[test]
    fn text_is_read_lossily() {
        let path = temp_file("notes.txt");
        std::fs::write(&path, b"caf\xe9 menu").expect("write");
        let text = extract_text(&path, DocumentFormat::Text).expect("extract text");
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" menu"));
    }

    #[test]
    fn corrupt_pdf_is_a_load_error() {
        let path = temp_file("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").expect("write");
        let err = extract_text(&path, DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, RfqScopeError::Load { .. }));
    }

    #[test]
    fn corrupt_spreadsheet_is_a_load_error() {
        let path = temp_file("pricing.xlsx");
        std::fs::write(&path, b"not a zip").expect("write");
        let err = extract_text(&path, DocumentFormat::Spreadsheet).unwrap_err();
        assert!(matches!(err, RfqScopeError::Load { .. }));
    }
}
