//! RFQScope CLI: summarize an RFQ and its vendor responses, then rank the vendors.
//!
//! `rfqscope <RUN_ID>` reads `{docs_root}/{RUN_ID}/` and writes every
//! artifact to `{output_root}/{RUN_ID}/`.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing();
    commands::run(cli).await
}
