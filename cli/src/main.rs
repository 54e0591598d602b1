//! Entry-point for the `datapillar-chat` binary.
use clap::Parser;
use datapillar_cli::Cli;
use datapillar_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_main(cli).await
}
