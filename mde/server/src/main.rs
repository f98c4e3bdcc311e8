use anyhow::Result;
use clap::Parser;

mod cli;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Args::parse().run().await
}
