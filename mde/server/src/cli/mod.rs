use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod issue;
mod serve;

pub use issue::IssueCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "mde")]
#[command(about = "Windows MDM enrollment server")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the discovery, policy and enrollment endpoints
    Serve(ServeCommand),
    /// Issue a certificate for a request file without starting the server
    Issue(IssueCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve(cmd) => cmd.run().await,
            Command::Issue(cmd) => cmd.run(),
        }
    }
}

/**
    Install the global subscriber. `RUST_LOG` overrides the `info` default.
*/
pub(crate) fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
