use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tracker-chain")]
#[command(about = "Permissioned document-tracker ledger node", version)]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node: workers plus the HTTP and RPC surfaces
    Start {
        /// Optional TOML settings file; environment variables override it
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Decrypt and print the persisted chain
    PrintChain,
    /// Decrypt and print the pending-transaction pool
    Pool,
    /// Create the node key pair ahead of first start
    Keygen,
}
