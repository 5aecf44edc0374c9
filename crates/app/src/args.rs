pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddh")]
#[command(about = "Store, share and govern personal data by consent")]
pub struct Args {
    /// Path to the ddh state directory (defaults to ~/.ddh)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
