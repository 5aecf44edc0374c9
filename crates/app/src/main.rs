mod args;
mod logging;
mod op;
mod ops;
mod state;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Consents, Delete, Get, Grant, Init, Principal, Put, Revoke, Schema, Version};

command_enum! {
    (Init, Init),
    (Principal, Principal),
    (Schema, Schema),
    (Put, Put),
    (Get, Get),
    (Delete, Delete),
    (Grant, Grant),
    (Revoke, Revoke),
    (Consents, Consents),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Before `init` there is no config; log with the defaults
    let config = state::AppState::load(args.config_path.clone())
        .ok()
        .map(|state| state.config);
    let _guards = logging::init_logging(config.as_ref());

    let ctx = op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
