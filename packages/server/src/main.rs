#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fireline API server binary.
//!
//! ```text
//! fireline_server                # start with BIND_ADDR / PORT / DATABASE_* from the env
//! fireline_server --interactive  # prompt for the settings first
//! ```

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "fireline_server",
    about = "Incident dispatch API and realtime event stream"
)]
struct Cli {
    /// Prompt for bind address, port, and database path before starting
    #[arg(long, short)]
    interactive: bool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    if cli.interactive {
        fireline_server::interactive::run().await
    } else {
        fireline_server::run_server().await
    }
}
