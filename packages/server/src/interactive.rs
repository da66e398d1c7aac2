//! Interactive mode for the server.
//!
//! Prompts for the bind address, port, and `SQLite` path before starting
//! the server.

use dialoguer::{Confirm, Input};
use fireline_database::db::DEFAULT_DATABASE_PATH;

/// Runs the server in interactive mode, prompting for configuration.
///
/// Sets `BIND_ADDR`, `PORT`, and (unless `DATABASE_URL` is already set)
/// `DATABASE_PATH` from the answers, then delegates to
/// [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Fireline Server");
    println!();

    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default("127.0.0.1".to_string())
        .interact_text()
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port_str: String = Input::new()
        .with_prompt("Port")
        .default("8080".to_string())
        .interact_text()
        .unwrap_or_else(|_| "8080".to_string());

    let database_path = if std::env::var("DATABASE_URL").is_ok() {
        println!("Using DATABASE_URL from the environment");
        None
    } else {
        let path: String = Input::new()
            .with_prompt("SQLite database path")
            .default(DEFAULT_DATABASE_PATH.to_string())
            .interact_text()
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
        Some(path)
    };

    // SAFETY: We are single-threaded at this point (before server starts) and
    // these variables are only read once during server initialisation.
    unsafe {
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", &port_str);
        if let Some(path) = &database_path {
            std::env::set_var("DATABASE_PATH", path);
        }
    }

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port_str}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}
