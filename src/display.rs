//! Colored terminal output for startup and fatal errors.

use std::io::{self, Write};
use std::net::SocketAddr;

use chrono::Utc;
use owo_colors::OwoColorize;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Describe the filter for humans.
#[must_use]
pub fn describe_pattern(pattern: &str) -> String {
    if pattern.is_empty() {
        "(all lines)".to_string()
    } else {
        format!("/{pattern}/i")
    }
}

/// Print the startup banner once the server is listening.
pub fn print_banner(addr: SocketAddr, source: &str, pattern: &str) {
    println!("\n    {}\n", "TUKU!".green().bold());
    println!(
        "{} {} source={} filter={} ws://{}/ws",
        timestamp().dimmed(),
        "[READY]".blue().bold(),
        source.cyan(),
        describe_pattern(pattern),
        addr
    );
    let _ = io::stdout().flush();
}

/// Print a fatal error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
    let _ = io::stderr().flush();
}
