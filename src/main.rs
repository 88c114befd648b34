//! ManimGL notebook binary
//!
//! Run with: cargo run -- path/to/scene.py
//!
//! For help: cargo run -- --help

use std::io::IsTerminal;

use clap::Parser;
use manim_notebook::{Cli, run_with_cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let result = run_with_cli(&cli).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);

        if std::io::stderr().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(1);
    }

    // The stdin reader blocks runtime shutdown until the next line arrives
    std::process::exit(0);
}
