//! Main entry point for passtree.

use clap::Parser;
use passtree::cli::Cli;
use passtree::logging;
use passtree::utils::error_exit;

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = cli.execute().await {
        error_exit(&format!("{e:#}"), 1);
    }
}
