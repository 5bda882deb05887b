//! Shared pieces of the `can-attack` and `can-sniff` tools

pub mod console;
pub mod output;

pub use console::{parse_id, ConsoleCommand, ConsoleError};
pub use output::{AttackRow, MessageRow, OutputContext, OutputFormat, SniffLine};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the log subscriber for a tool binary
///
/// Logs go to stderr so tables on stdout stay clean.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "testbed_attack=debug,testbed_can=debug,testbed_cli=debug"
    } else {
        "testbed_attack=warn,testbed_can=warn,testbed_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
