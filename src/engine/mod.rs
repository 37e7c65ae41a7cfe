//! Engine module for the `funnel` command-line driver

pub mod arg_parser;
pub mod cli;
pub mod command;
pub mod progress;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::{FeedSummary, feed_input, handle_run};
pub use command::CommandTemplate;
