//! Slow-query-log record model and parsing.

pub mod entry;
pub mod parse;

pub use entry::{Entry, Params};
pub use parse::LogParser;
