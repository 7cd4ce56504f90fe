//! Model output processing: fragment reading and tag extraction

pub mod parser;
pub mod reader;

#[cfg(test)]
mod proptests;

pub use parser::{ParserEvent, TagParser, DEFAULT_CAPABILITY};
pub use reader::{Fragment, TokenStreamReader};
