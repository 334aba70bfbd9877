pub mod fields;
pub mod source;
pub mod title;

pub use source::{ParserOptions, SourceFormat, SourceRow, SourceRows};
