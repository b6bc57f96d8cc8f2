//! Declarative source parsing and reserialization

pub mod error;
pub mod lexer;
pub mod parser;
pub mod pool;
pub mod printer;
pub mod source_map;


pub use error::{ParseError, ParseErrorKind};
pub use parser::{ParseOutcome, ParsedUnit, SourceUnit, parse_unit, parse_units};
pub use pool::{ParseRequest, ParserPool, create_parser_pool};
pub use printer::{SOURCE_EXTENSION, dump_elements, render_element};
pub use source_map::{SourceLocation, SourceMap};
