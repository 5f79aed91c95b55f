//! fmemo Core - Markdown heading parsing
//!
//! This crate provides the data model and the parser at the heart of fmemo.
//! A memo document is ordinary Markdown whose headings define a tree of
//! sections; each section can carry a `<desc>` and a `<path>` annotation
//! and any number of fenced code blocks.
//!
//! # Example
//!
//! ```
//! use fmemo_core::parse;
//!
//! let memos = parse("# A\n## B\n## C\n# D");
//! assert_eq!(memos.len(), 2);
//! assert_eq!(memos[0].children.len(), 2);
//! ```

pub mod directory;
pub mod error;
pub mod format;
pub mod node;
pub mod notification;
pub mod parser;

pub use directory::DirectoryTree;
pub use error::{ParseError, Result};
pub use format::{ExtensionFilter, DEFAULT_EXTENSIONS};
pub use node::{CodeBlock, Forest, MemoNode};
pub use notification::ChangeNotification;
pub use parser::{
    parse, parse_document, parse_file, read_source, ParseWarning, ParsedDocument, TagKind,
};
