//! Parser module - turns Markdown headings into a memo forest.
//!
//! The parser is a single pass over the document's lines. It keeps a stack
//! of open sections, one per heading level currently in scope, and a small
//! amount of fence state. Parsing is total: malformed input degrades by a
//! fixed rule and is reported as a [`ParseWarning`] instead of failing.
//!
//! Recognised syntax:
//! - headings: one or more `#` followed by whitespace (or end of line);
//! - tag lines: `<desc>TEXT</desc>` and `<path>TEXT</path>` on their own line;
//! - fenced code: three or more `` ` `` or `~`, optionally followed by a language.

use crate::error::{ParseError, Result};
use crate::format::ExtensionFilter;
use crate::node::{CodeBlock, Forest, MemoNode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// The two annotation tags a section body may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    #[serde(rename = "desc")]
    Description,
    Path,
}

impl TagKind {
    const ALL: [TagKind; 2] = [TagKind::Description, TagKind::Path];

    fn open(self) -> &'static str {
        match self {
            Self::Description => "<desc>",
            Self::Path => "<path>",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Self::Description => "</desc>",
            Self::Path => "</path>",
        }
    }
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Description => "desc",
            Self::Path => "path",
        };
        write!(f, "{}", s)
    }
}

/// A degradation applied while parsing. Lines are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// A fence was still open at end of input and was closed implicitly.
    UnterminatedFence { line: usize },

    /// A second tag of the same kind in one section; it was kept as content.
    DuplicateTag { tag: TagKind, line: usize },

    /// A heading skipped one or more levels below its parent.
    SkippedLevel {
        line: usize,
        parent_level: u32,
        level: u32,
    },

    /// Text before the first heading was kept in a level-0 placeholder.
    Prologue { line: usize },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedFence { line } => {
                write!(f, "line {}: code fence never closed", line)
            }
            Self::DuplicateTag { tag, line } => {
                write!(f, "line {}: duplicate <{}> tag ignored", line, tag)
            }
            Self::SkippedLevel {
                line,
                parent_level,
                level,
            } => write!(
                f,
                "line {}: level {} heading under level {} heading",
                line, level, parent_level
            ),
            Self::Prologue { line } => {
                write!(f, "line {}: text before the first heading", line)
            }
        }
    }
}

/// Result of parsing one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub memos: Forest,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedDocument {
    /// True if any degradation rule fired.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Total number of memo nodes across the forest.
    pub fn node_count(&self) -> usize {
        self.memos.iter().map(MemoNode::node_count).sum()
    }
}

/// Parses Markdown text into a memo forest.
///
/// Never fails; see [`parse_document`] to also get the warnings.
///
/// # Example
///
/// ```
/// use fmemo_core::parse;
///
/// let memos = parse("# Title\n<desc>short</desc>\nbody");
/// assert_eq!(memos[0].description.as_deref(), Some("short"));
/// assert_eq!(memos[0].content, "body");
/// ```
pub fn parse(text: &str) -> Forest {
    parse_document(text).memos
}

/// Parses Markdown text, keeping track of every degradation applied.
pub fn parse_document(text: &str) -> ParsedDocument {
    let mut parser = HeadingParser::default();
    for (index, raw) in text.split_inclusive('\n').enumerate() {
        parser.feed(index + 1, raw);
    }
    parser.finish()
}

/// Reads a memo file as UTF-8 text.
///
/// Rejects files whose extension isn't on the allow-list.
pub fn read_source(path: &Path, filter: &ExtensionFilter) -> Result<String> {
    if !filter.matches(path) {
        return Err(ParseError::UnsupportedFormat(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|e| ParseError::io(path, e))
}

/// Reads and parses a memo file.
pub fn parse_file(path: &Path, filter: &ExtensionFilter) -> Result<ParsedDocument> {
    let source = read_source(path, filter)?;
    let document = parse_document(&source);
    debug!(
        "Parsed {}: {} memos, {} warnings",
        path.display(),
        document.node_count(),
        document.warnings.len()
    );
    Ok(document)
}

/// A section whose heading has been seen but whose end has not.
struct OpenSection<'a> {
    node: MemoNode,
    body: Vec<&'a str>,
}

impl<'a> OpenSection<'a> {
    fn new(node: MemoNode) -> Self {
        Self {
            node,
            body: Vec::new(),
        }
    }

    fn has_text(&self) -> bool {
        self.body.iter().any(|l| !l.trim().is_empty())
    }

    /// Closes the section: body lines become `content`, blank edges dropped.
    fn finish(self) -> MemoNode {
        let mut node = self.node;
        let start = self.body.iter().position(|l| !l.trim().is_empty());
        let end = self.body.iter().rposition(|l| !l.trim().is_empty());
        if let (Some(start), Some(end)) = (start, end) {
            node.content = self.body[start..=end].join("\n");
        }
        node
    }
}

/// An open code fence.
struct Fence {
    marker: char,
    run: usize,
    language: String,
    code: String,
    line: usize,
}

impl Fence {
    /// Recognises an opening fence line.
    fn open(line: &str, line_no: usize) -> Option<Self> {
        let trimmed = line.trim();
        let marker = trimmed.chars().next()?;
        if marker != '`' && marker != '~' {
            return None;
        }
        let run = trimmed.chars().take_while(|&c| c == marker).count();
        if run < 3 {
            return None;
        }
        let language = trimmed[run..]
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        Some(Self {
            marker,
            run,
            language,
            code: String::new(),
            line: line_no,
        })
    }

    /// A closing fence uses the same character, at least as many times,
    /// and nothing else.
    fn is_closed_by(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|&c| c == self.marker).count();
        run >= self.run && trimmed[run..].trim().is_empty()
    }

    fn into_block(self) -> CodeBlock {
        CodeBlock::new(self.language, self.code)
    }
}

#[derive(Default)]
struct HeadingParser<'a> {
    roots: Forest,
    stack: Vec<OpenSection<'a>>,
    prologue: Option<OpenSection<'a>>,
    prologue_line: Option<usize>,
    fence: Option<Fence>,
    warnings: Vec<ParseWarning>,
}

impl<'a> HeadingParser<'a> {
    fn feed(&mut self, line_no: usize, raw: &'a str) {
        let line = raw.trim_end_matches(['\n', '\r']);

        if let Some(fence) = self.fence.as_mut() {
            if fence.is_closed_by(line) {
                if let Some(fence) = self.fence.take() {
                    self.current(line_no).node.code_blocks.push(fence.into_block());
                }
            } else {
                fence.code.push_str(raw);
            }
            return;
        }

        if let Some(fence) = Fence::open(line, line_no) {
            // The section the block lands in is fixed when the fence opens.
            self.current(line_no);
            self.fence = Some(fence);
            return;
        }

        if let Some((level, title)) = heading(line) {
            self.open_heading(line_no, level, title);
            return;
        }

        if let Some((tag, text)) = tag_line(line) {
            let section = self.current(line_no);
            let slot = match tag {
                TagKind::Description => &mut section.node.description,
                TagKind::Path => &mut section.node.path,
            };
            if slot.is_none() {
                *slot = Some(text.to_string());
                return;
            }
            self.warnings.push(ParseWarning::DuplicateTag { tag, line: line_no });
        }

        if self.stack.is_empty() && line.trim().is_empty() && self.prologue.is_none() {
            // Leading blank lines never start a prologue.
            return;
        }
        self.current(line_no).body.push(line);
    }

    /// The section that body text currently belongs to.
    ///
    /// Before the first heading this is the prologue placeholder, created
    /// on first use.
    fn current(&mut self, line_no: usize) -> &mut OpenSection<'a> {
        if let Some(section) = self.stack.last_mut() {
            return section;
        }
        self.prologue_line.get_or_insert(line_no);
        self.prologue
            .get_or_insert_with(|| OpenSection::new(MemoNode::new(0, "")))
    }

    fn open_heading(&mut self, line_no: usize, level: u32, title: &str) {
        self.close_sections(level);

        if let Some(parent) = self.stack.last() {
            if level > parent.node.level + 1 {
                self.warnings.push(ParseWarning::SkippedLevel {
                    line: line_no,
                    parent_level: parent.node.level,
                    level,
                });
            }
        }

        self.stack.push(OpenSection::new(MemoNode::new(level, title)));
    }

    /// Closes every open section at `level` or deeper, attaching each to
    /// its parent, or to the forest when it has none.
    fn close_sections(&mut self, level: u32) {
        while let Some(top) = self.stack.pop() {
            if top.node.level < level {
                self.stack.push(top);
                break;
            }
            let node = top.finish();
            match self.stack.last_mut() {
                Some(parent) => parent.node.children.push(node),
                None => self.roots.push(node),
            }
        }
    }

    fn finish(mut self) -> ParsedDocument {
        if let Some(fence) = self.fence.take() {
            self.warnings
                .push(ParseWarning::UnterminatedFence { line: fence.line });
            let line = fence.line;
            self.current(line).node.code_blocks.push(fence.into_block());
        }

        self.close_sections(0);

        if let Some(prologue) = self.prologue.take() {
            let keep = prologue.has_text()
                || !prologue.node.code_blocks.is_empty()
                || prologue.node.description.is_some()
                || prologue.node.path.is_some();
            if keep {
                let line = self.prologue_line.unwrap_or(1);
                self.warnings.push(ParseWarning::Prologue { line });
                self.roots.insert(0, prologue.finish());
            }
        }

        self.warnings.sort_by_key(warning_line);

        ParsedDocument {
            memos: self.roots,
            warnings: self.warnings,
        }
    }
}

fn warning_line(warning: &ParseWarning) -> usize {
    match warning {
        ParseWarning::UnterminatedFence { line }
        | ParseWarning::DuplicateTag { line, .. }
        | ParseWarning::SkippedLevel { line, .. }
        | ParseWarning::Prologue { line } => *line,
    }
}

/// Recognises a heading line, returning its level and trimmed title.
fn heading(line: &str) -> Option<(u32, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let level = u32::try_from(hashes).unwrap_or(u32::MAX);
    Some((level, rest.trim()))
}

/// Recognises a single-line `<desc>` or `<path>` tag.
fn tag_line(line: &str) -> Option<(TagKind, &str)> {
    let trimmed = line.trim();
    TagKind::ALL.into_iter().find_map(|tag| {
        trimmed
            .strip_prefix(tag.open())
            .and_then(|rest| rest.strip_suffix(tag.close()))
            .map(|inner| (tag, inner.trim()))
    })
}
