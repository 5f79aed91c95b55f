//! Memo node representation.
//!
//! A MemoNode is one heading section of a document: its title, the
//! optional annotations, the prose under it, its fenced code, and the
//! deeper sections nested below it.

use serde::{Deserialize, Serialize};

/// An ordered sequence of root-level memos.
///
/// A document may have several top-level headings, so parsing yields a
/// forest rather than a single tree.
pub type Forest = Vec<MemoNode>;

/// A fenced code block captured from a section body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// First token of the fence's info string. Empty when the fence had none.
    pub language: String,

    /// Verbatim content between the fences, line breaks included.
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// One parsed heading section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoNode {
    /// Heading depth: 1 for `#`, 2 for `##`, and so on.
    ///
    /// Level 0 is reserved for the synthetic node holding text that
    /// appears before the first heading.
    pub level: u32,

    /// Heading text, trimmed.
    pub title: String,

    /// Text of the first `<desc>` tag in the section.
    pub description: Option<String>,

    /// Text of the first `<path>` tag in the section.
    pub path: Option<String>,

    /// Section body without tag lines and fenced code.
    pub content: String,

    /// Fenced code blocks in document order.
    pub code_blocks: Vec<CodeBlock>,

    /// Nested sections in document order. Every child has a greater level.
    pub children: Vec<MemoNode>,
}

impl MemoNode {
    /// Creates an empty section.
    pub fn new(level: u32, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
            path: None,
            content: String::new(),
            code_blocks: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder pattern: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder pattern: set path annotation.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder pattern: set body content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Builder pattern: append a code block.
    pub fn with_code_block(mut self, block: CodeBlock) -> Self {
        self.code_blocks.push(block);
        self
    }

    /// Builder pattern: append a child section.
    pub fn with_child(mut self, child: MemoNode) -> Self {
        self.children.push(child);
        self
    }

    /// Whether this is the placeholder for text before the first heading.
    pub fn is_prologue(&self) -> bool {
        self.level == 0
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MemoNode::node_count).sum::<usize>()
    }

    /// Pre-order traversal of this subtree.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }
}

/// Pre-order iterator over a memo subtree.
pub struct Iter<'a> {
    stack: Vec<&'a MemoNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a MemoNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoNode {
        MemoNode::new(1, "A")
            .with_child(MemoNode::new(2, "B").with_child(MemoNode::new(3, "C")))
            .with_child(MemoNode::new(2, "D"))
    }

    #[test]
    fn test_node_count() {
        assert_eq!(sample().node_count(), 4);
        assert_eq!(MemoNode::new(1, "leaf").node_count(), 1);
    }

    #[test]
    fn test_iter_is_preorder() {
        let node = sample();
        let titles: Vec<_> = node.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_serialized_field_names() {
        let node = MemoNode::new(1, "Title")
            .with_description("what")
            .with_code_block(CodeBlock::new("rs", "fn f() {}\n"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["level"], 1);
        assert_eq!(json["description"], "what");
        assert!(json["path"].is_null());
        assert_eq!(json["code_blocks"][0]["language"], "rs");
        assert_eq!(json["children"].as_array().unwrap().len(), 0);
    }
}
