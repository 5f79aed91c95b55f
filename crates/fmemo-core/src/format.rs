//! Supported file formats.
//!
//! Memo files are recognised purely by extension. The allow-list is
//! configurable so projects can opt other Markdown-ish files in.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extensions treated as memo files when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["fmemo", "md"];

/// Case-insensitive allow-list of file extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl From<Vec<String>> for ExtensionFilter {
    fn from(extensions: Vec<String>) -> Self {
        Self::new(extensions)
    }
}

impl From<ExtensionFilter> for Vec<String> {
    fn from(filter: ExtensionFilter) -> Self {
        filter.extensions
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl ExtensionFilter {
    /// Builds a filter from extensions, with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        Self { extensions }
    }

    /// Checks a bare extension such as `"md"`.
    pub fn is_supported(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.extensions.iter().any(|e| *e == extension)
    }

    /// Checks whether a path names a memo file.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.is_supported(e))
            .unwrap_or(false)
    }

    /// The normalised extensions, sorted.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter = ExtensionFilter::default();
        assert!(filter.matches(Path::new("notes/todo.fmemo")));
        assert!(filter.matches(Path::new("README.MD")));
        assert!(!filter.matches(Path::new("main.rs")));
        assert!(!filter.matches(Path::new("Makefile")));
    }

    #[test]
    fn test_custom_extensions_are_normalised() {
        let filter = ExtensionFilter::new([".Markdown", "txt", "txt", ""]);
        assert_eq!(filter.extensions(), &["markdown".to_string(), "txt".to_string()]);
        assert!(filter.matches(Path::new("a.markdown")));
        assert!(!filter.matches(Path::new("a.md")));
    }

    #[test]
    fn test_serde_is_a_plain_list() {
        let filter: ExtensionFilter = serde_json::from_str(r#"["MD", ".txt"]"#).unwrap();
        assert!(filter.is_supported("md"));
        assert!(filter.is_supported("txt"));
        assert_eq!(serde_json::to_string(&filter).unwrap(), r#"["md","txt"]"#);
    }
}
