//! Package directive extraction
//!
//! Directives look like `Package: Name 1.2.3` and may appear several times in
//! one comment, across line breaks. Occurrences that do not match, or whose
//! version does not parse, are skipped one at a time.

use crate::packages::reference::{parse_version, PackageReference};
use tracing::debug;

/// Default directive keyword
pub const DEFAULT_DIRECTIVE: &str = "Package:";

/// Extraction seam
pub trait DirectiveExtractor: Send + Sync {
    /// Collect package references from comment texts
    fn extract(&self, comments: &[String]) -> Vec<PackageReference>;
}

/// Extracts `<keyword> <name> <version>` directives from comments
#[derive(Debug, Clone)]
pub struct CommentDirectiveExtractor {
    keyword: String,
}

impl CommentDirectiveExtractor {
    /// Extractor for a custom keyword
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    fn scan(&self, text: &str, out: &mut Vec<PackageReference>) {
        if self.keyword.is_empty() {
            return;
        }

        let mut rest = text;
        while let Some(pos) = rest.find(self.keyword.as_str()) {
            let after = &rest[pos + self.keyword.len()..];
            match parse_directive(after) {
                Some((name, version, consumed)) => {
                    if parse_version(version).is_some() {
                        out.push(PackageReference::new(name, version));
                    } else {
                        debug!("Ignoring directive for {} with malformed version {}", name, version);
                    }
                    rest = &after[consumed..];
                }
                None => rest = after,
            }
        }
    }
}

impl Default for CommentDirectiveExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIVE)
    }
}

impl DirectiveExtractor for CommentDirectiveExtractor {
    fn extract(&self, comments: &[String]) -> Vec<PackageReference> {
        let mut references = Vec::new();
        for comment in comments {
            self.scan(comment, &mut references);
        }
        references
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_version_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '+')
}

/// Parse `<ws>* name <ws>+ version` at the start of `s`.
///
/// Returns the name, version text and number of bytes consumed.
fn parse_directive(s: &str) -> Option<(&str, &str, usize)> {
    let name_start = s.len() - s.trim_start().len();
    let name_len = s[name_start..]
        .find(|c: char| !is_name_char(c))
        .unwrap_or(s.len() - name_start);
    if name_len == 0 {
        return None;
    }
    let name_end = name_start + name_len;

    let after_name = &s[name_end..];
    let gap = after_name.len() - after_name.trim_start().len();
    if gap == 0 {
        return None;
    }

    let version_start = name_end + gap;
    if !s[version_start..].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let version_len = s[version_start..]
        .find(|c: char| !is_version_char(c))
        .unwrap_or(s.len() - version_start);
    let version_end = version_start + version_len;

    Some((&s[name_start..name_end], &s[version_start..version_end], version_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(comment: &str) -> Vec<PackageReference> {
        CommentDirectiveExtractor::default().extract(&[comment.to_string()])
    }

    #[test]
    fn single_directives() {
        let cases = [
            ("Package: FluentAssertions 6.6.0", Some(("FluentAssertions", "6.6.0"))),
            ("Package:FluentAssertions 6.6.0-beta1", Some(("FluentAssertions", "6.6.0-beta1"))),
            ("// Package: NUnit 3.13.3-dota2", Some(("NUnit", "3.13.3-dota2"))),
            ("Package: NUnit: 3.13.3-beta1", None),
            ("Package: NUnit beta1-3.13.3", None),
            ("6.6.0-beta1 NUnit:", None),
            ("3.13-beta3-3: NUnit3TestAdapter", None),
        ];

        for (comment, expected) in cases {
            let found = extract(comment);
            match expected {
                Some((name, version)) => {
                    assert_eq!(found, vec![PackageReference::new(name, version)], "{comment}")
                }
                None => assert!(found.is_empty(), "{comment}: {found:?}"),
            }
        }
    }

    #[test]
    fn malformed_version_is_dropped_silently() {
        assert!(extract("Package: Foo not-a-version").is_empty());
        assert!(extract("Package: Foo 1.2.3.4.5").is_empty());
    }

    #[test]
    fn many_directives_in_one_line() {
        let comment = "Package: FluentAssertions 6.6.0 Package: 3.13-beta3-3 NUnit3TestAdapter: \
                       Package: NUnit 3.13.3-dota2 6.6.0-beta1: NUnit";
        assert_eq!(
            extract(comment),
            vec![
                PackageReference::new("FluentAssertions", "6.6.0"),
                PackageReference::new("NUnit", "3.13.3-dota2"),
            ]
        );
    }

    #[test]
    fn directives_across_line_breaks() {
        let comment = "Package: FluentAssertions 6.6.0\rPackage: 3.13-beta3-3 NUnit3TestAdapter:\r\n  \
                       Package: NUnit 3.13.3-dota2 Package: 6.6.0-beta1 NUnit";
        assert_eq!(
            extract(comment),
            vec![
                PackageReference::new("FluentAssertions", "6.6.0"),
                PackageReference::new("NUnit", "3.13.3-dota2"),
            ]
        );
    }

    #[test]
    fn block_comment_with_several_directives() {
        let comment = "/* \n    Package: Vostok.Logging.Abstractions 1.0.23\n    Package: Vostok.Logging.Formatting 1.0.8\n*/";
        assert_eq!(
            extract(comment),
            vec![
                PackageReference::new("Vostok.Logging.Abstractions", "1.0.23"),
                PackageReference::new("Vostok.Logging.Formatting", "1.0.8"),
            ]
        );
    }

    #[test]
    fn custom_keyword() {
        let extractor = CommentDirectiveExtractor::new("@dep");
        let found = extractor.extract(&["// @dep serde 1.0".to_string()]);
        assert_eq!(found, vec![PackageReference::new("serde", "1.0")]);
    }

    #[test]
    fn comments_without_directives() {
        assert!(extract("// just a comment").is_empty());
        assert!(extract("Package:").is_empty());
    }
}
