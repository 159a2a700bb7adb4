use std::collections::HashMap;
use std::sync::Mutex;

use migration_core::ports::{FieldQuery, MarkupBlock, MarkupScanner};
use regex::Regex;
use tracing::error;

/// Identifier attribute used by Disqus exports
pub const DISQUS_ID_ATTRIBUTE: &str = "dsq:id";

/// Pattern-based scanner for loosely structured XML exports
///
/// Only the handful of shapes needed to recover comments are recognised:
/// paired elements with attributes, text-only fields, CDATA fields and
/// double-quoted attributes. Compiled patterns are cached per query.
pub struct RegexMarkupScanner {
    id_attribute: String,
    cache: Mutex<HashMap<String, Regex>>,
}

impl Default for RegexMarkupScanner {
    fn default() -> Self {
        Self::new(DISQUS_ID_ATTRIBUTE)
    }
}

impl RegexMarkupScanner {
    /// Creates a scanner that reads block ids from `id_attribute`
    pub fn new(id_attribute: &str) -> Self {
        Self {
            id_attribute: id_attribute.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn pattern(&self, key: String, source: impl FnOnce() -> String) -> Option<Regex> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(regex) = cache.get(&key) {
            return Some(regex.clone());
        }
        let source = source();
        match Regex::new(&source) {
            Ok(regex) => {
                cache.insert(key, regex.clone());
                Some(regex)
            }
            Err(e) => {
                error!(pattern = %source, error = %e, "invalid markup pattern");
                None
            }
        }
    }

    /// Paired `<kind ...>body</kind>`; a self-closing `<kind .../>` never matches
    fn block_pattern(&self, kind: &str) -> Option<Regex> {
        self.pattern(format!("block:{kind}"), || {
            let kind = regex::escape(kind);
            format!(r"(?s)<{kind}(\s(?:[^>]*[^/>])?)?>(.*?)</{kind}\s*>")
        })
    }

    fn text_pattern(&self, name: &str) -> Option<Regex> {
        self.pattern(format!("text:{name}"), || {
            let name = regex::escape(name);
            format!(r"(?i)<{name}(?:\s[^>]*)?>([^<]*)</{name}\s*>")
        })
    }

    fn cdata_pattern(&self, name: &str) -> Option<Regex> {
        self.pattern(format!("cdata:{name}"), || {
            let name = regex::escape(name);
            format!(r"(?is)<{name}(?:\s[^>]*)?>\s*<!\[CDATA\[(.*?)\]\]>\s*</{name}\s*>")
        })
    }

    fn attribute_pattern(&self, tag: &str, attr: &str) -> Option<Regex> {
        self.pattern(format!("attr:{tag}@{attr}"), || {
            let tag = regex::escape(tag);
            let attr = regex::escape(attr);
            format!(r#"(?i)<{tag}\s(?:[^>]*\s)?{attr}\s*=\s*"([^"]*)""#)
        })
    }

    /// Reads the id attribute out of an opening tag's attribute text
    fn block_id(&self, attributes: &str) -> Option<String> {
        let attr = self.id_attribute.as_str();
        self.pattern(format!("id:{attr}"), || {
            let attr = regex::escape(attr);
            format!(r#"(?:^|\s){attr}\s*=\s*"([^"]*)""#)
        })?
        .captures(attributes)
        .map(|caps| caps[1].to_string())
    }
}

impl MarkupScanner for RegexMarkupScanner {
    fn find_blocks(&self, markup: &str, kind: &str) -> Vec<MarkupBlock> {
        let Some(pattern) = self.block_pattern(kind) else {
            return Vec::new();
        };
        pattern
            .captures_iter(markup)
            .map(|caps| MarkupBlock {
                id: caps.get(1).and_then(|attrs| self.block_id(attrs.as_str())),
                body: caps.get(2).map_or_else(String::new, |body| body.as_str().to_string()),
            })
            .collect()
    }

    fn find_field(&self, block: &str, query: FieldQuery<'_>) -> Option<String> {
        match query {
            FieldQuery::Text(name) => self
                .text_pattern(name)?
                .captures(block)
                .map(|caps| caps[1].trim().to_string()),
            FieldQuery::Markup(name) => self
                .cdata_pattern(name)?
                .captures(block)
                .map(|caps| caps[1].to_string())
                .or_else(|| self.find_field(block, FieldQuery::Text(name))),
            FieldQuery::Attribute { tag, attr } => self
                .attribute_pattern(tag, attr)?
                .captures(block)
                .map(|caps| caps[1].to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<disqus xmlns="http://disqus.com" xmlns:dsq="http://disqus.com/disqus-internals">
  <category dsq:id="100"><forum>blog</forum><title>General</title></category>
  <thread dsq:id="T1">
    <id />
    <forum>blog</forum>
    <link>https://example.com/post-1</link>
    <title>First post</title>
  </thread>
  <thread dsq:id="T2"><title>No link here</title></thread>
  <post dsq:id="P1">
    <id>wp_id=1</id>
    <message><![CDATA[<p>Hello &amp; welcome</p>]]></message>
    <createdAt>2013-01-23T12:34:56Z</createdAt>
    <isDeleted>false</isDeleted>
    <isSpam>false</isSpam>
    <author>
      <email>ada@example.com</email>
      <name>Ada</name>
      <isAnonymous>false</isAnonymous>
    </author>
    <thread dsq:id="T1" />
  </post>
  <post dsq:id="P2">
    <message>plain body</message>
    <thread dsq:id="T1"/>
  </post>
</disqus>
"#;

    #[test]
    fn test_find_blocks_threads_skip_self_closing_references() {
        let scanner = RegexMarkupScanner::default();
        let threads = scanner.find_blocks(EXPORT, "thread");
        let ids: Vec<_> = threads.iter().map(|t| t.id.as_deref()).collect();
        assert_eq!(ids, [Some("T1"), Some("T2")]);
        assert!(threads[0].body.contains("<link>https://example.com/post-1</link>"));
    }

    #[test]
    fn test_find_blocks_posts() {
        let scanner = RegexMarkupScanner::default();
        let posts = scanner.find_blocks(EXPORT, "post");
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id.as_deref(), Some("P1"));
        assert_eq!(posts[1].id.as_deref(), Some("P2"));
        assert!(posts[0].body.contains("<createdAt>"));
        assert!(!posts[0].body.contains("P2"));
    }

    #[test]
    fn test_find_blocks_without_id() {
        let scanner = RegexMarkupScanner::default();
        let blocks = scanner.find_blocks("<post><message>x</message></post><post >y</post>", "post");
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.id.is_none()));
        assert_eq!(blocks[1].body, "y");
    }

    #[test]
    fn test_find_blocks_ignores_longer_tag_names() {
        let scanner = RegexMarkupScanner::default();
        let markup = r#"<posts><post dsq:id="1">a</post></posts>"#;
        let blocks = scanner.find_blocks(markup, "post");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "a");
    }

    #[test]
    fn test_block_id_requires_exact_attribute() {
        let scanner = RegexMarkupScanner::default();
        assert_eq!(scanner.block_id(r#" xdsq:id="no" dsq:id="yes""#), Some("yes".to_string()));
        assert_eq!(scanner.block_id(r#" dsq:id = "spaced""#), Some("spaced".to_string()));
        assert_eq!(scanner.block_id(r#" other="1""#), None);
    }

    #[test]
    fn test_custom_id_attribute() {
        let scanner = RegexMarkupScanner::new("id");
        let blocks = scanner.find_blocks(r#"<post id="42">x</post>"#, "post");
        assert_eq!(blocks[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn test_find_field_text_is_trimmed_and_case_insensitive() {
        let scanner = RegexMarkupScanner::default();
        let block = "<Link>\n  https://example.com/a  \n</Link>";
        assert_eq!(
            scanner.find_field(block, FieldQuery::Text("link")),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(scanner.find_field(block, FieldQuery::Text("title")), None);
    }

    #[test]
    fn test_find_field_text_empty_element() {
        let scanner = RegexMarkupScanner::default();
        assert_eq!(
            scanner.find_field("<link></link>", FieldQuery::Text("link")),
            Some(String::new())
        );
    }

    #[test]
    fn test_find_field_markup_prefers_cdata() {
        let scanner = RegexMarkupScanner::default();
        let posts = scanner.find_blocks(EXPORT, "post");
        assert_eq!(
            scanner.find_field(&posts[0].body, FieldQuery::Markup("message")),
            Some("<p>Hello &amp; welcome</p>".to_string())
        );
        assert_eq!(
            scanner.find_field(&posts[1].body, FieldQuery::Markup("message")),
            Some("plain body".to_string())
        );
    }

    #[test]
    fn test_find_field_markup_multiline_cdata() {
        let scanner = RegexMarkupScanner::default();
        let block = "<message>\n<![CDATA[<p>one</p>\n<p>two ]] still</p>]]>\n</message>";
        assert_eq!(
            scanner.find_field(block, FieldQuery::Markup("message")),
            Some("<p>one</p>\n<p>two ]] still</p>".to_string())
        );
    }

    #[test]
    fn test_find_field_attribute() {
        let scanner = RegexMarkupScanner::default();
        let posts = scanner.find_blocks(EXPORT, "post");
        let query = FieldQuery::Attribute {
            tag: "thread",
            attr: "dsq:id",
        };
        assert_eq!(scanner.find_field(&posts[0].body, query), Some("T1".to_string()));
        assert_eq!(scanner.find_field(&posts[1].body, query), Some("T1".to_string()));
        assert_eq!(scanner.find_field("<message>x</message>", query), None);
    }

    #[test]
    fn test_patterns_are_cached() {
        let scanner = RegexMarkupScanner::default();
        scanner.find_field("<a>1</a>", FieldQuery::Text("a"));
        scanner.find_field("<a>2</a>", FieldQuery::Text("a"));
        scanner.find_blocks("<post>x</post>", "post");
        assert_eq!(scanner.cache.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_names_are_escaped() {
        let scanner = RegexMarkupScanner::default();
        assert_eq!(scanner.find_field("<a.b>x</a.b>", FieldQuery::Text("a.b")), Some("x".to_string()));
        assert_eq!(scanner.find_field("<aXb>x</aXb>", FieldQuery::Text("a.b")), None);
    }
}
