//! Line-oriented front matter parser for post source files.
//!
//! A metadata block sits at the top of the document between two `---`
//! delimiter lines. Inside the block each line carries one `key: value`
//! pair, split on the first colon. The format is deliberately flat: no
//! nesting, no quoting, no typed values.

use std::collections::HashMap;

/// Result of splitting a document into metadata and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    pub metadata: HashMap<String, String>,
    pub body: String,
}

/// Split a document into its front matter block and body.
///
/// Delimiter lines are matched after trimming surrounding whitespace, so
/// `--- ` and `\t---` both count. Keys and values are trimmed; keys stay
/// case-sensitive. Lines inside the block without a colon are skipped.
///
/// A document whose first line is not `---`, or whose opening `---` is never
/// closed, has no front matter: the metadata map is empty and the entire
/// text (delimiter included) is the body.
pub fn parse(text: &str) -> FrontMatter {
    let lines: Vec<&str> = text.split('\n').collect();

    let no_front_matter = || FrontMatter {
        metadata: HashMap::new(),
        body: text.to_string(),
    };

    if lines.first().map(|l| l.trim()) != Some("---") {
        return no_front_matter();
    }

    // Locate the closing delimiter; an unterminated block is not a block.
    let Some(close) = lines[1..].iter().position(|l| l.trim() == "---") else {
        return no_front_matter();
    };
    let close = close + 1;

    let mut metadata = HashMap::new();
    for line in &lines[1..close] {
        if let Some((key, value)) = line.split_once(':') {
            metadata.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    FrontMatter {
        metadata,
        body: lines[close + 1..].join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a document from pairs and a body, the inverse of `parse`.
    fn compose(pairs: &[(&str, &str)], body: &str) -> String {
        let mut doc = String::from("---\n");
        for (k, v) in pairs {
            doc.push_str(&format!("{}: {}\n", k, v));
        }
        doc.push_str("---\n");
        doc.push_str(body);
        doc
    }

    #[test]
    fn test_basic_parse() {
        let fm = parse("---\ntitle: Hello\nhidden: true\n---\nBody text.");
        assert_eq!(fm.metadata.get("title").map(String::as_str), Some("Hello"));
        assert_eq!(fm.metadata.get("hidden").map(String::as_str), Some("true"));
        assert_eq!(fm.body, "Body text.");
    }

    #[test]
    fn test_no_front_matter() {
        let fm = parse("# Just a heading\n\nSome text.");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "# Just a heading\n\nSome text.");
    }

    #[test]
    fn test_delimiter_not_on_first_line() {
        let text = "intro\n---\ntitle: X\n---\nbody";
        let fm = parse(text);
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, text);
    }

    #[test]
    fn test_unterminated_block_is_plain_body() {
        let text = "---\ntitle: Dangling\nno closing line here";
        let fm = parse(text);
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, text);
    }

    #[test]
    fn test_delimiters_trimmed() {
        let fm = parse("  ---  \ntitle: Padded\n\t---\nbody");
        assert_eq!(fm.metadata.get("title").map(String::as_str), Some("Padded"));
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn test_value_split_on_first_colon() {
        let fm = parse("---\nlink: https://example.com/a:b\n---\n");
        assert_eq!(
            fm.metadata.get("link").map(String::as_str),
            Some("https://example.com/a:b")
        );
    }

    #[test]
    fn test_whitespace_trimmed_from_keys_and_values() {
        let fm = parse("---\n  title  :   Spaced Out   \n---\nbody");
        assert_eq!(
            fm.metadata.get("title").map(String::as_str),
            Some("Spaced Out")
        );
    }

    #[test]
    fn test_colonless_lines_ignored() {
        let fm = parse("---\ntitle: Real\njust some words\n---\nbody");
        assert_eq!(fm.metadata.len(), 1);
        assert_eq!(fm.metadata.get("title").map(String::as_str), Some("Real"));
    }

    #[test]
    fn test_keys_case_sensitive() {
        let fm = parse("---\nTitle: Upper\ntitle: Lower\n---\n");
        assert_eq!(fm.metadata.get("Title").map(String::as_str), Some("Upper"));
        assert_eq!(fm.metadata.get("title").map(String::as_str), Some("Lower"));
    }

    #[test]
    fn test_empty_block() {
        let fm = parse("---\n---\nbody");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn test_body_newlines_preserved() {
        let fm = parse("---\ntitle: T\n---\n\nfirst\n\nsecond\n");
        assert_eq!(fm.body, "\nfirst\n\nsecond\n");
    }

    #[test]
    fn test_round_trip() {
        let pairs = [("title", "Round Trip"), ("hidden", "false")];
        let body = "Line one.\n\nLine two.\n";
        let fm = parse(&compose(&pairs, body));
        assert_eq!(fm.metadata.len(), pairs.len());
        for (k, v) in pairs {
            assert_eq!(fm.metadata.get(k).map(String::as_str), Some(v));
        }
        assert_eq!(fm.body, body);
    }

    #[test]
    fn test_crlf_line_endings() {
        let fm = parse("---\r\ntitle: Windows\r\n---\r\nbody\r\n");
        assert_eq!(
            fm.metadata.get("title").map(String::as_str),
            Some("Windows")
        );
        assert_eq!(fm.body, "body\r\n");
    }
}
