//! Pattern/template reformatting of command output.
//!
//! A job may carry a `pattern` with named capture groups and a `template`
//! with `{name}` placeholders. When the pattern matches the output, each
//! placeholder naming a group of the pattern is replaced by the captured
//! text (empty if the group did not take part in the match). Placeholders
//! naming no group are left as written. Anything else reports the raw
//! output unchanged.

use regex::{Regex, RegexBuilder};

/// Compiled-size ceiling for user-supplied patterns. Must equal
/// `nof_core::models::tasktemplates::PATTERN_SIZE_LIMIT`, which validates
/// patterns before they are stored; a pattern accepted there has to compile
/// here.
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    rule: Option<(Regex, String)>,
}

impl OutputFormatter {
    /// Compile once per worker. A pattern that does not compile disables
    /// formatting and is logged; the worker keeps running.
    pub fn new(pattern: Option<&str>, template: Option<&str>) -> Self {
        let (Some(pattern), Some(template)) = (pattern, template) else {
            return Self::default();
        };
        match RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(regex) => Self {
                rule: Some((regex, template.to_string())),
            },
            Err(e) => {
                tracing::error!(pattern, error = %e, "invalid output pattern, reporting raw output");
                Self::default()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.rule.is_some()
    }

    pub fn format(&self, raw: &str) -> String {
        let Some((regex, template)) = &self.rule else {
            return raw.to_string();
        };
        if raw.is_empty() {
            return String::new();
        }
        let Some(caps) = regex.captures(raw) else {
            return raw.to_string();
        };

        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    if regex.capture_names().flatten().any(|n| n == name) {
                        out.push_str(caps.name(name).map_or("", |m| m.as_str()));
                    } else {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting() -> OutputFormatter {
        OutputFormatter::new(Some("(?<greeting>Hello)"), Some("{greeting}"))
    }

    #[test]
    fn match_substitutes_named_group() {
        assert_eq!(greeting().format("Hello, World!"), "Hello");
    }

    #[test]
    fn no_match_reports_raw() {
        assert_eq!(greeting().format("Goodbye"), "Goodbye");
    }

    #[test]
    fn empty_output_stays_empty() {
        assert_eq!(greeting().format(""), "");
    }

    #[test]
    fn missing_pattern_or_template_is_passthrough() {
        let f = OutputFormatter::new(Some("(?<x>.)"), None);
        assert!(!f.is_active());
        assert_eq!(f.format("abc\n"), "abc\n");
        assert_eq!(OutputFormatter::new(None, Some("{x}")).format("abc"), "abc");
    }

    #[test]
    fn malformed_pattern_is_passthrough() {
        let f = OutputFormatter::new(Some("(?<open"), Some("{open}"));
        assert!(!f.is_active());
        assert_eq!(f.format("Hello"), "Hello");
    }

    #[test]
    fn multiple_groups_and_literal_text() {
        let f = OutputFormatter::new(
            Some(r"load average: (?<one>[\d.]+), (?<five>[\d.]+)"),
            Some("1m={one} 5m={five} {unknown}"),
        );
        assert_eq!(
            f.format(" 10:00 up 3 days, load average: 0.52, 0.58, 0.59"),
            "1m=0.52 5m=0.58 {unknown}"
        );
    }

    #[test]
    fn non_participating_group_is_empty() {
        let f = OutputFormatter::new(Some("(?<a>x)|(?<b>y)"), Some("[{a}][{b}]"));
        assert_eq!(f.format("y"), "[][y]");
    }

    #[test]
    fn unclosed_brace_is_literal() {
        let f = OutputFormatter::new(Some("(?<w>\\w+)"), Some("{w} {oops"));
        assert_eq!(f.format("hi"), "hi {oops");
    }
}
