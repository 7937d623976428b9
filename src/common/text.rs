//! Regex-driven text rewriting shared by the translator and the resolver.

use fancy_regex::{Captures, Regex};

use crate::common::error::TranslateError;

/// Replace every match of `regex` in `text` with the output of `render`.
///
/// Unlike `Regex::replace_all`, evaluation errors (backtrack limits) are
/// returned instead of panicking.
pub fn rewrite<F>(
    regex: &Regex,
    rule: &'static str,
    text: &str,
    mut render: F,
) -> Result<String, TranslateError>
where
    F: FnMut(&Captures<'_>) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in regex.captures_iter(text) {
        let caps = caps.map_err(|e| TranslateError::Evaluation {
            rule,
            message: e.to_string(),
        })?;
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last_end..whole.start()]);
        out.push_str(&render(&caps));
        last_end = whole.end();
    }

    out.push_str(&text[last_end..]);
    Ok(out)
}

/// Compile a named pattern.
pub fn compile(rule: &'static str, pattern: &str) -> Result<Regex, TranslateError> {
    Regex::new(pattern).map_err(|e| TranslateError::InvalidPattern {
        rule,
        message: e.to_string(),
    })
}

/// Truncate to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_replaces_all_matches() {
        let re = compile("digits", r"(\d+)").unwrap();
        let out = rewrite(&re, "digits", "a1 b22 c", |caps| {
            format!("<{}>", caps.get(1).map(|m| m.as_str()).unwrap_or(""))
        })
        .unwrap();
        assert_eq!(out, "a<1> b<22> c");
    }

    #[test]
    fn test_rewrite_without_match_is_identity() {
        let re = compile("digits", r"\d+").unwrap();
        assert_eq!(rewrite(&re, "digits", "none", |_| String::new()).unwrap(), "none");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo wörld", 5), "héll…");
        assert_eq!(truncate_chars("日本語テキスト", 3).chars().count(), 3);
    }
}
