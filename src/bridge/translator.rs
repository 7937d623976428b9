//! Markup translation between Discord markdown and Telegram MarkdownV2.
//!
//! Discord -> Telegram escapes every MarkdownV2 reserved character first and
//! then rewrites the (now escaped) style markers. Telegram -> Discord rewrites
//! the markers that differ and strips the escapes.

use fancy_regex::Regex;

use crate::common::error::TranslateError;
use crate::common::messages::Platform;
use crate::common::text::{compile, rewrite};

/// Characters MarkdownV2 requires to be backslash-escaped outside entities.
pub const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

fn is_escapable(c: char) -> bool {
    c == '\\' || RESERVED.contains(&c)
}

/// Escape text for MarkdownV2.
///
/// A backslash already followed by an escapable character is kept as is, so
/// escaping escaped text is a no-op.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if is_escapable(next) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            }
        } else if RESERVED.contains(&c) {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
    }

    out
}

/// Remove MarkdownV2 escapes.
pub fn unescape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if is_escapable(next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

/// Inside code entities only backtick and backslash are escaped.
fn escape_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '`' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum Render {
    /// Wrap the captured body in a delimiter.
    Wrap(&'static str),
    /// Wrap the captured body in two properly nested delimiters.
    Nest(&'static str, &'static str),
    /// Re-escape the captured body as code and wrap it in a fence.
    Code(&'static str),
}

#[derive(Debug)]
struct Rule {
    name: &'static str,
    regex: Regex,
    render: Render,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, render: Render) -> Result<Self, TranslateError> {
        Ok(Self {
            name,
            regex: compile(name, pattern)?,
            render,
        })
    }

    fn apply(&self, text: &str) -> Result<String, TranslateError> {
        rewrite(&self.regex, self.name, text, |caps| {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            match self.render {
                Render::Wrap(delim) => format!("{delim}{body}{delim}"),
                Render::Nest(outer, inner) => format!("{outer}{inner}{body}{inner}{outer}"),
                Render::Code(fence) => {
                    format!("{fence}{}{fence}", escape_code(&unescape_markdown_v2(body)))
                }
            }
        })
    }
}

/// Stateless bidirectional markup converter.
///
/// Patterns are compiled once; both directions are pure functions of their
/// input.
#[derive(Debug)]
pub struct FormatTranslator {
    to_telegram: Vec<Rule>,
    to_discord: Vec<Rule>,
}

impl FormatTranslator {
    pub fn new() -> Result<Self, TranslateError> {
        // Applied to escaped text, in precedence order.
        let to_telegram = vec![
            Rule::new(
                "bold_italic",
                r"\\\*\\\*\\\*(.+?)\\\*\\\*\\\*",
                Render::Nest("*", "_"),
            )?,
            Rule::new("bold", r"\\\*\\\*(.+?)\\\*\\\*", Render::Wrap("*"))?,
            Rule::new(
                "underline",
                r"(?<![A-Za-z0-9])\\_\\_(.+?)\\_\\_(?![A-Za-z0-9])",
                Render::Wrap("__"),
            )?,
            Rule::new("italic", r"\\\*(.+?)\\\*", Render::Wrap("_"))?,
            Rule::new(
                "italic_underscore",
                r"(?<![A-Za-z0-9])\\_(.+?)\\_(?![A-Za-z0-9])",
                Render::Wrap("_"),
            )?,
            Rule::new(
                "inline_code",
                r"(?<!\\`)\\`(?!\\`)([^\n]+?)(?<!\\`)\\`(?!\\`)",
                Render::Code("`"),
            )?,
            Rule::new(
                "code_block",
                r"(?s)\\`\\`\\`(.*?)\\`\\`\\`",
                Render::Code("```"),
            )?,
            Rule::new("strikethrough", r"\\~\\~(.+?)\\~\\~", Render::Wrap("~"))?,
        ];

        // Italic, underline and code are spelled the same in both dialects.
        let to_discord = vec![
            Rule::new("bold", r"(?<!\\)\*(.+?)(?<!\\)\*", Render::Wrap("**"))?,
            Rule::new("strikethrough", r"(?<!\\)~(.+?)(?<!\\)~", Render::Wrap("~~"))?,
        ];

        Ok(Self {
            to_telegram,
            to_discord,
        })
    }

    /// Convert Discord markdown into Telegram MarkdownV2.
    pub fn to_telegram(&self, text: &str) -> Result<String, TranslateError> {
        self.to_telegram
            .iter()
            .try_fold(escape_markdown_v2(text), |acc, rule| rule.apply(&acc))
    }

    /// Convert Telegram MarkdownV2 into Discord markdown.
    pub fn to_discord(&self, text: &str) -> Result<String, TranslateError> {
        let text = self
            .to_discord
            .iter()
            .try_fold(text.to_string(), |acc, rule| rule.apply(&acc))?;
        Ok(unescape_markdown_v2(&text))
    }

    /// Convert text into the dialect of `destination`.
    pub fn translate(&self, text: &str, destination: Platform) -> Result<String, TranslateError> {
        match destination {
            Platform::Telegram => self.to_telegram(text),
            Platform::Discord => self.to_discord(text),
        }
    }
}
