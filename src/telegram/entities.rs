//! Rebuild MarkdownV2 from a message's formatting entities.
//!
//! The Bot API delivers `text` as plain text and the styling as a separate
//! entity list. The relay expects MarkdownV2, so plain runs are escaped and
//! styled runs are wrapped in their delimiters.

use crate::bridge::translator::RESERVED;

use super::types::MessageEntity;

#[derive(Debug, Clone, Copy)]
struct Span {
    /// UTF-16 offsets, as the Bot API counts them.
    start: usize,
    end: usize,
    open: &'static str,
    close: &'static str,
}

impl Span {
    fn is_code(&self) -> bool {
        self.close.starts_with('`')
    }
}

fn delimiters(kind: &str) -> Option<(&'static str, &'static str)> {
    match kind {
        "bold" => Some(("*", "*")),
        "italic" => Some(("_", "_")),
        "underline" => Some(("__", "__")),
        "strikethrough" => Some(("~", "~")),
        "code" => Some(("`", "`")),
        "pre" => Some(("```\n", "```")),
        _ => None,
    }
}

/// Render `text` with its styling entities as MarkdownV2.
///
/// Entity types without a MarkdownV2 spelling (mentions, links, hashtags)
/// are kept as escaped text.
pub fn to_markdown_v2(text: &str, entities: &[MessageEntity]) -> String {
    let mut spans: Vec<Span> = entities
        .iter()
        .filter(|e| e.length > 0)
        .filter_map(|e| {
            delimiters(&e.kind).map(|(open, close)| Span {
                start: e.offset,
                end: e.offset + e.length,
                open,
                close,
            })
        })
        .collect();
    // Outer spans first when two start together.
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut open: Vec<Span> = Vec::new();
    let mut pending = spans.into_iter().peekable();
    let mut pos = 0;

    for c in text.chars() {
        close_ended(&mut out, &mut open, pos);

        while let Some(span) = pending.next_if(|s| s.start <= pos) {
            // Clamp to the enclosing span so entities always nest.
            let end = open.last().map_or(span.end, |outer| span.end.min(outer.end));
            if end <= pos || open.last().is_some_and(Span::is_code) {
                continue;
            }
            out.push_str(span.open);
            open.push(Span { end, ..span });
        }

        let in_code = open.last().is_some_and(Span::is_code);
        let escape = if in_code {
            c == '`' || c == '\\'
        } else {
            c == '\\' || RESERVED.contains(&c)
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
        pos += c.len_utf16();
    }

    close_ended(&mut out, &mut open, usize::MAX);
    out
}

fn close_ended(out: &mut String, open: &mut Vec<Span>, pos: usize) {
    while let Some(span) = open.last().copied().filter(|s| s.end <= pos) {
        out.push_str(span.close);
        open.pop();
    }
}
