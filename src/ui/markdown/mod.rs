//! Markdown-subset to HTML renderer for assistant replies.
//!
//! Rendering runs in fixed stages: fenced code is lifted out first, each
//! remaining line is classified by its prefix, line contents are escaped and
//! given inline formatting, list and table runs are grouped, and finally
//! paragraphs and line breaks are assembled before code blocks are put back.
//! Each stage sees only the output of the previous one, so formatting never
//! leaks into code.

mod blocks;
mod code;
mod inline;


use blocks::{classify_line, render_blocks};
use code::{extract_code_blocks, restore_code_blocks};

/// Escape the three characters that matter in HTML text content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render a (possibly partial) reply to HTML.
///
/// Output is always wrapped in one `<p>…</p>`; blank lines split it into
/// paragraphs and single newlines become `<br>`. Plain text without any
/// markers renders as its escaped self.
pub fn render(text: &str) -> String {
    let (text, code_blocks) = extract_code_blocks(text);

    let blocks: Vec<_> = text.split('\n').map(classify_line).collect();
    let body = render_blocks(&blocks)
        .join("\n")
        .replace("\n\n", "</p><p>")
        .replace('\n', "<br>");

    restore_code_blocks(format!("<p>{body}</p>"), &code_blocks)
}

/// A reply that is still arriving. Every appended token re-renders the whole
/// buffer, so constructs split across tokens come out right once complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    source: String,
    html: String,
}

impl Default for RenderedMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderedMessage {
    pub fn new() -> Self {
        Self {
            source: String::new(),
            html: render(""),
        }
    }

    pub fn push_str(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.source.push_str(token);
        self.html = render(&self.source);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn into_source(self) -> String {
        self.source
    }
}
