use super::escape_html;

const FENCE: &str = "```";

/// Marker that stands in for an extracted code block until the final pass.
/// Private-use code points keep it clear of every later pattern.
pub(crate) fn placeholder(index: usize) -> String {
    format!("\u{E000}{index}\u{E001}")
}

/// Pull every closed ``` fence out of `text`, leaving placeholders behind.
///
/// Returns the remaining text and the finished HTML for each block, indexed
/// by placeholder. An opening fence without a partner is left as-is.
pub(crate) fn extract_code_blocks(text: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(FENCE) {
        let after_open = &rest[start + FENCE.len()..];
        let Some(end) = after_open.find(FENCE) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&placeholder(blocks.len()));
        blocks.push(render_code_block(&after_open[..end]));
        rest = &after_open[end + FENCE.len()..];
    }
    out.push_str(rest);

    (out, blocks)
}

/// The first line names the language when it is a single word.
fn render_code_block(raw: &str) -> String {
    let trimmed = raw.trim();
    let (first, body) = match trimmed.split_once('\n') {
        Some((first, body)) => (first, body),
        None => (trimmed, ""),
    };

    let is_language = !first.is_empty() && !first.contains(char::is_whitespace);
    let (language, code) = if is_language {
        (first, body)
    } else {
        ("", trimmed)
    };

    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        escape_html(language).replace('"', "&quot;"),
        escape_html(code)
    )
}

pub(crate) fn restore_code_blocks(mut html: String, blocks: &[String]) -> String {
    for (index, block) in blocks.iter().enumerate() {
        html = html.replacen(&placeholder(index), block, 1);
    }
    html
}
