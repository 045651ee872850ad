use super::escape_html;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Escape one line of text and apply emphasis, code spans and links, in
/// that order.
pub(crate) fn format_inline(raw: &str) -> String {
    let text = escape_html(raw);
    let text = wrap_delimited(&text, "***", "<strong><em>", "</em></strong>");
    let text = wrap_delimited(&text, "**", "<strong>", "</strong>");
    let text = wrap_delimited(&text, "*", "<em>", "</em>");
    let text = code_spans(&text);
    links(&text)
}

/// Replace each `delim…delim` pair, left to right, with the given tags.
/// Pairs may be empty; an unpaired delimiter stays literal.
fn wrap_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(delim) {
        let inner = &rest[start + delim.len()..];
        let Some(end) = inner.find(delim) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&inner[..end]);
        out.push_str(close);
        rest = &inner[end + delim.len()..];
    }
    out.push_str(rest);
    out
}

/// Backtick spans need at least one character between the ticks.
fn code_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('`') {
        let inner = &rest[start + 1..];
        match inner.find('`') {
            Some(0) => {
                out.push_str(&rest[..=start]);
                rest = inner;
            }
            Some(end) => {
                out.push_str(&rest[..start]);
                out.push_str("<code>");
                out.push_str(&inner[..end]);
                out.push_str("</code>");
                rest = &inner[end + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        match parse_link(&rest[open..]) {
            Some((label, url, consumed)) => {
                out.push_str(&rest[..open]);
                out.push_str(&format!(
                    "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{label}</a>",
                    safe_href(url)
                ));
                rest = &rest[open + consumed..];
            }
            None => {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `[label](url)` at the start of `text`; both parts must be non-empty.
/// Returns the label, the url and the number of bytes consumed.
fn parse_link(text: &str) -> Option<(&str, &str, usize)> {
    let close = text.find(']')?;
    let label = &text[1..close];
    if label.is_empty() {
        return None;
    }

    let target = text[close + 1..].strip_prefix('(')?;
    let url_end = target.find(')')?;
    let url = &target[..url_end];
    if url.is_empty() {
        return None;
    }

    Some((label, url, close + 1 + 1 + url_end + 1))
}

/// Only http(s), mailto and scheme-less targets survive; anything else
/// becomes `#`. The scheme is read the way a browser reads it: tab and
/// newline characters removed, leading control characters and spaces
/// ignored.
fn safe_href(url: &str) -> String {
    let normalized: String = url
        .trim_start_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();

    match url_scheme(&normalized) {
        Some(scheme)
            if !ALLOWED_SCHEMES
                .iter()
                .any(|allowed| scheme.eq_ignore_ascii_case(allowed)) =>
        {
            "#".to_string()
        }
        _ => normalized.replace('"', "&quot;"),
    }
}

/// `scheme` in `scheme:rest`, when the part before the first `:` is a valid
/// scheme name and no path, query or fragment starts earlier.
fn url_scheme(url: &str) -> Option<&str> {
    let end = url.find(|c: char| matches!(c, ':' | '/' | '?' | '#'))?;
    if !url[end..].starts_with(':') {
        return None;
    }
    let scheme = &url[..end];
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    // Malformed scheme names count as unknown schemes.
    Some(if valid { scheme } else { url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emphasis_levels() {
        assert_eq!(
            format_inline("***both*** **bold** *it*"),
            "<strong><em>both</em></strong> <strong>bold</strong> <em>it</em>"
        );
    }

    #[test]
    fn unpaired_markers_stay_literal() {
        assert_eq!(format_inline("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(format_inline("a ` tick"), "a ` tick");
        assert_eq!(format_inline("[label] (nope)"), "[label] (nope)");
    }

    #[test]
    fn empty_backtick_pair_is_skipped() {
        assert_eq!(format_inline("``a`"), "`<code>a</code>");
    }

    #[test]
    fn code_span_content_is_escaped() {
        assert_eq!(format_inline("use `a<b>`"), "use <code>a&lt;b&gt;</code>");
    }

    #[test]
    fn links_open_in_new_tab() {
        assert_eq!(
            format_inline("see [docs](https://example.com/a?b=1&c=2)"),
            "see <a href=\"https://example.com/a?b=1&amp;c=2\" target=\"_blank\" \
             rel=\"noopener noreferrer\">docs</a>"
        );
    }

    #[test]
    fn script_links_are_neutralized() {
        let html = format_inline("[x](javascript:alert(1)) [y](  JavaScript:void)");
        assert!(!html.to_ascii_lowercase().contains("javascript"));
        assert_eq!(html.matches("href=\"#\"").count(), 2);
    }

    #[test]
    fn scheme_obfuscation_with_whitespace_and_controls_is_neutralized() {
        for url in [
            "java\tscript:location=name",
            "jav\u{0}ascript:alert(1)",
            "\u{1}\u{8}javascript:alert(1)",
            " \t VBScript:msgbox",
            "da\tta:text/html,boom",
        ] {
            let html = format_inline(&format!("[x]({url})"));
            assert!(html.contains("href=\"#\""), "{url:?} rendered as {html}");
        }
    }

    #[test]
    fn only_web_and_mail_schemes_are_kept() {
        let html = format_inline("[a](HTTPS://example.com) [b](mailto:me@example.com)");
        assert!(html.contains("href=\"HTTPS://example.com\""));
        assert!(html.contains("href=\"mailto:me@example.com\""));

        let html = format_inline("[c](/docs/page#intro) [d](notes.html?x=1:2)");
        assert!(html.contains("href=\"/docs/page#intro\""));
        assert!(html.contains("href=\"notes.html?x=1:2\""));

        let html = format_inline("[e](ftp://example.com) [f](file:///etc/passwd)");
        assert_eq!(html.matches("href=\"#\"").count(), 2);
    }

    #[test]
    fn quotes_in_urls_cannot_break_the_attribute() {
        let html = format_inline("[x](http://a\"onmouseover=\"boom)");
        assert!(html.contains("href=\"http://a&quot;onmouseover=&quot;boom\""));
    }

    #[test]
    fn raw_html_is_escaped() {
        assert_eq!(
            format_inline("<img src=x onerror=alert(1)>"),
            "&lt;img src=x onerror=alert(1)&gt;"
        );
    }
}
