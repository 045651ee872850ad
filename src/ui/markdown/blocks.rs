use super::inline::format_inline;

/// Line-level structure, decided on the raw line before any inline pass runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block<'a> {
    Heading(u8, &'a str),
    Bullet(&'a str),
    Numbered(&'a str),
    Quote(&'a str),
    Row(Vec<&'a str>),
    Text(&'a str),
}

pub(crate) fn classify_line(line: &str) -> Block<'_> {
    for (level, marker) in [(3, "### "), (2, "## "), (1, "# ")] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Block::Heading(level, rest);
        }
    }

    if let Some(rest) = line.strip_prefix("* ").filter(|rest| !rest.is_empty()) {
        return Block::Bullet(rest);
    }
    if let Some(rest) = numbered_item(line) {
        return Block::Numbered(rest);
    }
    if let Some(rest) = line.strip_prefix("> ").filter(|rest| !rest.is_empty()) {
        return Block::Quote(rest);
    }
    if line.matches('|').count() >= 2 {
        return Block::Row(table_cells(line));
    }
    Block::Text(line)
}

fn numbered_item(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..]
        .strip_prefix(". ")
        .filter(|rest| !rest.is_empty())
}

/// Cells between pipes; empty edge cells from leading or trailing pipes are
/// dropped.
fn table_cells(line: &str) -> Vec<&str> {
    let mut cells: Vec<&str> = line.split('|').collect();
    if cells.first().is_some_and(|cell| cell.trim().is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|cell| cell.trim().is_empty()) {
        cells.pop();
    }
    cells.into_iter().map(str::trim).collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Run {
    Bullet,
    Numbered,
    Table,
}

impl Run {
    fn of(block: &Block<'_>) -> Option<Self> {
        match block {
            Block::Bullet(_) => Some(Run::Bullet),
            Block::Numbered(_) => Some(Run::Numbered),
            Block::Row(_) => Some(Run::Table),
            _ => None,
        }
    }

    fn close(self, body: String) -> String {
        match self {
            Run::Bullet | Run::Numbered => format!("<ul>{body}</ul>"),
            Run::Table => format!("<table>{body}</table>"),
        }
    }
}

/// Render classified lines, grouping consecutive list items and table rows.
///
/// Each group becomes a single output line. Numbered items are grouped apart
/// from bullets but both are emitted as `<ul>`.
pub(crate) fn render_blocks(blocks: &[Block<'_>]) -> Vec<String> {
    let mut lines = Vec::with_capacity(blocks.len());
    let mut run: Option<(Run, String)> = None;

    for block in blocks {
        let kind = Run::of(block);
        if run.as_ref().is_some_and(|(open, _)| Some(*open) != kind) {
            if let Some((open, body)) = run.take() {
                lines.push(open.close(body));
            }
        }

        match block {
            Block::Heading(level, text) => {
                lines.push(format!("<h{level}>{}</h{level}>", format_inline(text)));
            }
            Block::Quote(text) => {
                lines.push(format!("<blockquote>{}</blockquote>", format_inline(text)));
            }
            Block::Text(text) => lines.push(format_inline(text)),
            Block::Bullet(item) => push_item(open_run(&mut run, Run::Bullet), item),
            Block::Numbered(item) => push_item(open_run(&mut run, Run::Numbered), item),
            Block::Row(cells) => {
                let body = open_run(&mut run, Run::Table);
                body.push_str("<tr>");
                for cell in cells {
                    body.push_str("<td>");
                    body.push_str(&format_inline(cell));
                    body.push_str("</td>");
                }
                body.push_str("</tr>");
            }
        }
    }

    if let Some((kind, body)) = run {
        lines.push(kind.close(body));
    }
    lines
}

fn open_run(run: &mut Option<(Run, String)>, kind: Run) -> &mut String {
    &mut run.get_or_insert_with(|| (kind, String::new())).1
}

fn push_item(body: &mut String, item: &str) {
    body.push_str("<li>");
    body.push_str(&format_inline(item));
    body.push_str("</li>");
}
