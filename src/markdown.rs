//! Whitespace normalization applied to raw OCR output.

/// Trim trailing whitespace per line, collapse runs of blank lines to a single
/// blank line, strip the whole text and end it with exactly one newline.
pub fn normalize(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;

    for line in split_lines(raw) {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run < 2 {
                lines.push("");
            }
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }

    let mut out = lines.join("\n").trim().to_string();
    out.push('\n');
    out
}

/// Split on every line boundary OCR output can contain: `\n`, `\r\n`, `\r`,
/// vertical tab, form feed (page breaks), the file/group/record separators,
/// NEL and the Unicode line/paragraph separators.
fn split_lines(raw: &str) -> impl Iterator<Item = &str> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(is_line_break) {
            Some(idx) => {
                let line = &rest[..idx];
                let brk = rest[idx..].chars().next().map_or(1, char::len_utf8);
                let skip = if rest[idx..].starts_with("\r\n") { 2 } else { brk };
                rest = &rest[idx + skip..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}
