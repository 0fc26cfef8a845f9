/// Normalize extracted text: unify line endings, drop control and
/// zero-width characters, collapse in-line whitespace runs, trim lines and
/// collapse runs of blank lines into one.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in unified.split('\n') {
        let cleaned = clean_line(line);
        if cleaned.is_empty() {
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push(String::new());
            }
            continue;
        }
        lines.push(cleaned);
    }

    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }

    lines.join("\n")
}

fn clean_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;

    for c in line.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() || is_invisible(c) {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            normalize_text("  姓名：\t李雷   \r\n\r\n\r\n\u{3000}电话 : 138 \u{a0}0000\r"),
            "姓名： 李雷\n\n电话 : 138 0000"
        );
    }

    #[test]
    fn test_strips_invisible_characters() {
        assert_eq!(normalize_text("\u{FEFF}Li\u{200B}Lei\u{0007}"), "LiLei");
    }

    #[test]
    fn test_blank_input_stays_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n\t\n\u{200B}\n"), "");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_text("a  b\n\n\n c \n");
        assert_eq!(normalize_text(&once), once);
    }
}
