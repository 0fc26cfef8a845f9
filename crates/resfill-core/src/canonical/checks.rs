//! Placeholder and minimal format checks.

/// Phrases models use instead of leaving a field empty. Compared
/// case-insensitively against the trimmed value.
const PLACEHOLDERS: &[&str] = &[
    "null",
    "none",
    "nil",
    "n/a",
    "na",
    "n.a.",
    "not mentioned",
    "not provided",
    "not available",
    "not specified",
    "unknown",
    "未提及",
    "未提供",
    "未填写",
    "未说明",
    "无",
    "暂无",
    "未知",
    "不详",
    "-",
    "--",
    "—",
    "/",
];

/// Minimum run of digits for a phone number.
const MIN_PHONE_DIGITS: usize = 7;

/// Whether `text` is empty or a placeholder phrase.
pub fn is_placeholder(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    text.is_empty() || PLACEHOLDERS.contains(&text.as_str())
}

/// An `@` with non-empty text on both sides, and no whitespace.
pub fn is_valid_email(text: &str) -> bool {
    let text = text.trim();
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    match text.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// At least [`MIN_PHONE_DIGITS`] consecutive digits once spaces, dashes,
/// parentheses, dots and a leading plus are ignored.
pub fn is_valid_phone(text: &str) -> bool {
    let mut run = 0;
    let mut longest = 0;

    for c in text.chars() {
        if c.is_ascii_digit() {
            run += 1;
            longest = longest.max(run);
        } else if !matches!(c, ' ' | '-' | '(' | ')' | '.' | '+') {
            run = 0;
        }
    }

    longest >= MIN_PHONE_DIGITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        for text in ["", "  ", "N/A", "None", "NULL", "未提及", "无", " - ", "Not Mentioned"] {
            assert!(is_placeholder(text), "{text:?}");
        }
        for text in ["李雷", "无锡", "Nanjing", "0"] {
            assert!(!is_placeholder(text), "{text:?}");
        }
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("lilei@example.com"));
        assert!(is_valid_email(" a@b "));
        assert!(!is_valid_email("lilei.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("lilei@"));
        assert!(!is_valid_email("li lei@example.com"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("13800001111"));
        assert!(is_valid_phone("+86 138-0000-1111"));
        assert!(is_valid_phone("(010) 6278.5001"));
        assert!(!is_valid_phone("123456"));
        assert!(!is_valid_phone("ext 12/34/56"));
        assert!(!is_valid_phone("电话"));
    }
}
