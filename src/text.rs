/// Turns every whitespace run into one space. Other characters, control
/// characters included, are kept so they count towards the text length.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    let mut out = String::new();
    let mut last_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}

/// Single-line form of extracted text: no line breaks, no outer whitespace.
pub fn normalize_block_text(value: &str) -> String {
    collapse_whitespace(value).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_with_single_spaces() {
        assert_eq!(
            normalize_block_text("  Jean Dupont\nDéveloppeur\r\n\nRust  "),
            "Jean Dupont Développeur Rust"
        );
    }

    #[test]
    fn drops_form_feeds_and_empty_input() {
        assert_eq!(normalize_block_text("\u{c}"), "");
        assert_eq!(normalize_block_text(""), "");
        assert_eq!(normalize_block_text("a\u{c}b"), "a b");
    }

    #[test]
    fn keeps_non_whitespace_control_characters() {
        let text = normalize_block_text(" ab\u{1}\n");
        assert_eq!(text, "ab\u{1}");
        assert_eq!(text.chars().count(), 3);
    }
}
