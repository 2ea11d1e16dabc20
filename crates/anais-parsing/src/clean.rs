/// Marks left behind when a PDF stores diacritics as separate spacing glyphs.
const DAMAGE_MARKERS: &[&str] = &[
    "´ı", "c¸˜a", "´o", "´e", "˜a", "˜o", "¸c", "´a", "´i", "´u",
];

/// Collapse whitespace runs to a single space and drop control characters.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_control() {
            continue;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Whether the text shows split-diacritic damage (`c¸˜ao` for `ção`).
pub fn has_encoding_damage(text: &str) -> bool {
    DAMAGE_MARKERS.iter().any(|m| text.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  Um\n\n  título\t longo  "), "Um título longo");
    }

    #[test]
    fn drops_control_characters() {
        assert_eq!(clean_text("a\u{0}b\u{7}c\u{c}d"), "abc d");
    }

    #[test]
    fn detects_split_diacritics() {
        assert!(has_encoding_damage("informa c¸˜ao"));
        assert!(has_encoding_damage("m´etodo"));
        assert!(!has_encoding_damage("informação e método"));
    }
}
