//! Display name to folder name mapping

use unicode_normalization::UnicodeNormalization;

/// Longest folder name produced, in characters
pub const MAX_FOLDER_NAME_LEN: usize = 50;

/// Used when nothing safe survives sanitization
pub const FALLBACK_FOLDER_NAME: &str = "mod";

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.' | '(' | ')' | '[' | ']')
}

fn is_edge_junk(c: char) -> bool {
    c == '.' || c.is_whitespace()
}

/// Turn arbitrary catalog text into a safe folder name
///
/// NFC-normalizes, keeps only the allow-list, collapses space runs, strips
/// leading and trailing dots and spaces, and caps the length. Never empty.
pub fn sanitize_folder_name(display_name: &str) -> String {
    let mut collapsed = String::with_capacity(display_name.len());
    let mut previous_space = false;
    for c in display_name.nfc().filter(|c| is_allowed(*c)) {
        if c == ' ' {
            if previous_space {
                continue;
            }
            previous_space = true;
        } else {
            previous_space = false;
        }
        collapsed.push(c);
    }

    let truncated: String = collapsed
        .trim_matches(is_edge_junk)
        .chars()
        .take(MAX_FOLDER_NAME_LEN)
        .collect();
    let name = truncated.trim_end_matches(is_edge_junk);

    if name.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_safe(name: &str) {
        assert!(!name.is_empty());
        assert!(name.chars().count() <= MAX_FOLDER_NAME_LEN);
        assert!(name.chars().all(is_allowed), "unsafe char in {name:?}");
        assert!(!name.starts_with('.') && !name.ends_with('.'));
        assert!(!name.starts_with(' ') && !name.ends_with(' '));
    }

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(sanitize_folder_name("CoolMod"), "CoolMod");
        assert_eq!(sanitize_folder_name("Better HUD (v2) [beta]"), "Better HUD (v2) [beta]");
    }

    #[test]
    fn empty_and_all_unsafe_inputs_fall_back() {
        assert_eq!(sanitize_folder_name(""), "mod");
        assert_eq!(sanitize_folder_name("/\\:*?\"<>|"), "mod");
        assert_eq!(sanitize_folder_name(".."), "mod");
        assert_eq!(sanitize_folder_name("   ...   "), "mod");
    }

    #[test]
    fn path_separators_are_removed() {
        let name = sanitize_folder_name("../../etc/passwd");
        assert_eq!(name, "etcpasswd");
        assert_safe(&name);

        let name = sanitize_folder_name("..\\Windows\\System32");
        assert_eq!(name, "WindowsSystem32");
    }

    #[test]
    fn long_names_are_truncated_without_trailing_space() {
        let long = "a".repeat(500);
        let name = sanitize_folder_name(&long);
        assert_eq!(name.chars().count(), MAX_FOLDER_NAME_LEN);
        assert_safe(&name);

        let spaced = format!("{} tail", "b".repeat(49));
        assert_eq!(sanitize_folder_name(&spaced), "b".repeat(49));
    }

    #[test]
    fn space_runs_collapse_and_edges_trim() {
        assert_eq!(sanitize_folder_name("  .Cool    Mod.  "), "Cool Mod");
    }

    #[test]
    fn decomposed_text_is_composed() {
        let decomposed = "Cafe\u{301} Mod";
        assert_eq!(sanitize_folder_name(decomposed), "Caf\u{e9} Mod");
    }

    #[test]
    fn unicode_letters_survive_but_symbols_do_not() {
        assert_eq!(sanitize_folder_name("Zelda 時のオカリナ 🎮"), "Zelda 時のオカリナ");
    }

    #[test]
    fn always_safe_for_hostile_inputs() {
        for input in ["\0\0", "\u{202e}gnp.exe", "con:", "a/b\\c", "\t\n", &"é".repeat(80)] {
            assert_safe(&sanitize_folder_name(input));
        }
    }
}
