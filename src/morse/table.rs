// src/morse/table.rs  —  Character ↔ representation tables and validators

use std::sync::OnceLock;

use crate::errors::{Error, Result};

/// Glyph used for the short mark in a representation string.
pub const CW_DOT_REPRESENTATION: char = '.';
/// Glyph used for the long mark in a representation string.
pub const CW_DASH_REPRESENTATION: char = '-';

/// Longest representation in the table ('$' = "...-..-").
pub const MAX_REPRESENTATION_LENGTH: usize = 7;

// ── Character table ───────────────────────────────────────────────────────────
//
// ITU international set plus the additional ASCII punctuation commonly keyed
// on the air.  Representations use only '.' and '-', length 1..=7.

static CHARACTER_TABLE: &[(char, &str)] = &[
    ('A', ".-"),      ('B', "-..."),   ('C', "-.-."),   ('D', "-.."),
    ('E', "."),       ('F', "..-."),   ('G', "--."),    ('H', "...."),
    ('I', ".."),      ('J', ".---"),   ('K', "-.-"),    ('L', ".-.."),
    ('M', "--"),      ('N', "-."),     ('O', "---"),    ('P', ".--."),
    ('Q', "--.-"),    ('R', ".-."),    ('S', "..."),    ('T', "-"),
    ('U', "..-"),     ('V', "...-"),   ('W', ".--"),    ('X', "-..-"),
    ('Y', "-.--"),    ('Z', "--.."),
    ('0', "-----"),   ('1', ".----"),  ('2', "..---"),  ('3', "...--"),
    ('4', "....-"),   ('5', "....."),  ('6', "-...."),  ('7', "--..."),
    ('8', "---.."),   ('9', "----."),
    ('"', ".-..-."),  ('\'', ".----."),('$', "...-..-"),('(', "-.--."),
    (')', "-.--.-"),  ('+', ".-.-."),  (',', "--..--"), ('-', "-....-"),
    ('.', ".-.-.-"),  ('/', "-..-."),  (':', "---..."), (';', "-.-.-."),
    ('=', "-...-"),   ('?', "..--.."), ('_', "..--.-"), ('@', ".--.-."),
];

// ── Procedural signs ──────────────────────────────────────────────────────────
//
// Each character maps to a short multi-character expansion.  The flag says
// whether the sign is usually sent as its expansion (separate characters with
// inter-character gaps) — signs whose run-together form already sits in the
// main table above carry `false`.

static PROCEDURAL_TABLE: &[(char, &str, bool)] = &[
    ('+', "AR", false), // end of message (.-.-. run together, in main table)
    ('=', "BT", false), // break / new paragraph
    ('(', "KN", false), // go ahead, named station only
    ('@', "AC", false), // commercial at
    ('!', "SN", true),  // understood
    ('&', "AS", true),  // wait
    ('<', "SK", true),  // end of contact
    ('>', "BK", true),  // break-in
    ('%', "HH", true),  // error — eight dots, sent as two H's
];

// ── Lookups ───────────────────────────────────────────────────────────────────

/// Representation for a character, or `None` if the character is not in the
/// table.  Lookup is case-insensitive.
pub fn character_to_representation(c: char) -> Option<&'static str> {
    let up = c.to_ascii_uppercase();
    CHARACTER_TABLE.iter().find(|(ch, _)| *ch == up).map(|(_, rep)| *rep)
}

/// Character for a representation string — hash-indexed fast path.
pub fn representation_to_character(representation: &str) -> Option<char> {
    let hash = representation_to_hash(representation)?;
    inverse_table()[hash as usize]
}

/// Character for a representation string — linear scan of the table.
///
/// Retained as the verification path for the hash lookup; both must agree on
/// every entry.
pub fn representation_to_character_direct(representation: &str) -> Option<char> {
    CHARACTER_TABLE
        .iter()
        .find(|(_, rep)| *rep == representation)
        .map(|(ch, _)| *ch)
}

/// Hash a representation of length 1..=7 into a byte in [2, 255]:
/// a sentinel bit followed by '.'→0 and '-'→1, bit by bit.
pub fn representation_to_hash(representation: &str) -> Option<u8> {
    let len = representation.len();
    if len == 0 || len > MAX_REPRESENTATION_LENGTH {
        return None;
    }
    let mut hash: u16 = 1; // sentinel
    for sym in representation.chars() {
        hash <<= 1;
        match sym {
            CW_DOT_REPRESENTATION => {}
            CW_DASH_REPRESENTATION => hash |= 1,
            _ => return None,
        }
    }
    Some(hash as u8)
}

/// The inverse table is built once by hashing every entry; hashes are unique
/// over well-formed representations so there are no collisions to resolve.
fn inverse_table() -> &'static [Option<char>; 256] {
    static INVERSE: OnceLock<[Option<char>; 256]> = OnceLock::new();
    INVERSE.get_or_init(|| {
        let mut table = [None; 256];
        for (ch, rep) in CHARACTER_TABLE {
            let hash = representation_to_hash(rep)
                .unwrap_or_else(|| panic!("malformed table entry {ch:?} {rep:?}"));
            table[hash as usize] = Some(*ch);
        }
        table
    })
}

/// Expansion and usually-expanded flag for a procedural sign.
pub fn lookup_procedural(c: char) -> Option<(&'static str, bool)> {
    let up = c.to_ascii_uppercase();
    PROCEDURAL_TABLE
        .iter()
        .find(|(ch, _, _)| *ch == up)
        .map(|(_, expansion, expanded)| (*expansion, *expanded))
}

// ── Validation ────────────────────────────────────────────────────────────────

/// True when the character can be sent: it is in the table, or it is a space.
///
/// Backspace is not valid — erasing is an explicit generator operation
/// (`remove_last_character`), not an input character.
pub fn is_character_valid(c: char) -> bool {
    c == ' ' || character_to_representation(c).is_some()
}

/// True when every character of the string can be sent.
pub fn is_string_valid(s: &str) -> bool {
    s.chars().all(is_character_valid)
}

/// True when the string is a well-formed representation: only '.' and '-',
/// length 1..=7.  Well-formed does not imply present in the table.
pub fn is_representation_valid(representation: &str) -> bool {
    representation_to_hash(representation).is_some()
}

/// Validate a representation, mapping failure onto the error taxonomy.
pub(crate) fn check_representation(representation: &str) -> Result<()> {
    if is_representation_valid(representation) {
        Ok(())
    } else {
        Err(Error::InvalidArgument("malformed dot/dash representation"))
    }
}

// ── Enumeration ───────────────────────────────────────────────────────────────

/// Every sendable character, in table order.
pub fn list_characters() -> Vec<char> {
    CHARACTER_TABLE.iter().map(|(ch, _)| *ch).collect()
}

/// Number of characters in the table.
pub fn character_count() -> usize {
    CHARACTER_TABLE.len()
}

/// Length of the longest representation actually present in the table.
pub fn max_representation_length() -> usize {
    CHARACTER_TABLE
        .iter()
        .map(|(_, rep)| rep.len())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_character() {
        for ch in list_characters() {
            let rep = character_to_representation(ch).unwrap();
            assert_eq!(representation_to_character(rep), Some(ch), "char {ch:?}");
        }
    }

    #[test]
    fn test_fast_path_matches_direct_path() {
        // Every well-formed representation, present in the table or not,
        // must resolve identically through both lookup methods.
        for bits in 0u16..(1 << MAX_REPRESENTATION_LENGTH) {
            for len in 1..=MAX_REPRESENTATION_LENGTH {
                if bits >= (1 << len) {
                    continue;
                }
                let rep: String = (0..len)
                    .rev()
                    .map(|i| if bits & (1 << i) != 0 { '-' } else { '.' })
                    .collect();
                assert_eq!(
                    representation_to_character(&rep),
                    representation_to_character_direct(&rep),
                    "representation {rep:?}"
                );
            }
        }
    }

    #[test]
    fn test_hash_range() {
        for len in 1..=MAX_REPRESENTATION_LENGTH {
            let all_dots: String = std::iter::repeat('.').take(len).collect();
            let all_dashes: String = std::iter::repeat('-').take(len).collect();
            for rep in [all_dots, all_dashes] {
                let h = representation_to_hash(&rep).unwrap();
                assert!(h >= 2, "hash {h} below range for {rep:?}");
            }
        }
        assert_eq!(representation_to_hash("."), Some(2));
        assert_eq!(representation_to_hash("-------"), Some(255));
        assert_eq!(representation_to_hash(""), None);
        assert_eq!(representation_to_hash("--------"), None);
        assert_eq!(representation_to_hash(".x."), None);
    }

    #[test]
    fn test_validation_rules() {
        assert!(is_character_valid(' '));
        assert!(is_character_valid('a'));
        assert!(is_character_valid('Q'));
        assert!(!is_character_valid('\u{8}')); // backspace
        assert!(!is_character_valid('#'));
        assert!(is_string_valid("CQ CQ DE N0CALL"));
        assert!(!is_string_valid("CQ\u{8}"));
        assert!(is_representation_valid(".-"));
        assert!(!is_representation_valid(".- "));
    }

    #[test]
    fn test_max_representation_length() {
        assert_eq!(max_representation_length(), MAX_REPRESENTATION_LENGTH);
        assert_eq!(character_to_representation('$'), Some("...-..-"));
    }

    #[test]
    fn test_procedural_signs() {
        let (expansion, expanded) = lookup_procedural('+').unwrap();
        assert_eq!(expansion, "AR");
        assert!(!expanded);

        let (expansion, expanded) = lookup_procedural('<').unwrap();
        assert_eq!(expansion, "SK");
        assert!(expanded);

        assert!(lookup_procedural('E').is_none());

        // Every expansion must itself be sendable; run-together signs must
        // exist in the main table.
        for (ch, expansion, expanded) in PROCEDURAL_TABLE {
            assert!(is_string_valid(expansion), "expansion of {ch:?}");
            if !expanded {
                assert!(
                    character_to_representation(*ch).is_some(),
                    "{ch:?} marked run-together but missing from the table"
                );
            }
        }
    }
}
