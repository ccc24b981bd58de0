// src/morse/mod.rs  —  Character codec, phonetics, timing model
pub mod phonetic;
pub mod table;
pub mod timing;

pub use phonetic::lookup_phonetic;
pub use table::{
    character_count, character_to_representation, is_character_valid,
    is_representation_valid, is_string_valid, list_characters, lookup_procedural,
    max_representation_length, representation_to_character,
    representation_to_character_direct, representation_to_hash,
    CW_DASH_REPRESENTATION, CW_DOT_REPRESENTATION, MAX_REPRESENTATION_LENGTH,
};
pub use timing::{SendParams, Timing};
