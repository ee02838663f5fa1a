//! Utility functions

pub mod tag_text;

pub use tag_text::{clean_tag, extract_tags_from_free_text, normalize_scanned_tag};
