//! Slot name validation and filesystem-safe naming

/// Slot name validation errors with helpful messages
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotNameError {
    #[error("Slot name is empty")]
    Empty,

    #[error("Slot name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Slot name cannot start with a dot")]
    LeadingDot,

    #[error("Slot name cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Slot name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

pub const MAX_SLOT_NAME_LEN: usize = 48;

/// Largest stored snapshot accepted on read (bytes).
pub const MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

/// Validate a save slot name. Returns the accepted name unchanged.
pub fn validate_slot_name(name: &str) -> Result<String, SlotNameError> {
    if name.is_empty() {
        return Err(SlotNameError::Empty);
    }
    if name.chars().count() > MAX_SLOT_NAME_LEN {
        return Err(SlotNameError::TooLong {
            max: MAX_SLOT_NAME_LEN,
        });
    }
    if name.starts_with('.') {
        return Err(SlotNameError::LeadingDot);
    }
    if name.trim() != name {
        return Err(SlotNameError::InvalidWhitespace);
    }
    let bad: String = name
        .chars()
        .filter(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')))
        .collect();
    if !bad.is_empty() {
        return Err(SlotNameError::InvalidCharacters { chars: bad });
    }
    Ok(name.to_string())
}

/// Generate safe filename from a slot name using URL encoding
pub fn safe_filename(name: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(name, NON_ALPHANUMERIC).to_string()
}

/// Inverse of [`safe_filename`]. Returns `None` for names that do not decode to UTF-8.
pub fn slot_from_filename(file_stem: &str) -> Option<String> {
    percent_encoding::percent_decode_str(file_stem)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Reject stored files larger than `max_size`.
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), std::io::Error> {
    if size > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file size {} exceeds limit ({} bytes)", size, max_size),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert_eq!(validate_slot_name("quick").unwrap(), "quick");
        assert!(validate_slot_name("Chapter 2 - cellar_v1.5").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(validate_slot_name(""), Err(SlotNameError::Empty));
        assert_eq!(validate_slot_name(".hidden"), Err(SlotNameError::LeadingDot));
        assert_eq!(
            validate_slot_name(" padded"),
            Err(SlotNameError::InvalidWhitespace)
        );
        assert!(matches!(
            validate_slot_name("../etc/passwd"),
            Err(SlotNameError::LeadingDot)
        ));
        assert!(matches!(
            validate_slot_name("a/b"),
            Err(SlotNameError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_slot_name(&"x".repeat(49)),
            Err(SlotNameError::TooLong { max: 48 })
        ));
    }

    #[test]
    fn filenames_round_trip() {
        let encoded = safe_filename("Chapter 2.final");
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('.'));
        assert_eq!(slot_from_filename(&encoded).as_deref(), Some("Chapter 2.final"));
    }
}
