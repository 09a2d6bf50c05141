use crate::TransferError;

/// Validates a key for the `Upload-Metadata` header.
///
/// Rejects:
/// - Empty keys
/// - Spaces and commas (the header's own separators)
/// - Non-ASCII or control characters
pub fn validate_metadata_key(key: &str) -> Result<(), TransferError> {
    if key.is_empty() {
        return Err(TransferError::InvalidMetadataKey("empty key".into()));
    }

    for c in key.chars() {
        if c == ' ' || c == ',' {
            return Err(TransferError::InvalidMetadataKey(format!(
                "separator {c:?} not allowed: {key}"
            )));
        }
        if !c.is_ascii() || c.is_ascii_control() {
            return Err(TransferError::InvalidMetadataKey(format!(
                "non-printable or non-ASCII character not allowed: {key}"
            )));
        }
    }

    Ok(())
}
