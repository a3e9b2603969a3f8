//! Name normalization helpers

/// Trim and collapse internal runs of whitespace to a single space
pub fn normalize_name(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize_name`, failing with `InvalidInput` when nothing is left
pub fn require_name(input: &str, field: &str) -> Result<String, crate::error::StorageError> {
    let name = normalize_name(input);
    if name.is_empty() {
        return Err(crate::error::StorageError::InvalidInput(format!(
            "{} is required",
            field
        )));
    }
    Ok(name)
}
