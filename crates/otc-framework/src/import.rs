//! Import-string parsing.
//!
//! Simple resources import by their cloud ID. Child resources import by a composite
//! `<parentID>/<childID>`: exactly two slash-separated, non-empty components.

use crate::error::ProviderError;

/// Splits `<parent>/<child>`.
pub fn parse_composite_id(id: &str) -> Result<(String, String), ProviderError> {
    let invalid = |reason: &str| ProviderError::Import {
        id: id.to_owned(),
        reason: reason.to_owned(),
    };
    let parts: Vec<&str> = id.split('/').collect();
    match parts.as_slice() {
        [parent, child] if !parent.is_empty() && !child.is_empty() => {
            Ok(((*parent).to_owned(), (*child).to_owned()))
        }
        [_, _] => Err(invalid("both components of <parent>/<child> must be non-empty")),
        _ => Err(invalid("expected <parent>/<child>")),
    }
}

/// Joins a composite ID. Inverse of [`parse_composite_id`].
pub fn composite_id(parent: &str, child: &str) -> String {
    format!("{parent}/{child}")
}

/// A simple ID: anything non-empty without surrounding whitespace.
pub fn parse_simple_id(id: &str) -> Result<String, ProviderError> {
    if id.trim().is_empty() {
        return Err(ProviderError::Import {
            id: id.to_owned(),
            reason: "id must not be empty".to_owned(),
        });
    }
    Ok(id.trim().to_owned())
}
