//! Read-only lookups. Each filters a list call by the configured arguments and requires
//! exactly one match.

use otc_framework::ProviderError;

pub mod subnet;
pub mod vpc;

/// The single element of a filtered list.
pub(crate) fn single<T>(kind: &str, mut found: Vec<T>) -> Result<T, ProviderError> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(ProviderError::Validation(format!(
            "your query returned no {kind} results, please change your search criteria and try again"
        ))),
        n => Err(ProviderError::Validation(format!(
            "your query returned {n} {kind} results, please try a more specific search criteria"
        ))),
    }
}
