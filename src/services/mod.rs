//! # Service Bindings
//!
//! Typed request and response structures for the cloud APIs the resources talk to, and one
//! async function per call. Every function takes a [`ServiceClient`] bound to the right
//! service version; endpoint, authentication, retries and cancellation come with it.
//!
//! | Module | Service | Objects |
//! |--------|---------|---------|
//! | [`vpc`] | VPC v1 | VPCs, subnets, elastic IPs, bandwidths |
//! | [`networking`] | Networking v2 | peering connections, routers, ports |
//! | [`rds`] | RDS v3 | backups |
//!
//! Most responses wrap the object in a single key (`{"vpc": {...}}`); [`unwrap`] and
//! [`envelope`] deal with that so the typed structs stay flat.

use otc_framework::{CloudError, ServiceClient};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod networking;
pub mod rds;
pub mod vpc;

/// `{"<key>": body}`
pub(crate) fn envelope<T: Serialize>(key: &str, body: T) -> serde_json::Value {
    serde_json::json!({ key: body })
}

/// Decodes the object under `key` of a response body.
pub(crate) fn unwrap<T: DeserializeOwned>(url: &str, mut body: serde_json::Value, key: &str) -> Result<T, CloudError> {
    let inner = body
        .get_mut(key)
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(inner).map_err(|e| CloudError::Decode {
        url: url.to_owned(),
        message: format!("{key}: {e}"),
    })
}

pub(crate) async fn get_wrapped<T: DeserializeOwned>(client: &ServiceClient, url: &str, key: &str) -> Result<T, CloudError> {
    let body: serde_json::Value = client.get(url).await?;
    unwrap(url, body, key)
}

pub(crate) async fn post_wrapped<B: Serialize, T: DeserializeOwned>(
    client: &ServiceClient,
    url: &str,
    key: &str,
    body: B,
) -> Result<T, CloudError> {
    let response: serde_json::Value = client.post(url, &envelope(key, body)).await?;
    unwrap(url, response, key)
}

pub(crate) async fn put_wrapped<B: Serialize, T: DeserializeOwned>(
    client: &ServiceClient,
    url: &str,
    key: &str,
    body: B,
) -> Result<T, CloudError> {
    let response: serde_json::Value = client.put(url, &envelope(key, body)).await?;
    unwrap(url, response, key)
}

/// Appends `key=value` pairs, skipping empty values.
pub fn with_query(url: String, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    if query.is_empty() {
        url
    } else {
        format!("{url}?{}", query.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_with_query_skips_empty_values() {
        let url = with_query("https://h/v1/p/vpcs".into(), &[("name", "a b"), ("cidr", ""), ("id", "x")]);
        assert_eq!(url, "https://h/v1/p/vpcs?name=a%20b&id=x");
        assert_eq!(with_query("u".into(), &[("name", "")]), "u");
    }

    #[test]
    fn test_unwrap_reports_key() {
        #[derive(Debug, Deserialize)]
        struct Thing {
            #[allow(dead_code)]
            id: String,
        }
        let ok: Thing = unwrap("u", json!({"thing": {"id": "1"}}), "thing").unwrap();
        assert_eq!(ok.id, "1");

        let err = unwrap::<Thing>("u", json!({"other": {}}), "thing").unwrap_err();
        assert!(matches!(err, CloudError::Decode { ref message, .. } if message.starts_with("thing:")));
    }
}
