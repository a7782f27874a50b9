//! # Tag Side-Channel
//!
//! Tags live behind a separate API version from the primary resource, so tag handling always
//! goes through its own [`TagClient`] with its own error handling.
//!
//! ```text
//! GET    {vpc v2}/{resource_type}/{id}/tags          list
//! POST   {vpc v2}/{resource_type}/{id}/tags/action   batch create (after resource create)
//! POST   {vpc v2}/{resource_type}/{id}/tags          add or overwrite one key
//! DELETE {vpc v2}/{resource_type}/{id}/tags/{key}    remove one key (404 ignored)
//! ```
//!
//! A resource opts in by returning a [`TagSpec`] from `Resource::tags`; the executor then
//! calls [`TagSpec::on_create`], [`TagSpec::on_read`] and [`TagSpec::on_update`] around the
//! resource's own callbacks.

use crate::client::{ServiceClient, ServiceVersion};
use crate::context::RequestContext;
use crate::diag::Diagnostic;
use crate::error::{CloudError, ProviderError};
use crate::mapper::expand_string_map;
use crate::schema::{Attribute, Kind};
use crate::state::ResourceData;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const TAGS_ATTRIBUTE: &str = "tags";

/// The `tags` attribute: an optional string map with the cloud's tag limits.
pub fn attribute() -> Attribute {
    Attribute::optional(Kind::map_of(Kind::String))
        .validate(validation::tags())
        .description("Key/value tags. Up to 10, keys 1-36 and values 0-43 characters.")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    action: &'a str,
    tags: Vec<Tag>,
}

#[derive(Serialize)]
struct SingleRequest {
    tag: Tag,
}

/// What has to change to turn one tag map into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Keys to delete.
    pub removed: Vec<String>,
    /// Keys to create or overwrite, including keys whose value changed.
    pub added: BTreeMap<String, String>,
}

impl TagDiff {
    pub fn between(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Self {
        let removed = old
            .keys()
            .filter(|k| !new.contains_key(*k))
            .cloned()
            .collect();
        let added = new
            .iter()
            .filter(|(k, v)| old.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { removed, added }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Tag operations for one resource instance.
#[derive(Debug, Clone)]
pub struct TagClient {
    client: ServiceClient,
    resource_type: String,
    id: String,
}

impl TagClient {
    pub fn new(client: ServiceClient, resource_type: &str, id: &str) -> Self {
        Self {
            client,
            resource_type: resource_type.to_owned(),
            id: id.to_owned(),
        }
    }

    fn url(&self, extra: &[&str]) -> String {
        let mut parts = vec![self.resource_type.as_str(), self.id.as_str(), "tags"];
        parts.extend_from_slice(extra);
        self.client.url(&parts)
    }

    pub async fn list(&self) -> Result<BTreeMap<String, String>, CloudError> {
        let list: TagList = self.client.get(&self.url(&[])).await?;
        Ok(list.tags.into_iter().map(|t| (t.key, t.value)).collect())
    }

    /// Creates all tags with one batch request.
    pub async fn create(&self, tags: &BTreeMap<String, String>) -> Result<(), CloudError> {
        let body = BatchRequest {
            action: "create",
            tags: to_tags(tags),
        };
        self.client.post_empty(&self.url(&["action"]), &body).await
    }

    pub async fn add(&self, key: &str, value: &str) -> Result<(), CloudError> {
        let body = SingleRequest {
            tag: Tag {
                key: key.to_owned(),
                value: value.to_owned(),
            },
        };
        self.client.post_empty(&self.url(&[]), &body).await
    }

    /// Deletes one key. A key that is already gone counts as deleted.
    pub async fn remove(&self, key: &str) -> Result<(), CloudError> {
        let segment = urlencoding::encode(key);
        match self.client.delete(&self.url(&[segment.as_ref()])).await {
            Err(e) if e.is_not_found() => {
                debug!(key, "Tag already absent");
                Ok(())
            }
            other => other,
        }
    }

    /// One DELETE per removed key, then one POST per added key.
    pub async fn apply(&self, diff: &TagDiff) -> Result<(), CloudError> {
        for key in &diff.removed {
            self.remove(key).await?;
        }
        for (key, value) in &diff.added {
            self.add(key, value).await?;
        }
        Ok(())
    }
}

fn to_tags(map: &BTreeMap<String, String>) -> Vec<Tag> {
    map.iter()
        .map(|(k, v)| Tag {
            key: k.clone(),
            value: v.clone(),
        })
        .collect()
}

/// How a resource type reaches its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub service: ServiceVersion,
    /// Path segment of the resource in the tag API, e.g. `vpcs`.
    pub resource_type: &'static str,
    /// Cloud-owned keys kept out of state.
    pub system_tags: &'static [&'static str],
}

impl TagSpec {
    pub const fn new(service: ServiceVersion, resource_type: &'static str) -> Self {
        Self {
            service,
            resource_type,
            system_tags: &[],
        }
    }

    pub const fn with_system_tags(mut self, keys: &'static [&'static str]) -> Self {
        self.system_tags = keys;
        self
    }

    async fn client(&self, ctx: &RequestContext, d: &ResourceData) -> Result<TagClient, ProviderError> {
        let client = ctx.client(self.service, &ctx.region(d)).await?;
        Ok(TagClient::new(client, self.resource_type, d.id()))
    }

    /// After create: batch-create the configured tags. A failure only warns; the resource
    /// stays created and the next update reconciles.
    pub async fn on_create(&self, ctx: &RequestContext, d: &ResourceData) -> Result<(), ProviderError> {
        let tags = expand_string_map(d.get(TAGS_ATTRIBUTE));
        if tags.is_empty() {
            return Ok(());
        }
        let client = self.client(ctx, d).await?;
        if let Err(e) = client.create(&tags).await {
            if matches!(e, CloudError::Cancelled) {
                return Err(ProviderError::Cancelled);
            }
            warn!(id = d.id(), error = %e, "Failed to apply tags after create");
            ctx.warn(
                Diagnostic::warning(format!("tags were not applied to {}", d.id()))
                    .with_detail(e.to_string())
                    .at(TAGS_ATTRIBUTE),
            );
        }
        Ok(())
    }

    /// During read: list tags into the `tags` attribute, dropping system-owned keys.
    pub async fn on_read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = self.client(ctx, d).await?;
        let mut tags = client.list().await?;
        tags.retain(|k, _| !self.system_tags.contains(&k.as_str()));
        d.set(TAGS_ATTRIBUTE, tags)?;
        Ok(())
    }

    /// During update: apply the symmetric difference between old and new tag maps.
    pub async fn on_update(&self, ctx: &RequestContext, d: &ResourceData) -> Result<(), ProviderError> {
        if !d.has_change(TAGS_ATTRIBUTE) {
            return Ok(());
        }
        let (old, new) = d.get_change(TAGS_ATTRIBUTE);
        let diff = TagDiff::between(&expand_string_map(&old), &expand_string_map(&new));
        if diff.is_empty() {
            return Ok(());
        }
        debug!(id = d.id(), removed = diff.removed.len(), added = diff.added.len(), "Updating tags");
        self.client(ctx, d).await?.apply(&diff).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthInfo, Credentials};
    use crate::client::RetryPolicy;
    use crate::mock::MockTransport;
    use crate::transport::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn tag_client(mock: &MockTransport) -> TagClient {
        let auth = Arc::new(AuthInfo {
            credentials: Credentials::Token("t".into()),
            project_id: "p1".into(),
            catalog: None,
        });
        let client = ServiceClient::new(
            mock.transport(),
            auth,
            ServiceVersion::VpcV2,
            "eu-de",
            "https://vpc.eu-de.example/v2.0/p1/",
            RetryPolicy::default(),
        );
        TagClient::new(client, "vpcs", "v1")
    }

    #[test]
    fn test_diff_is_symmetric() {
        let diff = TagDiff::between(&map(&[("a", "1"), ("b", "2")]), &map(&[("a", "1"), ("c", "3")]));
        assert_eq!(diff.removed, vec!["b".to_owned()]);
        assert_eq!(diff.added, map(&[("c", "3")]));

        let changed = TagDiff::between(&map(&[("a", "1")]), &map(&[("a", "2")]));
        assert!(changed.removed.is_empty());
        assert_eq!(changed.added, map(&[("a", "2")]));

        assert!(TagDiff::between(&map(&[("a", "1")]), &map(&[("a", "1")])).is_empty());
    }

    #[tokio::test]
    async fn test_apply_issues_one_call_per_key() {
        let mock = MockTransport::new();
        mock.expect(Method::Delete, "/v2.0/p1/vpcs/v1/tags/b").respond(404, json!({}));
        mock.expect(Method::Post, "/v2.0/p1/vpcs/v1/tags").respond(204, json!(null));

        let diff = TagDiff::between(&map(&[("a", "1"), ("b", "2")]), &map(&[("a", "1"), ("c", "3")]));
        tag_client(&mock).apply(&diff).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].json(), json!({"tag": {"key": "c", "value": "3"}}));
        mock.verify();
    }

    #[tokio::test]
    async fn test_remove_encodes_key_into_one_segment() {
        let mock = MockTransport::new();
        mock.expect(Method::Delete, "/v2.0/p1/vpcs/v1/tags/team%2Fa%3F").respond(204, json!(null));

        tag_client(&mock).remove("team/a?").await.unwrap();
        mock.verify();
    }

    #[tokio::test]
    async fn test_list_and_batch_create() {
        let mock = MockTransport::new();
        mock.expect(Method::Post, "/v2.0/p1/vpcs/v1/tags/action").respond(204, json!(null));
        mock.expect(Method::Get, "/v2.0/p1/vpcs/v1/tags")
            .respond(200, json!({"tags": [{"key": "env", "value": "prod"}]}));

        let client = tag_client(&mock);
        client.create(&map(&[("env", "prod")])).await.unwrap();
        assert_eq!(client.list().await.unwrap(), map(&[("env", "prod")]));

        assert_eq!(
            mock.requests()[0].json(),
            json!({"action": "create", "tags": [{"key": "env", "value": "prod"}]})
        );
        mock.verify();
    }
}
