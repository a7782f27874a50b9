//! # API Routes
//!
//! Maps a request path onto the store clients. Paths are matched on their segments, so the
//! host part of the URL is ignored and every endpoint template resolves here.
//!
//! | Service | Paths |
//! |---------|-------|
//! | VPC v1 | `/v1/{project}/vpcs[/{id}]`, `/v1/{project}/subnets[/{id}]`, `/v1/{project}/vpcs/{vpc}/subnets/{id}`, `/v1/{project}/publicips[/{id}]`, `/v1/{project}/bandwidths/{id}` |
//! | VPC v2 tags | `/v2.0/{project}/{type}/{id}/tags[/action \| /{key}]` |
//! | Networking v2 | `/v2.0/vpc/peerings[/{id}[/accept \| /reject]]`, `/v2.0/routers[/{id}]`, `/v2.0/ports[/{id}]` |
//! | RDS v3 | `/v3/{project}/backups[/{id}]` |

use crate::client::StoreClient;
use crate::entity::CloudEntity;
use crate::error::{ApiError, StoreError};
use crate::models::eip::EipAction;
use crate::models::peering::PeeringAction;
use crate::models::{Backup, Eip, Peering, Port, Router, Subnet, Vpc};
use otc_framework::transport::{HttpResponse, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Clients of every store plus the tag table.
pub struct Stores {
    pub vpcs: StoreClient<Vpc>,
    pub subnets: StoreClient<Subnet>,
    pub eips: StoreClient<Eip>,
    pub peerings: StoreClient<Peering>,
    pub routers: StoreClient<Router>,
    pub ports: StoreClient<Port>,
    pub backups: StoreClient<Backup>,
    tags: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl Stores {
    pub fn new(
        vpcs: StoreClient<Vpc>,
        subnets: StoreClient<Subnet>,
        eips: StoreClient<Eip>,
        peerings: StoreClient<Peering>,
        routers: StoreClient<Router>,
        ports: StoreClient<Port>,
        backups: StoreClient<Backup>,
    ) -> Self {
        Self {
            vpcs,
            subnets,
            eips,
            peerings,
            routers,
            ports,
            backups,
            tags: Mutex::new(BTreeMap::new()),
        }
    }

    fn tag_table(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, String>>> {
        self.tags.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current tags of one object.
    pub fn tags_of(&self, resource_type: &str, id: &str) -> BTreeMap<String, String> {
        self.tag_table()
            .get(&format!("{resource_type}/{id}"))
            .cloned()
            .unwrap_or_default()
    }

    async fn taggable_exists(&self, resource_type: &str, id: &str) -> Result<bool, StoreError> {
        match resource_type {
            "vpcs" => self.vpcs.exists(id).await,
            "subnets" => self.subnets.exists(id).await,
            "publicips" => self.eips.exists(id).await,
            _ => Ok(false),
        }
    }
}

/// Parsed request handed to [`dispatch`].
pub struct ApiRequest<'a> {
    pub method: Method,
    pub segments: Vec<&'a str>,
    pub filter: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl<'a> ApiRequest<'a> {
    pub fn new(method: Method, path: &'a str, query: Option<&str>, body: serde_json::Value) -> Self {
        let segments = path.split('/').filter(|s| !s.is_empty()).collect();
        let filter = query
            .unwrap_or_default()
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .filter(|(k, _)| !matches!(*k, "limit" | "marker"))
            .map(|(k, v)| {
                let value = urlencoding::decode(v).map_or_else(|_| v.to_owned(), |v| v.into_owned());
                (k.to_owned(), value)
            })
            .collect();
        Self {
            method,
            segments,
            filter,
            body,
        }
    }

    /// The JSON object under `key`, decoded.
    fn payload<T: DeserializeOwned>(&self, key: Option<&str>) -> Result<T, ApiError> {
        let value = match key {
            Some(key) => self.body.get(key).cloned().unwrap_or(serde_json::Value::Null),
            None => self.body.clone(),
        };
        serde_json::from_value(value).map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
    }
}

fn wrap<T: Serialize>(status: u16, key: &str, item: &T) -> HttpResponse {
    HttpResponse::json(status, &json!({ key: item }))
}

fn respond<T: Serialize>(status: u16, key: &str, result: Result<T, StoreError>) -> HttpResponse {
    match result {
        Ok(item) => wrap(status, key, &item),
        Err(e) => e.into_response(),
    }
}

fn no_content(result: Result<(), StoreError>, status: u16) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::new(status),
        Err(e) => e.into_response(),
    }
}

async fn create<T: CloudEntity>(
    store: &StoreClient<T>,
    req: &ApiRequest<'_>,
    key: Option<&str>,
    status: u16,
    response_key: &str,
) -> HttpResponse {
    match req.payload::<T::Create>(key) {
        Ok(params) => respond(status, response_key, store.create(params).await),
        Err(e) => e.into_response(),
    }
}

async fn update<T: CloudEntity>(store: &StoreClient<T>, req: &ApiRequest<'_>, id: &str, key: &str) -> HttpResponse {
    match req.payload::<T::Update>(Some(key)) {
        Ok(update) => respond(200, key, store.update(id, update).await),
        Err(e) => e.into_response(),
    }
}

async fn list<T: CloudEntity>(store: &StoreClient<T>, req: &ApiRequest<'_>, key: &str) -> HttpResponse {
    respond(200, key, store.list(req.filter.clone()).await)
}

/// RDS has no get-by-id. A `backup_id` filter is served through `get`, so polling a single
/// backup advances its status like any other read.
async fn list_backups(stores: &Stores, req: &ApiRequest<'_>) -> HttpResponse {
    let backup_id = req
        .filter
        .iter()
        .find(|(key, _)| key == "backup_id")
        .map(|(_, id)| id.as_str());
    let result: Result<Vec<Backup>, StoreError> = match backup_id {
        Some(id) => match stores.backups.get(id).await {
            Ok(backup) => Ok(vec![backup]
                .into_iter()
                .filter(|b| b.matches(&req.filter))
                .collect()),
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        },
        None => stores.backups.list(req.filter.clone()).await,
    };
    match result {
        Ok(backups) => HttpResponse::json(200, &json!({"backups": backups, "total_count": backups.len()})),
        Err(e) => e.into_response(),
    }
}

fn not_routed(req: &ApiRequest<'_>) -> HttpResponse {
    ApiError::new(
        404,
        "APIGW.0101",
        format!("no route for {} /{}", req.method, req.segments.join("/")),
    )
    .into_response()
}

/// Answers one API request. Keystone is served by the caller.
pub async fn dispatch(stores: &Stores, project_id: &str, req: &ApiRequest<'_>) -> HttpResponse {
    use Method::{Delete, Get, Post, Put};

    let scoped = match req.segments.as_slice() {
        ["v1" | "v3", project, ..] => Some(*project),
        ["v2.0", project, _, _, "tags", ..] => Some(*project),
        _ => None,
    };
    if scoped.is_some_and(|p| p != project_id) {
        return ApiError::new(403, "APIGW.0302", "project id does not match the credentials").into_response();
    }

    match (req.method, req.segments.as_slice()) {
        // VPC v1
        (Post, ["v1", _, "vpcs"]) => create(&stores.vpcs, req, Some("vpc"), 200, "vpc").await,
        (Get, ["v1", _, "vpcs"]) => list(&stores.vpcs, req, "vpcs").await,
        (Get, ["v1", _, "vpcs", id]) => respond(200, "vpc", stores.vpcs.get(id).await),
        (Put, ["v1", _, "vpcs", id]) => update(&stores.vpcs, req, id, "vpc").await,
        (Delete, ["v1", _, "vpcs", id]) => no_content(stores.vpcs.delete(id).await, 204),

        (Post, ["v1", _, "subnets"]) => create(&stores.subnets, req, Some("subnet"), 200, "subnet").await,
        (Get, ["v1", _, "subnets"]) => list(&stores.subnets, req, "subnets").await,
        (Get, ["v1", _, "subnets", id]) => respond(200, "subnet", stores.subnets.get(id).await),
        (Put, ["v1", _, "vpcs", _, "subnets", id]) => update(&stores.subnets, req, id, "subnet").await,
        (Delete, ["v1", _, "vpcs", _, "subnets", id]) => no_content(stores.subnets.delete(id).await, 204),

        (Post, ["v1", _, "publicips"]) => create(&stores.eips, req, None, 200, "publicip").await,
        (Get, ["v1", _, "publicips"]) => list(&stores.eips, req, "publicips").await,
        (Get, ["v1", _, "publicips", id]) => respond(200, "publicip", stores.eips.get(id).await),
        (Put, ["v1", _, "publicips", id]) => update(&stores.eips, req, id, "publicip").await,
        (Delete, ["v1", _, "publicips", id]) => no_content(stores.eips.delete(id).await, 204),
        (Put, ["v1", _, "bandwidths", id]) => update_bandwidth(stores, req, id).await,

        // VPC v2 tags
        (_, ["v2.0", _, resource_type, id, "tags", rest @ ..]) => tags(stores, req, resource_type, id, rest).await,

        // Networking v2
        (Post, ["v2.0", "vpc", "peerings"]) => create(&stores.peerings, req, Some("peering"), 201, "peering").await,
        (Get, ["v2.0", "vpc", "peerings"]) => list(&stores.peerings, req, "peerings").await,
        (Get, ["v2.0", "vpc", "peerings", id]) => respond(200, "peering", stores.peerings.get(id).await),
        (Put, ["v2.0", "vpc", "peerings", id]) => update(&stores.peerings, req, id, "peering").await,
        (Put, ["v2.0", "vpc", "peerings", id, "accept"]) => {
            respond(200, "peering", stores.peerings.perform_action(id, PeeringAction::Accept).await)
        }
        (Put, ["v2.0", "vpc", "peerings", id, "reject"]) => {
            respond(200, "peering", stores.peerings.perform_action(id, PeeringAction::Reject).await)
        }
        (Delete, ["v2.0", "vpc", "peerings", id]) => no_content(stores.peerings.delete(id).await, 204),

        (Post, ["v2.0", "routers"]) => create(&stores.routers, req, Some("router"), 201, "router").await,
        (Get, ["v2.0", "routers"]) => list(&stores.routers, req, "routers").await,
        (Get, ["v2.0", "routers", id]) => respond(200, "router", stores.routers.get(id).await),
        (Put, ["v2.0", "routers", id]) => update(&stores.routers, req, id, "router").await,
        (Delete, ["v2.0", "routers", id]) => no_content(stores.routers.delete(id).await, 204),

        (Post, ["v2.0", "ports"]) => create(&stores.ports, req, Some("port"), 201, "port").await,
        (Get, ["v2.0", "ports"]) => list(&stores.ports, req, "ports").await,
        (Get, ["v2.0", "ports", id]) => respond(200, "port", stores.ports.get(id).await),
        (Put, ["v2.0", "ports", id]) => update(&stores.ports, req, id, "port").await,
        (Delete, ["v2.0", "ports", id]) => no_content(stores.ports.delete(id).await, 204),

        // RDS v3
        (Post, ["v3", _, "backups"]) => create(&stores.backups, req, None, 202, "backup").await,
        (Get, ["v3", _, "backups"]) => list_backups(stores, req).await,
        (Delete, ["v3", _, "backups", id]) => no_content(stores.backups.delete(id).await, 202),

        _ => not_routed(req),
    }
}

async fn update_bandwidth(stores: &Stores, req: &ApiRequest<'_>, bandwidth_id: &str) -> HttpResponse {
    #[derive(serde::Deserialize)]
    struct BandwidthUpdate {
        name: Option<String>,
        size: Option<i64>,
    }

    let update: BandwidthUpdate = match req.payload(Some("bandwidth")) {
        Ok(update) => update,
        Err(e) => return e.into_response(),
    };
    let filter = vec![("bandwidth_id".to_owned(), bandwidth_id.to_owned())];
    let eip = match stores.eips.list(filter).await {
        Ok(found) => found.into_iter().next(),
        Err(e) => return e.into_response(),
    };
    let Some(eip) = eip else {
        return StoreError::NotFound {
            kind: "bandwidth",
            id: bandwidth_id.to_owned(),
        }
        .into_response();
    };
    let action = EipAction::UpdateBandwidth {
        name: update.name,
        size: update.size,
    };
    match stores.eips.perform_action(&eip.id, action).await {
        Ok(eip) => wrap(
            200,
            "bandwidth",
            &json!({
                "id": eip.bandwidth_id,
                "name": eip.bandwidth_name,
                "size": eip.bandwidth_size,
                "share_type": eip.bandwidth_share_type,
            }),
        ),
        Err(e) => e.into_response(),
    }
}

fn tag_pairs(value: &serde_json::Value) -> Vec<(String, String)> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|t| {
            let key = t.get("key")?.as_str()?.to_owned();
            let value = t.get("value").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
            Some((key, value))
        })
        .collect()
}

async fn tags(stores: &Stores, req: &ApiRequest<'_>, resource_type: &str, id: &str, rest: &[&str]) -> HttpResponse {
    match stores.taggable_exists(resource_type, id).await {
        Ok(true) => {}
        Ok(false) => {
            return StoreError::NotFound {
                kind: "taggable resource",
                id: format!("{resource_type}/{id}"),
            }
            .into_response()
        }
        Err(e) => return e.into_response(),
    }

    let table_key = format!("{resource_type}/{id}");
    let mut table = stores.tag_table();
    let tags = table.entry(table_key).or_default();

    match (req.method, rest) {
        (Method::Get, []) => {
            let list: Vec<_> = tags
                .iter()
                .map(|(k, v)| json!({"key": k, "value": v}))
                .collect();
            HttpResponse::json(200, &json!({ "tags": list }))
        }
        (Method::Post, []) => match tag_pairs(&json!([req.body.get("tag")])).into_iter().next() {
            Some((key, value)) => {
                tags.insert(key, value);
                HttpResponse::new(204)
            }
            None => ApiError::bad_request("tag is required").into_response(),
        },
        (Method::Post, ["action"]) => {
            let pairs = tag_pairs(req.body.get("tags").unwrap_or(&serde_json::Value::Null));
            match req.body.get("action").and_then(|a| a.as_str()) {
                Some("create") => {
                    tags.extend(pairs);
                    HttpResponse::new(204)
                }
                Some("delete") => {
                    for (key, _) in pairs {
                        tags.remove(&key);
                    }
                    HttpResponse::new(204)
                }
                other => ApiError::bad_request(format!("unknown tag action {other:?}")).into_response(),
            }
        }
        (Method::Delete, [key]) => {
            let key = urlencoding::decode(key).map_or_else(|_| (*key).to_owned(), |k| k.into_owned());
            match tags.remove(&key) {
                Some(_) => HttpResponse::new(204),
                None => ApiError::new(404, "VPC.0901", format!("tag {key} not found")).into_response(),
            }
        }
        _ => not_routed(req),
    }
}
