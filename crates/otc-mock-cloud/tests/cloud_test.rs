use otc_framework::transport::{HttpRequest, Method, Transport};
use otc_mock_cloud::{EntityKind, MockCloud, MockCloudOptions, Timing};
use serde_json::{json, Value};

struct Api {
    cloud: MockCloud,
}

impl Api {
    fn new(timing: Timing) -> Self {
        let cloud = MockCloud::start(MockCloudOptions {
            timing,
            ..Default::default()
        });
        Self { cloud }
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> (u16, Value) {
        let url = format!("https://vpc.eu-de.otc.t-systems.com{path}")
            .replace("{p}", self.cloud.project_id());
        let mut request = HttpRequest::new(method, url).header("x-auth-token", "mock-token");
        if let Some(body) = body {
            request = request.json_body(&body);
        }
        let response = self.cloud.send(request).await.unwrap();
        let body = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
        (response.status, body)
    }
}

#[tokio::test]
async fn test_keystone_serves_catalog_and_rejects_bad_tokens() {
    let api = Api::new(Timing::default());

    let (status, body) = api.call(Method::Post, "/v3/auth/tokens", Some(json!({}))).await;
    assert_eq!(status, 201);
    assert_eq!(body["token"]["project"]["id"], api.cloud.project_id());

    let request = HttpRequest::new(Method::Get, "https://vpc/v1/x/vpcs").header("x-auth-token", "wrong");
    assert_eq!(api.cloud.send(request).await.unwrap().status, 401);

    let (status, _) = api.call(Method::Get, "/v1/other-project/vpcs", None).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_subnet_requires_vpc_and_applies_dhcp_defaults() {
    let api = Api::new(Timing {
        settle_reads: 0,
        delete_reads: 0,
    });
    let subnet = json!({"subnet": {"name": "s1", "cidr": "192.168.1.0/24", "gateway_ip": "192.168.1.1", "vpc_id": "nope"}});
    let (status, _) = api.call(Method::Post, "/v1/{p}/subnets", Some(subnet)).await;
    assert_eq!(status, 400);

    let (_, vpc) = api
        .call(Method::Post, "/v1/{p}/vpcs", Some(json!({"vpc": {"name": "v", "cidr": "192.168.0.0/16"}})))
        .await;
    let vpc_id = vpc["vpc"]["id"].as_str().unwrap();
    let subnet = json!({"subnet": {"name": "s1", "cidr": "192.168.1.0/24", "gateway_ip": "192.168.1.1", "vpc_id": vpc_id}});
    let (status, created) = api.call(Method::Post, "/v1/{p}/subnets", Some(subnet)).await;
    assert_eq!(status, 200);
    assert_eq!(created["subnet"]["dhcp_enable"], true);
    assert_eq!(created["subnet"]["dnsList"], json!(["100.125.4.25", "100.125.129.199"]));
}

#[tokio::test]
async fn test_tags_and_failure_injection() {
    let api = Api::new(Timing::default());
    let (_, vpc) = api
        .call(Method::Post, "/v1/{p}/vpcs", Some(json!({"vpc": {"name": "v"}})))
        .await;
    let id = vpc["vpc"]["id"].as_str().unwrap().to_owned();
    let tags = format!("/v2.0/{{p}}/vpcs/{id}/tags");

    let batch = json!({"action": "create", "tags": [{"key": "a", "value": "1"}, {"key": "b", "value": "2"}]});
    let (status, _) = api.call(Method::Post, &format!("{tags}/action"), Some(batch)).await;
    assert_eq!(status, 204);
    let (status, _) = api.call(Method::Delete, &format!("{tags}/b"), None).await;
    assert_eq!(status, 204);
    let (status, _) = api.call(Method::Delete, &format!("{tags}/b"), None).await;
    assert_eq!(status, 404);
    let (_, listed) = api.call(Method::Get, &tags, None).await;
    assert_eq!(listed["tags"], json!([{"key": "a", "value": "1"}]));

    api.cloud.fail_next(Method::Get, "/vpcs/", 503, 1);
    let (status, _) = api.call(Method::Get, &format!("/v1/{{p}}/vpcs/{id}"), None).await;
    assert_eq!(status, 503);
    let (status, _) = api.call(Method::Get, &format!("/v1/{{p}}/vpcs/{id}"), None).await;
    assert_eq!(status, 200);

    assert!(api.cloud.delete_out_of_band(EntityKind::Vpc, &id).await);
    let (status, _) = api.call(Method::Get, &format!("/v1/{{p}}/vpcs/{id}"), None).await;
    assert_eq!(status, 404);
    assert_eq!(api.cloud.calls_to(Method::Delete, "/tags/").len(), 2);
}

#[tokio::test]
async fn test_peering_accept_flow() {
    let api = Api::new(Timing {
        settle_reads: 1,
        delete_reads: 1,
    });
    let (_, vpc) = api
        .call(Method::Post, "/v1/{p}/vpcs", Some(json!({"vpc": {"name": "v"}})))
        .await;
    let vpc_id = vpc["vpc"]["id"].as_str().unwrap();
    let peering = json!({"peering": {
        "name": "p",
        "request_vpc_info": {"vpc_id": vpc_id},
        "accept_vpc_info": {"vpc_id": "remote", "tenant_id": "other-tenant"},
    }});
    let (status, created) = api.call(Method::Post, "/v2.0/vpc/peerings", Some(peering)).await;
    assert_eq!(status, 201);
    let path = format!("/v2.0/vpc/peerings/{}", created["peering"]["id"].as_str().unwrap());

    let (_, read) = api.call(Method::Get, &path, None).await;
    assert_eq!(read["peering"]["status"], "CREATING");
    let (_, read) = api.call(Method::Get, &path, None).await;
    assert_eq!(read["peering"]["status"], "PENDING_ACCEPTANCE");

    let (status, _) = api.call(Method::Put, &format!("{path}/accept"), None).await;
    assert_eq!(status, 200);
    let (status, _) = api.call(Method::Put, &format!("{path}/accept"), None).await;
    assert_eq!(status, 409);
    api.call(Method::Get, &path, None).await;
    let (_, read) = api.call(Method::Get, &path, None).await;
    assert_eq!(read["peering"]["status"], "ACTIVE");
}
