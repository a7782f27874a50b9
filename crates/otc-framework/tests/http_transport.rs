use mockito::{Matcher, Server};
use otc_framework::transport::{HttpTransport, TlsOptions};
use otc_framework::{ClientFactory, CloudError, ProviderConfig, ServiceVersion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn transport() -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(&TlsOptions::default(), Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn test_token_exchange_and_catalog_over_http() {
    let mut server = Server::new_async().await;

    let catalog = json!({"token": {
        "project": {"id": "p9"},
        "catalog": [{"type": "vpc", "endpoints": [
            {"interface": "public", "region": "eu-de", "url": format!("{}/vpc", server.url())}
        ]}]
    }});
    let token_mock = server
        .mock("POST", "/v3/auth/tokens")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_header("x-subject-token", "tok-123")
        .with_body(catalog.to_string())
        .expect(1)
        .create_async()
        .await;

    let vpc_mock = server
        .mock("GET", "/vpc/v1/p9/vpcs/abc")
        .match_header("x-auth-token", "tok-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"vpc":{"id":"abc","status":"ACTIVE"}}"#)
        .expect(2)
        .create_async()
        .await;

    let config = ProviderConfig {
        auth_url: Some(format!("{}/v3", server.url())),
        project_name: Some("eu-de_demo".into()),
        domain_name: Some("OTC-EU-DE-000000000010000XXXXX".into()),
        user_name: Some("user".into()),
        password: Some("secret".into()),
        ..Default::default()
    };
    let factory = ClientFactory::new(config, transport());

    // two clients, one token exchange
    for _ in 0..2 {
        let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();
        let body: serde_json::Value = client.get(&client.url(&["vpcs", "abc"])).await.unwrap();
        assert_eq!(body["vpc"]["status"], "ACTIVE");
    }

    token_mock.assert_async().await;
    vpc_mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_sentinel_over_http() {
    let mut server = Server::new_async().await;
    let _gone = server
        .mock("GET", "/v1/p1/vpcs/gone")
        .with_status(404)
        .with_body(r#"{"code":"VPC.0202","message":"Query resource by id gone fail."}"#)
        .create_async()
        .await;
    let _bad = server
        .mock("POST", "/v1/p1/vpcs")
        .with_status(400)
        .with_body(r#"{"error_msg":"cidr is invalid"}"#)
        .create_async()
        .await;

    let mut config = ProviderConfig {
        auth_url: Some(format!("{}/v3", server.url())),
        project_id: Some("p1".into()),
        access_key: Some("AK".into()),
        secret_key: Some("SK".into()),
        ..Default::default()
    };
    config.endpoints.insert("vpc".into(), server.url());
    let factory = ClientFactory::new(config, transport());
    let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();

    let err = client
        .get::<serde_json::Value>(&client.url(&["vpcs", "gone"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::NotFound { .. }));

    let err = client
        .post::<_, serde_json::Value>(&client.url(&["vpcs"]), &json!({"vpc": {"cidr": "x"}}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("cidr is invalid"));
}

#[tokio::test]
async fn test_ak_sk_requests_are_signed() {
    let mut server = Server::new_async().await;
    let signed = server
        .mock("GET", "/v1/p1/vpcs")
        .match_header(
            "authorization",
            Matcher::Regex(r"^SDK-HMAC-SHA256 Access=AK, SignedHeaders=[a-z;-]+, Signature=[0-9a-f]{64}$".into()),
        )
        .match_header("x-sdk-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".into()))
        .match_header("x-project-id", "p1")
        .with_status(200)
        .with_body(r#"{"vpcs":[]}"#)
        .create_async()
        .await;

    let mut config = ProviderConfig {
        auth_url: Some(format!("{}/v3", server.url())),
        project_id: Some("p1".into()),
        access_key: Some("AK".into()),
        secret_key: Some("SK".into()),
        ..Default::default()
    };
    config.endpoints.insert("vpc".into(), server.url());
    let factory = ClientFactory::new(config, transport());
    let client = factory.client_for(ServiceVersion::VpcV1, "eu-de").await.unwrap();

    let body: serde_json::Value = client.get(&client.url(&["vpcs"])).await.unwrap();
    assert_eq!(body["vpcs"], json!([]));
    signed.assert_async().await;
}
