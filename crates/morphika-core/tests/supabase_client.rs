#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test: panics are the assertion mechanism")]

use bytes::Bytes;
use morphika_core::collaborators::{BillingProvider, IdentityProvider, ObjectStorage};
use morphika_core::collaborators::SupabaseClient;
use morphika_types::error::AuthError;
use morphika_types::models::{PlanTier, UserId};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVICE_KEY: &str = "service-role-key";
const BUCKET: &str = "morphika-images";

fn client_for(server: &MockServer) -> SupabaseClient {
    SupabaseClient::new(&server.uri(), SERVICE_KEY, BUCKET, "subscriptions").expect("valid url")
}

#[tokio::test]
async fn test_identity_resolves_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer user-jwt"))
        .and(header("apikey", SERVICE_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "8d0f3c4e-user",
            "email": "ana@example.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let user = client.current_user("user-jwt").await.expect("valid token");
    assert_eq!(user.as_str(), "8d0f3c4e-user");

    let err = client.current_user("expired").await.expect_err("expired token");
    assert_eq!(err, AuthError::Unauthenticated);
}

#[tokio::test]
async fn test_put_uploads_and_returns_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/morphika-images/models/u1/cats/a.png"))
        .and(header("x-upsert", "true"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Key": "morphika-images/models/u1/cats/a.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = client_for(&server)
        .put("models/u1/cats/a.png", Bytes::from_static(b"png"), "image/png", true)
        .await
        .expect("upload");
    assert_eq!(
        url,
        format!("{}/storage/v1/object/public/morphika-images/models/u1/cats/a.png", server.uri())
    );
}

#[tokio::test]
async fn test_list_skips_folders() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/morphika-images"))
        .and(body_partial_json(serde_json::json!({ "prefix": "models/u1/cats" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "nested", "id": null, "metadata": null },
            {
                "name": "a.png",
                "id": "obj-1",
                "updated_at": "2024-05-01T10:00:00.000Z",
                "metadata": { "size": 2048, "mimetype": "image/png" }
            }
        ])))
        .mount(&server)
        .await;

    let objects = client_for(&server).list("models/u1/cats/").await.expect("list");
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].name, "a.png");
    assert_eq!(objects[0].size_bytes, Some(2048));
    assert!(objects[0].updated_at.is_some());
}

#[tokio::test]
async fn test_remove_tolerates_missing_objects() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/morphika-images"))
        .and(body_partial_json(serde_json::json!({ "prefixes": ["models/u1/cats/a.png"] })))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client_for(&server).remove("models/u1/cats/a.png").await.expect("404 is not an error");
}

#[tokio::test]
async fn test_plan_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/subscriptions"))
        .and(query_param("user_id", "eq.paying"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "plan": "Pro", "status": "active" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/subscriptions"))
        .and(query_param("user_id", "eq.lapsed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "plan": "team", "status": "canceled" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/subscriptions"))
        .and(query_param("user_id", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.plan_for(&UserId::new("paying")).await.expect("plan"), Some(PlanTier::Pro));
    assert_eq!(client.plan_for(&UserId::new("lapsed")).await.expect("plan"), None);
    assert_eq!(client.plan_for(&UserId::new("free")).await.expect("plan"), None);
}
