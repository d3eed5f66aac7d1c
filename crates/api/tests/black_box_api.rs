use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use chatdesk_api::app::{AppServices, Stores, build_router};
use chatdesk_api::config::ApiConfig;
use chatdesk_auth::{AuditOutcome, JwtClaims, Role};
use chatdesk_core::{BranchId, EntityType, UserId};
use chatdesk_infra::{InMemoryAuditSink, InMemoryCredentialStore, InMemoryEntityStore, UserRecord};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    credentials: Arc<InMemoryCredentialStore>,
    entities: Arc<InMemoryEntityStore>,
    audit: Arc<InMemoryAuditSink>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let credentials = Arc::new(InMemoryCredentialStore::with_users(users()));
        let entities = Arc::new(InMemoryEntityStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        seed(&entities);

        let stores = Stores {
            credentials: credentials.clone(),
            entities: entities.clone(),
            audit: audit.clone(),
        };
        let services = AppServices::new(&ApiConfig::for_tests(JWT_SECRET), stores);

        // Same router as prod, bound to an ephemeral port.
        let app = build_router(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            credentials,
            entities,
            audit,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn users() -> Vec<UserRecord> {
    vec![
        UserRecord::new(UserId::new("admin"), "admin@x.io", Role::Admin),
        UserRecord::new(UserId::new("sup1"), "sup1@x.io", Role::Supervisor)
            .with_branch("b1", "Downtown", true)
            .with_whatsapp_account("wa1", Some(BranchId::new("b1"))),
        UserRecord::new(UserId::new("sup-empty"), "empty@x.io", Role::Supervisor),
        UserRecord::new(UserId::new("u1"), "u1@x.io", Role::Agent),
        UserRecord::new(UserId::new("u2"), "u2@x.io", Role::Agent),
        UserRecord::new(UserId::new("gone"), "gone@x.io", Role::Agent).deactivated(),
    ]
}

fn seed(entities: &InMemoryEntityStore) {
    let rows = [
        (EntityType::Booking, json!({ "id": "bk1", "agentId": "u1", "contact": { "branchId": "b1" } })),
        (EntityType::Booking, json!({ "id": "bk2", "agentId": "u2", "contact": { "branchId": "b2" } })),
        (
            EntityType::Template,
            json!({ "id": "t1", "name": "welcome", "category": "MARKETING", "whatsappAccountId": "wa1", "body": "Hi!" }),
        ),
        (
            EntityType::Template,
            json!({ "id": "t-global", "name": "legal", "category": "UTILITY", "whatsappAccountId": null }),
        ),
        (EntityType::Contact, json!({ "id": "c1", "name": "Ada", "branchId": "b1" })),
        (EntityType::Contact, json!({ "id": "c2", "name": "Bob", "branchId": "b2" })),
        (
            EntityType::Conversation,
            json!({ "id": "conv1", "assignedToId": "u1", "contact": { "branchId": "b2" }, "messages": [] }),
        ),
    ];
    for (entity, row) in rows {
        entities.seed(entity, row).unwrap();
    }
}

fn mint_jwt_at(user_id: &str, role: Role, issued: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        email: format!("{user_id}@x.io"),
        role: role.as_str().to_string(),
        iat: issued.timestamp(),
        exp: (issued + ttl).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn mint_jwt(user_id: &str, role: Role) -> String {
    mint_jwt_at(user_id, role, Utc::now(), ChronoDuration::minutes(10))
}

fn ids(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn agent_sees_only_own_bookings() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/bookings"))
        .bearer_auth(mint_jwt("u1", Role::Agent))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(ids(&body), vec!["bk1"]);
}

#[tokio::test]
async fn supervisor_without_branches_gets_empty_list() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/bookings"))
        .bearer_auth(mint_jwt("sup-empty", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn supervisor_template_delete_is_denied_and_audited() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .delete(srv.url("/templates/t1"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let records = srv.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Denied);
    assert_eq!(records[0].actor_id, UserId::new("sup1"));
    assert_eq!(records[0].prior_state, json!({ "name": "welcome", "category": "MARKETING" }));
    assert_eq!(srv.entities.len(EntityType::Template), 2);
}

#[tokio::test]
async fn expired_token_is_rejected_without_store_queries() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let issued = Utc::now() - ChronoDuration::hours(2);
    let token = mint_jwt_at("u1", Role::Agent, issued, ChronoDuration::minutes(10));

    let res = client.get(srv.url("/bookings")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.credentials.lookups(), 0);
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut token = mint_jwt("admin", Role::Admin);
    token.push('x');

    let res = client.get(srv.url("/whoami")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.credentials.lookups(), 0);
}

#[tokio::test]
async fn deactivated_and_unknown_users_are_unauthorized() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for user in ["gone", "deleted-user"] {
        let res = client
            .get(srv.url("/bookings"))
            .bearer_auth(mint_jwt(user, Role::Agent))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{user}");
    }
}

#[tokio::test]
async fn stored_role_overrides_token_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Token claims ADMIN, store says AGENT.
    let res = client
        .get(srv.url("/bookings"))
        .bearer_auth(mint_jwt("u1", Role::Admin))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec!["bk1"]);
}

#[tokio::test]
async fn out_of_scope_records_are_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt("sup1", Role::Supervisor);

    let res = client.get(srv.url("/contacts/c2")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/contacts/missing")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/contacts/c1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn null_anchored_templates_are_admin_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/templates"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec!["t1"]);

    let res = client
        .get(srv.url("/templates"))
        .bearer_auth(mint_jwt("admin", Role::Admin))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec!["t-global", "t1"]);
}

#[tokio::test]
async fn repeated_admin_delete_audits_twice_and_second_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt("admin", Role::Admin);

    let first = client.delete(srv.url("/bookings/bk2")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client.delete(srv.url("/bookings/bk2")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);

    let records = srv.audit.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.outcome == AuditOutcome::Granted));
    assert_eq!(records[1].prior_state, Value::Null);
}

#[tokio::test]
async fn supervisor_may_delete_in_scope_bookings_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt("sup1", Role::Supervisor);

    let res = client.delete(srv.url("/bookings/bk2")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.entities.len(EntityType::Booking), 2);

    let res = client.delete(srv.url("/bookings/bk1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.entities.len(EntityType::Booking), 1);
    assert_eq!(srv.audit.records().len(), 2);
}

#[tokio::test]
async fn unauthenticated_delete_is_not_audited() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.delete(srv.url("/templates/t1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(srv.audit.records().is_empty());
}

#[tokio::test]
async fn agent_cannot_edit_templates() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .patch(srv.url("/templates/t1"))
        .bearer_auth(mint_jwt("u1", Role::Agent))
        .json(&json!({ "name": "renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn patch_cannot_move_a_record_out_of_scope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt("sup1", Role::Supervisor);

    let res = client
        .patch(srv.url("/contacts/c1"))
        .bearer_auth(&token)
        .json(&json!({ "branchId": "b2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .patch(srv.url("/contacts/c1"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Ada L." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Ada L.");
    assert_eq!(body["data"]["branchId"], "b1");
}

#[tokio::test]
async fn bot_flow_creation_is_anchored_to_caller_scope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let sup = mint_jwt("sup1", Role::Supervisor);

    let res = client
        .post(srv.url("/bot-flows"))
        .bearer_auth(&sup)
        .json(&json!({ "name": "Greeter", "branchId": "b2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/bot-flows"))
        .bearer_auth(&sup)
        .json(&json!({ "name": "Unanchored" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/bot-flows"))
        .bearer_auth(&sup)
        .json(&json!({ "id": "bf1", "name": "Greeter", "branchId": "b1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["createdById"], "sup1");

    let res = client
        .post(srv.url("/bot-flows"))
        .bearer_auth(mint_jwt("u1", Role::Agent))
        .json(&json!({ "name": "Agent flow", "branchId": "b1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client.get(srv.url("/bot-flows")).bearer_auth(&sup).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec!["bf1"]);
}

#[tokio::test]
async fn whoami_returns_fresh_scope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["role"], "SUPERVISOR");
    assert_eq!(body["data"]["branchIds"], json!(["b1"]));
    assert_eq!(body["data"]["whatsappAccountIds"], json!(["wa1"]));
}

#[tokio::test]
async fn audit_log_is_admin_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .delete(srv.url("/templates/t1"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();

    let res = client
        .get(srv.url("/audit"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/audit?limit=10"))
        .bearer_auth(mint_jwt("admin", Role::Admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"][0]["outcome"], "DENIED");
    assert_eq!(body["data"][0]["entity_type"], "template");
}

#[tokio::test]
async fn rbac_explain_reports_granting_roles() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/rbac/explain?capability=delete_template"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["granted"], false);
    assert_eq!(body["data"]["granting_roles"], json!(["ADMIN"]));

    let res = client
        .get(srv.url("/rbac/capabilities"))
        .bearer_auth(mint_jwt("sup1", Role::Supervisor))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn template_creation_requires_capability_and_an_owned_account() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let sup = mint_jwt("sup1", Role::Supervisor);

    let res = client
        .post(srv.url("/templates"))
        .bearer_auth(mint_jwt("u1", Role::Agent))
        .json(&json!({ "name": "promo", "category": "MARKETING", "whatsappAccountId": "wa1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    for body in [
        json!({ "name": "promo", "category": "MARKETING", "whatsappAccountId": "wa2" }),
        json!({ "name": "promo", "category": "MARKETING" }),
    ] {
        let res = client
            .post(srv.url("/templates"))
            .bearer_auth(&sup)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    let res = client
        .post(srv.url("/templates"))
        .bearer_auth(&sup)
        .json(&json!({ "id": "t2", "name": "promo", "category": "MARKETING", "whatsappAccountId": "wa1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/templates"))
        .bearer_auth(mint_jwt("admin", Role::Admin))
        .json(&json!({ "id": "t-legal2", "name": "terms", "category": "UTILITY" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client.get(srv.url("/templates")).bearer_auth(&sup).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(ids(&body), vec!["t1", "t2"]);
}

#[tokio::test]
async fn malformed_requests_use_the_error_envelope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt("admin", Role::Admin);

    let res = client
        .patch(srv.url("/bookings/bk1"))
        .bearer_auth(&admin)
        .json(&json!([1, 2]))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    let res = client
        .get(srv.url("/audit?limit=-1"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let res = client
        .get(srv.url("/rbac/explain"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let res = client
        .post(srv.url("/bot-flows"))
        .bearer_auth(&admin)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}
