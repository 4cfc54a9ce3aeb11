//! HTTP-level tests: token validation, identity resolution, route guards and
//! the error envelope, driven through the full router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use scribe_core::api::{build_router, AppState};
use scribe_core::config::AuthSettings;
use scribe_core::middleware::{Authenticator, Claims, DirectoryIdentityResolver, JwksCache};
use scribe_core::rbac::{
    seed, AuthzStore, InMemoryAuthzStore, OwnershipRegistry, PolicyEngine, RoleService,
    SelfOwnershipChecker, UserId,
};
use scribe_core::users::{InMemoryUserDirectory, UserDirectory};

const SECRET: &[u8] = b"scribe-api-test-secret-0123456789";
const ISSUER: &str = "https://id.scribe.test/";

struct TestApp {
    router: Router,
    roles: RoleService,
    directory: Arc<InMemoryUserDirectory>,
}

async fn app() -> TestApp {
    let store = Arc::new(InMemoryAuthzStore::new());
    seed(store.as_ref()).await.unwrap();
    let store: Arc<dyn AuthzStore> = store;

    let ownership = OwnershipRegistry::new();
    ownership.register("users", Arc::new(SelfOwnershipChecker));

    let settings = AuthSettings {
        jwks_url: String::new(),
        issuer: ISSUER.to_string(),
        audience: None,
        algorithms: vec!["HS256".to_string()],
        jwks_refresh_secs: 300,
        leeway_secs: 0,
        user_id_claim: None,
    };
    let keys = HashMap::from([("k1".to_string(), DecodingKey::from_secret(SECRET))]);
    let authenticator =
        Authenticator::new(&settings, Arc::new(JwksCache::with_static_keys(keys))).unwrap();

    let directory = Arc::new(InMemoryUserDirectory::new());
    let roles = RoleService::new(store.clone());

    let state = AppState {
        engine: Arc::new(PolicyEngine::new(store.clone(), ownership)),
        roles: roles.clone(),
        directory: directory.clone(),
        authenticator: Arc::new(authenticator),
        identity: Arc::new(DirectoryIdentityResolver::new(directory.clone())),
        db: None,
        metrics: None,
    };

    TestApp {
        router: build_router(state),
        roles,
        directory,
    }
}

fn token(subject: &str, email: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        email: Some(email.to_string()),
        iss: ISSUER.to_string(),
        exp: now + 600,
        iat: now,
        ..Default::default()
    };
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".to_string());
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers a profile for `subject` and binds `role` to it.
async fn user_with_role(app: &TestApp, subject: &str, role: &str) -> (UserId, String) {
    let email = format!("{}@example.com", subject);
    let profile = app.directory.create_profile(subject, &email).await.unwrap();
    let role = app
        .roles
        .get_all_roles()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.name == role)
        .unwrap();
    app.roles
        .assign_role_to_user(profile.id, role.id, None)
        .await
        .unwrap();
    (profile.id, token(subject, &email))
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
}

#[tokio::test]
async fn admin_routes_require_a_token() {
    let app = app().await;

    let (status, body) = call(&app, Method::GET, "/api/v1/roles", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, body) = call(&app, Method::GET, "/api/v1/roles", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn profile_creation_precedes_identity_resolution() {
    let app = app().await;
    let bearer = token("auth0|carol", "carol@example.com");

    let (status, body) = call(&app, Method::GET, "/api/v1/me/authorization", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["business_code"], "USER_PROFILE_NOT_FOUND");

    let (status, body) = call(&app, Method::POST, "/api/v1/users/profile", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "carol@example.com");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Idempotent.
    let (_, again) = call(&app, Method::POST, "/api/v1/users/profile", Some(&bearer), None).await;
    assert_eq!(again["data"]["id"], id.as_str());

    let (status, body) = call(&app, Method::GET, "/api/v1/me/authorization", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], id.as_str());
    assert_eq!(body["data"]["permissions"], json!([]));
}

#[tokio::test]
async fn padded_subject_resolves_to_its_profile() {
    let app = app().await;
    let bearer = token(" auth0|dana ", "dana@example.com");

    let (status, body) = call(&app, Method::POST, "/api/v1/users/profile", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["external_id"], "auth0|dana");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, "/api/v1/me/authorization", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], id.as_str());
}

#[tokio::test]
async fn permission_guards_protect_the_admin_surface() {
    let app = app().await;
    let (_, subscriber) = user_with_role(&app, "auth0|sam", "subscriber").await;
    let (_, admin) = user_with_role(&app, "auth0|ada", "admin").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/roles", Some(&subscriber), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = call(&app, Method::GET, "/api/v1/roles", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 7);

    let (status, body) = call(&app, Method::GET, "/api/v1/permissions", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["permission"] == "posts:update:own"));
}

#[tokio::test]
async fn role_lifecycle_over_http() {
    let app = app().await;
    let (admin_id, admin) = user_with_role(&app, "auth0|ada", "admin").await;
    let (writer_id, _) = user_with_role(&app, "auth0|wes", "subscriber").await;

    let (status, templates) =
        call(&app, Method::GET, "/api/v1/roles/templates", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let template_id = templates["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "content_manager_template")
        .unwrap()["id"]
        .clone();

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/v1/roles/from-template",
        Some(&admin),
        Some(json!({ "template_id": template_id, "name": "site_editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["is_template"], false);
    let role_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/roles/from-template",
        Some(&admin),
        Some(json!({ "template_id": template_id, "name": "site_editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["business_code"], "ROLE_NAME_EXISTS");

    let (status, grants) = call(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/roles", writer_id),
        Some(&admin),
        Some(json!({ "role_id": role_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let granted = grants["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["role"]["name"] == "site_editor")
        .unwrap();
    assert_eq!(granted["granted_by"], admin_id.to_string());

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/roles", writer_id),
        Some(&admin),
        Some(json!({ "role_id": template_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["business_code"], "TEMPLATE_CANNOT_ASSIGN");

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/users/{}/roles/{}", writer_id, role_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/roles/{}", role_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn system_roles_are_protected_over_http() {
    let app = app().await;
    let (_, admin) = user_with_role(&app, "auth0|ada", "admin").await;

    let (_, roles) = call(&app, Method::GET, "/api/v1/roles", Some(&admin), None).await;
    let admin_role = roles["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/roles/{}", admin_role),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["business_code"], "CANNOT_DELETE_SYSTEM_ROLE");

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/roles/{}", admin_role),
        Some(&admin),
        Some(json!({ "name": "root" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["business_code"], "CANNOT_UPDATE_SYSTEM_ROLE");
}

#[tokio::test]
async fn profiles_are_readable_by_their_owner() {
    let app = app().await;
    let (sam_id, sam) = user_with_role(&app, "auth0|sam", "subscriber").await;
    let (ed_id, editor) = user_with_role(&app, "auth0|ed", "editor").await;

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/users/{}", sam_id), Some(&sam), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["external_id"], "auth0|sam");

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/users/{}", ed_id), Some(&sam), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // users:read:any covers every profile.
    let (status, _) = call(&app, Method::GET, &format!("/api/v1/users/{}", sam_id), Some(&editor), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/users/{}", Uuid::new_v4()), Some(&editor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let app = app().await;
    let (_, sam) = user_with_role(&app, "auth0|sam", "subscriber").await;
    let (_, admin) = user_with_role(&app, "auth0|ada", "admin").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/users/not-a-uuid", Some(&sam), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/roles",
        Some(&admin),
        Some(json!({ "description": "missing a name" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/roles",
        Some(&admin),
        Some(json!({ "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
