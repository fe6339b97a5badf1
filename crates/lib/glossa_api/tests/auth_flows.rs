//! Integration tests: build the router over an in-memory store and drive
//! the credential lifecycle end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use glossa_api::config::ApiConfig;
use glossa_api::{AppState, router};
use glossa_core::mail::RecordingMailer;
use glossa_core::models::auth::{SystemRoleGrant, VerificationKind};
use glossa_core::rbac::SystemRole;
use glossa_core::settings::AuthSettings;
use glossa_core::verification;
use glossa_core::store::{
    AuditStore, MemoryStore, SessionStore, UserStore, VerificationTokenStore,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

static NEXT_IP: AtomicU32 = AtomicU32::new(1);

fn fresh_ip() -> String {
    let n = NEXT_IP.fetch_add(1, Ordering::SeqCst);
    format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff)
}

/// The `token` query value of the link in an email body.
fn token_from_body(body: &str) -> Option<&str> {
    let start = body.find("token=")? + "token=".len();
    let rest = &body[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

struct TestApp {
    app: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }
}

/// Cookie values a browser would send back.
#[derive(Default, Clone)]
struct Browser {
    session: Option<String>,
    refresh: Option<String>,
    ip: String,
}

impl Browser {
    fn new() -> Self {
        Self {
            ip: fresh_ip(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, reply: &Reply) {
        let cookies = reply.cookies();
        if let Some(v) = cookies.get("session-token") {
            self.session = Some(v.clone()).filter(|v| !v.is_empty());
        }
        if let Some(v) = cookies.get("refresh-token") {
            self.refresh = Some(v.clone()).filter(|v| !v.is_empty());
        }
    }

    fn cookie_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(s) = &self.session {
            parts.push(format!("session-token={s}"));
        }
        if let Some(r) = &self.refresh {
            parts.push(format!("refresh-token={r}"));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let state = AppState::new(store.clone(), ApiConfig::for_tests("test-secret"), mailer.clone());
        Self {
            app: router(state.clone()),
            state,
            store,
            mailer,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        browser: &Browser,
    ) -> Reply {
        self.send(method, uri, body.map(|b| b.to_string()), browser)
            .await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
        browser: &Browser,
    ) -> Reply {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", browser.ip.as_str())
            .header(header::USER_AGENT, "integration-test");
        if let Some(cookie) = browser.cookie_header() {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn post(&self, uri: &str, body: Value, browser: &Browser) -> Reply {
        self.call(Method::POST, uri, Some(body), browser).await
    }

    async fn post_raw(&self, uri: &str, raw: &str, browser: &Browser) -> Reply {
        self.send(Method::POST, uri, Some(raw.to_string()), browser)
            .await
    }

    async fn register(&self, email: &str) -> Uuid {
        let reply = self
            .post(
                "/register",
                json!({"email": email, "password": "Str0ngPass!"}),
                &Browser::new(),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        reply.body["userId"].as_str().unwrap().parse().unwrap()
    }

    async fn login(&self, email: &str, browser: &mut Browser) -> Reply {
        let reply = self
            .post(
                "/login",
                json!({"email": email, "password": "Str0ngPass!"}),
                browser,
            )
            .await;
        browser.absorb(&reply);
        reply
    }

    async fn make_admin(&self, user_id: Uuid) {
        self.store
            .grant_system_role(&SystemRoleGrant {
                user_id,
                role: SystemRole::Admin,
                granted_by: Uuid::new_v4(),
                granted_at: Utc::now(),
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn register_creates_user_and_verification_token() {
    let t = TestApp::new();
    let user_id = t.register("alice@example.com").await;

    let user = t.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert!(!user.is_verified());

    let token = t
        .store
        .find_verification_token_for("alice@example.com", VerificationKind::EmailVerification)
        .await
        .unwrap()
        .expect("verification token");
    let ttl = token.expires_at - Utc::now();
    assert!(ttl > Duration::hours(24) - Duration::minutes(1) && ttl <= Duration::hours(24));
    assert!(t.mailer.last_to("alice@example.com").is_some());
}

#[tokio::test]
async fn duplicate_email_is_a_conflict_regardless_of_case() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let reply = t
        .post(
            "/register",
            json!({"email": "  Alice@Example.COM", "password": "Str0ngPass!"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"], "conflict");
}

#[tokio::test]
async fn register_rejects_weak_password_and_bad_email() {
    let t = TestApp::new();
    let reply = t
        .post(
            "/register",
            json!({"email": "alice@example.com", "password": "short"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = t
        .post(
            "/register",
            json!({"email": "not-an-email", "password": "Str0ngPass!"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_email_then_reuse_is_invalid_token() {
    let t = TestApp::new();
    let user_id = t.register("alice@example.com").await;
    let mail = t.mailer.last_to("alice@example.com").unwrap();
    let token = token_from_body(&mail.body).unwrap().to_string();

    let reply = t
        .post("/verify-email", json!({"token": token}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    let user = t.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert!(user.is_verified());

    let reply = t
        .post("/verify-email", json!({"token": token}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_token");
}

#[tokio::test]
async fn forgot_password_for_unknown_email_is_silent() {
    let t = TestApp::new();
    let reply = t
        .post(
            "/forgot-password",
            json!({"email": "ghost@example.com"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert!(
        t.store
            .find_verification_token_for("ghost@example.com", VerificationKind::PasswordReset)
            .await
            .unwrap()
            .is_none()
    );
    assert!(t.mailer.last_to("ghost@example.com").is_none());
}

#[tokio::test]
async fn forgot_password_answers_identically_when_throttled() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let browser = Browser::new();
    let mut messages = Vec::new();
    for _ in 0..5 {
        let reply = t
            .post(
                "/forgot-password",
                json!({"email": "alice@example.com"}),
                &browser,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        messages.push(reply.body["message"].clone());
    }
    assert!(messages.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn password_reset_revokes_refresh_tokens_and_is_single_use() {
    let t = TestApp::new();
    let user_id = t.register("alice@example.com").await;
    let mut browser = Browser::new();
    assert_eq!(t.login("alice@example.com", &mut browser).await.status, StatusCode::OK);

    let reply = t
        .post(
            "/forgot-password",
            json!({"email": "alice@example.com"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let mail = t.mailer.last_to("alice@example.com").unwrap();
    assert_eq!(mail.subject, "Reset your password");
    let token = token_from_body(&mail.body).unwrap().to_string();

    let reply = t
        .post(
            "/reset-password",
            json!({"token": token, "newPassword": "An0therPass"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(
        t.store
            .refresh_tokens_for(user_id)
            .await
            .iter()
            .all(|r| r.revoked_at.is_some())
    );

    let reply = t.post("/refresh", json!({}), &browser).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "token_revoked");

    let reply = t
        .post(
            "/reset-password",
            json!({"token": token, "newPassword": "Y3tAnotherPass"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_token");
}

#[tokio::test]
async fn login_sets_cookies_and_rejects_bad_password() {
    let t = TestApp::new();
    t.register("alice@example.com").await;

    let mut browser = Browser::new();
    let reply = t.login("alice@example.com", &mut browser).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["accessToken"].is_string());
    assert!(browser.session.is_some() && browser.refresh.is_some());
    let set_cookie: Vec<_> = reply
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(set_cookie.iter().all(|c| c.contains("HttpOnly") && c.contains("SameSite=Lax")));

    let reply = t
        .post(
            "/login",
            json!({"email": "alice@example.com", "password": "WrongPass1"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "invalid_credentials");
}

#[tokio::test]
async fn repeated_failed_logins_are_throttled() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let browser = Browser::new();
    for _ in 0..5 {
        let reply = t
            .post(
                "/login",
                json!({"email": "alice@example.com", "password": "WrongPass1"}),
                &browser,
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }
    let reply = t
        .post(
            "/login",
            json!({"email": "alice@example.com", "password": "Str0ngPass!"}),
            &browser,
        )
        .await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(reply.headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn refresh_rotates_and_reuse_is_rejected() {
    let t = TestApp::new();
    let user_id = t.register("alice@example.com").await;
    let mut browser = Browser::new();
    t.login("alice@example.com", &mut browser).await;
    let original = browser.clone();

    let reply = t.post("/refresh", json!({}), &browser).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["accessToken"].is_string());
    browser.absorb(&reply);
    assert_ne!(browser.refresh, original.refresh);

    let records = t.store.refresh_tokens_for(user_id).await;
    assert_eq!(records.len(), 2);
    assert!(records[0].revoked_at.is_some());
    assert_eq!(records[0].replaced_by, Some(records[1].id));
    assert!(records[1].revoked_at.is_none());

    let reply = t.post("/refresh", json!({}), &original).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "token_revoked");

    let reply = t.post("/refresh", json!({}), &Browser::new()).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_is_rate_limited_per_ip() {
    let t = TestApp::new();
    let browser = Browser::new();
    for i in 1..=6 {
        let reply = t
            .post(
                "/register",
                json!({"email": format!("user{i}@example.com"), "password": "Str0ngPass!"}),
                &browser,
            )
            .await;
        if i <= 3 {
            assert_eq!(reply.status, StatusCode::CREATED, "call {i}");
        } else {
            assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS, "call {i}");
            let retry: u64 = reply.headers[header::RETRY_AFTER]
                .to_str()
                .unwrap()
                .parse()
                .unwrap();
            assert!(retry > 0);
        }
    }
}

#[tokio::test]
async fn sessions_list_and_revoke() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    t.register("bob@example.com").await;
    let mut laptop = Browser::new();
    let mut phone = Browser::new();
    let mut bob = Browser::new();
    t.login("alice@example.com", &mut laptop).await;
    t.login("alice@example.com", &mut phone).await;
    t.login("bob@example.com", &mut bob).await;

    let reply = t.call(Method::GET, "/sessions", None, &laptop).await;
    assert_eq!(reply.status, StatusCode::OK);
    let sessions = reply.body["sessions"].as_array().unwrap().clone();
    assert_eq!(sessions.len(), 2);
    let current: Vec<_> = sessions.iter().filter(|s| s["isCurrent"] == true).collect();
    assert_eq!(current.len(), 1);
    let current_id = current[0]["id"].as_str().unwrap().to_string();
    let other_id = sessions
        .iter()
        .find(|s| s["isCurrent"] == false)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let reply = t
        .call(Method::DELETE, &format!("/sessions/{current_id}"), None, &laptop)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = t
        .call(Method::DELETE, &format!("/sessions/{other_id}"), None, &bob)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = t
        .call(Method::DELETE, &format!("/sessions/{other_id}"), None, &laptop)
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = t.call(Method::GET, "/session", None, &phone).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    t.state.audit.flush().await;
    let audit = t.store.list_audit_entries(10).await.unwrap();
    assert_eq!(audit[0].action, "session_revoked");
}

#[tokio::test]
async fn current_session_reports_roles() {
    let t = TestApp::new();
    let alice = t.register("alice@example.com").await;
    let mut browser = Browser::new();
    t.login("alice@example.com", &mut browser).await;

    let reply = t.call(Method::GET, "/session", None, &Browser::new()).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = t.call(Method::GET, "/session", None, &browser).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["user"]["id"], alice.to_string());
    assert_eq!(reply.body["systemRole"], Value::Null);
    assert_eq!(reply.body["session"]["isCurrent"], true);

    t.make_admin(alice).await;
    let reply = t.call(Method::GET, "/session", None, &browser).await;
    assert_eq!(reply.body["systemRole"], "ADMIN");
}

#[tokio::test]
async fn bearer_access_token_authenticates() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let mut browser = Browser::new();
    let reply = t.login("alice@example.com", &mut browser).await;
    let access = reply.body["accessToken"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/session")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_cookies_and_revokes_credentials() {
    let t = TestApp::new();
    let alice = t.register("alice@example.com").await;
    let mut browser = Browser::new();
    t.login("alice@example.com", &mut browser).await;

    let reply = t.post("/logout", json!({}), &browser).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cookies = reply.cookies();
    assert_eq!(cookies.get("session-token").map(String::as_str), Some(""));
    assert_eq!(cookies.get("refresh-token").map(String::as_str), Some(""));

    assert!(t.store.list_active_sessions(alice, Utc::now()).await.unwrap().is_empty());
    assert!(
        t.store
            .refresh_tokens_for(alice)
            .await
            .iter()
            .all(|r| r.revoked_at.is_some())
    );

    let reply = t.post("/logout", json!({}), &Browser::new()).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn audit_outage_does_not_fail_login() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    t.store.set_audit_unavailable(true);

    let mut browser = Browser::new();
    let reply = t.login("alice@example.com", &mut browser).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = t.post("/refresh", json!({}), &browser).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn system_role_administration() {
    let t = TestApp::new();
    let admin = t.register("admin@example.com").await;
    let bob = t.register("bob@example.com").await;
    t.make_admin(admin).await;
    let mut admin_browser = Browser::new();
    let mut bob_browser = Browser::new();
    t.login("admin@example.com", &mut admin_browser).await;
    t.login("bob@example.com", &mut bob_browser).await;

    let reply = t
        .call(
            Method::PUT,
            &format!("/admin/users/{admin}/system-role"),
            Some(json!({"role": "ADMIN"})),
            &bob_browser,
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = t
        .call(
            Method::DELETE,
            &format!("/admin/users/{admin}/system-role"),
            None,
            &admin_browser,
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = t
        .call(
            Method::PUT,
            &format!("/admin/users/{bob}/system-role"),
            Some(json!({"role": "ADMIN"})),
            &admin_browser,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        t.store.find_system_role(bob).await.unwrap().unwrap().granted_by,
        admin
    );

    let reply = t
        .call(
            Method::DELETE,
            &format!("/admin/users/{bob}/system-role"),
            None,
            &admin_browser,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(t.store.find_system_role(bob).await.unwrap().is_none());

    t.state.audit.flush().await;
    let reply = t
        .call(Method::GET, "/admin/audit?limit=2", None, &admin_browser)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let actions: Vec<_> = reply.body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, ["role_revoked", "role_granted"]);
}

#[tokio::test]
async fn project_membership_requires_members_manage() {
    let t = TestApp::new();
    let admin = t.register("admin@example.com").await;
    let bob = t.register("bob@example.com").await;
    let carol = t.register("carol@example.com").await;
    t.make_admin(admin).await;
    let project = Uuid::new_v4();
    let mut admin_browser = Browser::new();
    let mut bob_browser = Browser::new();
    t.login("admin@example.com", &mut admin_browser).await;
    t.login("bob@example.com", &mut bob_browser).await;

    let carol_uri = format!("/projects/{project}/members/{carol}");
    let bob_uri = format!("/projects/{project}/members/{bob}");

    // No membership at all: deny.
    let reply = t
        .call(Method::PUT, &carol_uri, Some(json!({"role": "VIEWER"})), &bob_browser)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // Editors cannot manage members either.
    let reply = t
        .call(Method::PUT, &bob_uri, Some(json!({"role": "EDITOR"})), &admin_browser)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = t
        .call(Method::PUT, &carol_uri, Some(json!({"role": "VIEWER"})), &bob_browser)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = t
        .call(Method::PUT, &bob_uri, Some(json!({"role": "ADMIN"})), &admin_browser)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = t
        .call(Method::PUT, &carol_uri, Some(json!({"role": "REVIEWER"})), &bob_browser)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["role"], "REVIEWER");

    // Membership is scoped to one project.
    let elsewhere = format!("/projects/{}/members/{carol}", Uuid::new_v4());
    let reply = t
        .call(Method::PUT, &elsewhere, Some(json!({"role": "VIEWER"})), &bob_browser)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_email_is_admin_only_and_audited() {
    let t = TestApp::new();
    let admin = t.register("admin@example.com").await;
    t.make_admin(admin).await;
    let mut browser = Browser::new();
    t.login("admin@example.com", &mut browser).await;

    let reply = t
        .post("/admin/test-email", json!({"to": "ops@example.com"}), &browser)
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(t.mailer.last_to("ops@example.com").is_some());

    t.state.audit.flush().await;
    let entries = t.store.list_audit_entries(1).await.unwrap();
    assert_eq!(entries[0].action, "test_email_sent");
    assert_eq!(entries[0].actor_id, Some(admin));
}

#[tokio::test]
async fn expired_session_cookie_is_removed_on_access() {
    let t = TestApp::new();
    let alice = t.register("alice@example.com").await;
    let mut browser = Browser::new();
    t.login("alice@example.com", &mut browser).await;

    let sessions = t.store.list_active_sessions(alice, Utc::now()).await.unwrap();
    let session = sessions[0].clone();
    t.store.delete_session(session.id).await.unwrap();
    let mut expired = session.clone();
    expired.expires_at = Utc::now() - Duration::minutes(1);
    t.store.insert_session(&expired).await.unwrap();

    let reply = t.call(Method::GET, "/session", None, &browser).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(t.store.find_session(session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_bodies_are_invalid_input() {
    let t = TestApp::new();
    let reply = t
        .post("/register", json!({"email": "alice@example.com"}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_input");
    assert!(reply.body["message"].is_string());

    let reply = t.post_raw("/login", "{not json", &Browser::new()).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_input");

    let reply = t
        .post("/reset-password", json!({"token": "abc"}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_input");
}

#[tokio::test]
async fn enumeration_resistant_endpoints_ignore_malformed_bodies() {
    let t = TestApp::new();
    for uri in ["/forgot-password", "/resend-verification"] {
        let valid = t
            .post(uri, json!({"email": "ghost@example.com"}), &Browser::new())
            .await;
        let missing = t.post(uri, json!({}), &Browser::new()).await;
        let garbage = t.post_raw(uri, "email=ghost", &Browser::new()).await;

        assert_eq!(valid.status, StatusCode::OK);
        assert_eq!(missing.status, StatusCode::OK, "{uri}");
        assert_eq!(garbage.status, StatusCode::OK, "{uri}");
        assert_eq!(missing.body, valid.body);
        assert_eq!(garbage.body, valid.body);
    }
}

#[tokio::test]
async fn resend_verification_reissues_only_for_unverified_accounts() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let first = token_from_body(&t.mailer.last_to("alice@example.com").unwrap().body)
        .unwrap()
        .to_string();

    let unknown = t
        .post(
            "/resend-verification",
            json!({"email": "ghost@example.com"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::OK);
    assert!(t.mailer.last_to("ghost@example.com").is_none());

    let reply = t
        .post(
            "/resend-verification",
            json!({"email": "Alice@Example.com"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, unknown.body);
    let second = token_from_body(&t.mailer.last_to("alice@example.com").unwrap().body)
        .unwrap()
        .to_string();
    assert_ne!(first, second);

    let reply = t
        .post("/verify-email", json!({"token": first}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = t
        .post("/verify-email", json!({"token": second}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let sent_before = t.mailer.sent().len();
    let reply = t
        .post(
            "/resend-verification",
            json!({"email": "alice@example.com"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(t.mailer.sent().len(), sent_before);
    assert!(
        t.store
            .find_verification_token_for("alice@example.com", VerificationKind::EmailVerification)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn verifying_an_already_verified_account_is_idempotent() {
    let t = TestApp::new();
    let user_id = t.register("alice@example.com").await;
    let token = token_from_body(&t.mailer.last_to("alice@example.com").unwrap().body)
        .unwrap()
        .to_string();
    let reply = t
        .post("/verify-email", json!({"token": token}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let verified_at = t
        .store
        .find_user_by_id(user_id)
        .await
        .unwrap()
        .unwrap()
        .email_verified_at;

    let fresh = verification::issue(
        t.store.as_ref(),
        "alice@example.com",
        VerificationKind::EmailVerification,
        &AuthSettings::default(),
        Utc::now(),
    )
    .await
    .unwrap();
    let reply = t
        .post("/verify-email", json!({"token": fresh}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);

    let user = t.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.email_verified_at, verified_at);

    t.state.audit.flush().await;
    let verified_entries = t
        .store
        .list_audit_entries(100)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == "email_verified")
        .count();
    assert_eq!(verified_entries, 1);
}

#[tokio::test]
async fn tokens_for_missing_accounts_are_not_found() {
    let t = TestApp::new();
    let settings = AuthSettings::default();
    let verify = verification::issue(
        t.store.as_ref(),
        "ghost@example.com",
        VerificationKind::EmailVerification,
        &settings,
        Utc::now(),
    )
    .await
    .unwrap();
    let reset = verification::issue(
        t.store.as_ref(),
        "ghost@example.com",
        VerificationKind::PasswordReset,
        &settings,
        Utc::now(),
    )
    .await
    .unwrap();

    let reply = t
        .post("/verify-email", json!({"token": verify}), &Browser::new())
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "not_found");

    let reply = t
        .post(
            "/reset-password",
            json!({"token": reset, "newPassword": "An0therPass"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "not_found");
}

#[tokio::test]
async fn unknown_email_login_is_indistinguishable_from_wrong_password() {
    let t = TestApp::new();
    t.register("alice@example.com").await;
    let unknown = t
        .post(
            "/login",
            json!({"email": "ghost@example.com", "password": "Str0ngPass!"}),
            &Browser::new(),
        )
        .await;
    let wrong = t
        .post(
            "/login",
            json!({"email": "alice@example.com", "password": "WrongPass1"}),
            &Browser::new(),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.body, wrong.body);
}
