//! Integration tests for the Supabase adapter against a mock HTTP server

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use taskmaster_auth::{AuthError, AuthService, SessionEvent, SessionManager, SignUpOutcome};
use taskmaster_config::BackendConfig;
use taskmaster_core::{Identity, ProfileFields, Session, TaskCreateInput, TaskId, TaskStatus, UserId};
use taskmaster_tasks::{StoreError, TableStore, TaskPatch, TaskQuery, TaskStore};
use taskmaster_cloud::SupabaseClient;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

struct Backend {
    server: MockServer,
    dir: TempDir,
}

impl Backend {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self) -> BackendConfig {
        let mut config = BackendConfig::with_credentials(self.server.uri(), ANON_KEY);
        config.session_file = Some(self.dir.path().join("session.toml"));
        config
    }

    fn client(&self) -> SupabaseClient {
        SupabaseClient::new(&self.config()).unwrap()
    }

    fn session_path(&self) -> std::path::PathBuf {
        self.dir.path().join("session.toml")
    }

    fn write_session(&self, session: &Session) {
        std::fs::write(self.session_path(), toml::to_string_pretty(session).unwrap()).unwrap();
    }
}

fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("{}-refresh", access_token),
        "user": {
            "id": "user-1",
            "email": "ada@example.com",
            "user_metadata": { "name": "Ada" }
        }
    })
}

fn task_row(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "user_id": "user-1",
        "title": title,
        "description": null,
        "status": "todo",
        "priority": "medium",
        "due_date": null,
        "tags": [],
        "created_at": "2024-03-01T09:00:00Z",
        "updated_at": "2024-03-01T09:00:00Z",
        "completed_at": null
    })
}

fn saved_session(access_token: &str, expires_in: ChronoDuration) -> Session {
    let mut user = Identity::new("user-1");
    user.email = Some("ada@example.com".to_string());
    Session {
        access_token: access_token.to_string(),
        refresh_token: Some(format!("{}-refresh", access_token)),
        token_type: "bearer".to_string(),
        expires_at: Utc::now() + expires_in,
        user,
    }
}

async fn mount_password_grant(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sign_in_persists_and_announces_session() {
    let backend = Backend::start().await;
    mount_password_grant(&backend.server, "jwt-1").await;
    let client = backend.client();
    let mut changes = client.subscribe();

    let session = assert_ok!(
        client
            .sign_in_with_password("ada@example.com", "correct-horse")
            .await
    );

    assert_eq!(session.access_token, "jwt-1");
    assert_eq!(session.user.name.as_deref(), Some("Ada"));
    assert!(backend.session_path().exists());

    let change = changes.recv().await.unwrap();
    assert_eq!(change.event, SessionEvent::SignedIn);
    assert_eq!(change.session, Some(session));
}

#[tokio::test]
async fn test_invalid_credentials() {
    let backend = Backend::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&backend.server)
        .await;

    let err = backend
        .client()
        .sign_in_with_password("ada@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!backend.session_path().exists());
}

#[tokio::test]
async fn test_sign_up_awaiting_confirmation() {
    let backend = Backend::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(json!({
            "email": "grace@example.com",
            "data": { "name": "Grace" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-2",
            "email": "grace@example.com",
            "user_metadata": { "name": "Grace" }
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    let outcome = client
        .sign_up_with_password(
            "grace@example.com",
            "hopper123",
            &ProfileFields::with_name("Grace"),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SignUpOutcome::PendingVerification {
            email: "grace@example.com".to_string()
        }
    );
    assert!(client.current_session().await.is_none());
}

#[tokio::test]
async fn test_sign_up_existing_account() {
    let backend = Backend::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "code": 422,
            "error_code": "user_already_exists",
            "msg": "User already registered"
        })))
        .mount(&backend.server)
        .await;

    let err = backend
        .client()
        .sign_up_with_password("ada@example.com", "hopper123", &ProfileFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountExists(email) if email == "ada@example.com"));
}

#[tokio::test]
async fn test_get_session_restores_saved_session_without_requests() {
    let backend = Backend::start().await;
    let saved = saved_session("jwt-saved", ChronoDuration::hours(1));
    backend.write_session(&saved);

    let restored = backend.client().get_session().await.unwrap();

    assert_eq!(restored, Some(saved));
    assert!(backend.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_session_refreshes_expired_session() {
    let backend = Backend::start().await;
    backend.write_session(&saved_session("jwt-old", ChronoDuration::minutes(-5)));
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_partial_json(json!({ "refresh_token": "jwt-old-refresh" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("jwt-new")))
        .expect(1)
        .mount(&backend.server)
        .await;

    let restored = backend.client().get_session().await.unwrap().unwrap();
    assert_eq!(restored.access_token, "jwt-new");
}

#[tokio::test]
async fn test_get_session_drops_unrefreshable_session() {
    let backend = Backend::start().await;
    backend.write_session(&saved_session("jwt-old", ChronoDuration::minutes(-5)));
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "refresh_token_not_found",
            "msg": "Invalid Refresh Token: Refresh Token Not Found"
        })))
        .mount(&backend.server)
        .await;

    assert_eq!(backend.client().get_session().await.unwrap(), None);
    assert!(!backend.session_path().exists());
}

#[tokio::test]
async fn test_sign_out_clears_locally_when_server_fails() {
    let backend = Backend::start().await;
    mount_password_grant(&backend.server, "jwt-1").await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("Authorization", "Bearer jwt-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client
        .sign_in_with_password("ada@example.com", "correct-horse")
        .await
        .unwrap();

    assert_err!(client.sign_out().await);
    assert!(client.current_session().await.is_none());
    assert!(!backend.session_path().exists());
}

#[tokio::test]
async fn test_update_profile_refreshes_identity() {
    let backend = Backend::start().await;
    mount_password_grant(&backend.server, "jwt-1").await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer jwt-1"))
        .and(body_partial_json(json!({ "data": { "name": "Ada Lovelace" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "ada@example.com",
            "user_metadata": { "name": "Ada Lovelace" }
        })))
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client
        .sign_in_with_password("ada@example.com", "correct-horse")
        .await
        .unwrap();
    let session = client
        .update_profile(&ProfileFields::with_name("Ada Lovelace"))
        .await
        .unwrap();

    assert_eq!(session.access_token, "jwt-1");
    assert_eq!(session.user.name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn test_query_is_scoped_to_owner() {
    let backend = Backend::start().await;
    backend.write_session(&saved_session("jwt-1", ChronoDuration::hours(1)));
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .and(query_param("select", "*"))
        .and(query_param("user_id", "eq.user-1"))
        .and(query_param("order", "created_at.desc"))
        .and(header("Authorization", "Bearer jwt-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_row("t-2", "Second"), task_row("t-1", "First")])),
        )
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client.get_session().await.unwrap();
    let tasks = client
        .query(&TaskQuery::owned_by(UserId::new("user-1")))
        .await
        .unwrap();

    let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Second", "First"]);
}

#[tokio::test]
async fn test_empty_write_results_mean_not_found() {
    let backend = Backend::start().await;
    backend.write_session(&saved_session("jwt-1", ChronoDuration::hours(1)));
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tasks"))
        .and(query_param("id", "eq.t-9"))
        .and(query_param("user_id", "eq.user-1"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/tasks"))
        .and(query_param("id", "eq.t-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client.get_session().await.unwrap();
    let owner = UserId::new("user-1");
    let id = TaskId::new("t-9");
    let patch = TaskPatch {
        status: Some(TaskStatus::Completed),
        updated_at: Utc::now(),
        ..Default::default()
    };

    assert_eq!(client.update(&id, &owner, &patch).await.unwrap(), None);
    assert!(!client.delete(&id, &owner).await.unwrap());
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let backend = Backend::start().await;
    // Inside the expiry buffer from the start, so the first data request refreshes.
    let mut body = token_body("jwt-short");
    body["expires_in"] = json!(60);
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "refresh_token_already_used",
            "msg": "Invalid Refresh Token: Already Used"
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = backend.client();
    client
        .sign_in_with_password("ada@example.com", "correct-horse")
        .await
        .unwrap();
    let mut changes = client.subscribe();

    let err = client
        .query(&TaskQuery::owned_by(UserId::new("user-1")))
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::Unauthorized);
    assert_eq!(changes.recv().await.unwrap().event, SessionEvent::SignedOut);
    assert!(client.current_session().await.is_none());
    assert!(!backend.session_path().exists());
}

#[tokio::test]
async fn test_row_level_security_rejection() {
    let backend = Backend::start().await;
    backend.write_session(&saved_session("jwt-1", ChronoDuration::hours(1)));
    Mock::given(method("POST"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy for table \"tasks\"",
            "details": null,
            "hint": null
        })))
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend.server)
        .await;

    let client = Arc::new(backend.client());
    let sessions = SessionManager::start(client.clone()).await;
    let store = TaskStore::start(client.clone(), &sessions);
    store.load().await.unwrap();

    let err = store
        .create(TaskCreateInput::new("Sneaky"))
        .await
        .unwrap_err();
    assert!(matches!(err, taskmaster_tasks::TaskError::Write(_)));
    assert!(store.tasks().is_empty());
}

#[tokio::test]
async fn test_sign_in_loads_tasks_end_to_end() {
    let backend = Backend::start().await;
    mount_password_grant(&backend.server, "jwt-1").await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .and(query_param("user_id", "eq.user-1"))
        .and(header("Authorization", "Bearer jwt-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([task_row("t-1", "From server")])),
        )
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/tasks"))
        .and(body_partial_json(json!({
            "user_id": "user-1",
            "title": "Write spec",
            "status": "todo",
            "priority": "medium"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([task_row("t-2", "Write spec")])))
        .expect(1)
        .mount(&backend.server)
        .await;

    let client = Arc::new(backend.client());
    let sessions = SessionManager::start(client.clone()).await;
    let store = TaskStore::start(client.clone(), &sessions);
    assert!(!sessions.is_authenticated());

    sessions
        .sign_in("ada@example.com", "correct-horse")
        .await
        .unwrap();
    let mut snapshots = store.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        snapshots.wait_for(|s| s.last_synced_at.is_some()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(store.tasks()[0].title, "From server");

    let created = store
        .create(TaskCreateInput::new("Write spec"))
        .await
        .unwrap();
    assert_eq!(created.id, TaskId::new("t-2"));
    assert_eq!(store.tasks().len(), 2);
}
