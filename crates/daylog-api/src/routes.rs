use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use daylog_core::util::{short_hash, user_fingerprint};
use daylog_core::{BackupRecord, LogDate, LogPush, ServerLogRecord};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{
    extract_bearer_token, hash_password, validate_credentials, verify_password,
    AuthenticatedUser, TokenIssuer,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::ServerLogStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: ServerLogStore,
    tokens: TokenIssuer,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: ServerLogStore) -> Self {
        Self {
            tokens: TokenIssuer::from_config(&config),
            store,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/raw-logs", get(list_logs).post(put_log))
        .route("/raw-logs/bulk", post(bulk_put_logs))
        .route("/raw-logs/{date}", get(get_log))
        .route("/raw-logs/{date}/backups", get(list_backups))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(log_in))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.tokens.verify(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// ===== Auth =====

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

async fn sign_up(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let Json(request) = body.map_err(rejected)?;
    let username = validate_credentials(&request.username, &request.password)?;
    if state.store.find_user(&username)?.is_some() {
        return Err(AppError::conflict("username is already taken"));
    }

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|error| AppError::internal(format!("Password hashing task failed: {error}")))??;
    let user = state.store.create_user(&username, &password_hash)?;

    tracing::info!(
        endpoint = "signup",
        user = user_fingerprint(&user.id),
        "Created account"
    );
    Ok((StatusCode::CREATED, Json(issue_token(&state, &user.id)?)))
}

async fn log_in(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(request) = body.map_err(rejected)?;
    let username = request.username.trim().to_string();
    let user = state
        .store
        .find_user(&username)?
        .ok_or_else(|| AppError::unauthorized("invalid username or password"))?;

    let encoded = user.password_hash.clone();
    let password = request.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&encoded, &password))
        .await
        .map_err(|error| AppError::internal(format!("Password check task failed: {error}")))?;
    if !valid {
        return Err(AppError::unauthorized("invalid username or password"));
    }

    tracing::info!(
        endpoint = "login",
        user = user_fingerprint(&user.id),
        "Issued access token"
    );
    Ok(Json(issue_token(&state, &user.id)?))
}

fn issue_token(state: &AppState, user_id: &str) -> Result<TokenResponse, AppError> {
    Ok(TokenResponse {
        access_token: state.tokens.issue(user_id)?,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.ttl().as_secs(),
    })
}

// ===== Raw logs =====

#[derive(Debug, Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct WriteResponse<T> {
    success: bool,
    data: T,
}

impl<T> WriteResponse<T> {
    const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    logs: Vec<LogPush>,
}

async fn list_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<DataResponse<Vec<ServerLogRecord>>>, AppError> {
    let logs = state.store.get_all(&user.user_id)?;
    tracing::debug!(
        endpoint = "list_logs",
        user = user_fingerprint(&user.user_id),
        count = logs.len(),
        "Listed raw logs"
    );
    Ok(Json(DataResponse { data: logs }))
}

async fn get_log(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(date): Path<String>,
) -> Result<Json<DataResponse<ServerLogRecord>>, AppError> {
    let date = parse_date(&date)?;
    let log = state
        .store
        .get(&user.user_id, date)?
        .ok_or_else(|| AppError::not_found(format!("no log for {date}")))?;
    Ok(Json(DataResponse { data: log }))
}

async fn put_log(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<LogPush>, JsonRejection>,
) -> Result<Json<WriteResponse<ServerLogRecord>>, AppError> {
    let Json(push) = body.map_err(rejected)?;
    validate_push(&push)?;
    let record = state.store.put(&user.user_id, &push)?;
    tracing::info!(
        endpoint = "put_log",
        user = user_fingerprint(&user.user_id),
        date = %record.date,
        version = record.version,
        hash = short_hash(Some(record.content_hash.as_str())),
        parent = short_hash(record.parent_hash.as_deref()),
        "Stored raw log"
    );
    Ok(Json(WriteResponse::ok(record)))
}

async fn bulk_put_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<WriteResponse<Vec<ServerLogRecord>>>, AppError> {
    let Json(request) = body.map_err(rejected)?;
    for push in &request.logs {
        validate_push(push)?;
    }
    let records = state.store.bulk_put(&user.user_id, &request.logs)?;
    tracing::info!(
        endpoint = "bulk_put_logs",
        user = user_fingerprint(&user.user_id),
        count = records.len(),
        "Stored raw logs in bulk"
    );
    Ok(Json(WriteResponse::ok(records)))
}

async fn list_backups(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(date): Path<String>,
) -> Result<Json<DataResponse<Vec<BackupRecord>>>, AppError> {
    let date = parse_date(&date)?;
    let backups = state.store.get_backups(&user.user_id, date)?;
    Ok(Json(DataResponse { data: backups }))
}

fn parse_date(raw: &str) -> Result<LogDate, AppError> {
    raw.parse::<LogDate>().map_err(AppError::from)
}

fn validate_push(push: &LogPush) -> Result<(), AppError> {
    if push.content_hash.trim().is_empty() {
        return Err(AppError::bad_request("contentHash is required"));
    }
    Ok(())
}

fn rejected(rejection: JsonRejection) -> AppError {
    AppError::bad_request(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use daylog_core::remote::TOKEN_KEY;
    use daylog_core::{
        content_hash, HttpLogRemote, KeyValueStore, LogRemote, MemoryStore, RemoteError,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;

    const SECRET: &str = "0123456789abcdef";

    async fn spawn_app() -> String {
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".to_string(),
            jwt_secret: SECRET.to_string(),
            jwt_ttl: Duration::from_secs(3600),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        });
        let store = ServerLogStore::open_in_memory().unwrap();
        let router = app_router(AppState::new(config, store));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn signed_up_token(client: &reqwest::Client, base: &str, username: &str) -> String {
        let response = client
            .post(format!("{base}/auth/signup"))
            .json(&json!({ "username": username, "password": "correct horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json::<TokenResponse>().await.unwrap().access_token
    }

    fn push_body(date: &str, content: &str, parent: Option<&str>) -> Value {
        json!({
            "date": date,
            "content": content,
            "contentHash": content_hash(content),
            "parentHash": parent,
        })
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let base = spawn_app().await;
        let body: Value = reqwest::get(format!("{base}/healthz"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn raw_logs_require_bearer_token() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let response = client.get(format!("{base}/raw-logs")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("Authorization"));

        let response = client
            .get(format!("{base}/raw-logs"))
            .bearer_auth("not-a-jwt")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejects_duplicates_and_login_checks_password() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();
        signed_up_token(&client, &base, "ana").await;

        let duplicate = client
            .post(format!("{base}/auth/signup"))
            .json(&json!({ "username": "ana", "password": "another one" }))
            .send()
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let wrong = client
            .post(format!("{base}/auth/login"))
            .json(&json!({ "username": "ana", "password": "wrong horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let right = client
            .post(format!("{base}/auth/login"))
            .json(&json!({ "username": "ana", "password": "correct horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(right.status(), StatusCode::OK);
        let token: TokenResponse = right.json().await.unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn put_overwrites_and_records_backup() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();
        let token = signed_up_token(&client, &base, "ana").await;

        let first: Value = client
            .post(format!("{base}/raw-logs"))
            .bearer_auth(&token)
            .json(&push_body("2026-01-12", "09:00 start", None))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(first["success"], true);
        assert_eq!(first["data"]["version"], 1);

        let parent = content_hash("09:00 start");
        let second: Value = client
            .post(format!("{base}/raw-logs"))
            .bearer_auth(&token)
            .json(&push_body("2026-01-12", "09:00 start\n10:00 focus", Some(&parent)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["data"]["version"], 2);
        assert_eq!(second["data"]["parentHash"], parent.as_str());

        let backups: Value = client
            .get(format!("{base}/raw-logs/2026-01-12/backups"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let backups = backups["data"].as_array().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0]["content"], "09:00 start");
        assert_eq!(backups[0]["originalVersion"], 1);
    }

    #[tokio::test]
    async fn missing_log_is_404_and_bad_dates_are_400() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();
        let token = signed_up_token(&client, &base, "ana").await;

        let missing = client
            .get(format!("{base}/raw-logs/2026-01-12"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body: Value = missing.json().await.unwrap();
        assert!(body["error"].is_string());

        let invalid = client
            .get(format!("{base}/raw-logs/2026-02-30"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let malformed = client
            .post(format!("{base}/raw-logs"))
            .bearer_auth(&token)
            .json(&json!({ "date": "yesterday", "content": "x" }))
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logs_are_isolated_per_user() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();
        let ana = signed_up_token(&client, &base, "ana").await;
        let bo = signed_up_token(&client, &base, "bo").await;

        client
            .post(format!("{base}/raw-logs"))
            .bearer_auth(&ana)
            .json(&push_body("2026-01-12", "ana's day", None))
            .send()
            .await
            .unwrap();

        let listed: Value = client
            .get(format!("{base}/raw-logs"))
            .bearer_auth(&bo)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["data"], json!([]));
    }

    #[tokio::test]
    async fn http_remote_round_trips_against_server() {
        let base = spawn_app().await;
        let tokens = Arc::new(MemoryStore::new());
        let remote = HttpLogRemote::new(&base, tokens).unwrap();
        let date: LogDate = "2026-01-12".parse().unwrap();

        remote.sign_up("ana", "correct horse").await.unwrap();
        assert!(remote.is_authenticated());
        assert_eq!(remote.fetch_log(date).await.unwrap(), None);

        let push = LogPush {
            date,
            content: "09:00 start".to_string(),
            content_hash: content_hash("09:00 start"),
            parent_hash: None,
        };
        let stored = remote.push_log(&push).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(remote.fetch_log(date).await.unwrap(), Some(stored.clone()));

        let replacements = vec![
            LogPush {
                content: "09:00 start\n12:00 lunch".to_string(),
                content_hash: content_hash("09:00 start\n12:00 lunch"),
                parent_hash: Some(stored.content_hash.clone()),
                ..push.clone()
            },
            LogPush {
                date: date.previous(),
                content: "quiet".to_string(),
                content_hash: content_hash("quiet"),
                parent_hash: None,
            },
        ];
        let bulk = remote.push_bulk(&replacements).await.unwrap();
        assert_eq!(bulk[0].version, 2);

        let all = remote.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);

        let backups = remote.fetch_backups(date).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].content, "09:00 start");

        remote.sign_out().unwrap();
        remote.sign_in("ana", "correct horse").await.unwrap();
        assert!(remote.is_authenticated());
    }

    #[tokio::test]
    async fn http_remote_clears_rejected_token() {
        let base = spawn_app().await;
        let tokens = Arc::new(MemoryStore::new());
        let remote = HttpLogRemote::new(&base, tokens.clone()).unwrap();
        let forged = TokenIssuer::new(b"fedcba9876543210", Duration::from_secs(60))
            .issue("intruder")
            .unwrap();
        tokens.set(TOKEN_KEY, &forged).unwrap();
        assert!(remote.is_authenticated());

        let err = remote.fetch_all().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
        assert!(!remote.is_authenticated());
    }
}
