//! OAuth helper that obtains a TikTok access token for publishing reels.
//!
//! Open `/` in a browser, follow the login link, approve the app, and the callback responds with
//! the token JSON. Put its `access_token` into `TIKTOK_ACCESS_TOKEN` for `newsreel publish`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "newsreel-auth")]
#[command(about = "OAuth callback server that issues TikTok publish tokens")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 5000)]
    port: u16,

    #[arg(long = "client-key", env = "TIKTOK_CLIENT_KEY")]
    client_key: String,

    #[arg(long = "client-secret", env = "TIKTOK_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Must match the redirect URI registered for the app.
    #[arg(long = "redirect-uri", env = "TIKTOK_REDIRECT_URI")]
    redirect_uri: String,

    #[arg(long = "scope", default_value = "user.info.basic,video.upload,video.publish")]
    scope: String,

    #[arg(long = "authorize-url", default_value = "https://www.tiktok.com/v2/auth/authorize/")]
    authorize_url: String,

    #[arg(long = "token-url", default_value = "https://open.tiktokapis.com/v2/oauth/token/")]
    token_url: String,
}

#[derive(Debug, Clone)]
struct AuthConfig {
    client_key: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
    authorize_url: String,
    token_url: String,
}

impl From<Params> for AuthConfig {
    fn from(p: Params) -> Self {
        Self {
            client_key: p.client_key,
            client_secret: p.client_secret,
            redirect_uri: p.redirect_uri,
            scope: p.scope,
            authorize_url: p.authorize_url,
            token_url: p.token_url,
        }
    }
}

/// How long a login may take between `/login` and `/callback`.
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on outstanding logins; the oldest is evicted past it.
const MAX_PENDING_STATES: usize = 1024;

/// Outstanding `state` values; each one is accepted by exactly one callback before it expires.
#[derive(Debug)]
struct StateStore {
    pending: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(STATE_TTL, MAX_PENDING_STATES)
    }
}

impl StateStore {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn issue(&self) -> String {
        self.issue_at(Instant::now())
    }

    fn issue_at(&self, now: Instant) -> String {
        let state = Uuid::new_v4().simple().to_string();
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|_, issued| now.saturating_duration_since(*issued) < self.ttl);
            while pending.len() >= self.capacity {
                let oldest = pending
                    .iter()
                    .min_by_key(|(_, issued)| **issued)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => pending.remove(&key),
                    None => break,
                };
            }
            pending.insert(state.clone(), now);
        }
        state
    }

    fn consume(&self, state: &str) -> bool {
        self.consume_at(state, Instant::now())
    }

    fn consume_at(&self, state: &str, now: Instant) -> bool {
        self.pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(state))
            .is_some_and(|issued| now.saturating_duration_since(issued) < self.ttl)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<AuthConfig>,
    states: Arc<StateStore>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// The subset of the token response worth handing back.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct TokenInfo {
    open_id: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    refresh_expires_in: Option<u64>,
    scope: Option<String>,
    token_type: Option<String>,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    newsreel::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "newsreel-auth failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")?;

    let state = AppState {
        config: Arc::new(AuthConfig::from(params)),
        states: Arc::new(StateStore::default()),
        http,
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> Html<&'static str> {
    Html(r#"<a href="/login">Login with TikTok</a>"#)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn login(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    let oauth_state = state.states.issue();
    let url = authorize_url(&state.config, &oauth_state)
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    Ok(Redirect::to(url.as_str()))
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> std::result::Result<Json<TokenInfo>, AppError> {
    let code = validate_callback(&state.states, query)?;

    let resp = state
        .http
        .post(&state.config.token_url)
        .form(&token_form(&state.config, &code))
        .send()
        .await
        .map_err(|err| AppError::bad_request(format!("Failed to retrieve token: {err}")))?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!(%body, "token exchange rejected");
        return Err(AppError::bad_request(format!("Failed to retrieve token: {body}")));
    }

    let token = resp
        .json::<TokenInfo>()
        .await
        .map_err(|err| AppError::bad_request(format!("Failed to retrieve token: {err}")))?;
    info!(open_id = ?token.open_id, "issued access token");
    Ok(Json(token))
}

fn authorize_url(config: &AuthConfig, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_key", config.client_key.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", config.scope.as_str()),
            ("state", state),
        ],
    )
    .context("invalid authorize url")
}

/// Check the provider's answer and return the authorization code.
fn validate_callback(
    states: &StateStore,
    query: CallbackQuery,
) -> std::result::Result<String, AppError> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or(error);
        return Err(AppError::bad_request(format!("Error encountered: {detail}")));
    }

    match query.state.as_deref() {
        Some(s) if states.consume(s) => {}
        _ => return Err(AppError::bad_request("Invalid state parameter.")),
    }

    query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("Authorization code not provided."))
}

fn token_form<'a>(config: &'a AuthConfig, code: &'a str) -> [(&'static str, &'a str); 5] {
    [
        ("client_key", config.client_key.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", config.redirect_uri.as_str()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            client_key: "ck".to_owned(),
            client_secret: "secret".to_owned(),
            redirect_uri: "https://example.ngrok.app/callback".to_owned(),
            scope: "user.info.basic,video.upload,video.publish".to_owned(),
            authorize_url: "https://www.tiktok.com/v2/auth/authorize/".to_owned(),
            token_url: "https://open.tiktokapis.com/v2/oauth/token/".to_owned(),
        }
    }

    fn query(code: Option<&str>, state: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(str::to_owned),
            state: state.map(str::to_owned),
            error: None,
            error_description: None,
        }
    }

    #[test]
    fn authorize_url_carries_all_parameters() -> anyhow::Result<()> {
        let url = authorize_url(&config(), "abc123")?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.host_str(), Some("www.tiktok.com"));
        assert!(pairs.contains(&("client_key".to_owned(), "ck".to_owned())));
        assert!(pairs.contains(&("response_type".to_owned(), "code".to_owned())));
        assert!(pairs.contains(&("state".to_owned(), "abc123".to_owned())));
        assert!(pairs.contains(&(
            "scope".to_owned(),
            "user.info.basic,video.upload,video.publish".to_owned()
        )));
        Ok(())
    }

    #[test]
    fn states_are_single_use() {
        let store = StateStore::default();
        let state = store.issue();
        assert!(store.consume(&state));
        assert!(!store.consume(&state));
        assert!(!store.consume("forged"));
    }

    #[test]
    fn expired_states_are_rejected_and_pruned() {
        let store = StateStore::new(Duration::from_secs(60), 16);
        let start = Instant::now();

        let stale = store.issue_at(start);
        let abandoned = store.issue_at(start);
        assert_eq!(store.len(), 2);

        assert!(!store.consume_at(&stale, start + Duration::from_secs(61)));

        // Issuing after the deadline drops the abandoned login.
        let fresh = store.issue_at(start + Duration::from_secs(120));
        assert_eq!(store.len(), 1);
        assert!(!store.consume_at(&abandoned, start + Duration::from_secs(120)));
        assert!(store.consume_at(&fresh, start + Duration::from_secs(121)));
    }

    #[test]
    fn pending_states_are_capped() {
        let store = StateStore::new(Duration::from_secs(600), 2);
        let start = Instant::now();

        let first = store.issue_at(start);
        let second = store.issue_at(start + Duration::from_secs(1));
        let third = store.issue_at(start + Duration::from_secs(2));

        assert_eq!(store.len(), 2);
        let now = start + Duration::from_secs(3);
        assert!(!store.consume_at(&first, now));
        assert!(store.consume_at(&second, now));
        assert!(store.consume_at(&third, now));
    }

    #[test]
    fn callback_requires_known_state_and_code() {
        let store = StateStore::default();
        let state = store.issue();

        let err = validate_callback(&store, query(Some("code"), Some("forged"))).err();
        assert_eq!(err.map(|e| e.message).as_deref(), Some("Invalid state parameter."));

        let err = validate_callback(&store, query(None, Some(&state))).err();
        assert_eq!(
            err.map(|e| e.message).as_deref(),
            Some("Authorization code not provided.")
        );
    }

    #[test]
    fn callback_returns_code() {
        let store = StateStore::default();
        let state = store.issue();
        let code = validate_callback(&store, query(Some("the-code"), Some(&state))).ok();
        assert_eq!(code.as_deref(), Some("the-code"));
    }

    #[test]
    fn provider_errors_are_reported() {
        let store = StateStore::default();
        let mut q = query(None, None);
        q.error = Some("access_denied".to_owned());
        q.error_description = Some("User cancelled".to_owned());

        let err = validate_callback(&store, q).err();
        assert_eq!(
            err.map(|e| e.message).as_deref(),
            Some("Error encountered: User cancelled")
        );
    }

    #[test]
    fn token_form_uses_authorization_code_grant() {
        let config = config();
        let form = token_form(&config, "xyz");
        assert!(form.contains(&("grant_type", "authorization_code")));
        assert!(form.contains(&("code", "xyz")));
    }
}
