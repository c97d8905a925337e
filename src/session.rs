//! Cookie-backed session layer.
//!
//! # Data Flow
//! ```text
//! request
//!     → cookie "vcms.sid" looked up
//!     → store.load(id), or a fresh session (UUID v4) when absent
//!     → init_session hook on fresh sessions
//!     → Session handle attached as a request extension
//!     → inner handlers read/write through the handle
//!     → store.save(id, data) after the response
//!     → Set-Cookie appended for fresh sessions that stored data
//! ```
//!
//! # Design Decisions
//! - A fresh session that ends the request empty is neither saved nor
//!   given a cookie, so anonymous traffic does not fill the store
//! - The store is a trait seam; the in-crate [`MemoryStore`] suits a
//!   single process, embedders bring their own for shared stores
//! - Store load failures fail the request; save failures are logged and
//!   the response still goes out, the client retries with its cookie

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{InitSession, VcmsConfig};

/// Name of the session id cookie.
pub const SESSION_COOKIE: &str = "vcms.sid";

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Errors surfaced by a session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing store could not serve the request.
    #[error("session store error: {0}")]
    Store(String),

    /// A stored session did not decode as session data.
    #[error("session data error: {source}")]
    Data {
        #[from]
        source: serde_json::Error,
    },
}

/// The values held by one session, a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(flatten)]
    values: serde_json::Map<String, Value>,
}

impl SessionData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Persistence seam for session data, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;
    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError>;
}

/// In-process store over a concurrent map. Sessions live for the
/// lifetime of the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<DashMap<String, SessionData>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        self.sessions.insert(id.to_string(), data.clone());
        Ok(())
    }
}

/// Store address and cookie settings derived from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub cookie_domain: Option<String>,
}

impl SessionOptions {
    /// Split `redis_host` into host and port, with the conventional
    /// redis port as fallback. Segments past the port are dropped.
    pub fn from_config(config: &VcmsConfig) -> Self {
        let mut segments = config.redis_host.split(':');
        let host = segments.next().unwrap_or_default().to_string();
        let port = segments
            .next()
            .and_then(|port| port.parse().ok())
            .unwrap_or(DEFAULT_REDIS_PORT);
        Self {
            host,
            port,
            cookie_domain: config.session_cookie_domain.clone(),
        }
    }
}

/// State driving [`session_middleware`]: the store, the cookie settings
/// and the fresh-session hook.
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    cookie_domain: Option<String>,
    init_session: Option<InitSession>,
}

impl SessionLayer {
    pub fn new(
        options: SessionOptions,
        store: Arc<dyn SessionStore>,
        init_session: Option<InitSession>,
    ) -> Self {
        match &options.cookie_domain {
            Some(domain) => tracing::info!(domain, "session cookies restricted to domain"),
            None => tracing::info!("session cookies without domain restriction"),
        }
        tracing::debug!(
            host = %options.host,
            port = options.port,
            "session store address resolved"
        );
        Self {
            store,
            cookie_domain: options.cookie_domain,
            init_session,
        }
    }

    /// Layer over the in-crate [`MemoryStore`].
    pub fn from_config(config: &VcmsConfig) -> Self {
        Self::new(
            SessionOptions::from_config(config),
            Arc::new(MemoryStore::default()),
            config.init_session.clone(),
        )
    }
}

/// Handle to one request's session, shared with handlers through the
/// request extensions.
#[derive(Clone)]
pub struct Session {
    id: String,
    fresh: bool,
    data: Arc<Mutex<SessionData>>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fresh: true,
            data: Arc::new(Mutex::new(SessionData::default())),
        }
    }

    fn from_store(id: String, data: SessionData) -> Self {
        Self {
            id,
            fresh: false,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this session was created by the current request.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .expect("session data mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data
            .lock()
            .expect("session data mutex poisoned")
            .insert(key, value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .expect("session data mutex poisoned")
            .remove(key)
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut data = self.data.lock().expect("session data mutex poisoned");
        f(&mut data)
    }
}

/// The session handle attached to `req`, if the session layer is
/// active.
pub fn get_session(req: &Request<Body>) -> Option<Session> {
    req.extensions().get::<Session>().cloned()
}

pub async fn session_middleware(
    State(layer): State<SessionLayer>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let mut session = None;
    if let Some(id) = cookie_value(req.headers(), SESSION_COOKIE) {
        match layer.store.load(&id).await {
            Ok(Some(data)) => session = Some(Session::from_store(id, data)),
            // Unknown or expired id: fall through to a fresh session.
            Ok(None) => {}
            Err(error) => {
                tracing::error!(%error, "failed to load session");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let session = session.unwrap_or_else(|| {
        let session = Session::new();
        if let Some(init) = &layer.init_session {
            session.with_data(|data| init(data));
        }
        session
    });

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;

    let data = session.with_data(|data| data.clone());
    if session.is_fresh() && data.is_empty() {
        return response;
    }

    if let Err(error) = layer.store.save(session.id(), &data).await {
        tracing::error!(%error, "failed to save session");
        return response;
    }

    if session.is_fresh() {
        let cookie = match &layer.cookie_domain {
            Some(domain) => format!(
                "{}={}; Domain={}; Path=/; HttpOnly",
                SESSION_COOKIE,
                session.id(),
                domain
            ),
            None => format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session.id()),
        };
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(_) => tracing::warn!("session cookie contains invalid characters"),
        }
    }

    response
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::{Extension, Router};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            host: "localhost".to_string(),
            port: DEFAULT_REDIS_PORT,
            cookie_domain: None,
        }
    }

    fn test_app(layer: SessionLayer) -> Router {
        Router::new()
            .route(
                "/set",
                get(|Extension(session): Extension<Session>| async move {
                    session.insert("user", json!("alice"));
                    "ok"
                }),
            )
            .route(
                "/get",
                get(|Extension(session): Extension<Session>| async move {
                    session
                        .get("user")
                        .and_then(|value| value.as_str().map(str::to_string))
                        .unwrap_or_default()
                }),
            )
            .route("/untouched", get(|| async { "untouched" }))
            .layer(from_fn_with_state(layer, session_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn set_cookie_id(response: &Response) -> String {
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("missing Set-Cookie")
            .to_str()
            .unwrap();
        assert!(cookie.starts_with(SESSION_COOKIE));
        cookie
            .split_once('=')
            .unwrap()
            .1
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        let mut data = SessionData::default();
        data.insert("user", json!("alice"));

        store.save("abc", &data).await.unwrap();
        assert_eq!(store.load("abc").await.unwrap(), Some(data));
        assert_eq!(store.load("other").await.unwrap(), None);
    }

    #[test]
    fn test_session_data_serializes_flat() {
        let mut data = SessionData::default();
        data.insert("user", json!("alice"));
        let encoded = serde_json::to_string(&data).unwrap();
        assert_eq!(encoded, r#"{"user":"alice"}"#);

        let decoded: SessionData = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_options_split_redis_host() {
        let mut config = VcmsConfig::default();
        config.redis_host = "cache:7000".to_string();
        let options = SessionOptions::from_config(&config);
        assert_eq!(options.host, "cache");
        assert_eq!(options.port, 7000);

        config.redis_host = "cache:7000:replica".to_string();
        let options = SessionOptions::from_config(&config);
        assert_eq!(options.host, "cache");
        assert_eq!(options.port, 7000);

        config.redis_host = "cache".to_string();
        assert_eq!(SessionOptions::from_config(&config).port, DEFAULT_REDIS_PORT);
    }

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; vcms.sid=abc-123; theme=dark"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc-123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), SESSION_COOKIE), None);
    }

    #[tokio::test]
    async fn test_untouched_session_gets_no_cookie() {
        let app = test_app(SessionLayer::new(
            options(),
            Arc::new(MemoryStore::default()),
            None,
        ));

        let response = app
            .oneshot(Request::builder().uri("/untouched").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_session_persists_across_requests() {
        let app = test_app(SessionLayer::new(
            options(),
            Arc::new(MemoryStore::default()),
            None,
        ));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/set").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = set_cookie_id(&response);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/get")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // no new cookie for a known session
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "alice");
    }

    #[tokio::test]
    async fn test_init_session_runs_on_fresh_sessions() {
        let init: InitSession = Arc::new(|data| {
            data.insert("user", json!("guest"));
        });
        let app = test_app(SessionLayer::new(
            options(),
            Arc::new(MemoryStore::default()),
            Some(init),
        ));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/untouched").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // the init hook stored data, so the session is persisted
        let id = set_cookie_id(&response);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/get")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "guest");
    }

    #[tokio::test]
    async fn test_cookie_domain_is_emitted() {
        let app = test_app(SessionLayer::new(
            SessionOptions {
                cookie_domain: Some("example.org".to_string()),
                ..options()
            },
            Arc::new(MemoryStore::default()),
            None,
        ));

        let response = app
            .oneshot(Request::builder().uri("/set").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.contains("Domain=example.org"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_unknown_session_id_gets_fresh_session() {
        let app = test_app(SessionLayer::new(
            options(),
            Arc::new(MemoryStore::default()),
            None,
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/set")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=stale-id"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = set_cookie_id(&response);
        assert_ne!(id, "stale-id");
    }
}
