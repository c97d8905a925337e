//! Application assembly.
//!
//! Builds the Axum router from the resolved configuration. Layer order,
//! outermost first: compression, session, request tracing (skipped in
//! the test environment), then the user middlewares with the first
//! registered transform closest to the routes.
//!
//! Static serving comes in two shapes. Literal mounts become
//! `nest_service` with a [`ServeDir`]. The public directory (served at
//! `/`) and pattern mounts cannot nest, so they live in the router
//! fallback, tried in registration order with a miss falling through to
//! the next entry.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{Environment, RoutePattern, StaticRoute, VcmsConfig};
use crate::session::{session_middleware, SessionLayer};

/// Assemble the application router.
pub fn build_app(config: &VcmsConfig, session: Option<SessionLayer>) -> Router {
    let mut app = Router::new().route("/ping", get(ping));

    for (base, router) in &config.routers {
        if base == "/" {
            app = app.merge(router.clone());
        } else {
            app = app.nest(base, router.clone());
        }
    }

    let mut fallback_entries = Vec::new();
    for route in config.static_routes() {
        match &route.route {
            RoutePattern::Literal(path) if !path.trim_end_matches('/').is_empty() => {
                let mount = path.trim_end_matches('/').to_string();
                app = app.nest_service(&mount, ServeDir::new(&route.serve));
            }
            _ => fallback_entries.push(route),
        }
    }
    if !fallback_entries.is_empty() {
        let entries = Arc::new(fallback_entries);
        app = app.fallback(move |req: Request<Body>| {
            let entries = entries.clone();
            async move { serve_static(&entries, req).await }
        });
    }

    for middleware in &config.middlewares {
        app = middleware(app);
    }

    if config.environment != Environment::Test {
        app = app.layer(TraceLayer::new_for_http());
    }
    if let Some(layer) = session {
        app = app.layer(from_fn_with_state(layer, session_middleware));
    }
    app.layer(CompressionLayer::new())
}

async fn ping() -> &'static str {
    "pong\n"
}

/// Serve the first fallback entry that matches and has the file; a miss
/// falls through to the next entry. The rewritten request keeps the
/// caller's method and headers, so range and conditional requests work
/// the same as on literal mounts.
async fn serve_static(entries: &[StaticRoute], req: Request<Body>) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = req.uri().path();

    for entry in entries {
        let Some(rest) = remainder(&entry.route, path) else {
            continue;
        };
        let Ok(mut request) = Request::builder()
            .method(req.method().clone())
            .uri(rest)
            .body(Body::empty())
        else {
            continue;
        };
        *request.headers_mut() = req.headers().clone();

        let Ok(response) = ServeDir::new(&entry.serve).oneshot(request).await;
        if response.status() != StatusCode::NOT_FOUND {
            return response.map(Body::new);
        }
    }

    StatusCode::NOT_FOUND.into_response()
}

/// The sub-path an entry serves for `path`, or `None` when the entry
/// does not apply. Patterns serve whatever follows the matched portion,
/// mirroring how mount prefixes are stripped from literal mounts.
fn remainder(route: &RoutePattern, path: &str) -> Option<String> {
    match route {
        RoutePattern::Literal(prefix) if prefix == "/" => Some(path.to_string()),
        RoutePattern::Literal(prefix) => {
            if path == prefix {
                Some("/".to_string())
            } else {
                path.strip_prefix(prefix.as_str())
                    .filter(|rest| rest.starts_with('/'))
                    .map(str::to_string)
            }
        }
        RoutePattern::Pattern(pattern) => pattern.find(path).map(|found| {
            let rest = &path[found.end()..];
            if rest.is_empty() {
                "/".to_string()
            } else if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            }
        }),
    }
}
