//! Static route normalization.
//!
//! Route strings arriving from the configuration file or the startup
//! hook come in two shapes: literal path prefixes (`"/public"`) and
//! slash-delimited patterns (`"/\/test/"`). Normalization compiles the
//! latter so the application layer only ever sees typed routes.

use regex::Regex;
use serde::Deserialize;

use crate::config::error::ConfigError;

/// A `{route, serve}` pair as written in a source layer, before the
/// route string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawStaticRoute {
    pub route: String,
    pub serve: String,
}

/// Route side of a static mount.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Plain path prefix, mounted as-is.
    Literal(String),
    /// Compiled pattern matched against the request path.
    Pattern(Regex),
}

impl RoutePattern {
    /// Interpret a route string. A string that starts with `/\/`, ends
    /// with `/` and is not the bare root is a slash-delimited pattern:
    /// the delimiters are stripped and the remainder compiled. Anything
    /// else stays literal and must itself start with `/`, the only
    /// shape the router can mount.
    pub fn from_route(route: &str) -> Result<Self, ConfigError> {
        if route != "/" && route.starts_with("/\\/") && route.ends_with('/') {
            let inner = &route[1..route.len() - 1];
            let pattern =
                Regex::new(inner).map_err(|source| ConfigError::InvalidRoutePattern {
                    route: route.to_string(),
                    source,
                })?;
            Ok(RoutePattern::Pattern(pattern))
        } else if !route.starts_with('/') {
            Err(ConfigError::InvalidStaticRoute {
                route: route.to_string(),
            })
        } else {
            Ok(RoutePattern::Literal(route.to_string()))
        }
    }

    /// Whether a request path falls under this route.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePattern::Literal(prefix) => {
                prefix == "/"
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            RoutePattern::Pattern(pattern) => pattern.is_match(path),
        }
    }
}

/// Patterns compare by their source text; a re-resolution from the same
/// inputs is equal to the first.
impl PartialEq for RoutePattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RoutePattern::Literal(a), RoutePattern::Literal(b)) => a == b,
            (RoutePattern::Pattern(a), RoutePattern::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// One normalized static mount.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRoute {
    pub route: RoutePattern,
    pub serve: String,
}

/// Normalize raw entries, preserving source order.
pub fn normalize(entries: &[RawStaticRoute]) -> Result<Vec<StaticRoute>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            Ok(StaticRoute {
                route: RoutePattern::from_route(&entry.route)?,
                serve: entry.serve.clone(),
            })
        })
        .collect()
}
