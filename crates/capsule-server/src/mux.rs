//! URL-path multiplexer.
//!
//! Patterns are `/`-separated sequences of literal segments (matched
//! case-insensitively), `{name}` variables (match any one segment and
//! capture it) and `*` wildcards (match the rest of the path). Matching
//! walks both sequences from the right, so a trailing wildcard swallows any
//! leftward remainder. The first registered route that matches wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use capsule_core::{ResponseWriter, WriteError};
use tracing::debug;

use crate::handlers::NotFoundHandler;
use crate::{Handler, Request};

/// Route pattern compiled into segments.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct Segment {
    name: String,
    kind: SegmentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Literal,
    Variable,
    Wildcard,
}

impl Segment {
    fn compile(raw: &str) -> Segment {
        if raw == "*" {
            return Segment {
                name: raw.to_string(),
                kind: SegmentKind::Wildcard,
            };
        }
        if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            return Segment {
                name: name.to_string(),
                kind: SegmentKind::Variable,
            };
        }
        Segment {
            name: raw.to_string(),
            kind: SegmentKind::Literal,
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self.kind {
            SegmentKind::Wildcard | SegmentKind::Variable => true,
            SegmentKind::Literal => value.eq_ignore_ascii_case(&self.name),
        }
    }
}

impl Route {
    /// Compiles a pattern such as `/users/{id}/files/*`. Capture names are
    /// extracted here, not per request.
    pub fn new(pattern: &str) -> Route {
        let trimmed = pattern.trim_matches('/');
        Route {
            pattern: pattern.to_string(),
            segments: trimmed.split('/').map(Segment::compile).collect(),
        }
    }

    /// Matches the route against pre-split path segments, walking from the
    /// right. Returns captured variables on success. Once a wildcard has
    /// matched, all remaining leftward segments are deemed matched too.
    pub fn matches(&self, input: &[&str]) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let mut wildcard = false;
        for offset in 0..self.segments.len() {
            let segment = &self.segments[self.segments.len() - 1 - offset];
            let value = input
                .len()
                .checked_sub(1 + offset)
                .map(|idx| input[idx])
                .unwrap_or("");
            let matched = segment.matches(value);
            if matched {
                wildcard = segment.kind == SegmentKind::Wildcard;
            }
            if !matched && !wildcard {
                return None;
            }
            if segment.kind == SegmentKind::Variable {
                vars.insert(segment.name.clone(), value.to_string());
            }
        }
        Some(vars)
    }
}

/// The route a request was dispatched through, with its captured variables.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub pattern: String,
    pub path_vars: HashMap<String, String>,
}

struct RouteHandler {
    route: Route,
    handler: Arc<dyn Handler>,
}

/// Orders routes by registration and dispatches to the first match, falling
/// back to a `51` not-found handler.
pub struct Mux {
    routes: Vec<RouteHandler>,
    pub not_found: Arc<dyn Handler>,
}

impl Default for Mux {
    fn default() -> Mux {
        Mux::new()
    }
}

impl Mux {
    pub fn new() -> Mux {
        Mux {
            routes: Vec::new(),
            not_found: Arc::new(NotFoundHandler),
        }
    }

    pub fn add_route(&mut self, pattern: &str, handler: Arc<dyn Handler>) {
        self.routes.push(RouteHandler {
            route: Route::new(pattern),
            handler,
        });
    }
}

#[async_trait]
impl Handler for Mux {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        let path = r.url.path().trim_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').collect();
        for route_handler in &self.routes {
            if let Some(path_vars) = route_handler.route.matches(&segments) {
                debug!(
                    target: "capsule::mux",
                    path = %r.url.path(),
                    pattern = %route_handler.route.pattern,
                    "route matched"
                );
                r.route = Some(MatchedRoute {
                    pattern: route_handler.route.pattern.clone(),
                    path_vars,
                });
                return route_handler.handler.serve_gemini(w, r).await;
            }
        }
        self.not_found.serve_gemini(w, r).await
    }
}
