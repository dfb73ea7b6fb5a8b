/// Navigation gating based on session state
use crate::claims;
use crate::config::SessionConfig;
use crate::refresh::{RefreshCoordinator, RefreshTransport};
use crate::store::TokenStorage;
use std::sync::Arc;

/// A navigable view: a path template with named segments and a
/// protected flag.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: String,
    pub protected: bool,
}

impl Route {
    pub fn new(pattern: &str, protected: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            protected,
        }
    }

    /// Whether a concrete path matches this route's template.
    /// `:name` segments match any single path segment.
    pub fn matches(&self, path: &str) -> bool {
        let pattern: Vec<&str> = self.pattern.trim_matches('/').split('/').collect();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        pattern.len() == segments.len()
            && pattern
                .iter()
                .zip(&segments)
                .all(|(pat, seg)| pat.starts_with(':') || pat == seg)
    }
}

/// Outcome of evaluating a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDecision {
    Allow,
    RedirectToLogin,
}

/// Decides whether a navigation to a route proceeds.
///
/// Embedded navigations (the anonymous chat widget) bypass every check
/// for that navigation only; the flag never carries over to another
/// evaluation.
pub struct RouteAuthGate<S: TokenStorage, T: RefreshTransport> {
    storage: Arc<S>,
    refresher: Arc<RefreshCoordinator<S, T>>,
    skew_tolerance_secs: u64,
}

impl<S: TokenStorage, T: RefreshTransport> RouteAuthGate<S, T> {
    pub fn new(
        storage: Arc<S>,
        refresher: Arc<RefreshCoordinator<S, T>>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            storage,
            refresher,
            skew_tolerance_secs: config.skew_tolerance_secs,
        }
    }

    /// Evaluate a navigation to `route`.
    ///
    /// Unprotected and embedded navigations always proceed. Otherwise a
    /// missing pair redirects to login, and an expired access token
    /// gets exactly one refresh attempt before the session is cleared
    /// and the navigation redirected.
    pub fn evaluate(&self, route: &Route, embedded: bool) -> NavDecision {
        if !route.protected || embedded {
            return NavDecision::Allow;
        }

        let pair = match self.storage.current_pair() {
            Some(pair) => pair,
            None => return NavDecision::RedirectToLogin,
        };

        if !claims::is_expired(&pair.access_token, self.skew_tolerance_secs) {
            return NavDecision::Allow;
        }

        tracing::debug!(route = %route.pattern, "stored token expired, refreshing before navigation");
        if self.refresher.refresh() {
            NavDecision::Allow
        } else {
            tracing::warn!("refresh before navigation failed, clearing session");
            self.storage.clear_session();
            NavDecision::RedirectToLogin
        }
    }
}
