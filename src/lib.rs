//! Pfortner - resilient bearer-token session layer for API clients
//!
//! This library owns the lifecycle of an access/refresh token pair and
//! keeps every outgoing request authenticated:
//!
//! # Features
//!
//! - Pluggable token storage (memory, file, OS credential manager)
//! - Single-flight token refresh: concurrent triggers share one exchange
//! - Request gateway with bearer injection, idempotency keys for
//!   mutating verbs, and one reactive refresh-and-retry per 401
//! - Proactive background refresh ahead of expiry
//! - Route gating with an embedded (anonymous widget) bypass
//!
//! # Example
//!
//! ```
//! use pfortner::prelude::*;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let config = SessionConfig::new("https://api.example.com");
//!
//! let refresher = Arc::new(RefreshCoordinator::new(
//!     storage.clone(),
//!     HttpRefreshTransport::new(&config),
//! ));
//! let gateway = RequestGateway::new(
//!     storage.clone(),
//!     refresher.clone(),
//!     ReqwestExec::new(),
//!     &config,
//! );
//! let gate = RouteAuthGate::new(storage.clone(), refresher, &config);
//!
//! assert_eq!(session_state(storage.as_ref(), 0), SessionState::Anonymous);
//! assert_eq!(
//!     gate.evaluate(&Route::new("/dashboard", true), false),
//!     NavDecision::RedirectToLogin,
//! );
//! # let _ = gateway;
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod refresh;
pub mod route;
pub mod store;
pub mod timer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::claims::{session_state, DecodedClaims, SessionState};
    pub use crate::config::SessionConfig;
    pub use crate::error::{ApiError, Result};
    pub use crate::gateway::{
        HttpExec, RequestGateway, RequestOptions, ReqwestExec,
    };
    pub use crate::idempotency::IdempotencyIssuer;
    pub use crate::refresh::{HttpRefreshTransport, RefreshCoordinator, RefreshTransport};
    pub use crate::route::{NavDecision, Route, RouteAuthGate};
    pub use crate::store::{
        FileStorage, KeyringStorage, MemoryStorage, TokenPair, TokenStorage, UserProfile,
    };
    pub use crate::timer::ProactiveRefreshTimer;
}
