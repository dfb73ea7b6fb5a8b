/// Token refresh with single-flight concurrency control
use crate::config::SessionConfig;
use crate::error::{ApiError, ErrorBody, Result};
use crate::store::{TokenPair, TokenStorage};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// A freshly granted credential set.
///
/// The refresh token is optional: servers that do not rotate refresh
/// tokens omit it, in which case the prior one stays valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct RefreshEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<RefreshGrant>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

/// The network seam of the refresh protocol
pub trait RefreshTransport: Send + Sync {
    /// Exchange a refresh token for a new grant
    fn exchange(&self, refresh_token: &str) -> Result<RefreshGrant>;
}

/// Production transport speaking the refresh wire contract over HTTP
pub struct HttpRefreshTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpRefreshTransport {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: config.refresh_url(),
        }
    }
}

impl RefreshTransport for HttpRefreshTransport {
    fn exchange(&self, refresh_token: &str) -> Result<RefreshGrant> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RefreshRequest { refresh_token })
            .send()?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        if !is_json {
            return Err(ApiError::InvalidResponse { status });
        }

        let envelope: RefreshEnvelope = serde_json::from_str(&response.text()?)?;
        match envelope {
            RefreshEnvelope {
                success: true,
                data: Some(grant),
                ..
            } => Ok(grant),
            RefreshEnvelope {
                error: Some(body), ..
            } => Err(body.into_api_error()),
            _ => Err(ApiError::InvalidResponse { status }),
        }
    }
}

struct Flight {
    in_flight: bool,
    generation: u64,
    last_success: bool,
}

/// Serializes every path into the refresh protocol.
///
/// Three independent triggers exist: a 401 seen by the request gateway,
/// the proactive timer, and the route gate. When any number of them
/// call [`refresh`](RefreshCoordinator::refresh) while an exchange is
/// already in flight, the extra callers wait for that exchange and
/// adopt its outcome instead of issuing their own. The guard clears
/// once the flight resolves, so a later expiry starts a fresh exchange.
pub struct RefreshCoordinator<S: TokenStorage, T: RefreshTransport> {
    storage: Arc<S>,
    transport: T,
    flight: Mutex<Flight>,
    resolved: Condvar,
}

impl<S: TokenStorage, T: RefreshTransport> RefreshCoordinator<S, T> {
    pub fn new(storage: Arc<S>, transport: T) -> Self {
        Self {
            storage,
            transport,
            flight: Mutex::new(Flight {
                in_flight: false,
                generation: 0,
                last_success: false,
            }),
            resolved: Condvar::new(),
        }
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Returns false without a network call when no pair is stored, and
    /// leaves storage untouched on any failure. Safe to call from any
    /// number of threads concurrently; all callers of one flight
    /// observe the outcome of the same underlying exchange.
    pub fn refresh(&self) -> bool {
        let mut flight = self.flight.lock();
        if flight.in_flight {
            let observed = flight.generation;
            while flight.in_flight && flight.generation == observed {
                self.resolved.wait(&mut flight);
            }
            return flight.last_success;
        }
        flight.in_flight = true;
        drop(flight);

        // The leader reads storage only after winning the flight. A read
        // taken before election could stall (file or keyring backends do
        // I/O) across a whole concurrent flight and then start a second
        // exchange with a refresh token that flight already rotated away.
        let success = match self.storage.current_pair() {
            Some(pair) => self.perform(&pair.refresh_token),
            None => {
                tracing::debug!("refresh skipped: no stored refresh token");
                false
            }
        };

        let mut flight = self.flight.lock();
        flight.in_flight = false;
        flight.generation = flight.generation.wrapping_add(1);
        flight.last_success = success;
        self.resolved.notify_all();
        success
    }

    fn perform(&self, refresh_token: &str) -> bool {
        match self.transport.exchange(refresh_token) {
            Ok(grant) => {
                // Keep the prior refresh token unless the server rotated it
                let rotated = grant
                    .refresh_token
                    .unwrap_or_else(|| refresh_token.to_string());
                let pair = TokenPair::new(grant.access_token, rotated);

                match self.storage.save_pair(&pair) {
                    Ok(()) => {
                        tracing::debug!("token pair refreshed");
                        true
                    }
                    Err(e) => {
                        tracing::warn!("failed to persist refreshed pair: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!("token refresh failed: {}", e);
                false
            }
        }
    }
}
