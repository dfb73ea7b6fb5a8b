/// Authenticated request gateway wrapping every outbound API call
use crate::config::SessionConfig;
use crate::error::{ApiError, ErrorBody, Result};
use crate::idempotency::IdempotencyIssuer;
use crate::refresh::{RefreshCoordinator, RefreshTransport};
use crate::store::TokenStorage;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

const CONTENT_TYPE_HEADER: &str = "Content-Type";
const AUTH_HEADER: &str = "Authorization";
const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// A fully built request, ready for execution
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    fn set_header(&mut self, name: &str, value: String) {
        if let Some(existing) = self.headers.iter_mut().find(|(n, _)| n == name) {
            existing.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response as seen by the gateway
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Whether the body declared a JSON content type
    pub json: bool,
    pub body: String,
}

/// The HTTP execution seam of the gateway
pub trait HttpExec: Send + Sync {
    fn execute(&self, request: &PreparedRequest) -> Result<RawResponse>;
}

/// Production executor backed by a blocking reqwest client
#[derive(Debug, Default)]
pub struct ReqwestExec {
    client: reqwest::blocking::Client,
}

impl ReqwestExec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpExec for ReqwestExec {
    fn execute(&self, request: &PreparedRequest) -> Result<RawResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);

        Ok(RawResponse {
            status,
            json,
            body: response.text()?,
        })
    }
}

/// Per-request switches for callers with unusual needs
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<serde_json::Value>,
    /// Leave the Authorization header off entirely (login, embed mode)
    pub skip_auth: bool,
    /// Suppress the idempotency key on a mutating request
    pub skip_idempotency: bool,
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

fn is_mutating(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE")
}

/// Wraps every outbound API call with bearer injection, idempotency
/// keys for mutating verbs, and reactive 401 recovery.
///
/// On a 401 the gateway runs one refresh through the shared
/// [`RefreshCoordinator`] and retries the original request exactly
/// once with the updated bearer; the retry's response is final even if
/// it is itself a 401. An irrecoverable refresh clears the session and
/// fires the session-expired hook so callers never handle that case
/// themselves.
pub struct RequestGateway<S: TokenStorage, T: RefreshTransport, H: HttpExec> {
    storage: Arc<S>,
    refresher: Arc<RefreshCoordinator<S, T>>,
    exec: H,
    issuer: IdempotencyIssuer,
    base_url: String,
    on_session_expired: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<S: TokenStorage, T: RefreshTransport, H: HttpExec> RequestGateway<S, T, H> {
    pub fn new(
        storage: Arc<S>,
        refresher: Arc<RefreshCoordinator<S, T>>,
        exec: H,
        config: &SessionConfig,
    ) -> Self {
        Self {
            storage,
            refresher,
            exec,
            issuer: IdempotencyIssuer::default(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            on_session_expired: None,
        }
    }

    /// Install the hook fired when the session is irrecoverably lost.
    /// The embedding application wires this to its login navigation
    /// and timer teardown.
    pub fn with_session_expired_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Box::new(hook));
        self
    }

    pub fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send(Method::GET, path, RequestOptions::default())
    }

    pub fn post<R: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<R> {
        self.send(
            Method::POST,
            path,
            RequestOptions {
                body: Some(body),
                ..Default::default()
            },
        )
    }

    pub fn put<R: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<R> {
        self.send(
            Method::PUT,
            path,
            RequestOptions {
                body: Some(body),
                ..Default::default()
            },
        )
    }

    pub fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send(Method::DELETE, path, RequestOptions::default())
    }

    /// Issue a request through the gateway.
    pub fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<R> {
        let mut request = self.prepare(method, path, &options);
        let mut response = self.exec.execute(&request)?;

        if response.status == 401 && !options.skip_auth {
            tracing::debug!(url = %request.url, "401 received, attempting refresh");

            if self.refresher.refresh() {
                // Only the Authorization header is rebuilt; the
                // idempotency key is reused so the server can collapse
                // the duplicate.
                self.apply_auth_header(&mut request);
                response = self.exec.execute(&request)?;
            } else {
                tracing::warn!("refresh after 401 failed, clearing session");
                self.storage.clear_session();
                if let Some(hook) = &self.on_session_expired {
                    hook();
                }
                return Err(ApiError::AuthenticationFailed);
            }
        }

        self.decode(response)
    }

    fn prepare(&self, method: Method, path: &str, options: &RequestOptions) -> PreparedRequest {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = PreparedRequest {
            method,
            url,
            headers: vec![(
                CONTENT_TYPE_HEADER.to_string(),
                "application/json".to_string(),
            )],
            body: options.body.as_ref().map(|v| v.to_string()),
        };

        if !options.skip_auth {
            self.apply_auth_header(&mut request);
        }
        if is_mutating(&request.method) && !options.skip_idempotency {
            request.set_header(IDEMPOTENCY_HEADER, self.issuer.next());
        }

        request
    }

    fn apply_auth_header(&self, request: &mut PreparedRequest) {
        // Omitted entirely when nothing is stored; never a malformed header
        if let Some(pair) = self.storage.current_pair() {
            request.set_header(AUTH_HEADER, format!("Bearer {}", pair.access_token));
        }
    }

    fn decode<R: DeserializeOwned>(&self, response: RawResponse) -> Result<R> {
        if !response.json {
            return Err(ApiError::InvalidResponse {
                status: response.status,
            });
        }

        let envelope: Envelope = serde_json::from_str(&response.body)?;
        if envelope.success {
            let data = envelope.data.unwrap_or(serde_json::Value::Null);
            Ok(serde_json::from_value(data)?)
        } else {
            Err(envelope
                .error
                .map(ErrorBody::into_api_error)
                .unwrap_or(ApiError::Server {
                    code: "UNKNOWN_ERROR".to_string(),
                    message: "request failed".to_string(),
                }))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_exec::{ok_json, unauthorized, MockExec};
    use super::*;
    use crate::refresh::test_transport::MockTransport;
    use crate::store::{MemoryStorage, TokenPair};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestGateway = RequestGateway<MemoryStorage, MockTransport, MockExec>;

    fn gateway(
        storage: Arc<MemoryStorage>,
        transport: MockTransport,
        responses: Vec<RawResponse>,
    ) -> TestGateway {
        let config = SessionConfig::new("http://api.test");
        let refresher = Arc::new(RefreshCoordinator::new(storage.clone(), transport));
        RequestGateway::new(
            storage,
            refresher,
            MockExec::with_responses(responses),
            &config,
        )
    }

    fn authed_storage() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage.save_pair(&TokenPair::new("a1", "r1")).unwrap();
        storage
    }

    #[test]
    fn test_get_carries_bearer_but_no_idempotency_key() {
        let gw = gateway(
            authed_storage(),
            MockTransport::failing(),
            vec![ok_json("{\"items\":[]}")],
        );

        let _: serde_json::Value = gw.get("/businesses").unwrap();

        let requests = gw.exec.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header(AUTH_HEADER), Some("Bearer a1"));
        assert!(requests[0].header(IDEMPOTENCY_HEADER).is_none());
        assert_eq!(requests[0].url, "http://api.test/businesses");
    }

    #[test]
    fn test_mutating_request_carries_idempotency_key() {
        let gw = gateway(
            authed_storage(),
            MockTransport::failing(),
            vec![ok_json("{\"id\":1}")],
        );

        let _: serde_json::Value = gw.post("/businesses", serde_json::json!({"name": "x"})).unwrap();

        let requests = gw.exec.requests.lock();
        let key = requests[0].header(IDEMPOTENCY_HEADER).unwrap();
        assert!(key.starts_with("req_"));
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"name":"x"}"#));
    }

    #[test]
    fn test_no_stored_token_omits_auth_header() {
        let gw = gateway(
            Arc::new(MemoryStorage::new()),
            MockTransport::failing(),
            vec![ok_json("null")],
        );

        let _: serde_json::Value = gw.get("/public").unwrap();

        let requests = gw.exec.requests.lock();
        assert!(requests[0].header(AUTH_HEADER).is_none());
    }

    #[test]
    fn test_401_refreshes_and_retries_once_with_new_bearer() {
        let storage = authed_storage();
        let transport = MockTransport::granting("a2", Some("r2"));
        let refresh_calls = transport.calls.clone();
        let gw = gateway(
            storage,
            transport,
            vec![unauthorized(), ok_json("{\"ok\":true}")],
        );

        let result: serde_json::Value = gw
            .post("/messages", serde_json::json!({"text": "hi"}))
            .unwrap();
        assert_eq!(result["ok"], true);

        let requests = gw.exec.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);

        // Retry observes the refreshed pair and reuses the original key
        assert_eq!(requests[1].header(AUTH_HEADER), Some("Bearer a2"));
        assert_eq!(
            requests[0].header(IDEMPOTENCY_HEADER),
            requests[1].header(IDEMPOTENCY_HEADER)
        );
    }

    #[test]
    fn test_retry_response_is_final_even_if_401() {
        let storage = authed_storage();
        let transport = MockTransport::granting("a2", None);
        let refresh_calls = transport.calls.clone();
        let gw = gateway(storage, transport, vec![unauthorized(), unauthorized()]);

        let err = gw.get::<serde_json::Value>("/things").unwrap_err();

        // The second 401's own envelope comes back; no second refresh
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.exec.requests.lock().len(), 2);
    }

    #[test]
    fn test_failed_refresh_clears_session_and_fires_hook() {
        let storage = authed_storage();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_hook = fired.clone();

        let config = SessionConfig::new("http://api.test");
        let refresher = Arc::new(RefreshCoordinator::new(
            storage.clone(),
            MockTransport::failing(),
        ));
        let gw = RequestGateway::new(
            storage.clone(),
            refresher,
            MockExec::with_responses(vec![unauthorized()]),
            &config,
        )
        .with_session_expired_hook(move || {
            fired_in_hook.fetch_add(1, Ordering::SeqCst);
        });

        let err = gw.get::<serde_json::Value>("/things").unwrap_err();

        assert!(matches!(err, ApiError::AuthenticationFailed));
        assert!(storage.current_pair().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // No retry after a failed refresh
        assert_eq!(gw.exec.requests.lock().len(), 1);
    }

    #[test]
    fn test_skip_auth_passes_401_through_without_refresh() {
        let transport = MockTransport::granting("a2", None);
        let refresh_calls = transport.calls.clone();
        let gw = gateway(authed_storage(), transport, vec![unauthorized()]);

        let err = gw
            .send::<serde_json::Value>(
                Method::GET,
                "/login",
                RequestOptions {
                    skip_auth: true,
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);

        let requests = gw.exec.requests.lock();
        assert!(requests[0].header(AUTH_HEADER).is_none());
    }

    #[test]
    fn test_non_json_body_is_invalid_response() {
        let gw = gateway(
            authed_storage(),
            MockTransport::failing(),
            vec![RawResponse {
                status: 502,
                json: false,
                body: "<html>Bad Gateway</html>".to_string(),
            }],
        );

        let err = gw.get::<serde_json::Value>("/things").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { status: 502 }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let gw = gateway(
            authed_storage(),
            MockTransport::failing(),
            vec![RawResponse {
                status: 200,
                json: true,
                body: "{truncated".to_string(),
            }],
        );

        let err = gw.get::<serde_json::Value>("/things").unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_server_error_passes_through() {
        let gw = gateway(
            authed_storage(),
            MockTransport::failing(),
            vec![RawResponse {
                status: 404,
                json: true,
                body: r#"{"success":false,"error":{"code":"BUSINESS_NOT_FOUND","message":"gone"}}"#
                    .to_string(),
            }],
        );

        let err = gw.get::<serde_json::Value>("/businesses/9").unwrap_err();
        assert_eq!(err.code(), "BUSINESS_NOT_FOUND");
    }
}
