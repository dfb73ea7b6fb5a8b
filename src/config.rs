/// Session layer configuration
///
/// Plain values wired in by the embedding application; there is no
/// config-file machinery at this layer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL every gateway request is resolved against
    pub api_base_url: String,

    /// Path of the token refresh endpoint, relative to the base URL
    pub refresh_path: String,

    /// Remaining lifetime below which the proactive timer refreshes
    pub refresh_threshold_secs: u64,

    /// Interval between proactive timer ticks
    pub refresh_interval_secs: u64,

    /// Clock-skew tolerance applied to expiry checks. Zero by default;
    /// expiry is compared against the local clock as-is.
    pub skew_tolerance_secs: u64,
}

impl SessionConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Absolute URL of the refresh endpoint
    pub fn refresh_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.refresh_path.trim_start_matches('/')
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            refresh_threshold_secs: 300,
            refresh_interval_secs: 60,
            skew_tolerance_secs: 0,
        }
    }
}
