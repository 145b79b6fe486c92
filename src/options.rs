/// Default API root of the staff/project backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1024/oztf/api/v1/";

/// Configures the transport, retry policy and retry-prompt timing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorOptions {
    /// API base URL; endpoint paths are resolved relative to it.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries allowed per endpoint after the initial attempt.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single retry delay.
    pub retry_max_delay_ms: u64,
    /// Wait before showing the prompt when more than one request has failed.
    pub dialog_debounce_ms: u64,
    /// Wait before re-arming the prompt after a retry-all left failures.
    pub dialog_reset_delay_ms: u64,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: 2_500,
            max_attempts: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            dialog_debounce_ms: 1_000,
            dialog_reset_delay_ms: 1_000,
        }
    }
}

impl CoordinatorOptions {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Reads options from the environment.
    ///
    /// Reads:
    /// - `OZTF_API_BASE_URL`: API root, required
    /// - `OZTF_API_TIMEOUT_MS`: request timeout, optional
    ///
    /// Everything else keeps its default.
    pub fn from_env() -> Result<Self, String> {
        let base_url = std::env::var("OZTF_API_BASE_URL")
            .map_err(|_| "missing OZTF_API_BASE_URL environment variable".to_owned())?;
        let timeout = std::env::var("OZTF_API_TIMEOUT_MS").ok();
        Self::from_parts(&base_url, timeout.as_deref())
    }

    fn from_parts(base_url: &str, timeout_ms: Option<&str>) -> Result<Self, String> {
        if base_url.trim().is_empty() {
            return Err("OZTF_API_BASE_URL is set but empty".to_owned());
        }
        let mut options = Self::default().with_base_url(base_url.trim());
        if let Some(raw) = timeout_ms {
            options.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|err| format!("invalid OZTF_API_TIMEOUT_MS '{raw}': {err}"))?;
        }
        Ok(options)
    }
}
