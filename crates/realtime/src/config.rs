use url::Url;

/// Path of the broker endpoint, appended to the API base.
pub const ENDPOINT_PATH: &str = "ws-queue";

/// Path segment of the SockJS raw-WebSocket transport under the endpoint.
const SOCKJS_WEBSOCKET_SEGMENT: &str = "websocket";

const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// How the broker endpoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Endpoint served behind SockJS; connect to its raw WebSocket path.
    SockJs,
    /// Plain WebSocket endpoint.
    Native,
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sockjs" => Ok(TransportMode::SockJs),
            "native" | "websocket" => Ok(TransportMode::Native),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

/// Realtime client configuration loaded from environment variables.
///
/// Reconnect delay and heart-beat intervals are fixed constants and are
/// not configurable here.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Backend base URL, e.g. `https://api.example.com`. `None` means the
    /// endpoint is relative to [`origin`](Self::origin).
    pub api_base: Option<String>,
    /// Origin used to resolve a relative endpoint path.
    pub origin: String,
    pub transport: TransportMode,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            origin: DEFAULT_ORIGIN.to_string(),
            transport: TransportMode::SockJs,
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var        | Default                 |
    /// |----------------|-------------------------|
    /// | `API_BASE`     | unset                   |
    /// | `WS_ORIGIN`    | `http://localhost:8080` |
    /// | `WS_TRANSPORT` | `sockjs`                |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = std::env::var("API_BASE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let origin = std::env::var("WS_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.into());

        let transport = match std::env::var("WS_TRANSPORT") {
            Ok(raw) => raw.parse()?,
            Err(_) => TransportMode::SockJs,
        };

        Ok(Self {
            api_base,
            origin,
            transport,
        })
    }

    /// The broker endpoint: `{API_BASE}/ws-queue`, or `/ws-queue` resolved
    /// against the origin when no base is configured.
    ///
    /// A query string on the base is kept on the endpoint.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        match self.api_base.as_deref() {
            Some(base) => {
                let mut base_url = parse_url(base)?;
                let query = base_url.query().map(str::to_owned);
                base_url.set_fragment(None);
                if !base_url.path().ends_with('/') {
                    let path = format!("{}/", base_url.path());
                    base_url.set_path(&path);
                }
                let mut endpoint = join(&base_url, ENDPOINT_PATH)?;
                endpoint.set_query(query.as_deref());
                Ok(endpoint)
            }
            None => join(&parse_url(&self.origin)?, &format!("/{ENDPOINT_PATH}")),
        }
    }

    /// Absolute `ws://` / `wss://` URL the transport connects to.
    pub fn transport_url(&self) -> Result<String, ConfigError> {
        let mut url = self.endpoint()?;

        let ws_scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(ConfigError::InvalidUrl(url.to_string())),
        };
        if url.set_scheme(ws_scheme).is_err() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        if self.transport == TransportMode::SockJs {
            let invalid = ConfigError::InvalidUrl(url.to_string());
            url.path_segments_mut()
                .map_err(|()| invalid)?
                .pop_if_empty()
                .push(SOCKJS_WEBSOCKET_SEGMENT);
        }
        Ok(url.into())
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))
}

fn join(base: &Url, path: &str) -> Result<Url, ConfigError> {
    base.join(path)
        .map_err(|e| ConfigError::InvalidUrl(format!("{base} + {path}: {e}")))
}

/// The `host` header value for CONNECT, taken from a transport URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_owned)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid WS_TRANSPORT value: {0} (expected `sockjs` or `native`)")]
    InvalidTransport(String),

    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),
}
