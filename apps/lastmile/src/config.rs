use std::env;

use thiserror::Error;
use url::Url;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8082";

/// Fixed path segment the gateway serves its event channel on.
pub const SOCKET_PATH: &str = "/realtime";

/// Query parameter appended when the gateway sits behind an ngrok tunnel,
/// to bypass the interstitial warning page. Deployment concern, not protocol.
const TUNNEL_BYPASS_PARAM: (&str, &str) = ("ngrok-skip-browser-warning", "true");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("gateway base url cannot be empty")]
    EmptyBaseUrl,
    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("gateway url scheme {0:?} is not supported")]
    UnsupportedScheme(String),
}

/// Externally configured gateway address. Owns derivation of the websocket
/// endpoint and REST urls so callers never build addresses by hand.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    base_url: Url,
}

impl GatewayConfig {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ConfigError> {
        let mut base = raw.as_ref().trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if !base.contains("://") {
            base = format!("http://{base}");
        }
        let parsed = Url::parse(&base)?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self { base_url: parsed }),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Reads `LASTMILE_GATEWAY_URL`, defaulting to the local dev gateway.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw =
            env::var("LASTMILE_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        Self::new(raw)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Event channel endpoint: base address with a ws/wss scheme and the
    /// well-known socket path.
    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        url.set_path(SOCKET_PATH);
        self.decorate(&mut url);
        Ok(url)
    }

    /// REST endpoint under the base address, tunnel bypass included.
    pub fn rest_url(&self, path: &str) -> Result<Url, ConfigError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        self.decorate(&mut url);
        Ok(url)
    }

    fn decorate(&self, url: &mut Url) {
        if self.behind_tunnel() {
            let (key, value) = TUNNEL_BYPASS_PARAM;
            url.query_pairs_mut().append_pair(key, value);
        }
    }

    fn behind_tunnel(&self) -> bool {
        self.base_url
            .host_str()
            .is_some_and(|host| host.contains("ngrok"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_http() {
        let config = GatewayConfig::new("gateway.example.com:8082").unwrap();
        assert_eq!(config.base_url().as_str(), "http://gateway.example.com:8082/");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(matches!(
            GatewayConfig::new("   "),
            Err(ConfigError::EmptyBaseUrl)
        ));
    }

    #[test]
    fn websocket_url_uses_ws_for_http_and_wss_for_https() {
        let config = GatewayConfig::new("http://localhost:8082").unwrap();
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://localhost:8082/realtime"
        );

        let config = GatewayConfig::new("https://gateway.example.com").unwrap();
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://gateway.example.com/realtime"
        );
    }

    #[test]
    fn tunnel_hosts_get_the_bypass_parameter() {
        let config = GatewayConfig::new("https://abc123.ngrok-free.app").unwrap();
        let ws = config.websocket_url().unwrap();
        assert_eq!(
            ws.as_str(),
            "wss://abc123.ngrok-free.app/realtime?ngrok-skip-browser-warning=true"
        );
        let rest = config.rest_url("/aggregates/snapshot").unwrap();
        assert!(rest.query().unwrap().contains("ngrok-skip-browser-warning"));
    }

    #[test]
    fn rest_url_joins_paths_under_the_base() {
        let config = GatewayConfig::new("http://localhost:8082").unwrap();
        assert_eq!(
            config.rest_url("/aggregates/snapshot").unwrap().as_str(),
            "http://localhost:8082/aggregates/snapshot"
        );
    }
}
