//! HTTP transport to the miner
//!
//! The gateway talks to the device only through [`Transport`], which keeps
//! retry policy out of the HTTP client and lets tests swap in a mock or the
//! simulated device.

use std::time::Duration;

/// Status and raw body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer answered too slowly; worth another attempt
    #[error("timed out: {0}")]
    Timeout(String),

    /// Nothing is listening or the host does not resolve
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transport error: {0}")]
    Other(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    fn get(&self, path: &str) -> Result<HttpReply, TransportError>;

    fn patch(&self, path: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError>;

    /// Human-readable peer address used in errors and logs
    fn endpoint(&self) -> String;
}

/// Blocking HTTP client for a real device
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTransport {
    pub fn new(host: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Self { agent, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<HttpReply, TransportError> {
        finish(self.agent.get(&self.url(path)).call())
    }

    fn patch(&self, path: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        finish(self.agent.request("PATCH", &self.url(path)).send_json(body))
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}

fn finish(outcome: Result<ureq::Response, ureq::Error>) -> Result<HttpReply, TransportError> {
    match outcome {
        Ok(resp) => {
            let status = resp.status();
            Ok(HttpReply::new(status, resp.into_string().unwrap_or_default()))
        }
        Err(ureq::Error::Status(status, resp)) => {
            Ok(HttpReply::new(status, resp.into_string().unwrap_or_default()))
        }
        Err(ureq::Error::Transport(t)) => Err(classify(t.kind(), t.to_string())),
    }
}

/// Map ureq's transport kinds onto retry classes.
///
/// ureq reports socket read timeouts as `Io`.
fn classify(kind: ureq::ErrorKind, message: String) -> TransportError {
    match kind {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
            TransportError::ConnectionFailed(message)
        }
        ureq::ErrorKind::Io => TransportError::Timeout(message),
        _ => TransportError::Other(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let t = HttpTransport::new("192.168.1.97", Duration::from_secs(1));
        assert_eq!(t.endpoint(), "http://192.168.1.97");
        let t = HttpTransport::new("http://miner.local/", Duration::from_secs(1));
        assert_eq!(t.url("/api/system/info"), "http://miner.local/api/system/info");
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            classify(ureq::ErrorKind::ConnectionFailed, "refused".into()),
            TransportError::ConnectionFailed(_)
        ));
        assert!(matches!(
            classify(ureq::ErrorKind::Dns, "nxdomain".into()),
            TransportError::ConnectionFailed(_)
        ));
        assert!(matches!(
            classify(ureq::ErrorKind::Io, "timed out".into()),
            TransportError::Timeout(_)
        ));
        assert!(matches!(
            classify(ureq::ErrorKind::BadHeader, "bad".into()),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn test_reply_success_range() {
        assert!(HttpReply::new(200, "").is_success());
        assert!(HttpReply::new(204, "").is_success());
        assert!(!HttpReply::new(301, "").is_success());
        assert!(!HttpReply::new(500, "").is_success());
    }
}
