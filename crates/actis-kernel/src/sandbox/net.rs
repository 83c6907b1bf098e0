//! Outbound HTTP behind the network policy.

use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::interpreter::{Fault, FaultKind, Interrupt};

use super::limits::NetworkPolicy;

const USER_AGENT: &str = concat!("actis/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum NetError {
    #[error("{0}")]
    Denied(String),
    #[error("invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl From<NetError> for Interrupt {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Denied(message) => {
                Interrupt::Denied(Fault::new(FaultKind::NetworkDenied, message))
            }
            NetError::Invalid { .. } => Interrupt::Fault(Fault::value_error(err.to_string())),
            NetError::Http(_) => Interrupt::Fault(Fault::new(FaultKind::ToolError, err.to_string())),
            NetError::TooLarge { .. } => Interrupt::ResourceExceeded(Fault::new(
                FaultKind::MemoryExceeded,
                err.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Checks every URL against the policy before a request is sent.
#[derive(Debug)]
pub struct NetworkGuard {
    policy: NetworkPolicy,
    client: OnceLock<reqwest::Client>,
}

impl NetworkGuard {
    pub fn new(policy: NetworkPolicy) -> Self {
        Self {
            policy,
            client: OnceLock::new(),
        }
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// Parse `url` and confirm its scheme and host are permitted.
    pub fn check(&self, url: &str) -> Result<Url, NetError> {
        let parsed = Url::parse(url).map_err(|e| NetError::Invalid {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(NetError::Invalid {
                    url: url.to_string(),
                    reason: format!("unsupported scheme '{scheme}' (only http/https)"),
                });
            }
        }
        let host = parsed.host_str().unwrap_or_default();
        if !self.policy.allows_host(host) {
            return Err(NetError::Denied(format!(
                "network access to host '{host}' is not allowed"
            )));
        }
        Ok(parsed)
    }

    fn client(&self) -> Result<&reqwest::Client, NetError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        // Only the checked host may be contacted, so redirects are not followed.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }

    /// GET `url`, reading at most `max_body` bytes of the response.
    pub async fn get(&self, url: &str, max_body: usize) -> Result<HttpResponse, NetError> {
        let parsed = self.check(url)?;
        debug!(url = %parsed, "http get");
        let mut response = self.client()?.get(parsed).send().await?;
        let status = response.status().as_u16();
        if response
            .content_length()
            .is_some_and(|len| len > max_body as u64)
        {
            return Err(NetError::TooLarge { limit: max_body });
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > max_body {
                return Err(NetError::TooLarge { limit: max_body });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(hosts: &[&str]) -> NetworkGuard {
        NetworkGuard::new(NetworkPolicy::AllowListed {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        })
    }

    #[test]
    fn deny_policy_refuses_all_hosts() {
        let guard = NetworkGuard::new(NetworkPolicy::Deny);
        assert!(matches!(guard.check("https://example.com/"), Err(NetError::Denied(_))));
    }

    #[test]
    fn allow_listed_host_passes() {
        let guard = allow(&["example.com"]);
        let url = guard.check("https://example.com/a?b=1").expect("allowed");
        assert_eq!(url.path(), "/a");
        assert!(matches!(guard.check("https://evil.com/"), Err(NetError::Denied(_))));
    }

    #[test]
    fn non_http_schemes_are_invalid() {
        let guard = allow(&["example.com"]);
        assert!(matches!(guard.check("file:///etc/passwd"), Err(NetError::Invalid { .. })));
        assert!(matches!(guard.check("not a url"), Err(NetError::Invalid { .. })));
    }

    #[tokio::test]
    async fn denied_get_never_sends() {
        let guard = NetworkGuard::new(NetworkPolicy::Deny);
        assert!(matches!(
            guard.get("http://127.0.0.1:9/", 1024).await,
            Err(NetError::Denied(_))
        ));
    }
}
