use std::time::Duration;

use ureq::{Agent, Proxy};

use crate::error::{DownloadError, Result};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(format!("mirrorkit/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    /// Builds an HTTP `Agent` from this config.
    ///
    /// Non-2xx responses are returned as responses rather than errors, so callers can
    /// tell a missing file from a flaky server.
    pub fn build(&self) -> Result<Agent> {
        let proxy = self
            .proxy
            .as_deref()
            .map(|proxy| {
                Proxy::new(proxy).map_err(|err| {
                    DownloadError::InvalidProxy {
                        proxy: proxy.to_string(),
                        reason: err.to_string(),
                    }
                })
            })
            .transpose()?;

        let mut config = Agent::config_builder()
            .proxy(proxy)
            .timeout_global(self.timeout)
            .http_status_as_error(false);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        Ok(config.build().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("mirrorkit/")));
        assert!(config.proxy.is_none());
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.build().is_ok());
    }

    #[test]
    fn test_invalid_proxy() {
        let config = ClientConfig {
            proxy: Some("ftp://proxy.example:21".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.build(),
            Err(DownloadError::InvalidProxy { .. })
        ));
    }
}
