//! Shared blocking HTTP client for the upstream feeds.

use opswatch_protocol::SourceTag;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{Result, WatchError};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::blocking::Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("opswatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| WatchError::HttpClient(err.to_string()))?;

        Ok(Self {
            http,
            token: config
                .token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn get_json(
        &self,
        source: SourceTag,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|err| WatchError::Http {
            source_tag: source,
            details: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::HttpStatus {
                source_tag: source,
                status: status.as_u16(),
            });
        }

        let body = response.json::<Value>().map_err(|err| WatchError::Http {
            source_tag: source,
            details: format!("invalid JSON body: {}", err),
        })?;
        debug!(source = %source, url = %url, "Feed fetched");
        Ok(body)
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("http://host/api/", "/devices"),
            "http://host/api/devices"
        );
        assert_eq!(join_url("http://host", "pppoe/active"), "http://host/pppoe/active");
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = ApiConfig {
            token: Some("   ".to_string()),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config).expect("client");
        assert!(client.token.is_none());
    }
}
