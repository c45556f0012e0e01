//! Installer settings, constructed by the caller and handed to the
//! [`DependencyManager`](super::DependencyManager).

use crate::game::download_provider::{DownloadProvider, MojangDownloadProvider};
use crate::game::version::{Features, Platform};
use crate::task::download::{DEFAULT_ATTEMPTS, DEFAULT_RETRY_BACKOFF};
use crate::task::executor::DEFAULT_PROGRESS_INTERVAL;
use crate::task::scheduler::DEFAULT_IO_CONCURRENCY;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const KEEP_ALIVE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct InstallerConfig {
    pub download_provider: Arc<dyn DownloadProvider>,
    pub proxy: Option<ProxyConfig>,
    /// Attempts per download, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    pub io_concurrency: usize,
    pub progress_interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Platform library rules are evaluated against.
    pub platform: Platform,
    pub features: Features,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            download_provider: Arc::new(MojangDownloadProvider),
            proxy: None,
            max_attempts: DEFAULT_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            io_concurrency: DEFAULT_IO_CONCURRENCY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            user_agent: format!("hearth/{}", env!("CARGO_PKG_VERSION")),
            platform: Platform::current().clone(),
            features: Features::default(),
        }
    }
}

impl InstallerConfig {
    pub fn with_provider(mut self, provider: Arc<dyn DownloadProvider>) -> Self {
        self.download_provider = provider;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// The HTTP client shared by every download of a manager.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .tcp_keepalive(Some(KEEP_ALIVE))
            .user_agent(self.user_agent.clone());

        if let Some(proxy) = &self.proxy {
            let mut p = reqwest::Proxy::all(&proxy.url)
                .with_context(|| format!("Invalid proxy URL {}", proxy.url))?;
            if let Some(username) = &proxy.username {
                p = p.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(p);
        }

        builder.build().context("Failed to build HTTP client")
    }
}

impl std::fmt::Debug for InstallerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerConfig")
            .field("proxy", &self.proxy.as_ref().map(|p| &p.url))
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field("io_concurrency", &self.io_concurrency)
            .field("progress_interval", &self.progress_interval)
            .field("request_timeout", &self.request_timeout)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.io_concurrency, 8);
        assert_eq!(config.progress_interval, Duration::from_secs(1));
        assert!(config.http_client().is_ok());
    }

    #[test]
    fn proxy_with_credentials_builds() {
        let config = InstallerConfig::default().with_proxy(ProxyConfig {
            url: "http://127.0.0.1:3128".to_string(),
            username: Some("user".to_string()),
            password: None,
        });
        assert!(config.http_client().is_ok());
    }
}
