use super::{Outcome, ResultKey, Scheduler, Task, TaskContext};
use crate::error::{is_cancellation, Cancelled, DownloadError};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(1000);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Context handed to a [`FailedHook`] after a failed attempt.
pub struct DownloadFailure<'a> {
    pub url: &'a str,
    pub attempt: u32,
    pub error: &'a anyhow::Error,
}

/// Called after every failed attempt. Returning a URL replaces the one used
/// by the next attempt, which is how mirror fallback is wired in.
pub type FailedHook = Arc<dyn Fn(&DownloadFailure<'_>) -> Option<String> + Send + Sync>;

/// Shared retry policy of the network tasks.
#[derive(Clone)]
struct Attempts {
    urls: Vec<String>,
    max_attempts: u32,
    backoff: Duration,
    on_failed: Option<FailedHook>,
}

impl Attempts {
    fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            max_attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
            on_failed: None,
        }
    }

    /// Drive `attempt` until it succeeds, the attempts run out or the run is
    /// cancelled. Candidate URLs are rotated between attempts unless the
    /// failure hook picks one.
    async fn run<T, F, Fut>(&self, ctx: &TaskContext, what: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let Some(first) = self.urls.first() else {
            anyhow::bail!("No URL to download {} from", what);
        };
        let max_attempts = self.max_attempts.max(1);
        let mut url = first.clone();
        let mut last_error = None;

        for n in 1..=max_attempts {
            ctx.check_cancelled()?;
            match attempt(url.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if is_cancellation(&e) => return Err(e),
                Err(e) => {
                    log::warn!(
                        "Download failed (attempt {}/{}) : {:#}. Retrying...",
                        n,
                        max_attempts,
                        e
                    );
                    let replacement = self.on_failed.as_ref().and_then(|hook| {
                        hook(&DownloadFailure {
                            url: &url,
                            attempt: n,
                            error: &e,
                        })
                    });
                    url = replacement
                        .unwrap_or_else(|| self.urls[n as usize % self.urls.len()].clone());
                    last_error = Some(e);

                    if n < max_attempts && !self.backoff.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.backoff * n) => {}
                            _ = ctx.cancel_token().cancelled() => return Err(Cancelled.into()),
                        }
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| anyhow!("Download of {} never attempted", what));
        log::error!("Download failed after {} attempts: {:#}", max_attempts, error);
        Err(error).with_context(|| format!("Failed to download {} after {} attempts", what, max_attempts))
    }
}

fn default_client() -> Result<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// True when `path` exists and matches the expected hash, or the expected
/// size when no hash is known. With neither, an existing file is accepted.
pub async fn is_file_valid(path: &Path, sha1: Option<&str>, size: Option<u64>) -> bool {
    if !path.exists() {
        return false;
    }
    if let Some(expected) = sha1 {
        return match tokio::fs::read(path).await {
            Ok(bytes) => {
                let computed = sha1_hex(&bytes);
                if computed.eq_ignore_ascii_case(expected) {
                    true
                } else {
                    log::info!(
                        "File exists but hash mismatches ({} != {}), re-downloading: {:?}",
                        computed,
                        expected,
                        path
                    );
                    false
                }
            }
            Err(e) => {
                log::warn!("Failed to read existing file for validation: {} - {}", e, path.display());
                false
            }
        };
    }
    if let Some(expected) = size {
        return tokio::fs::metadata(path)
            .await
            .map(|m| m.len() == expected)
            .unwrap_or(false);
    }
    true
}

/// Downloads one URL to a file, atomically.
///
/// The body is streamed into `<name>.part` next to the destination and only
/// renamed over it once the byte count, size and SHA1 checks passed, so the
/// destination is either absent, its previous content, or complete.
pub struct FileDownloadTask {
    attempts: Attempts,
    dest: PathBuf,
    sha1: Option<String>,
    size: Option<u64>,
    client: Option<Client>,
    name: Option<String>,
    hidden: bool,
    result: Option<ResultKey<PathBuf>>,
}

impl FileDownloadTask {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self::with_candidates(vec![url.into()], dest)
    }

    /// Several candidate URLs for the same file, tried in rotation.
    pub fn with_candidates(urls: Vec<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            attempts: Attempts::new(urls),
            dest: dest.into(),
            sha1: None,
            size: None,
            client: None,
            name: None,
            hidden: false,
            result: None,
        }
    }

    pub fn sha1(mut self, sha1: Option<impl Into<String>>) -> Self {
        self.sha1 = sha1.map(Into::into);
        self
    }

    pub fn size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.attempts.backoff = backoff;
        self
    }

    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn on_failed(mut self, hook: FailedHook) -> Self {
        self.attempts.on_failed = Some(hook);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn hide(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Publish the destination path under `key` once complete.
    pub fn publish_as(mut self, key: ResultKey<PathBuf>) -> Self {
        self.result = Some(key);
        self
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    fn finish(self) -> Outcome {
        match &self.result {
            Some(key) => Outcome::publish(key, self.dest.clone()),
            None => Outcome::done(),
        }
    }

    async fn download(self, ctx: TaskContext) -> Result<Outcome> {
        log::debug!("Downloading: {:?} -> {:?}", self.attempts.urls.first(), self.dest);

        if is_file_valid(&self.dest, self.sha1.as_deref(), self.size).await {
            log::debug!("File exists and is valid, skipping: {:?}", self.dest);
            return Ok(self.finish());
        }

        if let Some(parent) = self.dest.parent() {
            create_dir_all(parent).await?;
        }

        let client = match &self.client {
            Some(client) => client.clone(),
            None => default_client()?,
        };
        let what = self.dest.display().to_string();
        self.attempts
            .run(&ctx, &what, |url| {
                stream_to_file(&client, url, &self.dest, self.sha1.as_deref(), self.size, &ctx)
            })
            .await?;
        log::debug!("Download complete: {:?}", self.dest);
        Ok(self.finish())
    }
}

impl Task for FileDownloadTask {
    fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "Download {}",
                self.dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ),
        }
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::Io
    }

    fn hidden(&self) -> bool {
        self.hidden
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(self.download(ctx))
    }
}

async fn stream_to_file(
    client: &Client,
    url: String,
    dest: &Path,
    expected_sha1: Option<&str>,
    expected_size: Option<u64>,
    ctx: &TaskContext,
) -> Result<()> {
    let start = Instant::now();
    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status().as_u16(),
            url,
        }
        .into());
    }

    let total_size = response.content_length();
    log::debug!("Download size: {:?} bytes", total_size);

    let tmp_name = format!(
        "{}.part",
        dest.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    let tmp_path = dest.with_file_name(tmp_name);

    let written = write_body(response, &tmp_path, total_size, ctx).await;
    let (downloaded, computed) = match written {
        Ok(stats) => stats,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    let mismatch = if total_size.is_some_and(|expected| expected != downloaded) {
        Some(DownloadError::ContentLengthMismatch {
            url: url.clone(),
            expected: total_size.unwrap_or_default(),
            actual: downloaded,
        })
    } else if expected_size.is_some_and(|expected| expected != downloaded) {
        Some(DownloadError::SizeMismatch {
            url: url.clone(),
            expected: expected_size.unwrap_or_default(),
            actual: downloaded,
        })
    } else {
        match expected_sha1 {
            Some(expected) if !computed.eq_ignore_ascii_case(expected) => {
                Some(DownloadError::ChecksumMismatch {
                    url: url.clone(),
                    expected: expected.to_string(),
                    actual: computed.clone(),
                })
            }
            _ => None,
        }
    };
    if let Some(error) = mismatch {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(error.into());
    }

    tokio::fs::rename(&tmp_path, dest)
        .await
        .with_context(|| format!("Failed to move {:?} into place", tmp_path))?;

    let secs = start.elapsed().as_secs_f64();
    log::info!(
        "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
        url,
        downloaded,
        secs,
        (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001)
    );
    ctx.set_progress(1.0);
    Ok(())
}

/// Stream the response body into `tmp_path`. Returns the byte count and the
/// SHA1 of what was written.
async fn write_body(
    response: reqwest::Response,
    tmp_path: &Path,
    total_size: Option<u64>,
    ctx: &TaskContext,
) -> Result<(u64, String)> {
    let mut file = File::create(tmp_path).await?;
    let mut hasher = Sha1::new();
    let mut downloaded: u64 = 0;
    let mut window_bytes: u64 = 0;
    let mut window_start = Instant::now();

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        ctx.check_cancelled()?;
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        window_bytes += chunk.len() as u64;

        if let Some(total) = total_size.filter(|t| *t > 0) {
            ctx.set_progress(downloaded as f64 / total as f64);
        }
        let elapsed = window_start.elapsed();
        if elapsed >= ctx.progress_interval() && !elapsed.is_zero() {
            let speed = window_bytes as f64 / 1024.0 / elapsed.as_secs_f64();
            ctx.set_message(&format!("{:.0} KB/s", speed));
            window_bytes = 0;
            window_start = Instant::now();
        }
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

/// Fetches a URL as text and publishes the body under its result key.
pub struct GetTask {
    attempts: Attempts,
    key: ResultKey<String>,
    client: Option<Client>,
    name: Option<String>,
}

impl GetTask {
    pub fn new(url: impl Into<String>, key: ResultKey<String>) -> Self {
        Self::with_candidates(vec![url.into()], key)
    }

    pub fn with_candidates(urls: Vec<String>, key: ResultKey<String>) -> Self {
        Self {
            attempts: Attempts::new(urls),
            key,
            client: None,
            name: None,
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.attempts.backoff = backoff;
        self
    }

    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn on_failed(mut self, hook: FailedHook) -> Self {
        self.attempts.on_failed = Some(hook);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn key(&self) -> &ResultKey<String> {
        &self.key
    }

    async fn fetch(self, ctx: TaskContext) -> Result<Outcome> {
        let client = match &self.client {
            Some(client) => client.clone(),
            None => default_client()?,
        };
        let what = self.attempts.urls.first().cloned().unwrap_or_default();
        let body = self
            .attempts
            .run(&ctx, &what, |url| fetch_text(&client, url))
            .await?;
        Ok(Outcome::publish(&self.key, body))
    }
}

impl Task for GetTask {
    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Fetch {}", self.key.id()))
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::Io
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(self.fetch(ctx))
    }
}

async fn fetch_text(client: &Client, url: String) -> Result<String> {
    log::debug!("Fetching: {}", url);
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status().as_u16(),
            url,
        }
        .into());
    }
    Ok(response.text().await?)
}
