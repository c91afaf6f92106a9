//! Download scheduler
//!
//! This module turns candidates into outcomes:
//! - Cache-driven skips for artifacts that are still fresh
//! - At-most-one task in flight per normalized URL
//! - Probe, download and signature validation per attempt
//! - Retries with backoff for transient faults
//! - Bounded worker concurrency; outcomes arrive in completion order

use crate::cache::{fingerprint, CacheEntry, CacheStatus, IncrementalCache};
use crate::classifier::{confirm, content_type_signal, has_pdf_signature, Signal, Verdict};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::{FetchError, PageFetcher, RateLimiter, TaskError};
use crate::state::{Candidate, DownloadTask, Outcome, SeedGroup};
use crate::store::{artifact_key, ArtifactMetadata, ArtifactStore};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Result of one successful attempt
enum Completed {
    /// New content was stored under the task's destination
    Stored { bytes: u64 },
    /// Remote content is unchanged and already stored under `key`
    Unchanged { key: String },
}

/// Executes download tasks for discovered candidates
pub struct DownloadScheduler {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    cache: IncrementalCache,
    store: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
    probe_timeout: Duration,
    request_timeout: Duration,
    max_artifact_bytes: u64,
    min_artifact_bytes: u64,
    organize_by_group: bool,

    /// Worker pool shared by every `schedule` call, so concurrent groups
    /// together never exceed the configured worker count
    workers: Arc<Semaphore>,
}

impl DownloadScheduler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<RateLimiter>,
        cache: IncrementalCache,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            cache,
            store,
            retry: RetryPolicy::default(),
            probe_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_artifact_bytes: 50 * 1024 * 1024,
            min_artifact_bytes: 0,
            organize_by_group: true,
            workers: Arc::new(Semaphore::new(5)),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(workers.max(1)));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, probe: Duration, request: Duration) -> Self {
        self.probe_timeout = probe;
        self.request_timeout = request;
        self
    }

    pub fn with_max_artifact_bytes(mut self, max: u64) -> Self {
        self.max_artifact_bytes = max;
        self
    }

    pub fn with_min_artifact_bytes(mut self, min: u64) -> Self {
        self.min_artifact_bytes = min;
        self
    }

    pub fn with_organize_by_group(mut self, organize: bool) -> Self {
        self.organize_by_group = organize;
        self
    }

    /// Schedules downloads for a group's candidates
    ///
    /// At most `concurrency` tasks run at once. Outcomes are yielded as tasks
    /// finish. Once `deadline` passes no further task is dispatched; tasks
    /// already running finish normally, so the stream may end before every
    /// candidate has an outcome.
    pub fn schedule<'a>(
        &'a self,
        group: &SeedGroup,
        candidates: Vec<Candidate>,
        concurrency: usize,
        deadline: Option<Instant>,
    ) -> impl Stream<Item = Outcome> + 'a {
        let group_id = group.id.clone();
        let category = group.category.clone();

        stream::iter(candidates)
            .take_while(move |_| {
                let open = deadline.map_or(true, |d| Instant::now() < d);
                if !open {
                    info!("run deadline passed, no further downloads dispatched");
                }
                futures::future::ready(open)
            })
            .map(move |candidate| {
                let destination = artifact_key(
                    &group_id,
                    category.as_deref(),
                    &candidate.url,
                    self.organize_by_group,
                );
                self.run_task(DownloadTask::new(candidate, destination))
            })
            .buffer_unordered(concurrency.max(1))
    }

    /// Runs one candidate to its terminal outcome
    #[instrument(skip_all, fields(url = %task.key()))]
    async fn run_task(&self, mut task: DownloadTask) -> Outcome {
        let url = task.key().to_string();

        let Ok(_permit) = self.workers.acquire().await else {
            return Outcome::failed(&url, 0, "worker pool closed");
        };

        let Some(_claim) = self.cache.claim(&url) else {
            debug!("already in flight");
            return Outcome::duplicate(&url, Some(&task.destination), 0);
        };

        let previous = match self.cache.lookup(&url) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cache lookup failed, downloading");
                None
            }
        };

        if let Some(entry) = &previous {
            if entry.status == CacheStatus::Fresh && entry.fingerprint.is_some() {
                let stored = entry
                    .artifact_key
                    .clone()
                    .unwrap_or_else(|| task.destination.clone());
                if self.store.exists_fresh(&stored).await {
                    debug!("fresh in cache, skipping");
                    return Outcome::duplicate(&url, Some(&stored), 0);
                }
            }
        }

        loop {
            if let Some(at) = task.next_eligible.take() {
                tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            }
            task.attempt += 1;

            let error = match self.attempt(&task, previous.as_ref()).await {
                Ok(completed) => return self.complete(&task, completed),
                Err(e) => e,
            };

            match self
                .retry
                .should_retry_after(error.failure_kind(), task.attempt, error.retry_after())
            {
                RetryDecision::Retry { delay, attempt } => {
                    debug!(
                        attempt = task.attempt,
                        next_attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "download attempt failed, will retry"
                    );
                    task.next_eligible = Some(Instant::now() + delay);
                }
                RetryDecision::DoNotRetry { reason } => {
                    return self.give_up(&task, error, &reason);
                }
            }
        }
    }

    /// One probe-download-validate-store pass
    async fn attempt(
        &self,
        task: &DownloadTask,
        previous: Option<&CacheEntry>,
    ) -> Result<Completed, TaskError> {
        let candidate = &task.candidate;
        let url = &candidate.url;

        self.limiter.acquire_url(url).await;
        let probe = match self.fetcher.probe(url, self.probe_timeout).await {
            Ok(probe) => Some(probe),
            Err(e) if matches!(e.status(), Some(405) | Some(501)) => {
                debug!("probe not supported by server");
                None
            }
            Err(e) => return Err(e.into()),
        };

        match &probe {
            Some(probe) => {
                let confirmed = confirm(
                    candidate,
                    probe.content_type.as_deref(),
                    probe.content_disposition.as_deref(),
                );
                match confirmed.verdict {
                    Verdict::Accepted => {}
                    Verdict::Rejected => {
                        return Err(TaskError::invalid(format!(
                            "declared content type {}",
                            probe.content_type.as_deref().unwrap_or("unknown")
                        )))
                    }
                    Verdict::Tentative | Verdict::NotCandidate => {
                        return Err(TaskError::invalid("content type not confirmed by probe"))
                    }
                }

                if let Some(length) = probe.content_length {
                    if length > self.max_artifact_bytes {
                        return Err(FetchError::TooLarge {
                            url: url.to_string(),
                            size: length,
                            limit: self.max_artifact_bytes,
                        }
                        .into());
                    }
                }

                if let Some(key) = self.unchanged_by_validator(previous, probe.validator.as_deref()).await {
                    return Ok(Completed::Unchanged { key });
                }
            }
            None if candidate.verdict != Verdict::Accepted => {
                return Err(TaskError::invalid("content type not confirmed by probe"));
            }
            None => {}
        }

        self.limiter.acquire_url(url).await;
        let response = self
            .fetcher
            .download(url, self.request_timeout, self.max_artifact_bytes)
            .await?;

        if let Some(Signal::NonTarget(mime)) = content_type_signal(
            response.content_type.as_deref(),
            response.content_disposition.as_deref(),
        ) {
            return Err(TaskError::invalid(format!("served content type {}", mime)));
        }
        if !has_pdf_signature(&response.body) {
            return Err(TaskError::invalid("missing %PDF- signature"));
        }
        if (response.body.len() as u64) < self.min_artifact_bytes {
            return Err(TaskError::invalid(format!(
                "body too small ({} < {} bytes)",
                response.body.len(),
                self.min_artifact_bytes
            )));
        }

        let fingerprint = fingerprint(&response.body);
        if let Some(entry) = previous {
            if entry.fingerprint.as_deref() == Some(fingerprint.as_str()) {
                if let Some(key) = &entry.artifact_key {
                    if self.store.exists_fresh(key).await {
                        return Ok(Completed::Unchanged { key: key.clone() });
                    }
                }
            }
        }

        let metadata = ArtifactMetadata {
            source_url: url.to_string(),
            source_page: candidate.source_page.to_string(),
            content_type: response.content_type.clone(),
            fingerprint: fingerprint.clone(),
        };
        self.store
            .store(&task.destination, &response.body, &metadata)
            .await?;

        let bytes = response.body.len() as u64;
        self.cache.record_entry(
            &CacheEntry::artifact(task.key(), Some(fingerprint), CacheStatus::Fresh)
                .with_validator(response.validator)
                .with_artifact(&task.destination, bytes),
        )?;

        Ok(Completed::Stored { bytes })
    }

    /// Returns the stored key when the probe's validator matches the cached one
    async fn unchanged_by_validator(
        &self,
        previous: Option<&CacheEntry>,
        validator: Option<&str>,
    ) -> Option<String> {
        let entry = previous?;
        let validator = validator?;
        if entry.fingerprint.is_none() || entry.validator.as_deref() != Some(validator) {
            return None;
        }

        let key = entry.artifact_key.as_deref()?;
        self.store
            .exists_fresh(key)
            .await
            .then(|| key.to_string())
    }

    fn complete(&self, task: &DownloadTask, completed: Completed) -> Outcome {
        let url = task.key();
        match completed {
            Completed::Stored { bytes } => {
                info!(bytes, attempts = task.attempt, key = %task.destination, "downloaded");
                Outcome::downloaded(url, &task.destination, bytes, task.attempt)
            }
            Completed::Unchanged { key } => {
                if let Err(e) = self.cache.refresh(url) {
                    warn!(error = %e, "failed to refresh cache entry");
                }
                debug!(key = %key, "unchanged since last download");
                Outcome::duplicate(url, Some(&key), task.attempt)
            }
        }
    }

    fn give_up(&self, task: &DownloadTask, error: TaskError, reason: &str) -> Outcome {
        let url = task.key();

        // Keep an entry for every terminal outcome; a stored fingerprint survives
        if let Err(e) = self.cache.record_entry(&CacheEntry::artifact(url, None, CacheStatus::Unknown)) {
            warn!(error = %e, "failed to record outcome in cache");
        }

        match error {
            TaskError::Invalid { reason: detail } => {
                info!(attempts = task.attempt, reason = %detail, "skipped, not a PDF");
                Outcome::invalid(url, task.attempt, format!("invalid: {}", detail))
            }
            other => {
                warn!(attempts = task.attempt, error = %other, reason, "download failed");
                Outcome::failed(
                    url,
                    task.attempt,
                    format!("{}: {}", other.kind_label(), other),
                )
            }
        }
    }
}
