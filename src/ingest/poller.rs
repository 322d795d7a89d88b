//! Timer-driven consumer of the pending voice queue.
//!
//! Each tick drains up to a batch of due jobs, strictly one at a time, to
//! bound provider load and avoid interleaved writes to the same study. A
//! failed job stays pending and is retried on later ticks until the attempt
//! ceiling; a tick in flight finishes its current job even when the poller
//! is being stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::Clock;
use crate::adapters::MessagingApi;
use crate::domain::PendingVoiceJob;
use crate::storage::MediaStore;
use crate::store::StudyStore;
use crate::sync::MessageSyncer;

/// Poller tuning knobs.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between ticks.
    pub interval: Duration,
    /// Maximum jobs consumed per tick.
    pub batch_size: u32,
    /// Jobs stop being retried once they have failed this many times.
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 10,
            max_attempts: 20,
        }
    }
}

/// Summary of one tick, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub failed: usize,
}

/// Downloads queued voice replies and attaches them to their studies.
pub struct JobPoller {
    store: Arc<StudyStore>,
    api: Arc<dyn MessagingApi>,
    syncer: Arc<MessageSyncer>,
    media: MediaStore,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(
        store: Arc<StudyStore>,
        api: Arc<dyn MessagingApi>,
        syncer: Arc<MessageSyncer>,
        media: MediaStore,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            api,
            syncer,
            media,
            clock,
            config,
        }
    }

    /// Run one polling pass over the due jobs.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let now = self.clock.now().timestamp();
        let jobs = match self.store.due_voice_jobs(
            now,
            self.config.batch_size,
            self.config.max_attempts,
        ) {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "failed to select due voice jobs");
                return report;
            }
        };

        for job in jobs {
            match self.process_job(&job).await {
                Ok(()) => {
                    report.processed += 1;
                    // Mirror refresh is best-effort; the attachment is already
                    // durable and the job is done.
                    if let Err(err) = self.syncer.edit(job.study_id).await {
                        warn!(
                            study_id = job.study_id,
                            error = %err,
                            "mirror edit failed after voice attach"
                        );
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(job_id = job.id, error = %format!("{err:#}"), "voice job failed, leaving pending");
                    if let Err(err) = self.store.record_job_attempt(job.id) {
                        error!(job_id = job.id, error = %err, "failed to record job attempt");
                    }
                }
            }
        }

        if report != TickReport::default() {
            info!(
                processed = report.processed,
                failed = report.failed,
                "voice poll tick finished"
            );
        }
        report
    }

    /// Download, persist and attach one voice reply, then mark its job done.
    async fn process_job(&self, job: &PendingVoiceJob) -> Result<()> {
        let url = self
            .api
            .resolve_file(&job.file_id)
            .await
            .context("resolving file reference")?;
        let bytes = self
            .api
            .download_file(&url)
            .await
            .context("downloading audio")?;
        let dest = self
            .media
            .save_voice_reply(job.study_id, job.reply_message_id, &bytes)
            .await
            .context("persisting audio")?;

        self.store
            .attach_audio(job.study_id, &dest.to_string_lossy())
            .context("attaching audio to study")?;
        self.store.mark_job_done(job.id).context("marking job done")?;

        info!(
            job_id = job.id,
            study_id = job.study_id,
            path = %dest.display(),
            "voice reply attached"
        );
        Ok(())
    }

    /// Spawn the polling loop as a cancellable background task.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let poller = self;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.config.interval);
            // A slow tick delays the next one rather than bursting to catch up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = poller.config.interval.as_secs(),
                batch_size = poller.config.batch_size,
                "voice poller started"
            );

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        info!("voice poller stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        poller.tick().await;
                    }
                }
            }
        });

        PollerHandle { stop_tx, task }
    }
}

/// Handle to stop the polling loop.
///
/// Stopping prevents further ticks; a tick already past its timer completes
/// before the task exits.
pub struct PollerHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}
