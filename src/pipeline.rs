use std::{path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        OwnedSemaphorePermit, Semaphore,
    },
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{
    artifact_store::{
        background_path, delete_file_if_exists, ensure_job_dir, result_location, video_path,
        voice_path,
    },
    captions::{tokenize, CaptionTimer},
    config::Config,
    error::{PipelineError, PipelineResult},
    job_store::{JobStore, JobUpdate, StoreError},
    media::MediaToolkit,
    models::{ErrorDetail, JobRecord},
    render::RenderEngine,
    tts::SpeechSynthesizer,
};

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] PipelineError),

    #[error("job queue is unavailable")]
    QueueUnavailable,
}

#[derive(Clone)]
pub struct Pipeline {
    store: JobStore,
    synthesizer: Arc<SpeechSynthesizer>,
    renderer: Arc<RenderEngine>,
    timer: Arc<CaptionTimer>,
    storage_root: PathBuf,
    permits: Arc<Semaphore>,
    queue_tx: mpsc::Sender<QueuedJob>,
}

impl Pipeline {
    pub fn new(
        store: JobStore,
        synthesizer: SpeechSynthesizer,
        renderer: RenderEngine,
        storage_root: PathBuf,
        max_concurrent_jobs: usize,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        let pipeline = Self {
            store,
            synthesizer: Arc::new(synthesizer),
            renderer: Arc::new(renderer),
            timer: Arc::new(CaptionTimer::even()),
            storage_root,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            queue_tx,
        };
        (pipeline, queue_rx)
    }

    pub fn from_config(
        config: &Config,
        store: JobStore,
        media: Arc<dyn MediaToolkit>,
    ) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (pipeline, queue_rx) = Self::new(
            store,
            SpeechSynthesizer::from_config(config, media.clone()),
            RenderEngine::from_config(config, media),
            config.storage_root.clone(),
            config.max_concurrent_jobs,
            config.queue_capacity,
        );
        (pipeline.with_caption_timer(CaptionTimer::from_config(config)), queue_rx)
    }

    pub fn with_caption_timer(mut self, timer: CaptionTimer) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validates and enqueues a script. Returns as soon as the `pending`
    /// record exists; no stage has run yet.
    pub async fn submit(&self, text: &str) -> Result<JobRecord, SubmitError> {
        self.synthesizer.validate(text)?;

        let record = self.store.create().await;
        let queued = QueuedJob {
            job_id: record.job_id.clone(),
            text: text.trim().to_string(),
        };

        if let Err(err) = self.queue_tx.try_send(queued) {
            self.store.remove(&record.job_id).await;
            match err {
                TrySendError::Full(_) => warn!("Job queue full, rejecting submission"),
                TrySendError::Closed(_) => error!("Job queue closed, rejecting submission"),
            }
            return Err(SubmitError::QueueUnavailable);
        }

        info!(job_id = %record.job_id, chars = text.trim().chars().count(), "Job queued");
        Ok(record)
    }

    /// Runs one admitted job to a terminal state, releasing its
    /// concurrency slot when done.
    pub async fn run_job(&self, job: QueuedJob, _permit: OwnedSemaphorePermit) {
        match self.execute(&job).await {
            Ok(record) => {
                info!(
                    job_id = %record.job_id,
                    result = record.result_location.as_deref().unwrap_or_default(),
                    "Job completed"
                );
            }
            Err(err) => self.fail(&job.job_id, err).await,
        }
    }

    async fn execute(&self, job: &QueuedJob) -> PipelineResult<JobRecord> {
        let job_id = job.job_id.as_str();

        self.synthesizer.validate(&job.text)?;
        self.advance(job_id, 0, "Starting").await?;

        ensure_job_dir(&self.storage_root, job_id)
            .await
            .map_err(|err| {
                PipelineError::synthesis("Could not prepare job storage", Some(format!("{err:#}")))
            })?;

        self.advance(job_id, 10, "Generating voiceover").await?;
        let audio = self
            .synthesizer
            .synthesize(&job.text, &voice_path(&self.storage_root, job_id))
            .await?;
        self.advance(
            job_id,
            30,
            format!("Voiceover generated ({:.1}s)", audio.duration_seconds),
        )
        .await?;

        self.advance(job_id, 45, "Syncing captions").await?;
        let words = tokenize(&job.text);
        let cues = self
            .timer
            .cues(&words, &audio.path, audio.duration_seconds)
            .await?;
        self.advance(job_id, 55, format!("Timed {} captions", cues.len()))
            .await?;

        self.advance(job_id, 60, "Rendering background").await?;
        let background = self
            .renderer
            .render_background(
                &background_path(&self.storage_root, job_id),
                audio.duration_seconds,
            )
            .await?;

        self.advance(job_id, 75, "Rendering video").await?;
        let video = self
            .renderer
            .composite(
                &background,
                &audio.path,
                &cues,
                &video_path(&self.storage_root, job_id),
            )
            .await?;
        info!(job_id = %job_id, video = %video.display(), "Video rendered");

        self.advance(job_id, 90, "Finalizing").await?;
        for intermediate in [&audio.path, &background] {
            if let Err(err) = delete_file_if_exists(intermediate).await {
                warn!(job_id = %job_id, "Failed removing intermediate: {err:#}");
            }
        }

        self.store
            .update(
                job_id,
                JobUpdate::Done {
                    message: "Done".to_string(),
                    result_location: result_location(job_id),
                },
            )
            .await
            .map_err(|err| store_failure(job_id, err))
    }

    async fn advance(
        &self,
        job_id: &str,
        progress: u8,
        message: impl Into<String>,
    ) -> PipelineResult<()> {
        let message = message.into();
        self.store
            .update(
                job_id,
                JobUpdate::Progress {
                    progress,
                    message: message.clone(),
                },
            )
            .await
            .map_err(|err| store_failure(job_id, err))?;

        info!(job_id = %job_id, progress, message = %message, "Job progress update");
        Ok(())
    }

    async fn fail(&self, job_id: &str, err: PipelineError) {
        error!(
            job_id = %job_id,
            code = err.code(),
            diagnostic = err.diagnostic().unwrap_or_default(),
            "Job failed: {err}"
        );

        let update = JobUpdate::Failed {
            message: err.public_message(),
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.public_message(),
            },
            diagnostic: err.diagnostic().map(str::to_string),
        };
        if let Err(store_err) = self.store.update(job_id, update).await {
            warn!(job_id = %job_id, "Could not record job failure: {store_err}");
        }
    }
}

fn store_failure(job_id: &str, err: StoreError) -> PipelineError {
    match err {
        StoreError::NotFound(_) => PipelineError::NotFound(format!("job {job_id}")),
        StoreError::AlreadyTerminal { .. } => PipelineError::NotFound(format!("active job {job_id}")),
    }
}

/// Feeds queued jobs to their own tasks, one per free concurrency slot.
///
/// A slot is taken before the next job is received, so jobs beyond the
/// ceiling wait inside the bounded queue (still `pending`) and count
/// against its capacity.
pub fn spawn_dispatcher(pipeline: Pipeline, mut queue_rx: mpsc::Receiver<QueuedJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Ok(permit) = pipeline.permits.clone().acquire_owned().await else {
                error!("Worker pool closed, dispatcher stopping");
                break;
            };
            let Some(job) = queue_rx.recv().await else {
                break;
            };
            info!(job_id = %job.job_id, "Dispatching job");
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run_job(job, permit).await });
        }
    })
}
