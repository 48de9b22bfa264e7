//! Wires configuration, storage, the generation client, the queue and its
//! workers into one running process.

use crate::config::{Config, ProviderKind};
use crate::error::Result;
use crate::pipeline::{BookPipeline, spawn_event_recorder};
use crate::queue::{InMemoryJobQueue, WorkerPool};
use crate::service::BookService;
use crate::storage::{ArtifactStorage, FilesystemArtifactStorage, FilesystemBookStore};
use fable_generation::GenerationClient;
use fable_imaging::ImageOptimizer;
use fable_render_lopdf::{DocumentAssembler, ImagePreparer};
use fable_traits::{BookStore, JobQueue, QueueEvent};
use fable_types::BookId;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Builds the generation client the configuration asks for.
///
/// An `openai` provider without credentials degrades to the offline client.
pub fn build_generator(config: &Config) -> Result<GenerationClient> {
    let generation = config.generation_config()?;
    let client = match config.generation.provider {
        ProviderKind::Offline => GenerationClient::offline(config.storage.images_dir(), generation),
        ProviderKind::Openai => match Config::api_key() {
            Some(key) => GenerationClient::openai(
                config.openai_config(key),
                config.image_fetcher(),
                generation,
            ),
            None => {
                warn!(
                    "{} is not set, falling back to the offline provider",
                    crate::config::API_KEY_VAR
                );
                GenerationClient::offline(config.storage.images_dir(), generation)
            }
        },
    };
    Ok(client)
}

pub struct App {
    service: BookService,
    store: Arc<dyn BookStore>,
    queue: InMemoryJobQueue,
    workers: WorkerPool,
    recorder: JoinHandle<()>,
}

impl App {
    /// Filesystem-backed process using the configured provider.
    pub async fn start(config: &Config) -> Result<Self> {
        let store = Arc::new(FilesystemBookStore::new(config.storage.books_dir()).await?);
        let artifacts = Arc::new(FilesystemArtifactStorage::new(config.storage.pdfs_dir()).await?);
        let generator = Arc::new(build_generator(config)?);
        info!(
            data_dir = %config.storage.data_dir.display(),
            workers = config.queue.workers,
            "Starting book service"
        );
        Ok(Self::with_parts(config, store, generator, artifacts))
    }

    /// Assembles a process from explicit collaborators. Must be called inside
    /// a tokio runtime.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn BookStore>,
        generator: Arc<GenerationClient>,
        artifacts: Arc<dyn ArtifactStorage>,
    ) -> Self {
        let preparer = ImagePreparer::new(
            generator.fetcher(),
            ImageOptimizer::new(config.optimizer_config()),
        );
        let pipeline = Arc::new(BookPipeline::new(
            store.clone(),
            generator,
            DocumentAssembler::new(preparer),
            artifacts,
            config.storage.work_dir(),
        ));

        let queue = InMemoryJobQueue::new();
        let recorder = spawn_event_recorder(store.clone(), queue.subscribe());
        let workers = queue.start(pipeline, config.queue.workers);
        let service = BookService::new(store.clone(), Arc::new(queue.clone()), config.job_options());

        Self {
            service,
            store,
            queue,
            workers,
            recorder,
        }
    }

    pub fn service(&self) -> &BookService {
        &self.service
    }

    pub fn store(&self) -> Arc<dyn BookStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> &InMemoryJobQueue {
        &self.queue
    }

    /// Queue events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    /// Waits for the job of `book_id` to complete or fail for good.
    /// `None` if the event stream ends first.
    pub async fn wait_for(
        events: &mut broadcast::Receiver<QueueEvent>,
        book_id: BookId,
    ) -> Option<QueueEvent> {
        loop {
            match events.recv().await {
                Ok(event) if event.book_id() == book_id => match event {
                    QueueEvent::Completed { .. } | QueueEvent::Failed { will_retry: false, .. } => {
                        return Some(event);
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed queue events"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stops accepting jobs, lets the workers drain, then waits for the event
    /// recorder to write the remaining events. The recorder ends once every
    /// handle to the queue, including clones of the service, is dropped.
    pub async fn shutdown(self) {
        let Self {
            service,
            store: _,
            queue,
            workers,
            recorder,
        } = self;
        queue.close();
        workers.join().await;
        drop(service);
        drop(queue);
        if let Err(e) = recorder.await {
            warn!("Event recorder ended abnormally: {}", e);
        }
        info!("Book service stopped");
    }
}
