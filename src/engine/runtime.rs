use crate::engine::pipeline::{ProcessorPipeline, PublishedCollection};
use crate::hal::{AcquisitionSource, SourceState};
use anyhow::{anyhow, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    Stopped,
    Initializing,
    Running,
    Error,
}

/// Drives a [`ProcessorPipeline`] from an [`AcquisitionSource`] on a
/// background task. Consumers read results through [`PublishedCollection`].
pub struct AcquisitionRuntime {
    source: Arc<Mutex<Box<dyn AcquisitionSource>>>,
    pipeline: Arc<Mutex<ProcessorPipeline>>,
    published: PublishedCollection,
    status: RuntimeStatus,
    shutdown_tx: Option<broadcast::Sender<()>>,
    reader_handle: Option<JoinHandle<Result<u64>>>,
}

impl AcquisitionRuntime {
    pub fn new(source: Box<dyn AcquisitionSource>, pipeline: ProcessorPipeline) -> Self {
        let published = pipeline.published();
        Self {
            source: Arc::new(Mutex::new(source)),
            pipeline: Arc::new(Mutex::new(pipeline)),
            published,
            status: RuntimeStatus::Stopped,
            shutdown_tx: None,
            reader_handle: None,
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        self.status
    }

    /// Shared pipeline, for rebinding decoders while running
    pub fn pipeline(&self) -> Arc<Mutex<ProcessorPipeline>> {
        Arc::clone(&self.pipeline)
    }

    pub fn published(&self) -> PublishedCollection {
        self.published.clone()
    }

    /// Open and start the source, then spawn the acquisition task
    pub async fn start(&mut self) -> Result<()> {
        if self.status == RuntimeStatus::Running {
            return Err(anyhow!("Runtime is already running"));
        }
        self.status = RuntimeStatus::Initializing;

        {
            let mut source = self.source.lock().await;
            if source.state() == SourceState::Unopened {
                if let Err(e) = source.open().await {
                    self.status = RuntimeStatus::Error;
                    return Err(e);
                }
            }
            if let Err(e) = source.start().await {
                self.status = RuntimeStatus::Error;
                return Err(e);
            }
            info!("Acquisition source {} started", source.name());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        self.shutdown_tx = Some(shutdown_tx);
        self.reader_handle = Some(self.spawn_acquisition_task(shutdown_rx));
        self.status = RuntimeStatus::Running;
        Ok(())
    }

    fn spawn_acquisition_task(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<Result<u64>> {
        let source = Arc::clone(&self.source);
        let pipeline = Arc::clone(&self.pipeline);

        tokio::spawn(async move {
            let mut published = 0u64;
            loop {
                let next = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    next = async { source.lock().await.read_acquisition().await } => next,
                };

                match next {
                    Ok(Some(raw)) => {
                        if pipeline.lock().await.handle_acquisition(Some(Arc::new(raw))) {
                            published += 1;
                        }
                    }
                    Ok(None) => {
                        info!("Acquisition source exhausted after {} captures", published);
                        break;
                    }
                    Err(e) => {
                        error!("Acquisition failed: {:#}", e);
                        return Err(e);
                    }
                }
            }
            Ok(published)
        })
    }

    /// Wait for the acquisition task to finish on its own, e.g. when the
    /// source is exhausted. Returns the number of published collections.
    pub async fn join(&mut self) -> Result<u64> {
        let Some(handle) = self.reader_handle.take() else {
            return Ok(0);
        };
        let result = handle.await.map_err(|e| anyhow!("Acquisition task panicked: {}", e))?;
        self.stop_source().await;
        self.shutdown_tx = None;
        self.status = if result.is_ok() {
            RuntimeStatus::Stopped
        } else {
            RuntimeStatus::Error
        };
        result
    }

    async fn stop_source(&self) {
        let mut source = self.source.lock().await;
        if let Err(e) = source.stop().await {
            warn!("Failed to stop source {}: {}", source.name(), e);
        }
    }

    /// Stop the acquisition task and the source
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.status == RuntimeStatus::Stopped && self.reader_handle.is_none() {
            return Ok(());
        }

        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.reader_handle.take() {
            match handle.await {
                Ok(Err(e)) => warn!("Acquisition task ended with error: {:#}", e),
                Err(e) => warn!("Acquisition task panicked: {}", e),
                Ok(Ok(_)) => {}
            }
        }

        self.stop_source().await;
        self.shutdown_tx = None;
        self.status = RuntimeStatus::Stopped;
        Ok(())
    }
}

impl Drop for AcquisitionRuntime {
    fn drop(&mut self) {
        // Async cleanup is impossible here; at least stop the task loop
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
    }
}
