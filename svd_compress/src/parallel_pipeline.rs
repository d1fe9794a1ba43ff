// THEORY:
// Compression is CPU-bound and can take seconds on a large image, while the
// engine itself is synchronous and never spawns threads. This module is the
// calling layer's half of that contract: it keeps heavy calls off the async
// runtime so request intake stays responsive.
//
// Shape:
// - Jobs go into one shared unbounded queue. A fixed number of worker tasks pull
//   from it, so an idle worker always takes the next job and a long job only
//   occupies the worker running it.
// - Each worker runs its job on tokio's blocking thread pool and answers on the
//   job's oneshot channel. With one in-flight job per worker, the worker count
//   bounds how many decompositions run at once.
// - Jobs share nothing. A job whose blocking task panics only fails its own caller,
//   and a caller that stops waiting only discards its own result. There is no
//   cancellation inside the engine.

use crate::error::CompressError;
use crate::pipeline::{CompressionConfig, CompressionPipeline, PixelArray, Report};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,
    #[error("worker stopped before returning a result")]
    WorkerLost,
    #[error(transparent)]
    Compress(#[from] CompressError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
        }
    }
}

pub struct CompressionTask {
    pub image: PixelArray,
    pub config: CompressionConfig,
    pub result_sender: oneshot::Sender<Result<Report, PoolError>>,
}

pub struct WorkerPool {
    task_sender: async_channel::Sender<CompressionTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts the workers. Must be called inside a tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let worker_count = config.workers.max(1);
        let (task_sender, task_receiver) = async_channel::unbounded::<CompressionTask>();
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let task_receiver = task_receiver.clone();
            let worker = tokio::spawn(async move {
                while let Ok(task) = task_receiver.recv().await {
                    let CompressionTask {
                        image,
                        config,
                        result_sender,
                    } = task;
                    tracing::trace!(worker = id, strategy = config.strategy.name(), "job started");

                    let outcome = tokio::task::spawn_blocking(move || {
                        CompressionPipeline::new(config).run(&image)
                    })
                    .await;

                    let result = match outcome {
                        Ok(result) => result.map_err(PoolError::from),
                        Err(join_error) => {
                            tracing::error!(worker = id, error = %join_error, "compression job panicked");
                            Err(PoolError::WorkerLost)
                        }
                    };
                    // The caller may have given up waiting; that only drops its result.
                    let _ = result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        tracing::debug!(workers = worker_count, "worker pool started");
        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn process(&self, image: PixelArray, config: CompressionConfig) -> Result<Report, PoolError> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .try_send(CompressionTask {
                image,
                config,
                result_sender,
            })
            .map_err(|_| PoolError::Closed)?;

        result_receiver.await.map_err(|_| PoolError::WorkerLost)?
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.task_sender.close();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// A cloneable handle for submitting compression jobs from async code.
#[derive(Clone)]
pub struct ParallelPipeline {
    pool: std::sync::Arc<WorkerPool>,
}

impl ParallelPipeline {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            pool: std::sync::Arc::new(WorkerPool::new(config)),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Compresses `image` on a worker and waits for the report.
    pub async fn process(&self, image: PixelArray, config: CompressionConfig) -> Result<Report, PoolError> {
        self.pool.process(image, config).await
    }
}
