//! Worker pool for per-article processing.
//!
//! `num_workers` tasks share one job queue. Each job carries its own oneshot
//! sender, so results can be collected in submission order regardless of
//! which worker finishes first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ProgressEvent;
use crate::migrator::{ArticleOutcome, ArticlePipeline, FailureKind};
use crate::source::ArticleSource;

/// One article submitted to the pool.
pub struct ArticleJob {
    pub source: ArticleSource,
    pub result_tx: oneshot::Sender<ArticleOutcome>,
    /// Zero-based position in the run.
    pub index: usize,
    pub total: usize,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks running the article pipeline.
///
/// Submit jobs via [`submit()`](MigrationPool::submit), receive results via
/// the oneshot receiver paired with each job.
pub struct MigrationPool {
    job_tx: async_channel::Sender<ArticleJob>,
    pool_handle: JoinHandle<()>,
}

impl MigrationPool {
    pub fn new(pipeline: Arc<ArticlePipeline>, cancel: CancellationToken, num_workers: usize) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ArticleJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for worker in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    pipeline.clone(),
                    cancel.clone(),
                )));
            }

            // Workers exit once job_tx closes and the queue drains.
            drop(job_rx);
            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: ArticleJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker: usize,
    rx: async_channel::Receiver<ArticleJob>,
    pipeline: Arc<ArticlePipeline>,
    cancel: CancellationToken,
) {
    while let Ok(job) = rx.recv().await {
        let outcome = if cancel.is_cancelled() {
            tracing::debug!(worker, article = %job.source.id, "skipping: cancelled");
            ArticleOutcome::cancelled(&job.source, job.index)
        } else {
            let run = pipeline.run(&job.source, job.index, job.total, job.progress.as_ref(), &cancel);
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(worker, article = %job.source.id, panic = %message, "article pipeline panicked");
                    (job.progress)(ProgressEvent::ArticleFailed {
                        index: job.index,
                        total: job.total,
                        id: job.source.id.clone(),
                        kind: FailureKind::ExtractionFailure,
                        reason: message.clone(),
                    });
                    ArticleOutcome::crashed(&job.source, job.index, &message)
                }
            }
        };
        let _ = job.result_tx.send(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let literal: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(literal.as_ref()), "index out of bounds");
        let formatted: Box<dyn Any + Send> = Box::new(format!("bad page {}", 7));
        assert_eq!(panic_message(formatted.as_ref()), "bad page 7");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
