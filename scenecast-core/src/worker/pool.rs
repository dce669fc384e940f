use std::sync::Arc;

use rayon::prelude::*;

use crate::foundation::error::{RenderError, RenderResult};
use crate::page::BrowserLauncher;
use crate::timing::window::RecordWindow;
use crate::worker::child::{
    CaptureWorker, ChildOptions, IsolatedWorker, PrimaryWorker, RecordOptions, WorkerState,
};

/// Owns every capture worker of a run and fans work out to them.
///
/// Worker 0 reuses the page the render opened; workers `1..multi` launch their own browsers.
/// Each phase runs on all workers concurrently and completes before the next one starts.
pub struct WorkerPool {
    workers: Vec<Box<dyn CaptureWorker>>,
    options: ChildOptions,
}

impl WorkerPool {
    pub fn new(primary: PrimaryWorker, options: ChildOptions) -> Self {
        Self {
            workers: vec![Box::new(primary)],
            options,
        }
    }

    /// Build a pool from arbitrary workers; their `index()` drives stride assignment.
    pub fn from_workers(
        workers: Vec<Box<dyn CaptureWorker>>,
        options: ChildOptions,
    ) -> RenderResult<Self> {
        if workers.is_empty() {
            return Err(RenderError::capture("worker pool needs at least one worker"));
        }
        Ok(Self { workers, options })
    }

    /// Add isolated workers until the pool holds `multi` workers (at least one).
    pub fn spawn_isolated(&mut self, launcher: Arc<dyn BrowserLauncher>, multi: usize) {
        for index in self.workers.len()..multi.max(1) {
            self.workers
                .push(Box::new(IsolatedWorker::new(index, launcher.clone())));
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn options(&self) -> &ChildOptions {
        &self.options
    }

    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(|w| w.state()).collect()
    }

    pub fn start_all(&mut self) -> RenderResult<()> {
        tracing::info!(workers = self.workers.len(), "Start Workers");
        let options = self.options.clone();
        let results = self.fan_out(|worker| worker.start(&options))?;
        first_error(results).map(|_| ())
    }

    /// Capture `window` with stride distribution. Returns the number of frames written.
    pub fn record_all(&mut self, window: &RecordWindow) -> RenderResult<u64> {
        let workers = self.workers.len();
        let results = self.fan_out(|worker| {
            let rec = RecordOptions {
                start_frame: window.start_frame,
                end_frame: window.end_frame,
                worker_index: worker.index(),
                workers,
            };
            worker.record(&rec)
        })?;
        Ok(first_error(results)?.into_iter().sum())
    }

    /// Disconnect every connected worker, even when some of them fail to close.
    pub fn disconnect_all(&mut self) -> RenderResult<()> {
        let mut first = None;
        for worker in &mut self.workers {
            if worker.state() == WorkerState::Disconnected {
                continue;
            }
            if let Err(e) = worker.disconnect() {
                tracing::warn!(worker = worker.index(), error = %e, "failed to disconnect worker");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start, record and disconnect. Workers are disconnected whatever the outcome.
    pub fn capture(&mut self, window: &RecordWindow) -> RenderResult<u64> {
        let result = self.start_all().and_then(|()| self.record_all(window));
        let disconnected = self.disconnect_all();
        let frames = result?;
        disconnected?;

        if frames != window.frame_count() {
            return Err(RenderError::capture(format!(
                "captured {frames} frames, expected {}",
                window.frame_count()
            )));
        }
        tracing::debug!(frames, "captured all frames");
        Ok(frames)
    }

    fn fan_out<T, F>(&mut self, f: F) -> RenderResult<Vec<RenderResult<T>>>
    where
        T: Send,
        F: Fn(&mut dyn CaptureWorker) -> RenderResult<T> + Send + Sync,
    {
        let pool = build_thread_pool(self.workers.len())?;
        Ok(pool.install(|| {
            self.workers
                .par_iter_mut()
                .map(|worker| f(worker.as_mut()))
                .collect()
        }))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect_all() {
            tracing::warn!(error = %e, "failed to disconnect workers");
        }
    }
}

fn first_error<T>(results: Vec<RenderResult<T>>) -> RenderResult<Vec<T>> {
    results.into_iter().collect()
}

fn build_thread_pool(threads: usize) -> RenderResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| RenderError::capture(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/worker/pool.rs"]
mod tests;
