use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;

/// A fixed-size pool of threads that runs one stage of a batch.
///
/// Each call to [`WorkerPool::run`] starts `worker_count` scoped threads,
/// feeds them through a bounded channel and blocks until every item has
/// been handled. Results come back in completion order.
pub struct WorkerPool {
    name: String,
    worker_count: usize,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(name: impl Into<String>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        Self {
            name: name.into(),
            worker_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs `work` over every item and returns the outputs.
    ///
    /// A worker that panics loses the item it was holding; the panic is
    /// logged when the worker is joined and the remaining workers carry on.
    pub fn run<I, O, F>(&self, items: Vec<I>, work: F) -> Result<Vec<O>, WorkerError>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.worker_count.min(total);
        let (item_sender, item_receiver) = bounded::<I>(workers * 2);
        let (result_sender, result_receiver) = bounded::<O>(workers * 2);
        let work = &work;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let item_rx = item_receiver.clone();
                let result_tx = result_sender.clone();
                let handle = thread::Builder::new()
                    .name(format!("{}-{}", self.name, worker_id))
                    .spawn_scoped(scope, move || {
                        run_worker(worker_id, item_rx, result_tx, work)
                    })
                    .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
                handles.push(handle);
            }
            drop(item_receiver);
            drop(result_sender);

            info!("Started {} {} workers for {} items", workers, self.name, total);

            let feeder = thread::Builder::new()
                .name(format!("{}-feeder", self.name))
                .spawn_scoped(scope, move || feed(item_sender, items))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            let results: Vec<O> = result_receiver.iter().collect();

            if feeder.join().is_err() {
                error!("{} feeder panicked", self.name);
            }
            for (i, handle) in handles.into_iter().enumerate() {
                if let Err(e) = handle.join() {
                    error!("{} worker {} panicked: {:?}", self.name, i, e);
                } else {
                    debug!("{} worker {} finished", self.name, i);
                }
            }

            if results.len() < total {
                warn!(
                    "{} pool returned {} of {} results",
                    self.name,
                    results.len(),
                    total
                );
            }
            Ok(results)
        })
    }
}

fn feed<I>(sender: Sender<I>, items: Vec<I>) {
    for item in items {
        if sender.send(item).is_err() {
            // Every worker is gone.
            break;
        }
    }
}

fn run_worker<I, O, F>(worker_id: usize, items: Receiver<I>, results: Sender<O>, work: &F)
where
    F: Fn(I) -> O,
{
    debug!("Worker {} started", worker_id);

    for item in items.iter() {
        let output = work(item);
        if let Err(e) = results.send(output) {
            error!("Worker {} failed to send result: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}
