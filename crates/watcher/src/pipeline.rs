//! The fetch/diff pipeline: discovery producer → worker pool → sink.
//!
//! Three stages hand off through bounded channels:
//! - the producer ticks on a fixed interval, queries the watch-list, and
//!   emits URLs onto the work channel (blocking when workers are saturated,
//!   which is the pipeline's backpressure);
//! - W workers drain the work channel, fetch, and push observations onto
//!   the results channel;
//! - a single sink consumes observations serially, runs freshness detection
//!   against stored history, and persists every observation.
//!
//! Channel close order is fixed: the producer closes the work channel, the
//! fan-in closer waits for all workers to exit and then closes the results
//! channel, and the sink loop ends naturally. Unrecoverable errors cancel
//! the shared token; cancellation is observed cooperatively between work
//! items, never mid-fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sitewatch_shared::{
    FetchObservation, Result, SiteWatchError, WatchStore, WatchUrl, WatcherConfig,
};

use crate::detect;
use crate::fetch::Fetch;

/// The watch pipeline. Construction validates the configuration; [`run`]
/// starts all stages and returns immediately. Control after that is
/// entirely via the shared cancellation token.
///
/// [`run`]: Watcher::run
#[derive(Debug)]
pub struct Watcher {
    workers: usize,
    tick: Duration,
    shutdown: CancellationToken,
}

impl Watcher {
    /// Create a pipeline sharing `shutdown` with the hosting process.
    ///
    /// Fails fast on a zero-size worker pool; a zero-throughput pipeline
    /// must never start silently.
    pub fn new(config: &WatcherConfig, shutdown: CancellationToken) -> Result<Self> {
        if config.workers == 0 {
            return Err(SiteWatchError::config("worker pool size must be at least 1"));
        }
        Ok(Self {
            workers: config.workers,
            tick: config.tick,
            shutdown,
        })
    }

    /// Start producer, workers, fan-in closer, and sink. Must be called
    /// within a tokio runtime; all tasks are detached.
    pub fn run(self, store: Arc<dyn WatchStore>, fetcher: Arc<dyn Fetch>) {
        // Capacity-1 channels: a send is a hand-off, not a buffer.
        let (work_tx, work_rx) = mpsc::channel::<WatchUrl>(1);
        let (result_tx, result_rx) = mpsc::channel::<FetchObservation>(1);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut pool = JoinSet::new();
        for _ in 0..self.workers {
            pool.spawn(worker(
                Arc::clone(&work_rx),
                result_tx.clone(),
                Arc::clone(&fetcher),
            ));
        }

        info!(workers = self.workers, tick_secs = self.tick.as_secs(), "starting watch pipeline");

        tokio::spawn(produce(
            self.tick,
            Arc::clone(&store),
            work_tx,
            self.shutdown.clone(),
        ));

        // Fan-in closer: hold the original results sender until every
        // worker has exited, then drop it so the sink can drain out.
        // JoinSet aborts its tasks on drop, so this task must own the pool.
        tokio::spawn(async move {
            while pool.join_next().await.is_some() {}
            drop(result_tx);
            debug!("worker pool drained, results channel closed");
        });

        tokio::spawn(consume(result_rx, store, self.shutdown.clone()));
    }
}

/// Discovery producer: tick, query the watch-list, emit URLs.
///
/// The first tick fires immediately so a fresh process does one discovery
/// pass at startup. A watch-list query failure is fatal: the producer
/// cancels the shared token and stops, closing the work channel on exit.
async fn produce(
    tick: Duration,
    store: Arc<dyn WatchStore>,
    work_tx: Sender<WatchUrl>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let urls = match store.distinct_watch_urls().await {
            Ok(urls) => urls,
            Err(error) => {
                error!(%error, "watch-list query failed");
                shutdown.cancel();
                break;
            }
        };

        debug!(count = urls.len(), "discovered watch urls");
        for url in urls {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                sent = work_tx.send(url) => {
                    if sent.is_err() {
                        // All workers gone; nothing left to feed.
                        return;
                    }
                }
            }
        }
    }
}

/// One fetch worker: pull a URL, fetch it, emit an observation.
///
/// A transport error is never fatal; it degrades to an empty-content
/// observation. The worker exits when the work channel is closed and
/// drained.
async fn worker(
    work_rx: Arc<Mutex<Receiver<WatchUrl>>>,
    result_tx: Sender<FetchObservation>,
    fetcher: Arc<dyn Fetch>,
) {
    loop {
        // Lock only for the receive so fetches run concurrently.
        let url = { work_rx.lock().await.recv().await };
        let Some(url) = url else { break };

        let content = match fetcher.fetch(&url).await {
            Ok(content) => content,
            Err(error) => {
                warn!(%url, %error, "fetch failed");
                String::new()
            }
        };

        let observation = FetchObservation {
            url,
            content,
            observed_at: Utc::now(),
        };

        if result_tx.send(observation).await.is_err() {
            break;
        }
    }
}

/// The sink: serially fold each observation into persisted history.
///
/// A single consumer keeps per-URL decisions ordered; a lookup or persist
/// failure would corrupt the most-recent invariant if dropped silently,
/// so both cancel the shared token and stop the stage.
async fn consume(
    mut result_rx: Receiver<FetchObservation>,
    store: Arc<dyn WatchStore>,
    shutdown: CancellationToken,
) {
    while let Some(observation) = result_rx.recv().await {
        let prior = match store.latest_record(&observation.url).await {
            Ok(prior) => prior,
            Err(error) => {
                error!(url = %observation.url, %error, "history lookup failed");
                shutdown.cancel();
                break;
            }
        };

        let record = detect::evaluate(&prior, &observation);
        debug!(url = %record.url, changed = record.is_most_recent, "persisting observation");

        if let Err(error) = store.persist_record(&record).await {
            error!(url = %record.url, %error, "persist failed");
            shutdown.cancel();
            break;
        }
    }
}
