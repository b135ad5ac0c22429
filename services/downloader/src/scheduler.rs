//! Region fetch runs.
//!
//! A run walks every configured zoom level, x outer and y inner, in bursts
//! sized by the [`Pacer`]. Within a burst up to `fetch.concurrency` fetches
//! are in flight. Shutdown is honoured between bursts and during pauses.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use map_common::{Layer, MapConfig, MapResult, TileCoord, TileRegion};
use projection::TilePlanner;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::fetch::{DownloadOutcome, TileFetcher};
use crate::metrics;
use crate::pacer::{BurstEnd, Pacer};

/// Per-outcome counts of a run or of one zoom level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: u64,
    pub cached: u64,
    pub network_failures: u64,
    pub rejected: u64,
    pub storage_errors: u64,
    pub pauses: u64,
    /// Zoom levels whose every tile was attempted
    pub zooms_completed: u32,
    /// The run stopped early on a shutdown signal
    pub interrupted: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Fetched => self.fetched += 1,
            DownloadOutcome::AlreadyCached => self.cached += 1,
            DownloadOutcome::NetworkFailure => self.network_failures += 1,
            DownloadOutcome::ServerRejected => self.rejected += 1,
        }
    }

    /// Tiles attempted, whatever the outcome.
    pub fn attempts(&self) -> u64 {
        self.fetched + self.cached + self.network_failures + self.rejected + self.storage_errors
    }

    fn merge(&mut self, other: &RunSummary) {
        self.fetched += other.fetched;
        self.cached += other.cached;
        self.network_failures += other.network_failures;
        self.rejected += other.rejected;
        self.storage_errors += other.storage_errors;
        self.pauses += other.pauses;
    }

    fn log(&self, message: &str, zoom: Option<u32>) {
        info!(
            zoom = ?zoom,
            fetched = self.fetched,
            cached = self.cached,
            network_failures = self.network_failures,
            rejected = self.rejected,
            storage_errors = self.storage_errors,
            pauses = self.pauses,
            "{}",
            message
        );
    }
}

/// Resolves when a shutdown signal arrives. A closed channel never fires.
async fn shutdown_signal(shutdown: &mut broadcast::Receiver<()>) {
    match shutdown.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        Err(broadcast::error::RecvError::Closed) => std::future::pending().await,
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    matches!(
        shutdown.try_recv(),
        Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_))
    )
}

/// One download run over the configured region and zoom levels.
pub struct FetchRun {
    config: Arc<MapConfig>,
    fetcher: Arc<TileFetcher>,
    pacer: Pacer,
    planner: TilePlanner,
}

impl FetchRun {
    pub fn new(config: Arc<MapConfig>, fetcher: Arc<TileFetcher>, pacer: Pacer) -> Self {
        Self {
            config,
            fetcher,
            pacer,
            planner: TilePlanner::default(),
        }
    }

    pub fn layer(&self) -> Layer {
        self.fetcher.layer()
    }

    /// Fetch every configured zoom level in order.
    ///
    /// Per-tile failures are counted and skipped. The run aborts with the
    /// last storage error once `fetch.max_storage_errors` storage failures
    /// happen in a row.
    #[instrument(skip_all, fields(layer = %self.layer()))]
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> MapResult<RunSummary> {
        let config = Arc::clone(&self.config);
        let mut total = RunSummary::default();
        let mut consecutive_storage_errors = 0u32;

        for &zoom in &config.region.zooms {
            let region = self
                .planner
                .plan(&config.region.corner1, &config.region.corner2, zoom);
            self.fetcher.store().ensure_zoom_dir(zoom)?;

            info!(
                zoom,
                start = %region.top_left(),
                end = %region.bottom_right(),
                total = region.len(),
                "Processing zoom level"
            );

            let zoom_summary = self
                .run_region(&region, &mut shutdown, &mut consecutive_storage_errors)
                .await?;

            total.merge(&zoom_summary);
            zoom_summary.log("Zoom level complete", Some(zoom));

            if zoom_summary.interrupted {
                total.interrupted = true;
                warn!(zoom, "Shutdown requested, stopping run");
                break;
            }
            total.zooms_completed += 1;
        }

        total.log("Download run complete", None);
        Ok(total)
    }

    async fn run_region(
        &mut self,
        region: &TileRegion,
        shutdown: &mut broadcast::Receiver<()>,
        consecutive_storage_errors: &mut u32,
    ) -> MapResult<RunSummary> {
        let layer = self.layer();
        let max_storage_errors = self.config.fetch.max_storage_errors.max(1);
        let concurrency = self.config.fetch.concurrency.max(1);
        let total = region.len();

        let mut summary = RunSummary::default();
        let mut tiles = region.tiles();
        let mut done = 0u64;

        while done < total {
            if shutdown_requested(shutdown) {
                summary.interrupted = true;
                return Ok(summary);
            }

            if self.pacer.at_burst_start() {
                info!(tiles = self.pacer.remaining(), "Downloading next {} tiles", self.pacer.remaining());
            }

            let left = (total - done) as usize;
            let batch: Vec<TileCoord> = tiles.by_ref().take(self.pacer.remaining().min(left)).collect();

            let fetcher = Arc::clone(&self.fetcher);
            let mut results = stream::iter(batch)
                .map(|coord| {
                    let fetcher = Arc::clone(&fetcher);
                    async move { (coord, fetcher.fetch(coord).await) }
                })
                .buffer_unordered(concurrency);

            let mut burst_end = None;
            while let Some((coord, result)) = results.next().await {
                done += 1;
                let progress = done as f64 * 100.0 / total as f64;

                let transferred = match result {
                    Ok(outcome) => {
                        *consecutive_storage_errors = 0;
                        summary.record(outcome);
                        metrics::record_outcome(layer, outcome);
                        info!(
                            zoom = coord.zoom,
                            x = coord.x,
                            y = coord.y,
                            progress = %format!("{:.2}%", progress),
                            outcome = ?outcome,
                            "GET {:>3} {:>10} {:>10} | {:6.2}% {}",
                            coord.zoom,
                            coord.x,
                            coord.y,
                            progress,
                            outcome.glyph()
                        );
                        outcome.is_transfer()
                    }
                    Err(e) => {
                        *consecutive_storage_errors += 1;
                        summary.storage_errors += 1;
                        metrics::record_storage_error(layer);
                        error!(
                            zoom = coord.zoom,
                            x = coord.x,
                            y = coord.y,
                            progress = %format!("{:.2}%", progress),
                            error = %e,
                            "GET {:>3} {:>10} {:>10} | {:6.2}% !",
                            coord.zoom,
                            coord.x,
                            coord.y,
                            progress
                        );
                        if *consecutive_storage_errors >= max_storage_errors {
                            error!(
                                consecutive = *consecutive_storage_errors,
                                "Too many storage errors, aborting run"
                            );
                            return Err(e);
                        }
                        false
                    }
                };

                if let Some(end) = self.pacer.record(transferred) {
                    burst_end = Some(end);
                }
            }

            match burst_end {
                Some(BurstEnd::Pause(pause)) => {
                    summary.pauses += 1;
                    metrics::record_pause(layer, pause);
                    info!(seconds = pause.as_secs(), "Sleeping for {} seconds", pause.as_secs());
                    tokio::select! {
                        _ = shutdown_signal(shutdown) => {
                            summary.interrupted = true;
                            return Ok(summary);
                        }
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                Some(BurstEnd::Skip { fetched }) => {
                    info!(
                        fetched,
                        threshold = self.config.pacing.transfer_threshold,
                        "Skipping pause: only {} tiles were downloaded in this burst",
                        fetched
                    );
                }
                None => {}
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        for outcome in [
            DownloadOutcome::Fetched,
            DownloadOutcome::Fetched,
            DownloadOutcome::AlreadyCached,
            DownloadOutcome::NetworkFailure,
            DownloadOutcome::ServerRejected,
        ] {
            summary.record(outcome);
        }
        summary.storage_errors = 1;
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.attempts(), 6);
    }

    #[tokio::test]
    async fn test_closed_channel_is_not_a_shutdown() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        drop(tx);
        assert!(!shutdown_requested(&mut rx));
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            shutdown_signal(&mut rx),
        )
        .await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_sent_signal_is_a_shutdown() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        tx.send(()).unwrap();
        assert!(shutdown_requested(&mut rx));
    }
}
