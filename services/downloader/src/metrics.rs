//! Fetch counters.
//!
//! Counters go through the `metrics` facade; without an installed recorder
//! they are no-ops.

use std::time::Duration;

use map_common::Layer;
use metrics::counter;

use crate::fetch::DownloadOutcome;

pub fn record_outcome(layer: Layer, outcome: DownloadOutcome) {
    match outcome {
        DownloadOutcome::Fetched => {
            counter!("tiles_fetched_total", "layer" => layer.name()).increment(1)
        }
        DownloadOutcome::AlreadyCached => {
            counter!("tiles_cached_total", "layer" => layer.name()).increment(1)
        }
        DownloadOutcome::NetworkFailure => counter!(
            "tiles_failed_total",
            "layer" => layer.name(),
            "reason" => "network"
        )
        .increment(1),
        DownloadOutcome::ServerRejected => counter!(
            "tiles_failed_total",
            "layer" => layer.name(),
            "reason" => "rejected"
        )
        .increment(1),
    }
}

pub fn record_storage_error(layer: Layer) {
    counter!(
        "tiles_failed_total",
        "layer" => layer.name(),
        "reason" => "storage"
    )
    .increment(1);
}

pub fn record_pause(layer: Layer, pause: Duration) {
    counter!("fetch_pauses_total", "layer" => layer.name()).increment(1);
    counter!("fetch_pause_seconds_total", "layer" => layer.name()).increment(pause.as_secs());
}
