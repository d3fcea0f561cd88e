/**
 * Progress Stream
 *
 * Polls the ledger on a fixed interval and republishes the percentage
 * as Server-Sent Events until the subscriber goes away.
 */

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_stream::{wrappers::IntervalStream, Stream, StreamExt};

use crate::ledger::{DownloadKey, ProgressLedger};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
}

/// Endless poll of `key`. Ticks with no record emit nothing, so the
/// stream goes quiet once the download ends but never finishes itself.
pub fn subscribe(
    ledger: Arc<dyn ProgressLedger>,
    key: DownloadKey,
    every: Duration,
) -> impl Stream<Item = ProgressSnapshot> {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    IntervalStream::new(interval).filter_map(move |_| match ledger.peek(&key) {
        Ok(record) => record.map(|r| ProgressSnapshot { percent: r.percent }),
        Err(e) => {
            tracing::warn!("[Progress] Failed to read {}: {}", key, e);
            None
        }
    })
}

/// GET /download-progress/:feature/:model
pub async fn download_progress(
    State(state): State<AppState>,
    Path((feature, model)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = DownloadKey::new(&feature, &model);
    tracing::info!("[Progress] New subscriber for {}", key);

    let stream = subscribe(state.ledger.clone(), key, state.config.poll_interval())
        .map(|snapshot| Ok::<_, Infallible>(Event::default().data(snapshot.percent.to_string())));

    // Keep-alive comments also surface a dropped client once the
    // record is gone and no data frames are being written.
    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}
