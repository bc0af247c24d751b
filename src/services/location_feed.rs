//! Operator location feed.
//!
//! A [`LocationSource`] produces single position fixes; [`LocationFeed`]
//! turns one into an interval-driven stream of samples for continuous
//! tracking. Every fix is bounded by [`FIX_TIMEOUT`] so location
//! acquisition can never hang a caller, and a failed fix is an explicit
//! error sample, not a missing one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::models::location::Location;

/// Upper bound on a single position fix.
pub const FIX_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval for continuous tracking.
pub const TRACKING_INTERVAL: Duration = Duration::from_secs(30);

/// Why a position fix could not be produced. Timeouts and degraded accuracy
/// are deliberately distinct from a permission refusal: the former are
/// retried by the poll loop, the latter needs operator action.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("position fix timed out")]
    Timeout,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position accuracy too low ({accuracy_m} m)")]
    LowAccuracy { accuracy_m: f64 },

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// A source of the operator's current position.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Fetch the current position once. Callers additionally bound this
    /// with [`FIX_TIMEOUT`] via [`fetch_once`].
    async fn current_location(&self) -> Result<Location, LocationError>;
}

/// On-demand single fix for point-in-time checks, bounded by [`FIX_TIMEOUT`].
pub async fn fetch_once(source: &dyn LocationSource) -> Result<Location, LocationError> {
    timeout(FIX_TIMEOUT, source.current_location())
        .await
        .unwrap_or(Err(LocationError::Timeout))
}

/// Handle to a running interval poll task.
///
/// Samples (including failed fixes) arrive on the channel returned by
/// [`LocationFeed::start`]; the loop keeps polling after an error sample.
pub struct LocationFeed {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl LocationFeed {
    /// Spawn the poll task. The first sample is produced immediately, then
    /// one per `poll_interval`.
    pub fn start(
        source: Arc<dyn LocationSource>,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<Result<Location, LocationError>>) {
        let (tx, rx) = mpsc::channel(16);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let sample = fetch_once(source.as_ref()).await;
                        if let Err(ref e) = sample {
                            tracing::warn!(error = %e, "position fix failed");
                        }
                        if tx.send(sample).await.is_err() {
                            // Receiver gone; nothing left to feed.
                            break;
                        }
                    }
                }
            }
        });

        (Self { handle, shutdown }, rx)
    }

    /// Stop polling. The poll task is cancelled before this returns, so no
    /// further samples are queued afterwards.
    pub fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

/// Telematics-provider position endpoint payload. Coordinates are
/// GeoJSON-style `[longitude, latitude]`.
#[derive(Debug, Deserialize)]
struct PositionResponse {
    coordinates: [f64; 2],
    #[serde(default)]
    accuracy_m: Option<f64>,
}

/// Location source backed by the fleet telematics provider's HTTP API.
pub struct HttpLocationSource {
    client: reqwest::Client,
    position_url: String,
    max_accuracy_m: f64,
}

impl HttpLocationSource {
    /// `position_url` is the provider endpoint for the tracked vehicle;
    /// fixes with a reported accuracy worse than `max_accuracy_m` are
    /// rejected as [`LocationError::LowAccuracy`].
    pub fn new(position_url: &str, max_accuracy_m: f64) -> Result<Self, LocationError> {
        let client = reqwest::Client::builder()
            .timeout(FIX_TIMEOUT)
            .build()
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            position_url: position_url.to_string(),
            max_accuracy_m,
        })
    }
}

#[async_trait]
impl LocationSource for HttpLocationSource {
    async fn current_location(&self) -> Result<Location, LocationError> {
        let response = self
            .client
            .get(&self.position_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LocationError::Timeout
                } else {
                    LocationError::Unavailable(e.to_string())
                }
            })?;

        match response.status() {
            s if s == reqwest::StatusCode::FORBIDDEN || s == reqwest::StatusCode::UNAUTHORIZED => {
                return Err(LocationError::PermissionDenied);
            }
            s if !s.is_success() => {
                return Err(LocationError::Unavailable(format!(
                    "provider returned {s}"
                )));
            }
            _ => {}
        }

        let position: PositionResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        if let Some(accuracy_m) = position.accuracy_m {
            if accuracy_m > self.max_accuracy_m {
                return Err(LocationError::LowAccuracy { accuracy_m });
            }
        }

        Ok(Location::from_wire_pair(position.coordinates))
    }
}
