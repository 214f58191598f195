use serde::Serialize;
use serde_json::Value;

use crate::envelope::value_as_f64;
use crate::error::{ClientError, ClientResult};

pub const DEFAULT_SPIKE_THRESHOLD_GB: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeReport {
    pub spiked: bool,
    pub usage_diff: f64,
    pub threshold: f64,
    pub message: String,
}

/// Flags a spike when `usage_diff` is strictly greater than the threshold
/// (default 1 GB).
pub fn detect_spike(usage_diff: f64, threshold: Option<f64>) -> ClientResult<SpikeReport> {
    if !usage_diff.is_finite() {
        return Err(ClientError::Validation(format!(
            "usage_diff must be a finite number, got {}",
            usage_diff
        )));
    }
    let threshold = threshold.unwrap_or(DEFAULT_SPIKE_THRESHOLD_GB);
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ClientError::Validation(format!(
            "threshold must be a non-negative number, got {}",
            threshold
        )));
    }

    let spiked = usage_diff > threshold;
    let message = if spiked {
        tracing::warn!(usage_diff, threshold, "usage spike detected");
        format!(
            "Spike detected! Your usage increased by {}GB in the last interval, which is above the threshold of {}GB. Please check your activity.",
            usage_diff, threshold
        )
    } else {
        tracing::debug!(usage_diff, threshold, "no usage spike");
        format!(
            "No spike detected. Usage: {}GB is within the safe limit of {}GB.",
            usage_diff, threshold
        )
    };

    Ok(SpikeReport {
        spiked,
        usage_diff,
        threshold,
        message,
    })
}

/// Like [`detect_spike`], reading the delta from a `{"usage_diff": n}` object.
pub fn detect_spike_in(payload: &Value, threshold: Option<f64>) -> ClientResult<SpikeReport> {
    let raw = payload.get("usage_diff").ok_or_else(|| {
        ClientError::Validation("expected an object with a usage_diff field".to_string())
    })?;
    let usage_diff = value_as_f64(raw).ok_or_else(|| {
        ClientError::Validation(format!("usage_diff is not a number: {}", raw))
    })?;
    detect_spike(usage_diff, threshold)
}

/// Keeps the previous total-usage reading so consecutive polls can be turned
/// into deltas. In-memory only.
#[derive(Debug, Clone)]
pub struct SpikeTracker {
    threshold: f64,
    last_used: Option<f64>,
}

impl SpikeTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_used: None,
        }
    }

    pub fn last_used(&self) -> Option<f64> {
        self.last_used
    }

    /// Records a new total-usage reading. Returns `None` for the first
    /// reading. A drop in usage (quota reset) counts as a zero delta.
    pub fn observe(&mut self, total_used: f64) -> ClientResult<Option<SpikeReport>> {
        if !total_used.is_finite() || total_used < 0.0 {
            return Err(ClientError::Validation(format!(
                "total usage must be a non-negative number, got {}",
                total_used
            )));
        }
        let previous = self.last_used.replace(total_used);
        let Some(previous) = previous else {
            return Ok(None);
        };
        let usage_diff = (total_used - previous).max(0.0);
        detect_spike(usage_diff, Some(self.threshold)).map(Some)
    }
}

impl Default for SpikeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_THRESHOLD_GB)
    }
}
