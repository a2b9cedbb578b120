//! Metrics snapshots and the candidate-vs-current evaluation.

use crate::policy::Thresholds;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Metrics attached to a trained model: metric name -> value. Only `r2` and
/// `rmse` drive the verdict; everything else (`mae`, ...) rides along
/// opaquely into the comparison artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot(serde_json::Map<String, Value>);

impl MetricsSnapshot {
    /// Load a metrics document. An absent file is an empty snapshot, not an
    /// error - it means no model has been deployed (or trained) yet.
    /// Malformed JSON is still fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read metrics {}", path.display()))?;
        let map = serde_json::from_str(&text)
            .with_context(|| format!("parse metrics {}", path.display()))?;
        Ok(Self(map))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn metric(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    fn r2(&self) -> f64 {
        self.metric("r2").unwrap_or(0.0)
    }

    /// Missing rmse defaults to +inf so an absent candidate rmse can never
    /// appear to improve on the current model.
    fn rmse(&self) -> f64 {
        self.metric("rmse").unwrap_or(f64::INFINITY)
    }
}

/// Outcome of one evaluation. Produced fresh per call; persisted only inside
/// the comparison artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub improved: bool,
    pub reasons: Vec<String>,
    pub thresholds: Thresholds,
}

/// Compare a candidate model's metrics against the currently deployed one.
///
/// Both conditions are required (AND, not OR): a model that improves R2 but
/// regresses RMSE, or vice versa, is not promoted. Reasons always carry the
/// signed 4-decimal deltas for traceability, whatever the verdict.
pub fn evaluate(
    current: &MetricsSnapshot,
    candidate: &MetricsSnapshot,
    thresholds: &Thresholds,
) -> Verdict {
    if candidate.is_empty() {
        return Verdict {
            improved: false,
            reasons: vec!["candidate metrics unavailable".to_string()],
            thresholds: thresholds.clone(),
        };
    }
    if current.is_empty() {
        // First deployment always promotes.
        return Verdict {
            improved: true,
            reasons: vec!["no current model".to_string()],
            thresholds: thresholds.clone(),
        };
    }

    let r2_gain = candidate.r2() - current.r2();
    let rmse_delta = candidate.rmse() - current.rmse();
    let rmse_drop = -rmse_delta;
    let improved =
        r2_gain >= thresholds.r2_min_gain && rmse_drop >= thresholds.rmse_min_drop;
    Verdict {
        improved,
        reasons: vec![
            format!("r2 {r2_gain:+.4}"),
            format!("rmse {rmse_delta:+.4}"),
        ],
        thresholds: thresholds.clone(),
    }
}
