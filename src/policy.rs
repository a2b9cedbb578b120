//! Promotion policy: thresholds and actions, loaded once per invocation.

use crate::error::GitopsError;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::path::Path;

/// Default location of the policy document, relative to the repo root.
pub const DEFAULT_POLICY_PATH: &str = "ml/policies/promotion.yaml";

/// Minimum improvement a candidate must show on BOTH axes to promote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub r2_min_gain: f64,
    pub rmse_min_drop: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            r2_min_gain: 0.01,
            rmse_min_drop: 100.0,
        }
    }
}

/// What to do with a positive verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Actions {
    pub auto_promote: bool,
    pub target_overlay: String,
}

impl Default for Actions {
    fn default() -> Self {
        Self {
            auto_promote: true,
            target_overlay: "dev".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionPolicy {
    pub thresholds: Thresholds,
    pub actions: Actions,
}

/// Load the policy document, merging it field-by-field over the built-in
/// defaults. An absent file means defaults verbatim. A present field wins
/// only when it carries the right type (numeric for thresholds, bool/string
/// for actions); anything else keeps the default.
pub fn load_policy(path: &Path) -> Result<PromotionPolicy> {
    let mut policy = PromotionPolicy::default();
    if !path.exists() {
        return Ok(policy);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read policy {}", path.display()))?;
    let doc: Value = serde_yaml::from_str(&text)
        .map_err(|err| GitopsError::Config(format!("policy {}: {err}", path.display())))?;

    if let Some(value) = threshold_field(&doc, "r2_min_gain") {
        policy.thresholds.r2_min_gain = value;
    }
    if let Some(value) = threshold_field(&doc, "rmse_min_drop") {
        policy.thresholds.rmse_min_drop = value;
    }
    if let Some(value) = action_field(&doc, "auto_promote").and_then(Value::as_bool) {
        policy.actions.auto_promote = value;
    }
    if let Some(value) = action_field(&doc, "target_overlay").and_then(Value::as_str) {
        policy.actions.target_overlay = value.to_string();
    }
    Ok(policy)
}

fn threshold_field(doc: &Value, field: &str) -> Option<f64> {
    doc.get("thresholds")
        .and_then(|thresholds| thresholds.get(field))
        .and_then(Value::as_f64)
}

fn action_field<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    doc.get("actions").and_then(|actions| actions.get(field))
}
