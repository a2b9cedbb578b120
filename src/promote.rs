//! Model promotion: patch the serving overlay, commit, record provenance.
//!
//! The executor owns the overlay configuration file for the duration of one
//! promotion - a plain read-modify-write with no locking, so concurrent
//! promotions against the same overlay must be serialized by the caller.

use crate::error::GitopsError;
use crate::metrics::{evaluate, MetricsSnapshot};
use crate::policy::load_policy;
use crate::storage::{self, ProvenanceRecord};
use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use regex::{Captures, Regex};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// Overlays live here, one subdirectory per deployment variant.
pub const OVERLAY_ROOT: &str = "deploy-gitops/overlays";

/// Keys the serving component reads at startup. Substitution happens only
/// for keys already present verbatim in the target file.
const MODEL_PATH_KEY: &str = "MODEL_PATH";
const MODEL_FORMAT_KEY: &str = "MODEL_FORMAT";
const MODEL_META_KEY: &str = "MODEL_META_PATH";

const DEFAULT_COMMIT_NAME: &str = "ci-bot";
const DEFAULT_COMMIT_EMAIL: &str = "ci-bot@example.com";

/// Serialization formats the inference service recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Onnx,
    Pickle,
}

impl ModelFormat {
    pub fn from_uri(uri: &str) -> Self {
        if uri.to_ascii_lowercase().ends_with(".onnx") {
            Self::Onnx
        } else {
            Self::Pickle
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Pickle => "pkl",
        }
    }
}

/// Inputs for one promotion run.
pub struct PromotionRequest<'a> {
    pub current_metrics: &'a Path,
    pub candidate_metrics: &'a Path,
    pub model_uri: &'a str,
    pub policy_path: &'a Path,
}

/// Evaluate the candidate and, on a positive verdict, patch the target
/// overlay, commit under a deterministic identity, and record provenance.
pub fn run(request: &PromotionRequest<'_>) -> Result<()> {
    let policy = load_policy(request.policy_path)?;
    let current = MetricsSnapshot::load(request.current_metrics)?;
    let candidate = MetricsSnapshot::load(request.candidate_metrics)?;
    let verdict = evaluate(&current, &candidate, &policy.thresholds);

    if !verdict.improved {
        tracing::info!(reasons = ?verdict.reasons, "candidate rejected");
        println!("NOT IMPROVED: no promotion");
        return Ok(());
    }

    let overlay = policy.actions.target_overlay.clone();
    let overlay_dir = Path::new(OVERLAY_ROOT).join(&overlay);
    let config_path = serving_config_file(&overlay_dir);
    let format = ModelFormat::from_uri(request.model_uri);
    let metadata_uri = sibling_metadata_uri(request.model_uri);

    patch_serving_config(
        &config_path,
        request.model_uri,
        format,
        metadata_uri.as_deref(),
    )?;
    git_run(&["add", &config_path.display().to_string()])?;
    ensure_git_identity()?;
    let message = format!("chore: promote model -> {}", request.model_uri);
    git_run(&["commit", "-m", &message])?;
    tracing::info!(overlay = %overlay, config = %config_path.display(), "promotion committed");

    let record = ProvenanceRecord {
        overlay,
        when: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        by: env_or("GIT_AUTHOR_NAME", DEFAULT_COMMIT_NAME),
        reason: verdict.reasons.join(", "),
        model_uri: request.model_uri.to_string(),
    };
    // Best-effort from here on: the commit above is durable whatever happens
    // to the upload.
    storage::record_promotion(request.model_uri, &record);

    if policy.actions.auto_promote {
        println!("IMPROVED: promotion committed");
    } else {
        println!("IMPROVED: promotion committed (awaiting manual approval)");
    }
    Ok(())
}

/// The file promotion edits: the overlay's inference configmap patch when
/// present, the overlay's kustomization otherwise.
fn serving_config_file(overlay_dir: &Path) -> PathBuf {
    let patch = overlay_dir.join("patches").join("inference-configmap.yaml");
    if patch.exists() {
        patch
    } else {
        overlay_dir.join("kustomization.yaml")
    }
}

/// Metadata travels next to the artifact; only object-storage URIs have a
/// well-known sibling location.
fn sibling_metadata_uri(model_uri: &str) -> Option<String> {
    if !model_uri.starts_with("s3://") {
        return None;
    }
    model_uri
        .rsplit_once('/')
        .map(|(directory, _)| format!("{directory}/model-metadata.json"))
}

fn patch_serving_config(
    path: &Path,
    model_uri: &str,
    format: ModelFormat,
    metadata_uri: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read serving config {}", path.display()))?;
    let updated = rewrite_serving_keys(&text, model_uri, format, metadata_uri)?;
    if updated == text {
        return Err(GitopsError::Config(format!(
            "no serving keys ({MODEL_PATH_KEY}, {MODEL_FORMAT_KEY}, {MODEL_META_KEY}) found in {}",
            path.display()
        ))
        .into());
    }
    // Replace atomically so a crash mid-write cannot leave a torn config
    // for a later apply to pick up.
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut staged = NamedTempFile::new_in(parent.unwrap_or_else(|| Path::new(".")))
        .with_context(|| format!("stage replacement for {}", path.display()))?;
    staged
        .write_all(updated.as_bytes())
        .with_context(|| format!("write replacement for {}", path.display()))?;
    staged
        .persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn rewrite_serving_keys(
    text: &str,
    model_uri: &str,
    format: ModelFormat,
    metadata_uri: Option<&str>,
) -> Result<String> {
    let mut updated = text.to_string();
    if updated.contains(MODEL_PATH_KEY) {
        updated = substitute_quoted(&updated, MODEL_PATH_KEY, model_uri)?;
    }
    if updated.contains(MODEL_FORMAT_KEY) {
        updated = substitute_quoted(&updated, MODEL_FORMAT_KEY, format.as_str())?;
    }
    if let Some(metadata_uri) = metadata_uri {
        if updated.contains(MODEL_META_KEY) {
            updated = substitute_quoted(&updated, MODEL_META_KEY, metadata_uri)?;
        }
    }
    Ok(updated)
}

/// Rewrite every `KEY: "..."` occurrence to carry `value`, leaving the rest
/// of the file untouched.
fn substitute_quoted(text: &str, key: &str, value: &str) -> Result<String> {
    let pattern = format!("({}:\\s*)\".*?\"", regex::escape(key));
    let re = Regex::new(&pattern).context("build substitution pattern")?;
    let replaced = re.replace_all(text, |caps: &Captures<'_>| {
        format!("{}\"{value}\"", &caps[1])
    });
    Ok(replaced.into_owned())
}

fn ensure_git_identity() -> Result<()> {
    let name_set = git_capture(&["config", "user.name"])?.status.success();
    let email_set = git_capture(&["config", "user.email"])?.status.success();
    if name_set && email_set {
        return Ok(());
    }
    git_run(&[
        "config",
        "user.name",
        &env_or("GIT_AUTHOR_NAME", DEFAULT_COMMIT_NAME),
    ])?;
    git_run(&[
        "config",
        "user.email",
        &env_or("GIT_AUTHOR_EMAIL", DEFAULT_COMMIT_EMAIL),
    ])?;
    Ok(())
}

fn git_capture(args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .args(args)
        .output()
        .with_context(|| format!("run git {}", args.join(" ")))
}

fn git_run(args: &[&str]) -> Result<()> {
    let output = git_capture(args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        ));
    }
    Ok(())
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}
