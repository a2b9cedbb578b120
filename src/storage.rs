//! Provenance records and their best-effort upload to object storage.
//!
//! Uploads go through the `aws` CLI rather than an in-process client; this
//! tool's whole surface is subprocess orchestration, and the storage side is
//! no exception. Credentials travel via the `S3_*`/`AWS_*` environment.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::process::{Command, Stdio};

/// Audit entry describing who/when/why a promotion occurred. Written once
/// per successful promotion next to the model artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceRecord {
    pub overlay: String,
    pub when: String,
    pub by: String,
    pub reason: String,
    pub model_uri: String,
}

/// Bucket/key pair parsed out of an `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

pub fn parse_s3_uri(uri: &str) -> Option<S3Location> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(S3Location {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

/// Key of the promotion record living next to the artifact.
fn promotion_key(artifact_key: &str) -> String {
    match artifact_key.rsplit_once('/') {
        Some((directory, _)) => format!("{directory}/promotion.json"),
        None => "promotion.json".to_string(),
    }
}

/// Record a promotion next to its artifact, best-effort.
///
/// The caller's commit is already durable by the time this runs; a failed
/// upload is logged and swallowed so a successful promotion is merely
/// unreported, never unrecorded in git. Do not make this fatal.
pub fn record_promotion(model_uri: &str, record: &ProvenanceRecord) {
    let Some(location) = parse_s3_uri(model_uri) else {
        tracing::info!(uri = model_uri, "non-S3 artifact URI, skipping promotion.json upload");
        return;
    };
    let key = promotion_key(&location.key);
    match upload_json(&location.bucket, &key, record) {
        Ok(()) => {
            tracing::info!(
                target_uri = %format!("s3://{}/{key}", location.bucket),
                "promotion.json stored"
            );
        }
        Err(err) => {
            tracing::warn!("failed to upload promotion.json: {err:#}");
        }
    }
}

fn upload_json(bucket: &str, key: &str, record: &ProvenanceRecord) -> Result<()> {
    let aws = which::which("aws")
        .map_err(|_| anyhow!("no object-storage client (aws) on PATH"))?;
    let body = serde_json::to_string_pretty(record).context("serialize promotion record")?;

    let mut cmd = Command::new(aws);
    cmd.args([
        "s3",
        "cp",
        "-",
        &format!("s3://{bucket}/{key}"),
        "--content-type",
        "application/json",
    ]);
    if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
        cmd.args(["--endpoint-url", &endpoint]);
    }
    if let Ok(region) = std::env::var("AWS_REGION").or_else(|_| std::env::var("S3_REGION")) {
        cmd.args(["--region", &region]);
    }
    if let Ok(access_key) = std::env::var("S3_ACCESS_KEY") {
        cmd.env("AWS_ACCESS_KEY_ID", access_key);
    }
    if let Ok(secret_key) = std::env::var("S3_SECRET_KEY") {
        cmd.env("AWS_SECRET_ACCESS_KEY", secret_key);
    }
    cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn aws s3 cp")?;
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("aws stdin unavailable"))?;
    pipe.write_all(body.as_bytes())
        .context("write promotion record to aws stdin")?;
    drop(pipe);
    let output = child.wait_with_output().context("wait for aws s3 cp")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "aws s3 cp exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let location = parse_s3_uri("s3://models/runs/42/model.onnx").unwrap();
        assert_eq!(location.bucket, "models");
        assert_eq!(location.key, "runs/42/model.onnx");
    }

    #[test]
    fn rejects_non_s3_schemes_and_bare_buckets() {
        assert!(parse_s3_uri("/tmp/model.onnx").is_none());
        assert!(parse_s3_uri("https://models/m.onnx").is_none());
        assert!(parse_s3_uri("s3://bucket-only").is_none());
        assert!(parse_s3_uri("s3://bucket/").is_none());
    }

    #[test]
    fn promotion_record_lands_next_to_the_artifact() {
        assert_eq!(
            promotion_key("runs/42/model.onnx"),
            "runs/42/promotion.json"
        );
        assert_eq!(promotion_key("model.onnx"), "promotion.json");
    }
}
