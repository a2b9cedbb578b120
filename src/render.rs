//! Manifest rendering: path on disk -> single multi-document text blob.

use crate::error::GitopsError;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolve the templating executable once per invocation: `KUSTOMIZE_BIN`
/// override wins, otherwise the first `kustomize` on PATH. Callers pass the
/// result down as a value instead of re-querying per call.
pub fn resolve_kustomize_bin() -> Result<String> {
    if let Ok(bin) = std::env::var("KUSTOMIZE_BIN") {
        if !bin.trim().is_empty() {
            return Ok(bin);
        }
    }
    match which::which("kustomize") {
        Ok(path) => Ok(path.display().to_string()),
        Err(_) => Err(GitopsError::Render(
            "unable to find kustomize executable (set KUSTOMIZE_BIN to override)".to_string(),
        )
        .into()),
    }
}

/// Turn a manifest source into one text blob.
///
/// With `kustomize_bin` set the path is treated as a templated root and the
/// tool's stdout is returned verbatim. A directory is the concatenation of
/// its `*.yaml`/`*.yml` files in lexicographic filename order. Anything else
/// is read as a single file.
pub fn render_manifests(path: &Path, kustomize_bin: Option<&str>) -> Result<String> {
    if let Some(bin) = kustomize_bin {
        return render_kustomize(bin, path);
    }
    if path.is_dir() {
        return concat_directory(path);
    }
    read_manifest_file(path)
}

fn render_kustomize(bin: &str, path: &Path) -> Result<String> {
    let output = match Command::new(bin).arg("build").arg(path).output() {
        Ok(output) => output,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(
                GitopsError::Render(format!("unable to find kustomize executable '{bin}'")).into(),
            );
        }
        Err(err) => {
            return Err(err).with_context(|| format!("run {bin} build {}", path.display()));
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitopsError::Render(format!(
            "{bin} build {} failed: {}",
            path.display(),
            stderr.trim()
        ))
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn concat_directory(dir: &Path) -> Result<String> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read manifest directory {}", dir.display()))?;
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_manifest_file(&path) {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(GitopsError::Render(format!(
            "no manifest files found in directory: {}",
            dir.display()
        ))
        .into());
    }
    // Lexicographic filename order keeps diffs and applies reproducible
    // whatever order the directory listing came back in.
    files.sort();
    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        documents.push(read_manifest_file(file)?);
    }
    Ok(documents.join("\n---\n"))
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_manifest_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| {
        GitopsError::Render(format!("path not found: {} ({err})", path.display())).into()
    })
}
