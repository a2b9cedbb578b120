//! Thin adapter over the cluster-management executable.
//!
//! Everything the verbs do against the cluster funnels through
//! [`ClusterExec`], a one-method seam: resolved binary plus global flags on
//! one side, captured exit code and output on the other. Tests swap in a
//! recording fake; production uses [`KubectlProcess`].

use crate::error::GitopsError;
use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Priority-ordered candidates for the cluster client lookup.
const KUBE_BIN_CANDIDATES: &[&str] = &["kubectl", "oc"];

/// Captured outcome of one cluster-client invocation. Exit codes carry the
/// protocol (`diff`: 0 no differences, 1 differences; `get`: 0 exists,
/// 1 not found); the caller decides what is fatal.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Execution seam for the cluster client.
pub trait ClusterExec {
    fn exec(&self, args: &[String], stdin: Option<&str>) -> Result<CmdOutput>;
}

/// Resolve the cluster client command once per invocation.
///
/// An explicit override (`--kube-bin` flag or `KUBE_BIN` env) is split with
/// shell rules so wrappers like `minikube kubectl --` work. Without an
/// override, the first candidate found on PATH wins.
pub fn resolve_kube_command(override_cmd: Option<&str>) -> Result<Vec<String>> {
    if let Some(raw) = override_cmd {
        let parts = shell_words::split(raw)
            .with_context(|| format!("parse cluster client command: {raw}"))?;
        if parts.is_empty() {
            return Err(GitopsError::Config("empty cluster client command".to_string()).into());
        }
        return Ok(parts);
    }
    for candidate in KUBE_BIN_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(vec![path.display().to_string()]);
        }
    }
    Err(GitopsError::Config(format!(
        "no cluster client found on PATH (tried {})",
        KUBE_BIN_CANDIDATES.join(", ")
    ))
    .into())
}

/// Runs the resolved cluster binary with shared global flags prepended to
/// every call and the manifest piped on stdin where applicable.
pub struct KubectlProcess {
    argv: Vec<String>,
}

impl KubectlProcess {
    pub fn new(command: Vec<String>, kubeconfig: Option<&Path>, context: Option<&str>) -> Self {
        let mut argv = command;
        if let Some(kubeconfig) = kubeconfig {
            argv.push("--kubeconfig".to_string());
            argv.push(kubeconfig.display().to_string());
        }
        if let Some(context) = context {
            argv.push("--context".to_string());
            argv.push(context.to_string());
        }
        Self { argv }
    }
}

impl ClusterExec for KubectlProcess {
    fn exec(&self, args: &[String], stdin: Option<&str>) -> Result<CmdOutput> {
        let Some((program, global_flags)) = self.argv.split_first() else {
            return Err(GitopsError::Config("empty cluster client command".to_string()).into());
        };
        tracing::debug!(
            command = %shell_words::join(self.argv.iter().map(String::as_str).chain(args.iter().map(String::as_str))),
            "invoking cluster client"
        );
        let mut cmd = Command::new(program);
        cmd.args(global_flags)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = cmd
            .spawn()
            .map_err(|err| GitopsError::Cluster(format!("spawn {program}: {err}")))?;
        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("cluster client stdin unavailable"))?;
            pipe.write_all(input.as_bytes())
                .context("write manifest to cluster client stdin")?;
            // Dropping the pipe closes stdin so the client sees EOF.
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("wait for {program}"))?;
        Ok(CmdOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Flags shaping one apply invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyRequest<'a> {
    pub server_side: bool,
    pub prune: bool,
    pub selector: Option<&'a str>,
    pub dry_run_server: bool,
}

/// Build the argv for an apply. Fails fast with a config error - before any
/// process is spawned - when pruning is requested without a selector, since
/// an unscoped prune could delete unrelated resources.
fn build_apply_args(request: &ApplyRequest<'_>) -> Result<Vec<String>> {
    let mut args = vec!["apply".to_string()];
    if request.dry_run_server {
        args.push("--dry-run=server".to_string());
    }
    args.push("-f".to_string());
    args.push("-".to_string());
    if request.server_side {
        args.push("--server-side".to_string());
    }
    if request.prune {
        let selector = request
            .selector
            .map(str::trim)
            .filter(|selector| !selector.is_empty())
            .ok_or_else(|| {
                GitopsError::Config("prune operations require --selector".to_string())
            })?;
        args.push("--prune".to_string());
        args.push("-l".to_string());
        args.push(selector.to_string());
    }
    Ok(args)
}

/// The verbs' view of the cluster: diff, existence probe, apply.
pub struct KubeClient<'a> {
    exec: &'a dyn ClusterExec,
}

impl<'a> KubeClient<'a> {
    pub fn new(exec: &'a dyn ClusterExec) -> Self {
        Self { exec }
    }

    /// `diff -f -` over the given document. The exit code is returned as-is;
    /// callers treat anything other than 0/1 as a cluster error.
    pub fn diff(&self, manifest: &str) -> Result<CmdOutput> {
        let args = vec!["diff".to_string(), "-f".to_string(), "-".to_string()];
        self.exec.exec(&args, Some(manifest))
    }

    /// Whether a resource exists on the cluster. Exit 0 means it does,
    /// 1 means it does not, anything else is fatal - including "kind
    /// unknown", which stays indistinguishable from a transient failure.
    pub fn exists(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        let mut args = vec!["get".to_string(), kind.to_string(), name.to_string()];
        if let Some(namespace) = namespace {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        let output = self.exec.exec(&args, None)?;
        match output.code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(GitopsError::Cluster(format!(
                "get {kind}/{name} exited with {code}: {}",
                output.stderr.trim()
            ))
            .into()),
        }
    }

    /// Apply the manifest. The result is never fatal by itself; the caller
    /// inspects the exit code and decides.
    pub fn apply(&self, manifest: &str, request: &ApplyRequest<'_>) -> Result<CmdOutput> {
        let args = build_apply_args(request)?;
        self.exec.exec(&args, Some(manifest))
    }
}
