//! Shared test infrastructure for integration tests.
//!
//! Cluster contact is faked with a recording shell script: every invocation
//! is appended to a log file, exit codes come from `FAKE_*_CODE` variables
//! on the glite process. Tests assert on the log to prove (or rule out)
//! cluster contact.

// Each integration test binary compiles this module separately and none of
// them uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Command for the binary under test.
pub fn glite() -> Command {
    Command::new(env!("CARGO_BIN_EXE_glite"))
}

/// Scratch workspace holding manifests and the fake cluster client.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Install the recording fake cluster client into this workspace.
    pub fn install_fake_kubectl(&self) -> FakeKubectl {
        let script = self.path().join("fake-kubectl");
        let log = self.path().join("kubectl-calls.log");
        let body = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> \"{log}\"\n\
             cat > /dev/null 2>/dev/null || true\n\
             case \"$1\" in\n\
               diff) exit \"${{FAKE_DIFF_CODE:-0}}\" ;;\n\
               get) exit \"${{FAKE_GET_CODE:-0}}\" ;;\n\
               apply) echo \"fake apply ok\"; exit \"${{FAKE_APPLY_CODE:-0}}\" ;;\n\
             esac\n\
             exit 0\n",
            log = log.display()
        );
        fs::write(&script, body).expect("write fake kubectl");
        make_executable(&script);
        FakeKubectl { script, log }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FakeKubectl {
    pub script: PathBuf,
    pub log: PathBuf,
}

impl FakeKubectl {
    /// One line per recorded invocation, in call order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path).expect("stat fake kubectl").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).expect("chmod fake kubectl");
}

/// Guard for tests that need a real git on PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// A scratch git repository laid out like a deployment repo, with an
/// overlay serving configmap ready for promotion.
pub struct GitRepo {
    pub workspace: Workspace,
}

pub const SERVING_CONFIGMAP: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: inference-config
data:
  MODEL_PATH: \"s3://models/old/model.pkl\"
  MODEL_FORMAT: \"pkl\"
  MODEL_META_PATH: \"s3://models/old/model-metadata.json\"
";

impl GitRepo {
    /// `None` when git is missing; callers skip.
    pub fn init() -> Option<Self> {
        if !git_available() {
            eprintln!("Skipping: git not found on PATH");
            return None;
        }
        let workspace = Workspace::new();
        let status = Command::new("git")
            .args(["init", "-q"])
            .current_dir(workspace.path())
            .status()
            .expect("run git init");
        assert!(status.success(), "git init failed");
        workspace.write(
            "deploy-gitops/overlays/dev/patches/inference-configmap.yaml",
            SERVING_CONFIGMAP,
        );
        Some(Self { workspace })
    }

    pub fn path(&self) -> &Path {
        self.workspace.path()
    }

    /// `git log -1 --pretty=<format>`, or `None` before the first commit.
    pub fn last_commit(&self, format: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["log", "-1", &format!("--pretty={format}")])
            .current_dir(self.path())
            .output()
            .expect("run git log");
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// A glite command isolated from the host's git identity, so the tool
    /// has to configure its own.
    pub fn glite(&self) -> Command {
        let mut cmd = glite();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env_remove("XDG_CONFIG_HOME");
        cmd
    }
}
