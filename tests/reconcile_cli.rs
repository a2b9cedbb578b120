//! Integration tests for plan/status/apply/prune/sync against the
//! recording fake cluster client.

mod common;

use common::{glite, Workspace};

const MANIFEST: &str = "\
kind: ConfigMap
metadata:
  name: app-config
  namespace: demo
";

#[test]
fn plan_accepts_both_diff_outcomes() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    for diff_code in ["0", "1"] {
        let output = glite()
            .args(["plan", "--path"])
            .arg(&manifest)
            .arg("--kube-bin")
            .arg(&fake.script)
            .env("FAKE_DIFF_CODE", diff_code)
            .output()
            .expect("run glite plan");
        assert!(output.status.success(), "diff code {diff_code}");
    }
}

#[test]
fn plan_treats_other_diff_codes_as_fatal() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["plan", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .env("FAKE_DIFF_CODE", "2")
        .output()
        .expect("run glite plan");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cluster"), "{stderr}");
}

#[test]
fn status_classifies_and_summarizes() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["status", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .env("FAKE_DIFF_CODE", "1")
        .env("FAKE_GET_CODE", "0")
        .output()
        .expect("run glite status");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ConfigMap/demo/app-config: Changed"), "{stdout}");
    assert!(stdout.contains("Summary: Added=0, Changed=1, Same=0"), "{stdout}");
    // One diff plus one get per named resource.
    let calls = fake.calls();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(calls[0].starts_with("diff -f -"), "{calls:?}");
    assert!(calls[1].starts_with("get ConfigMap app-config -n demo"), "{calls:?}");
}

#[test]
fn status_reports_missing_resources_as_added() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["status", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .env("FAKE_DIFF_CODE", "0")
        .env("FAKE_GET_CODE", "1")
        .output()
        .expect("run glite status");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ConfigMap/demo/app-config: Added"), "{stdout}");
}

#[test]
fn status_without_resources_prints_a_notice() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("empty.yaml", "# nothing here\n");

    let output = glite()
        .args(["status", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .output()
        .expect("run glite status");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No Kubernetes resources detected"), "{stdout}");
    assert!(fake.calls().is_empty());
}

#[test]
fn apply_mirrors_the_cluster_exit_code() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["apply", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .env("FAKE_APPLY_CODE", "3")
        .output()
        .expect("run glite apply");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn prune_requires_a_selector_before_any_call() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["prune", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .output()
        .expect("run glite prune");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("prune operations require --selector"), "{stderr}");
    assert!(fake.calls().is_empty(), "cluster was contacted: {:?}", fake.calls());
}

#[test]
fn prune_scopes_by_selector() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args([
            "prune",
            "--selector",
            "gitops-lite=managed",
            "--server-side",
            "--path",
        ])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .output()
        .expect("run glite prune");

    assert!(output.status.success());
    let calls = fake.calls();
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert_eq!(
        calls[0],
        "apply -f - --server-side --prune -l gitops-lite=managed"
    );
}

#[test]
fn sync_prunes_even_after_a_failed_apply() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args([
            "sync",
            "--enable-prune",
            "--selector",
            "gitops-lite=managed",
            "--path",
        ])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .env("FAKE_APPLY_CODE", "1")
        .output()
        .expect("run glite sync");

    // The apply failure is mirrored, but the prune still ran: cleanup is
    // best-effort because some resources may already be applied.
    assert_eq!(output.status.code(), Some(1));
    let calls = fake.calls();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert_eq!(calls[0], "apply -f -");
    assert_eq!(calls[1], "apply -f - --prune -l gitops-lite=managed");
}

#[test]
fn sync_without_prune_applies_once() {
    let workspace = Workspace::new();
    let fake = workspace.install_fake_kubectl();
    let manifest = workspace.write("m.yaml", MANIFEST);

    let output = glite()
        .args(["sync", "--path"])
        .arg(&manifest)
        .arg("--kube-bin")
        .arg(&fake.script)
        .output()
        .expect("run glite sync");

    assert!(output.status.success());
    assert_eq!(fake.calls(), ["apply -f -"]);
}
