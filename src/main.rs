use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

mod cluster;
mod error;
mod manifest;
mod metrics;
mod policy;
mod promote;
mod render;
mod status;
mod storage;
mod validate;

use cluster::{ApplyRequest, CmdOutput, KubeClient, KubectlProcess};
use error::GitopsError;
use metrics::MetricsSnapshot;
use policy::Thresholds;

#[derive(Parser, Debug)]
#[command(
    name = "glite",
    version,
    about = "GitOps reconciliation and model promotion"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render manifests without contacting the cluster
    Render(ManifestArgs),
    /// Show the diff between rendered manifests and live cluster state
    Plan(ManifestArgs),
    /// Classify each rendered resource as Added, Changed, or Same
    Status(ManifestArgs),
    /// Apply rendered manifests
    Apply(ManifestArgs),
    /// Apply with pruning of stale labelled resources
    Prune(ManifestArgs),
    /// Apply manifests, then prune when enabled
    Sync(ManifestArgs),
    /// Check governance labels, then dry-run the apply server-side
    Validate(ManifestArgs),
    /// Compare candidate metrics against current and store the verdict
    Compare(CompareArgs),
    /// Promote a trained model when it beats the deployed one
    Promote(PromoteArgs),
}

#[derive(Args, Debug)]
struct ManifestArgs {
    /// Path to a manifest file, directory of manifests, or kustomize root
    #[arg(long)]
    path: PathBuf,

    /// Render the path with `kustomize build` before acting
    #[arg(long)]
    kustomize: bool,

    /// Delegate conflict resolution to the cluster on apply
    #[arg(long)]
    server_side: bool,

    /// Allow prune steps where the verb supports them
    #[arg(long)]
    enable_prune: bool,

    /// Label selector scoping prune operations
    #[arg(long)]
    selector: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    context: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Cluster client command, overriding autodetection (also env KUBE_BIN)
    #[arg(long)]
    kube_bin: Option<String>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Metrics of the currently deployed model
    #[arg(long)]
    current: PathBuf,

    /// Metrics of the candidate model
    #[arg(long)]
    candidate: PathBuf,

    /// Destination for the comparison artifact
    #[arg(long)]
    out: PathBuf,

    /// Policy document overriding the default location
    #[arg(long)]
    policy: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PromoteArgs {
    /// Metrics of the currently deployed model
    current: PathBuf,

    /// Metrics of the candidate model
    candidate: PathBuf,

    /// URI of the trained artifact (s3://... or a local path)
    model_uri: String,

    /// Policy document overriding the default location
    #[arg(long)]
    policy: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => ExitCode::from(exit_code(code)),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Render(args) => cmd_render(&args),
        Commands::Plan(args) => cmd_plan(&args),
        Commands::Status(args) => cmd_status(&args),
        Commands::Apply(args) => cmd_apply(&args, args.enable_prune),
        Commands::Prune(args) => cmd_apply(&args, true),
        Commands::Sync(args) => cmd_sync(&args),
        Commands::Validate(args) => cmd_validate(&args),
        Commands::Compare(args) => cmd_compare(&args),
        Commands::Promote(args) => cmd_promote(&args),
    }
}

fn cmd_render(args: &ManifestArgs) -> Result<i32> {
    let manifest = render_for(args)?;
    print!("{manifest}");
    Ok(0)
}

fn cmd_plan(args: &ManifestArgs) -> Result<i32> {
    let manifest = render_for(args)?;
    let process = cluster_for(args)?;
    let client = KubeClient::new(&process);
    let diff = client.diff(&manifest)?;
    emit(&diff);
    match diff.code {
        // 0 means no drift, 1 means differences exist; both are a
        // successful plan.
        0 | 1 => Ok(0),
        code => Err(GitopsError::Cluster(format!("diff exited with {code}")).into()),
    }
}

fn cmd_status(args: &ManifestArgs) -> Result<i32> {
    let manifest = render_for(args)?;
    let resources = manifest::parse_documents(&manifest)?;
    if !resources.iter().any(|resource| resource.kind().is_some()) {
        println!("No Kubernetes resources detected in manifest.");
        return Ok(0);
    }
    let process = cluster_for(args)?;
    let client = KubeClient::new(&process);
    let report = status::classify_manifest(&client, &resources)?;
    for line in &report.lines {
        println!("{line}");
    }
    println!("{}", report.tally);
    Ok(0)
}

fn cmd_apply(args: &ManifestArgs, prune: bool) -> Result<i32> {
    let manifest = render_for(args)?;
    let process = cluster_for(args)?;
    let client = KubeClient::new(&process);
    let request = ApplyRequest {
        server_side: args.server_side,
        prune,
        selector: args.selector.as_deref(),
        dry_run_server: false,
    };
    let output = client.apply(&manifest, &request)?;
    emit(&output);
    Ok(output.code)
}

fn cmd_sync(args: &ManifestArgs) -> Result<i32> {
    let manifest = render_for(args)?;
    let process = cluster_for(args)?;
    let client = KubeClient::new(&process);

    let apply_request = ApplyRequest {
        server_side: args.server_side,
        prune: false,
        selector: args.selector.as_deref(),
        dry_run_server: false,
    };
    let apply_output = client.apply(&manifest, &apply_request)?;
    emit(&apply_output);

    let mut final_code = apply_output.code;
    if args.enable_prune {
        // Prune runs even after a failed apply: some resources may already
        // be applied correctly, so the cleanup is best-effort. There is no
        // transactional guarantee across the two steps.
        let prune_request = ApplyRequest {
            server_side: args.server_side,
            prune: true,
            selector: args.selector.as_deref(),
            dry_run_server: false,
        };
        let prune_output = client.apply(&manifest, &prune_request)?;
        emit(&prune_output);
        if final_code == 0 {
            final_code = prune_output.code;
        }
    }
    Ok(final_code)
}

fn cmd_validate(args: &ManifestArgs) -> Result<i32> {
    let manifest = render_for(args)?;
    let resources = manifest::parse_documents(&manifest)?;
    let errors = validate::validate_labels(&resources);
    if !errors.is_empty() {
        // Hard stop before any cluster contact; every violation is listed.
        for error in &errors {
            eprintln!("{error}");
        }
        return Err(GitopsError::Validation(format!(
            "{} governance label violation(s)",
            errors.len()
        ))
        .into());
    }

    let process = cluster_for(args)?;
    let client = KubeClient::new(&process);
    let request = ApplyRequest {
        dry_run_server: true,
        ..ApplyRequest::default()
    };
    let output = client.apply(&manifest, &request)?;
    emit(&output);
    Ok(output.code)
}

#[derive(Serialize)]
struct ComparisonArtifact<'a> {
    current: &'a MetricsSnapshot,
    candidate: &'a MetricsSnapshot,
    improved: bool,
    reasons: &'a [String],
    thresholds: &'a Thresholds,
}

fn cmd_compare(args: &CompareArgs) -> Result<i32> {
    let policy = policy::load_policy(&policy_path(args.policy.as_deref()))?;
    let current = MetricsSnapshot::load(&args.current)?;
    let candidate = MetricsSnapshot::load(&args.candidate)?;
    let verdict = metrics::evaluate(&current, &candidate, &policy.thresholds);

    let artifact = ComparisonArtifact {
        current: &current,
        candidate: &candidate,
        improved: verdict.improved,
        reasons: &verdict.reasons,
        thresholds: &verdict.thresholds,
    };
    let json = serde_json::to_string_pretty(&artifact)?;
    std::fs::write(&args.out, json)?;

    let status = if verdict.improved {
        "IMPROVED"
    } else {
        "NOT IMPROVED"
    };
    println!("{status}: comparison stored in {}", args.out.display());
    Ok(0)
}

fn cmd_promote(args: &PromoteArgs) -> Result<i32> {
    let policy_path = policy_path(args.policy.as_deref());
    let request = promote::PromotionRequest {
        current_metrics: &args.current,
        candidate_metrics: &args.candidate,
        model_uri: &args.model_uri,
        policy_path: &policy_path,
    };
    promote::run(&request)?;
    Ok(0)
}

fn policy_path(override_path: Option<&std::path::Path>) -> PathBuf {
    match override_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(policy::DEFAULT_POLICY_PATH),
    }
}

fn render_for(args: &ManifestArgs) -> Result<String> {
    let kustomize_bin = if args.kustomize {
        Some(render::resolve_kustomize_bin()?)
    } else {
        None
    };
    render::render_manifests(&args.path, kustomize_bin.as_deref())
}

fn cluster_for(args: &ManifestArgs) -> Result<KubectlProcess> {
    let override_cmd = args
        .kube_bin
        .clone()
        .or_else(|| std::env::var("KUBE_BIN").ok());
    let argv = cluster::resolve_kube_command(override_cmd.as_deref())?;
    Ok(KubectlProcess::new(
        argv,
        args.kubeconfig.as_deref(),
        args.context.as_deref(),
    ))
}

/// Mirror a cluster call's captured output onto our own streams.
fn emit(output: &CmdOutput) {
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
}

/// Map a cluster exit code onto our own. Codes outside the u8 range (signal
/// deaths surface as -1) collapse to a generic failure.
fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
