//! Per-resource classification of rendered manifests against live state.
//!
//! Every named resource is probed twice: a single-resource `diff`, then a
//! `get`. The pair is deliberate - some cluster tools report an absent
//! resource as a one-sided diff, so `diff` alone cannot tell "absent" from
//! "present and identical after normalization". Collapsing the two calls
//! into one changes observable classification; keep both.
//!
//! Probing is sequential on purpose: it bounds concurrent load on the
//! cluster API and keeps output ordering deterministic.

use crate::cluster::KubeClient;
use crate::error::GitopsError;
use crate::manifest::Resource;
use anyhow::Result;
use std::fmt;

/// Relation of one rendered resource to the live cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Added,
    Changed,
    Same,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceState::Added => "Added",
            ResourceState::Changed => "Changed",
            ResourceState::Same => "Same",
        };
        f.write_str(label)
    }
}

/// Running tally over one classification pass. The total always equals the
/// number of resources carrying both `kind` and `metadata.name`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StateTally {
    pub added: usize,
    pub changed: usize,
    pub same: usize,
}

impl StateTally {
    fn record(&mut self, state: ResourceState) {
        match state {
            ResourceState::Added => self.added += 1,
            ResourceState::Changed => self.changed += 1,
            ResourceState::Same => self.same += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.added + self.changed + self.same
    }
}

impl fmt::Display for StateTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: Added={}, Changed={}, Same={}",
            self.added, self.changed, self.same
        )
    }
}

/// Classification output: one line per named resource, manifest order.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub lines: Vec<String>,
    pub tally: StateTally,
}

/// Classify every named resource in manifest order.
///
/// Any cluster error aborts the whole pass; partial results are discarded,
/// not returned.
pub fn classify_manifest(client: &KubeClient<'_>, resources: &[Resource]) -> Result<StatusReport> {
    let mut report = StatusReport::default();
    for resource in resources {
        let (Some(kind), Some(name)) = (resource.kind(), resource.name()) else {
            // Nameless or kindless documents are skipped, not counted.
            continue;
        };
        let state = classify_resource(client, resource, kind, name)?;
        report.tally.record(state);
        let ns_prefix = resource
            .namespace()
            .map(|namespace| format!("{namespace}/"))
            .unwrap_or_default();
        report.lines.push(format!("{kind}/{ns_prefix}{name}: {state}"));
    }
    Ok(report)
}

fn classify_resource(
    client: &KubeClient<'_>,
    resource: &Resource,
    kind: &str,
    name: &str,
) -> Result<ResourceState> {
    let document = resource.to_yaml()?;
    let diff = client.diff(&document)?;
    if !matches!(diff.code, 0 | 1) {
        return Err(GitopsError::Cluster(format!(
            "diff for {} exited with {}: {}",
            resource.qualified_name(),
            diff.code,
            diff.stderr.trim()
        ))
        .into());
    }
    let exists = client.exists(kind, name, resource.namespace())?;
    let state = if diff.code == 0 && exists {
        ResourceState::Same
    } else if !exists {
        ResourceState::Added
    } else {
        ResourceState::Changed
    };
    Ok(state)
}
