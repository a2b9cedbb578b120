//! Governance label checks over rendered manifests.

use crate::manifest::Resource;

/// Labels every managed resource must carry, with their exact values.
pub const REQUIRED_LABELS: &[(&str, &str)] = &[
    ("app.kubernetes.io/part-of", "eda-runner"),
    ("gitops-lite", "managed"),
];

/// Check every resource against every required label.
///
/// Returns the full ordered list of violations - one line per missing or
/// mismatched key, in manifest order. An empty list means the manifest is
/// valid. Callers treat any violation as a hard stop before cluster contact.
pub fn validate_labels(resources: &[Resource]) -> Vec<String> {
    let mut errors = Vec::new();
    for resource in resources {
        let name = resource.name().unwrap_or("<unknown>");
        let namespace = resource.namespace().unwrap_or("cluster");
        for (key, expected) in REQUIRED_LABELS {
            if resource.label(key) != Some(*expected) {
                errors.push(format!(
                    "Resource '{namespace}/{name}' missing label {key}={expected}"
                ));
            }
        }
    }
    errors
}
