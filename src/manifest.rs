//! Parsed view of a rendered manifest blob.
//!
//! Rendering (see [`crate::render`]) always produces one multi-document text
//! blob; verbs that need structured access parse it here. Documents keep
//! their full YAML value - only `kind`, `metadata.name`,
//! `metadata.namespace` and `metadata.labels` get typed accessors, the rest
//! is opaque and travels with the resource.

use crate::error::GitopsError;
use anyhow::Result;
use serde::Deserialize;
use serde_yaml::Value;

/// One document out of a rendered manifest. Immutable once parsed; the
/// reconciliation verbs only ever mutate the cluster's copy.
#[derive(Debug, Clone)]
pub struct Resource {
    doc: Value,
}

impl Resource {
    pub fn kind(&self) -> Option<&str> {
        self.doc.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata_field("name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_field("namespace")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.doc
            .get("metadata")
            .and_then(|metadata| metadata.get("labels"))
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    /// `Kind/namespace/name` for log and error lines; cluster-scoped
    /// resources drop the namespace segment.
    pub fn qualified_name(&self) -> String {
        let kind = self.kind().unwrap_or("<unknown>");
        let name = self.name().unwrap_or("<unknown>");
        match self.namespace() {
            Some(namespace) => format!("{kind}/{namespace}/{name}"),
            None => format!("{kind}/{name}"),
        }
    }

    /// Serialize this single resource back to canonical document form, as
    /// fed to per-resource `diff` calls.
    pub fn to_yaml(&self) -> Result<String> {
        let text = serde_yaml::to_string(&self.doc)
            .map_err(|err| GitopsError::Render(format!("reserialize resource: {err}")))?;
        Ok(text)
    }

    fn metadata_field(&self, field: &str) -> Option<&str> {
        self.doc
            .get("metadata")
            .and_then(|metadata| metadata.get(field))
            .and_then(Value::as_str)
    }
}

/// Split a rendered blob into resources, preserving document order.
///
/// Non-mapping documents (empty documents between separators, stray
/// scalars) are skipped. Duplicate identities are NOT de-duplicated; they
/// propagate as separate apply operations downstream.
pub fn parse_documents(text: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)
            .map_err(|err| GitopsError::Render(format!("manifest is not valid YAML: {err}")))?;
        if value.is_mapping() {
            resources.push(Resource { doc: value });
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOCS: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: demo
  labels:
    tier: backend
data:
  KEY: \"value\"
---
kind: Namespace
metadata:
  name: demo
";

    #[test]
    fn parses_documents_in_order() {
        let resources = parse_documents(TWO_DOCS).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), Some("ConfigMap"));
        assert_eq!(resources[0].name(), Some("app-config"));
        assert_eq!(resources[0].namespace(), Some("demo"));
        assert_eq!(resources[1].kind(), Some("Namespace"));
        assert_eq!(resources[1].namespace(), None);
    }

    #[test]
    fn skips_empty_documents() {
        let text = "---\n---\nkind: Pod\nmetadata:\n  name: p\n---\n";
        let resources = parse_documents(text).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind(), Some("Pod"));
    }

    #[test]
    fn keeps_duplicate_identities() {
        let text = "kind: Pod\nmetadata:\n  name: p\n---\nkind: Pod\nmetadata:\n  name: p\n";
        let resources = parse_documents(text).unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn label_lookup() {
        let resources = parse_documents(TWO_DOCS).unwrap();
        assert_eq!(resources[0].label("tier"), Some("backend"));
        assert_eq!(resources[0].label("absent"), None);
        assert_eq!(resources[1].label("tier"), None);
    }

    #[test]
    fn qualified_name_formats() {
        let resources = parse_documents(TWO_DOCS).unwrap();
        assert_eq!(resources[0].qualified_name(), "ConfigMap/demo/app-config");
        assert_eq!(resources[1].qualified_name(), "Namespace/demo");
    }

    #[test]
    fn reserializes_a_single_resource() {
        let resources = parse_documents("kind: Pod\nmetadata:\n  name: p\n").unwrap();
        let text = resources[0].to_yaml().unwrap();
        let reparsed = parse_documents(&text).unwrap();
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].qualified_name(), "Pod/p");
    }

    #[test]
    fn invalid_yaml_is_a_render_error() {
        let err = parse_documents("kind: [unclosed\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GitopsError>(),
            Some(GitopsError::Render(_))
        ));
    }
}
