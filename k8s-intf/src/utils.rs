// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Utils to build [`ConfigResource`] objects from JSON / YAML text files.

use crate::config_resource_crd::ConfigResource;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read resources from file ({0}): {1}")]
    Io(String, std::io::Error),
    #[error("Failed to deserialize resources from YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Failed to deserialize resources from JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported file extension {0}")]
    UnsupportedExtension(String),
    #[error("Missing file extension")]
    MissingExtension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

/// YAML input may hold several documents, one resource each. Empty documents are skipped.
fn load_from_yaml(text: &str) -> Result<Vec<ConfigResource>, LoadError> {
    let mut resources = vec![];
    for document in serde_yaml_ng::Deserializer::from_str(text) {
        if let Some(resource) = Option::<ConfigResource>::deserialize(document)? {
            resources.push(resource);
        }
    }
    Ok(resources)
}

/// JSON input is either a single object or an array of objects
fn load_from_json(text: &str) -> Result<Vec<ConfigResource>, LoadError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(LoadError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Deserialize a set of [`ConfigResource`]s from text in the given [`Format`].
///
/// # Errors
/// Fails if the text cannot be deserialized.
pub fn load_resources_from_str(text: &str, format: Format) -> Result<Vec<ConfigResource>, LoadError> {
    let resources = match format {
        Format::Yaml => load_from_yaml(text)?,
        Format::Json => load_from_json(text)?,
    };
    debug!("Loaded {} resources from {format:?} text", resources.len());
    Ok(resources)
}

/// Read the file at `path` and deserialize its contents into [`ConfigResource`]s.
/// The format is picked from the file extension.
///
/// # Errors
/// This function may fail if the file does not exist or cannot be read, if the extension
/// is not supported, or if the contents cannot be deserialized.
pub fn load_resources_from_file(path: &str) -> Result<Vec<ConfigResource>, LoadError> {
    let format = match Path::new(path).extension() {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            Format::Yaml
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
        Some(ext) => return Err(LoadError::UnsupportedExtension(ext.display().to_string())),
        None => return Err(LoadError::MissingExtension),
    };
    let text = fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_owned(), e))?;
    load_resources_from_str(&text, format)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = "
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata:
  name: eth-1
spec:
  resourceKind: Interface
  node: leaf1
  parameters:
    admin-state: enable
---
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata:
  name: eth-1.0
  finalizers:
    - config.devcfg.io/finalizer
spec:
  resourceKind: Subinterface
  node: leaf1
  parentRef:
    kind: Interface
    name: eth-1
  parameters:
    index: 0
---
";

    #[test]
    fn test_load_multi_document_yaml() {
        let resources = load_resources_from_str(YAML, Format::Yaml).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].metadata.name.as_deref(), Some("eth-1"));
        assert_eq!(resources[0].spec.resource_kind, "Interface");
        assert_eq!(resources[1].spec.parent_ref.as_ref().unwrap().name, "eth-1");
        assert_eq!(
            resources[1].metadata.finalizers,
            Some(vec![crate::FINALIZER.to_string()])
        );
    }

    #[test]
    fn test_load_json_array_and_object() {
        let json = r#"[
            {"apiVersion": "config.devcfg.io/v1alpha1", "kind": "ConfigResource",
             "metadata": {"name": "grp-A"},
             "spec": {"resourceKind": "BgpGroup", "node": "leaf1"}}
        ]"#;
        let resources = load_resources_from_str(json, Format::Json).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].spec.resource_kind, "BgpGroup");
        assert_eq!(resources[0].spec.parameters, serde_json::Value::Null);

        let json = r#"{"apiVersion": "config.devcfg.io/v1alpha1", "kind": "ConfigResource",
             "metadata": {"name": "default"},
             "spec": {"resourceKind": "NetworkInstance", "node": "leaf1"}}"#;
        let resources = load_resources_from_str(json, Format::Json).unwrap();
        assert_eq!(resources[0].metadata.name.as_deref(), Some("default"));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            load_resources_from_file("/nonexistent/resources.toml"),
            Err(LoadError::UnsupportedExtension(_))
        ));
        assert!(matches!(
            load_resources_from_file("/nonexistent/resources"),
            Err(LoadError::MissingExtension)
        ));
        assert!(matches!(
            load_resources_from_file("/nonexistent/resources.yaml"),
            Err(LoadError::Io(..))
        ));
        assert!(matches!(
            load_resources_from_str("spec: [", Format::Yaml),
            Err(LoadError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("devcfg-k8s-intf-load");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("resources.yml");
        fs::write(&path, YAML).unwrap();
        let resources = load_resources_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(resources.len(), 2);
    }
}
