// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of the resource kinds the engine accepts. Built once at start.

use crate::model::key::{Kind, ResourceKey};
use crate::model::leafref::LeafRefScope;
use crate::model::resource::ResourceInstance;
use crate::{ModelError, ModelResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Validation of the desired payload of a resource kind
pub trait PayloadValidator: Send + Sync + Debug {
    fn validate(&self, key: &ResourceKey, desired: &Value) -> ModelResult;
}

/// Validator for kinds whose payload is fully opaque
#[derive(Debug, Default)]
pub struct AcceptAll;
impl PayloadValidator for AcceptAll {
    fn validate(&self, _key: &ResourceKey, _desired: &Value) -> ModelResult {
        Ok(())
    }
}

/// Validator requiring the payload to be an object with the listed top-level fields
#[derive(Debug, Default)]
pub struct RequiredFields(pub Vec<String>);
impl RequiredFields {
    #[must_use]
    pub fn new(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}
impl PayloadValidator for RequiredFields {
    fn validate(&self, key: &ResourceKey, desired: &Value) -> ModelResult {
        let Some(object) = desired.as_object() else {
            return Err(ModelError::InvalidParameters(
                key.clone(),
                "parameters must be an object".to_string(),
            ));
        };
        if let Some(missing) = self.0.iter().find(|f| !object.contains_key(f.as_str())) {
            return Err(ModelError::MissingParameter(key.clone(), missing.clone()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct KindEntry {
    pub kind: Kind,
    pub subtree_root: Kind,
    pub defaults: Map<String, Value>,
    pub validator: Arc<dyn PayloadValidator>,
}
impl KindEntry {
    /// A top-level kind, root of its own subtree
    #[must_use]
    pub fn root(kind: Kind) -> Self {
        Self {
            subtree_root: kind.clone(),
            kind,
            defaults: Map::new(),
            validator: Arc::new(AcceptAll),
        }
    }
    /// A kind living in the subtree of `root`
    #[must_use]
    pub fn under(kind: Kind, root: Kind) -> Self {
        Self {
            kind,
            subtree_root: root,
            defaults: Map::new(),
            validator: Arc::new(AcceptAll),
        }
    }
    #[must_use]
    pub fn with_default(mut self, field: &str, value: Value) -> Self {
        self.defaults.insert(field.to_owned(), value);
        self
    }
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn PayloadValidator>) -> Self {
        self.validator = validator;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct KindRegistry(BTreeMap<Kind, KindEntry>);

impl KindRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. The subtree root must be the kind itself or a kind
    /// already registered.
    pub fn register(&mut self, entry: KindEntry) -> ModelResult {
        if self.0.contains_key(&entry.kind) {
            return Err(ModelError::DuplicateKind(entry.kind));
        }
        if entry.subtree_root != entry.kind && !self.0.contains_key(&entry.subtree_root) {
            return Err(ModelError::UnknownSubtreeRoot(entry.kind, entry.subtree_root));
        }
        debug!("Registering kind {} (subtree {})", entry.kind, entry.subtree_root);
        self.0.insert(entry.kind.clone(), entry);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, kind: &Kind) -> Option<&KindEntry> {
        self.0.get(kind)
    }

    #[must_use]
    pub fn subtree_root(&self, kind: &Kind) -> Option<&Kind> {
        self.0.get(kind).map(|e| &e.subtree_root)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.0.keys()
    }

    /// A reference is internal if both kinds live in the same subtree
    #[must_use]
    pub fn classify(&self, referrer: &Kind, target: &Kind) -> LeafRefScope {
        match (self.subtree_root(referrer), self.subtree_root(target)) {
            (Some(a), Some(b)) if a == b => LeafRefScope::Internal,
            _ => LeafRefScope::External,
        }
    }

    /// Admit a resource: the kind must be known, missing top-level fields get the
    /// kind defaults and the payload must pass the kind validator.
    pub fn admit(&self, resource: &mut ResourceInstance) -> ModelResult {
        let entry = self
            .0
            .get(&resource.key.kind)
            .ok_or_else(|| ModelError::UnknownKind(resource.key.kind.clone()))?;

        if !entry.defaults.is_empty() {
            if resource.desired.is_null() {
                resource.desired = Value::Object(Map::new());
            }
            if let Some(object) = resource.desired.as_object_mut() {
                for (field, value) in &entry.defaults {
                    object.entry(field.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        entry.validator.validate(&resource.key, &resource.desired)?;
        resource.validate_references()
    }

    /// The device-configuration kinds known out of the box
    #[must_use]
    pub fn builtin() -> Self {
        let k = Kind::builtin;
        let entries = [
            KindEntry::root(k("Interface"))
                .with_default("admin-state", Value::String("enable".to_string())),
            KindEntry::under(k("Subinterface"), k("Interface")),
            KindEntry::root(k("NetworkInstance")),
            KindEntry::under(k("NetworkInstanceProtocolsBgp"), k("NetworkInstance")),
            KindEntry::under(k("BgpGroup"), k("NetworkInstance")),
            KindEntry::under(k("BgpNeighbor"), k("NetworkInstance"))
                .with_validator(Arc::new(RequiredFields::new(&["peer-address"]))),
            KindEntry::root(k("RoutingPolicy")),
            KindEntry::under(k("RoutingPolicyPrefixSet"), k("RoutingPolicy"))
                .with_validator(Arc::new(RequiredFields::new(&["prefix"]))),
            KindEntry::under(k("RoutingPolicyCommunitySet"), k("RoutingPolicy")),
            KindEntry::root(k("SystemNtp")),
            KindEntry::root(k("SystemDns")),
            KindEntry::root(k("SystemName")),
            KindEntry::root(k("TunnelInterface")),
            KindEntry::under(k("TunnelVxlanInterface"), k("TunnelInterface")),
        ];
        let mut registry = Self::new();
        for entry in entries {
            // builtin entries are listed roots first and have distinct kinds
            if let Err(e) = registry.register(entry) {
                debug!("Skipping builtin kind: {e}");
            }
        }
        registry
    }
}
