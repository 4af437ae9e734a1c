// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource identities: kinds, resource keys and device (node) references

use crate::{ModelError, ModelResult};
use std::fmt::Display;

const MAX_NAME_LEN: usize = 253;

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.chars().any(|c| c.is_whitespace() || c == '/')
}

/// The kind of a configuration resource, e.g. `Interface` or `BgpGroup`.
/// Kinds start with an uppercase letter and are ASCII alphanumeric.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kind(String);
impl Kind {
    pub fn new(name: &str) -> ModelResult<Self> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(ModelError::InvalidKind(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    /// Build a kind from a name known to be valid
    pub(crate) fn builtin(name: &'static str) -> Self {
        Self(name.to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
impl TryFrom<&str> for Kind {
    type Error = ModelError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Kind::new(value)
    }
}
impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a resource instance: its kind and its name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: Kind,
    pub name: String,
}
impl ResourceKey {
    pub fn new(kind: &str, name: &str) -> ModelResult<Self> {
        Self::with_kind(Kind::new(kind)?, name)
    }
    pub fn with_kind(kind: Kind, name: &str) -> ModelResult<Self> {
        if !is_valid_name(name) {
            return Err(ModelError::InvalidName(name.to_owned()));
        }
        Ok(Self {
            kind,
            name: name.to_owned(),
        })
    }
}
impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Reference to the device (node) a resource gets configured on
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef(String);
impl NodeRef {
    pub fn new(name: &str) -> ModelResult<Self> {
        if !is_valid_name(name) {
            return Err(ModelError::InvalidNode(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
impl Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
