// ABOUTME: Phantom-typed resource identifiers.
// ABOUTME: A ContainerId cannot be passed where a VolumeId or NetworkId is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub enum ContainerKind {}
pub enum NetworkKind {}
pub enum VolumeKind {}

/// Identifier of a runtime resource of kind `K`.
///
/// Runtimes accept either the generated id or the resource name wherever an
/// id is expected, so an `Id` built from a name is equally valid.
#[must_use = "ids reference runtime resources"]
pub struct Id<K> {
    value: String,
    kind: PhantomData<K>,
}

impl<K> Id<K> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// Manual impls: K is a marker and carries no trait bounds.

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K> From<&str> for Id<K> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type ContainerId = Id<ContainerKind>;
pub type NetworkId = Id<NetworkKind>;
pub type VolumeId = Id<VolumeKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_value() {
        let a = ContainerId::new("west-router");
        let b: ContainerId = "west-router".into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "west-router");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = VolumeId::new("siteforge-certs");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"siteforge-certs\"");
        let back: VolumeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "siteforge-certs");
    }
}
