//! Control-plane resources consumed by the watcher and the notifications that carry them.

use std::collections::BTreeMap;
use std::fmt;

/// `namespace/name` identity of a control-plane object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Builds a key from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cluster descriptor as published by the orchestration control-plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterDescriptor {
    /// Descriptor name.
    pub name: String,
    /// Project namespace (`garden-<project>`).
    pub namespace: String,
    /// Provider region.
    pub region: String,
    /// Infrastructure provider name.
    pub provider_type: String,
    /// Declared purpose; `evaluation` marks a trial cluster.
    pub purpose: Option<String>,
    /// Credential secret used to reach the provider API.
    pub secret_ref: ObjectKey,
    /// Object labels, including the billing identities.
    pub labels: BTreeMap<String, String>,
    /// Opaque control-plane revision; ignored by reconciliation.
    pub resource_version: String,
}

impl ClusterDescriptor {
    /// Identity of this descriptor.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// Credential secret referenced by cluster descriptors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Secret {
    /// Secret name.
    pub name: String,
    /// Secret namespace.
    pub namespace: String,
    /// Credential fields.
    pub data: BTreeMap<String, Vec<u8>>,
    /// Opaque control-plane revision; ignored by reconciliation.
    pub resource_version: String,
}

impl Secret {
    /// Identity of this secret.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// Payload of a deletion notification.
///
/// The control-plane may have lost the final state of the object; only its key
/// is guaranteed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tombstone<T> {
    /// Last known state of the deleted object.
    Object(T),
    /// Bare identity of the deleted object.
    Key(ObjectKey),
}

/// One change observed on the control-plane feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A descriptor appeared (initial listing or creation).
    ClusterAdded(ClusterDescriptor),
    /// A descriptor changed.
    ClusterUpdated {
        /// Previous version.
        old: ClusterDescriptor,
        /// Current version.
        new: ClusterDescriptor,
    },
    /// A descriptor was removed.
    ClusterDeleted(Tombstone<ClusterDescriptor>),
    /// A secret appeared.
    SecretAdded(Secret),
    /// A secret changed.
    SecretUpdated {
        /// Previous version.
        old: Secret,
        /// Current version.
        new: Secret,
    },
    /// A secret was removed.
    SecretDeleted(Tombstone<Secret>),
}
