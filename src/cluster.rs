//! # Cluster: one billable fleet member as seen by the pipeline.
//!
//! A [`Cluster`] is produced by the [`FleetWatcher`](crate::watcher::FleetWatcher)
//! and consumed by exactly one [`PollingEngine`](crate::engine::PollingEngine),
//! chosen by [`Cluster::provider_type`]. Deletions travel as a `Cluster` with
//! `deleted = true` and only [`Cluster::technical_id`] guaranteed to be set.

use std::collections::BTreeMap;
use std::fmt;

/// Opaque credential fields copied from the cluster's secret.
///
/// `Debug` prints the field names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialData(BTreeMap<String, Vec<u8>>);

impl CredentialData {
    /// Creates an empty credential map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw bytes of `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Returns `key` decoded as UTF-8, if present and valid.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Inserts or replaces one field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Vec<u8>>> for CredentialData {
    fn from(map: BTreeMap<String, Vec<u8>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for CredentialData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Normalized cluster identity and credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cluster {
    /// Infrastructure provider name (routing key to a polling engine).
    pub provider_type: String,
    /// Provider region.
    pub region: String,
    /// Fleet-wide unique id; the key of every cache and queue.
    pub technical_id: String,
    /// Global account the usage is billed to.
    pub account_id: String,
    /// Subaccount; used as the ingestion tenant.
    pub subaccount_id: String,
    /// Provider credentials.
    pub credential_data: CredentialData,
    /// Tombstone flag.
    pub deleted: bool,
    /// Evaluation clusters may lack one-time provider metadata.
    pub trial: bool,
}

impl Cluster {
    /// Tombstone carrying only the identity.
    pub fn deleted(technical_id: impl Into<String>) -> Self {
        Self {
            technical_id: technical_id.into(),
            deleted: true,
            ..Self::default()
        }
    }

    /// True when both clusters agree on everything downstream stages depend on.
    ///
    /// Region, trial flag and tombstone flag are not compared.
    pub fn same_identity(&self, other: &Cluster) -> bool {
        self.technical_id == other.technical_id
            && self.provider_type == other.provider_type
            && self.account_id == other.account_id
            && self.subaccount_id == other.subaccount_id
            && self.credential_data == other.credential_data
    }
}
