//! # Infrastructure providers.
//!
//! A polling engine never talks to a cloud API directly. It goes through two
//! seams:
//! - [`MetricsProvider`]: what to collect and how to compute it (one per provider);
//! - [`ManagementApi`]: the provider's management REST surface, one handle per
//!   cluster, created by an [`ApiConnector`] from the cluster's credentials.
//!
//! Providers are looked up by name in an explicit [`ProviderRegistry`] built at
//! startup; the pipeline runs one engine per registered provider.

mod azure;
mod model;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use azure::AzureProvider;
pub use model::{
    CapabilitySet, ClusterMetadata, Compute, ComputeInstance, Disk, EventData, EventHub,
    MessagingNamespace, MetricValue, NetworkKind, NetworkResource, Networking, ProvisionedVolumes,
    ResourceGroup, VmType,
};

use crate::cluster::{Cluster, CredentialData};
use crate::error::ProviderError;

/// Handle to a provider management API, bound to one set of credentials.
///
/// Every call may fail with a provider status (see [`ProviderError::from_status`])
/// and is rate limited by the provider independently.
#[async_trait]
pub trait ManagementApi: Send + Sync + 'static {
    /// Virtual machines of a resource group.
    async fn list_compute_instances(
        &self,
        resource_group: &str,
    ) -> Result<Vec<ComputeInstance>, ProviderError>;

    /// Managed disks of a resource group.
    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>, ProviderError>;

    /// Billed network resources of a resource group.
    async fn list_network_resources(
        &self,
        resource_group: &str,
    ) -> Result<Vec<NetworkResource>, ProviderError>;

    /// Messaging namespaces of a resource group.
    async fn list_messaging_namespaces(
        &self,
        resource_group: &str,
    ) -> Result<Vec<MessagingNamespace>, ProviderError>;

    /// Totals of `metric_names` for `resource_uri` over the last `interval`.
    async fn get_metric_values(
        &self,
        resource_uri: &str,
        interval: Duration,
        metric_names: &[&str],
    ) -> Result<Vec<MetricValue>, ProviderError>;

    /// First resource group carrying tag `key = value`.
    async fn resolve_resource_group_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<ResourceGroup, ProviderError>;

    /// Resource group named `name`.
    async fn resolve_resource_group_by_name(
        &self,
        name: &str,
    ) -> Result<ResourceGroup, ProviderError>;

    /// Resource capabilities available in `region`.
    async fn list_resource_capabilities(&self, region: &str)
    -> Result<CapabilitySet, ProviderError>;
}

/// Creates management API handles from credentials.
pub trait ApiConnector: Send + Sync + 'static {
    /// Builds a handle; fails with [`ProviderError::Auth`] on unusable credentials.
    fn connect(&self, credentials: &CredentialData) -> Result<Arc<dyn ManagementApi>, ProviderError>;
}

/// What a polling engine collects for the clusters of one provider.
#[async_trait]
pub trait MetricsProvider: Send + Sync + 'static {
    /// Provider name, matched against [`Cluster::provider_type`].
    fn name(&self) -> &str;

    /// Builds the API handle for `cluster`.
    fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ManagementApi>, ProviderError>;

    /// Resolves the one-time metadata needed before collecting.
    async fn resolve_metadata(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
    ) -> Result<ClusterMetadata, ProviderError>;

    /// Loads the capability set of `region`.
    async fn capabilities(
        &self,
        api: &dyn ManagementApi,
        region: &str,
    ) -> Result<CapabilitySet, ProviderError>;

    /// Collects compute usage.
    async fn collect_compute(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
        capabilities: Option<&CapabilitySet>,
    ) -> Result<Compute, ProviderError>;

    /// Collects network usage.
    async fn collect_network(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
    ) -> Result<Networking, ProviderError>;

    /// Collects messaging usage; `None` when the cluster has none.
    async fn collect_messaging(
        &self,
        api: &dyn ManagementApi,
        metadata: &ClusterMetadata,
    ) -> Result<Option<EventHub>, ProviderError>;

    /// Collects a full [`EventData`]; the first failing section fails the whole poll.
    async fn collect(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
        metadata: &ClusterMetadata,
        capabilities: Option<&CapabilitySet>,
    ) -> Result<EventData, ProviderError> {
        let compute = self.collect_compute(api, cluster, capabilities).await?;
        let networking = self.collect_network(api, cluster).await?;
        let event_hub = self.collect_messaging(api, metadata).await?;

        let mut resource_groups = vec![cluster.technical_id.clone()];
        resource_groups.extend(metadata.messaging_resource_group.iter().cloned());

        Ok(EventData {
            resource_groups,
            compute,
            networking,
            event_hub,
        })
    }
}

/// Providers available to the pipeline, by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn MetricsProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under its own name, replacing any previous entry.
    pub fn with(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Provider registered as `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MetricsProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered providers, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MetricsProvider>> {
        self.providers.values()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
