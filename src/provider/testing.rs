//! In-memory management API and connector for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ApiConnector, CapabilitySet, ComputeInstance, Disk, ManagementApi, MessagingNamespace,
    MetricValue, NetworkResource, ResourceGroup,
};
use crate::cluster::{Cluster, CredentialData};
use crate::error::ProviderError;

#[derive(Default)]
pub(crate) struct FakeState {
    pub instances: Vec<ComputeInstance>,
    pub disks: Vec<Disk>,
    pub network: Vec<NetworkResource>,
    pub namespaces: Vec<MessagingNamespace>,
    pub metrics: Vec<MetricValue>,
    /// Tag value → group name.
    pub tagged_groups: HashMap<String, String>,
    /// Returned by every compute listing while set.
    pub compute_error: Option<ProviderError>,
    /// Returned by the next compute listings, one per call, before `compute_error`.
    pub scripted_errors: VecDeque<ProviderError>,
    /// Makes compute listings hang for this long.
    pub compute_delay: Option<Duration>,
    pub capability_error: Option<ProviderError>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub state: Mutex<FakeState>,
    pub compute_calls: AtomicUsize,
    pub capability_calls: AtomicUsize,
}

impl FakeApi {
    pub fn capability_set(&self) -> CapabilitySet {
        let attrs = |cpus: &str, mem: &str| {
            [
                ("vCPUs".to_string(), cpus.to_string()),
                ("MemoryGB".to_string(), mem.to_string()),
            ]
        };
        [
            ("Standard_D4s_v3", attrs("4", "16")),
            ("Standard_D8s_v3", attrs("8", "32")),
        ]
        .into_iter()
        .collect()
    }

    pub fn compute_calls(&self) -> usize {
        self.compute_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagementApi for FakeApi {
    async fn list_compute_instances(
        &self,
        _resource_group: &str,
    ) -> Result<Vec<ComputeInstance>, ProviderError> {
        self.compute_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().compute_delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let mut s = self.state.lock();
        if let Some(err) = s.scripted_errors.pop_front() {
            return Err(err);
        }
        if let Some(err) = &s.compute_error {
            return Err(err.clone());
        }
        Ok(s.instances.clone())
    }

    async fn list_disks(&self, _resource_group: &str) -> Result<Vec<Disk>, ProviderError> {
        Ok(self.state.lock().disks.clone())
    }

    async fn list_network_resources(
        &self,
        _resource_group: &str,
    ) -> Result<Vec<NetworkResource>, ProviderError> {
        Ok(self.state.lock().network.clone())
    }

    async fn list_messaging_namespaces(
        &self,
        _resource_group: &str,
    ) -> Result<Vec<MessagingNamespace>, ProviderError> {
        Ok(self.state.lock().namespaces.clone())
    }

    async fn get_metric_values(
        &self,
        _resource_uri: &str,
        _interval: Duration,
        _metric_names: &[&str],
    ) -> Result<Vec<MetricValue>, ProviderError> {
        Ok(self.state.lock().metrics.clone())
    }

    async fn resolve_resource_group_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<ResourceGroup, ProviderError> {
        let s = self.state.lock();
        let name = s
            .tagged_groups
            .get(value)
            .ok_or_else(|| ProviderError::NotFound {
                resource: format!("resource group tagged {key}={value}"),
            })?;
        Ok(ResourceGroup {
            id: format!("/resourceGroups/{name}"),
            name: name.clone(),
            tags: [(key.to_string(), value.to_string())].into_iter().collect(),
        })
    }

    async fn resolve_resource_group_by_name(
        &self,
        name: &str,
    ) -> Result<ResourceGroup, ProviderError> {
        Ok(ResourceGroup {
            id: format!("/resourceGroups/{name}"),
            name: name.to_string(),
            ..ResourceGroup::default()
        })
    }

    async fn list_resource_capabilities(
        &self,
        _region: &str,
    ) -> Result<CapabilitySet, ProviderError> {
        self.capability_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.state.lock().capability_error {
            return Err(err.clone());
        }
        Ok(self.capability_set())
    }
}

/// Hands out the same [`FakeApi`] for any credentials, unless told to reject them.
#[derive(Default)]
pub(crate) struct FakeConnector {
    pub api: Arc<FakeApi>,
    pub reject: bool,
}

impl FakeConnector {
    pub fn new(api: Arc<FakeApi>) -> Self {
        Self { api, reject: false }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }
}

impl ApiConnector for FakeConnector {
    fn connect(&self, _credentials: &CredentialData) -> Result<Arc<dyn ManagementApi>, ProviderError> {
        if self.reject {
            return Err(ProviderError::Auth {
                message: "invalid client secret".into(),
            });
        }
        Ok(self.api.clone() as Arc<dyn ManagementApi>)
    }
}

/// An Azure cluster of project `acme` with a complete credential set.
pub(crate) fn azure_cluster(name: &str, subaccount: &str) -> Cluster {
    Cluster {
        provider_type: "azure".into(),
        region: "westeurope".into(),
        technical_id: format!("shoot--acme--{name}"),
        account_id: "ga-1".into(),
        subaccount_id: subaccount.into(),
        credential_data: [
            ("clientID", "id"),
            ("clientSecret", "secret"),
            ("tenantID", "tenant"),
            ("subscriptionID", "sub"),
        ]
        .into_iter()
        .collect(),
        deleted: false,
        trial: false,
    }
}
