//! # Azure-style metrics provider.
//!
//! Layout assumed on the provider side:
//! - every cluster owns a resource group named after its technical id, holding
//!   its machines, disks and network resources;
//! - messaging namespaces live in a separate group tagged with the cluster's
//!   subaccount id (trial clusters usually have none).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ApiConnector, CapabilitySet, ClusterMetadata, Compute, EventHub, ManagementApi,
    MetricsProvider, NetworkKind, Networking, ProvisionedVolumes, VmType,
};
use crate::cluster::Cluster;
use crate::error::ProviderError;

/// Tag identifying the messaging resource group of a subaccount.
pub const SUBACCOUNT_TAG: &str = "subaccount_id";

/// Credential fields required to build an API handle.
pub const REQUIRED_CREDENTIALS: [&str; 4] =
    ["clientID", "clientSecret", "tenantID", "subscriptionID"];

const CPU_ATTRIBUTE: &str = "vCPUs";
const MEMORY_ATTRIBUTE: &str = "MemoryGB";
const DISK_BLOCK_GB: u64 = 32;
const MESSAGING_INTERVAL: Duration = Duration::from_secs(5 * 60);
const INCOMING_REQUESTS: &str = "IncomingRequests";
const INCOMING_BYTES: &str = "IncomingBytes";
const OUTGOING_BYTES: &str = "OutgoingBytes";

/// Metrics provider for Azure-hosted clusters.
pub struct AzureProvider {
    connector: Arc<dyn ApiConnector>,
}

impl AzureProvider {
    /// Provider name used for routing.
    pub const NAME: &'static str = "azure";

    /// Creates the provider on top of an API connector.
    pub fn new(connector: Arc<dyn ApiConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl MetricsProvider for AzureProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ManagementApi>, ProviderError> {
        if let Some(missing) = REQUIRED_CREDENTIALS
            .iter()
            .find(|k| cluster.credential_data.get(k).is_none_or(<[u8]>::is_empty))
        {
            return Err(ProviderError::Auth {
                message: format!("credential field {missing} is missing"),
            });
        }
        self.connector.connect(&cluster.credential_data)
    }

    async fn resolve_metadata(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
    ) -> Result<ClusterMetadata, ProviderError> {
        let group = api
            .resolve_resource_group_by_tag(SUBACCOUNT_TAG, &cluster.subaccount_id)
            .await?;
        Ok(ClusterMetadata {
            messaging_resource_group: Some(group.name),
        })
    }

    async fn capabilities(
        &self,
        api: &dyn ManagementApi,
        region: &str,
    ) -> Result<CapabilitySet, ProviderError> {
        api.list_resource_capabilities(region).await
    }

    async fn collect_compute(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
        capabilities: Option<&CapabilitySet>,
    ) -> Result<Compute, ProviderError> {
        let group = cluster.technical_id.as_str();
        let machines = api.list_compute_instances(group).await?;
        let disks = api.list_disks(group).await?;

        let mut compute = Compute::default();
        let mut sizes: BTreeMap<&str, u32> = BTreeMap::new();
        for vm in &machines {
            *sizes.entry(vm.size.as_str()).or_default() += 1;
            if let Some(caps) = capabilities {
                compute.provisioned_cpus += caps.number(&vm.size, CPU_ATTRIBUTE).unwrap_or(0.0) as u32;
                compute.provisioned_ram_gb += caps.number(&vm.size, MEMORY_ATTRIBUTE).unwrap_or(0.0);
            }
        }
        compute.vm_types = sizes
            .into_iter()
            .map(|(name, count)| VmType {
                name: name.to_string(),
                count,
            })
            .collect();

        compute.provisioned_volumes = ProvisionedVolumes {
            size_gb_total: disks.iter().map(|d| d.size_gb).sum(),
            size_gb_rounded: disks
                .iter()
                .map(|d| d.size_gb.div_ceil(DISK_BLOCK_GB) * DISK_BLOCK_GB)
                .sum(),
            count: disks.len() as u32,
        };
        Ok(compute)
    }

    async fn collect_network(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
    ) -> Result<Networking, ProviderError> {
        let resources = api.list_network_resources(&cluster.technical_id).await?;
        let count = |kind: NetworkKind| resources.iter().filter(|r| r.kind == kind).count() as u32;
        Ok(Networking {
            provisioned_load_balancers: count(NetworkKind::LoadBalancer),
            provisioned_vnets: count(NetworkKind::VirtualNetwork),
            provisioned_ips: count(NetworkKind::PublicIp),
        })
    }

    async fn collect_messaging(
        &self,
        api: &dyn ManagementApi,
        metadata: &ClusterMetadata,
    ) -> Result<Option<EventHub>, ProviderError> {
        let Some(group) = metadata.messaging_resource_group.as_deref() else {
            return Ok(None);
        };

        let namespaces = api.list_messaging_namespaces(group).await?;
        let mut hub = EventHub {
            number_namespaces: namespaces.len() as u32,
            ..EventHub::default()
        };
        for ns in &namespaces {
            let values = api
                .get_metric_values(
                    &ns.id,
                    MESSAGING_INTERVAL,
                    &[INCOMING_REQUESTS, INCOMING_BYTES, OUTGOING_BYTES],
                )
                .await?;
            for v in values {
                match v.name.as_str() {
                    INCOMING_REQUESTS => hub.incoming_requests += v.total,
                    INCOMING_BYTES => hub.incoming_bytes += v.total,
                    OUTGOING_BYTES => hub.outgoing_bytes += v.total,
                    _ => {}
                }
            }
        }
        Ok(Some(hub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeApi, FakeConnector, azure_cluster};
    use crate::provider::{ComputeInstance, Disk, MessagingNamespace, MetricValue, NetworkResource};

    fn provider(api: Arc<FakeApi>) -> AzureProvider {
        AzureProvider::new(Arc::new(FakeConnector::new(api)))
    }

    #[tokio::test]
    async fn computes_usage_from_machines_disks_and_capabilities() {
        let api = Arc::new(FakeApi::default());
        let c = azure_cluster("c1", "sa-1");
        {
            let mut s = api.state.lock();
            s.instances = vec![
                ComputeInstance { id: "vm1".into(), size: "Standard_D4s_v3".into() },
                ComputeInstance { id: "vm2".into(), size: "Standard_D4s_v3".into() },
                ComputeInstance { id: "vm3".into(), size: "Standard_D8s_v3".into() },
            ];
            s.disks = vec![
                Disk { id: "d1".into(), size_gb: 30 },
                Disk { id: "d2".into(), size_gb: 64 },
                Disk { id: "d3".into(), size_gb: 65 },
            ];
        }
        let caps = api.capability_set();
        let p = provider(api.clone());

        let compute = p.collect_compute(api.as_ref(), &c, Some(&caps)).await.unwrap();
        assert_eq!(
            compute.vm_types,
            vec![
                VmType { name: "Standard_D4s_v3".into(), count: 2 },
                VmType { name: "Standard_D8s_v3".into(), count: 1 },
            ]
        );
        assert_eq!(compute.provisioned_cpus, 16);
        assert_eq!(compute.provisioned_ram_gb, 64.0);
        assert_eq!(
            compute.provisioned_volumes,
            ProvisionedVolumes { size_gb_total: 159, size_gb_rounded: 32 + 64 + 96, count: 3 }
        );
    }

    #[tokio::test]
    async fn counts_network_resources_by_kind() {
        let api = Arc::new(FakeApi::default());
        api.state.lock().network = vec![
            NetworkResource { id: "lb".into(), kind: NetworkKind::LoadBalancer },
            NetworkResource { id: "vnet".into(), kind: NetworkKind::VirtualNetwork },
            NetworkResource { id: "ip1".into(), kind: NetworkKind::PublicIp },
            NetworkResource { id: "ip2".into(), kind: NetworkKind::PublicIp },
        ];
        let net = provider(api.clone())
            .collect_network(api.as_ref(), &azure_cluster("c1", "sa-1"))
            .await
            .unwrap();
        assert_eq!(
            net,
            Networking { provisioned_load_balancers: 1, provisioned_vnets: 1, provisioned_ips: 2 }
        );
    }

    #[tokio::test]
    async fn sums_messaging_metrics_over_namespaces() {
        let api = Arc::new(FakeApi::default());
        {
            let mut s = api.state.lock();
            s.namespaces = vec![
                MessagingNamespace { id: "ns1-id".into(), name: "ns1".into() },
                MessagingNamespace { id: "ns2-id".into(), name: "ns2".into() },
            ];
            s.metrics = vec![
                MetricValue { name: INCOMING_REQUESTS.into(), total: 10.0 },
                MetricValue { name: INCOMING_BYTES.into(), total: 100.0 },
                MetricValue { name: OUTGOING_BYTES.into(), total: 50.0 },
            ];
        }
        let meta = ClusterMetadata { messaging_resource_group: Some("rg-msg".into()) };
        let hub = provider(api.clone())
            .collect_messaging(api.as_ref(), &meta)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.number_namespaces, 2);
        assert_eq!(hub.incoming_requests, 20.0);
        assert_eq!(hub.incoming_bytes, 200.0);
        assert_eq!(hub.outgoing_bytes, 100.0);

        let none = provider(api.clone())
            .collect_messaging(api.as_ref(), &ClusterMetadata::default())
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn metadata_comes_from_the_subaccount_tag() {
        let api = Arc::new(FakeApi::default());
        let p = provider(api.clone());
        let c = azure_cluster("c1", "sa-1");

        assert!(matches!(
            p.resolve_metadata(api.as_ref(), &c).await,
            Err(ProviderError::NotFound { .. })
        ));

        api.state.lock().tagged_groups.insert("sa-1".into(), "rg-msg".into());
        let meta = p.resolve_metadata(api.as_ref(), &c).await.unwrap();
        assert_eq!(meta.messaging_resource_group.as_deref(), Some("rg-msg"));
    }

    #[tokio::test]
    async fn collect_reports_every_resource_group() {
        let api = Arc::new(FakeApi::default());
        let p = provider(api.clone());
        let c = azure_cluster("c1", "sa-1");
        let meta = ClusterMetadata { messaging_resource_group: Some("rg-msg".into()) };
        let data = p.collect(api.as_ref(), &c, &meta, None).await.unwrap();
        assert_eq!(data.resource_groups, vec!["shoot--acme--c1", "rg-msg"]);
        assert_eq!(data.event_hub.unwrap().number_namespaces, 0);
    }

    #[test]
    fn connect_requires_every_credential_field() {
        let p = provider(Arc::new(FakeApi::default()));
        let mut c = azure_cluster("c1", "sa-1");
        assert!(p.connect(&c).is_ok());

        c.credential_data.insert("tenantID", "");
        let err = p.connect(&c).err().unwrap();
        assert!(matches!(err, ProviderError::Auth { .. }));
        assert!(err.to_string().contains("tenantID"));
    }
}
