//! Metric payloads produced by providers and the records exchanged with a management API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metrics collected for one cluster on one poll.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Resource groups the metrics were collected from.
    pub resource_groups: Vec<String>,
    /// Virtual machines and volumes.
    pub compute: Compute,
    /// Provisioned network resources.
    pub networking: Networking,
    /// Messaging usage; `null` when the cluster has no messaging resource group.
    pub event_hub: Option<EventHub>,
}

/// Compute usage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compute {
    /// Number of machines per machine size, sorted by size name.
    pub vm_types: Vec<VmType>,
    /// Sum of vCPUs over all machines.
    pub provisioned_cpus: u32,
    /// Sum of memory over all machines, in GB.
    pub provisioned_ram_gb: f64,
    /// Attached volumes.
    pub provisioned_volumes: ProvisionedVolumes,
}

/// Machine count of one size.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmType {
    /// Provider machine size.
    pub name: String,
    /// Number of machines.
    pub count: u32,
}

/// Volume usage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedVolumes {
    /// Exact sum of disk sizes.
    pub size_gb_total: u64,
    /// Sum of disk sizes, each rounded up to the billing block.
    pub size_gb_rounded: u64,
    /// Number of disks.
    pub count: u32,
}

/// Network usage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    /// Load balancers.
    pub provisioned_load_balancers: u32,
    /// Virtual networks.
    pub provisioned_vnets: u32,
    /// Public IP addresses.
    pub provisioned_ips: u32,
}

/// Messaging usage, summed over every namespace of the cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHub {
    /// Messaging namespaces.
    pub number_namespaces: u32,
    /// Incoming requests over the sampling interval.
    pub incoming_requests: f64,
    /// Incoming bytes over the sampling interval.
    pub incoming_bytes: f64,
    /// Outgoing bytes over the sampling interval.
    pub outgoing_bytes: f64,
}

/// Resource type → attribute map, for one region.
///
/// Built once per region and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    resources: BTreeMap<String, BTreeMap<String, String>>,
}

impl CapabilitySet {
    /// Wraps a resource map.
    pub fn new(resources: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { resources }
    }

    /// Attributes of `resource_type`.
    pub fn get(&self, resource_type: &str) -> Option<&BTreeMap<String, String>> {
        self.resources.get(resource_type)
    }

    /// Attribute parsed as a number; `None` if absent or not numeric.
    pub fn number(&self, resource_type: &str, attribute: &str) -> Option<f64> {
        self.get(resource_type)?.get(attribute)?.parse().ok()
    }

    /// Number of resource types.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True if no resource type is known.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<T, A> FromIterator<(T, A)> for CapabilitySet
where
    T: Into<String>,
    A: IntoIterator<Item = (String, String)>,
{
    fn from_iter<I: IntoIterator<Item = (T, A)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(t, attrs)| (t.into(), attrs.into_iter().collect()))
                .collect(),
        )
    }
}

/// One-time per-cluster metadata resolved before the first collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterMetadata {
    /// Resource group holding the cluster's messaging namespaces.
    pub messaging_resource_group: Option<String>,
}

/// A virtual machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputeInstance {
    /// Provider resource id.
    pub id: String,
    /// Machine size.
    pub size: String,
}

/// A managed disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disk {
    /// Provider resource id.
    pub id: String,
    /// Size in GB.
    pub size_gb: u64,
}

/// Kinds of network resources that are billed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkKind {
    /// Load balancer.
    LoadBalancer,
    /// Virtual network.
    VirtualNetwork,
    /// Public IP address.
    PublicIp,
}

/// A network resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkResource {
    /// Provider resource id.
    pub id: String,
    /// Resource kind.
    pub kind: NetworkKind,
}

/// A messaging namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagingNamespace {
    /// Provider resource id (the metric resource URI).
    pub id: String,
    /// Namespace name.
    pub name: String,
}

/// A resource group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceGroup {
    /// Provider resource id.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Group tags.
    pub tags: BTreeMap<String, String>,
}

/// Aggregated value of one metric.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricValue {
    /// Metric name.
    pub name: String,
    /// Total over the requested interval.
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_numbers_parse() {
        let caps: CapabilitySet = [(
            "Standard_D4s_v3",
            [
                ("vCPUs".to_string(), "4".to_string()),
                ("MemoryGB".to_string(), "16".to_string()),
                ("Tier".to_string(), "Standard".to_string()),
            ],
        )]
        .into_iter()
        .collect();

        assert_eq!(caps.number("Standard_D4s_v3", "vCPUs"), Some(4.0));
        assert_eq!(caps.number("Standard_D4s_v3", "Tier"), None);
        assert_eq!(caps.number("Standard_D8s_v3", "vCPUs"), None);
    }

    #[test]
    fn missing_event_hub_serializes_as_null() {
        let json = serde_json::to_value(EventData::default()).unwrap();
        assert!(json["eventHub"].is_null());
        assert_eq!(json["compute"]["provisionedCpus"], 0);
        assert_eq!(json["networking"]["provisionedVnets"], 0);
    }
}
