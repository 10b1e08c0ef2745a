//! Data models shared across the Cloud API resource modules.
//!
//! Request payload types embed [`CommonParams`] (flattened), which carries
//! the `dc`/`force` fields the server understands on every mutating call
//! and opts the payload into datacenter-scope injection. Response models
//! tolerate missing fields the server omits.

use danube_core::Scoped;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Image access level: visible to every account.
pub const ACCESS_PUBLIC: i32 = 1;

/// Image access level: visible to the owner only.
pub const ACCESS_PRIVATE: i32 = 3;

/// Parameters accepted by every mutating API call.
///
/// Flattened into request payloads; the `dc` field is what the dispatcher
/// fills in with the active datacenter scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Target virtual datacenter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,

    /// Force the operation past server-side safety checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

impl CommonParams {
    /// Parameters carrying only a force flag.
    #[must_use]
    pub fn force(force: bool) -> Self {
        Self {
            dc: None,
            force: Some(force),
        }
    }
}

impl Scoped for CommonParams {
    fn datacenter(&self) -> Option<&str> {
        self.dc.as_deref()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.dc = Some(dc.to_string());
    }
}

/// Fields common to most server-side objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericEntity {
    /// Unique readable identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// Object owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Access level ([`ACCESS_PUBLIC`] or [`ACCESS_PRIVATE`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<i32>,

    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,

    /// Object creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Extended state of a provisioned virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VmDetails {
    /// VM hostname
    pub hostname: Option<String>,
    /// Server-assigned identifier
    pub uuid: Option<Uuid>,
    /// DNS name without a domain
    pub alias: Option<String>,
    /// Compute node the VM is placed on
    pub node: Option<String>,
    /// Owning account
    pub owner: Option<String>,
    /// Current VM state
    pub status: Option<String>,
    /// Compute node state
    pub node_status: Option<String>,
    /// Number of virtual CPUs
    pub vcpus: Option<u32>,
    /// Memory in MB
    pub ram: Option<u64>,
    /// Total disk in MB
    pub disk: Option<u64>,
    /// Assigned IP addresses
    pub ips: Vec<String>,
    /// Seconds since last boot
    pub uptime: Option<u64>,
    /// Whether the VM is locked against changes
    pub locked: bool,
    /// Assigned tags
    pub tags: Vec<String>,
    /// Number of snapshots on record
    pub snapshots: Option<u32>,
    /// Number of backups on record
    pub backups: Option<u32>,
    /// Whether the definition differs from the deployed state
    pub changed: bool,
}

/// Client-side criteria for narrowing an extended machine listing.
///
/// String fields other than `uuid`, `owner`, and `status` match by
/// substring; `tags` requires every listed tag to be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmFilter {
    /// Substring of the hostname
    pub hostname: Option<String>,
    /// Exact machine identifier
    pub uuid: Option<Uuid>,
    /// Substring of the alias
    pub alias: Option<String>,
    /// Substring of the compute-node name
    pub node: Option<String>,
    /// Exact owning account
    pub owner: Option<String>,
    /// Exact VM state
    pub status: Option<String>,
    /// Tags that must all be present
    pub tags: Vec<String>,
}

impl VmFilter {
    fn contains(needle: &Option<String>, haystack: &Option<String>) -> bool {
        match (needle, haystack) {
            (Some(needle), Some(haystack)) => haystack.contains(needle.as_str()),
            _ => false,
        }
    }

    fn equals(needle: &Option<String>, value: &Option<String>) -> bool {
        matches!((needle, value), (Some(n), Some(v)) if n == v)
    }

    /// Whether `vm` satisfies this filter.
    #[must_use]
    pub fn matches(&self, vm: &VmDetails) -> bool {
        if Self::contains(&self.hostname, &vm.hostname)
            || matches!((self.uuid, vm.uuid), (Some(f), Some(v)) if f == v)
            || Self::contains(&self.alias, &vm.alias)
            || Self::contains(&self.node, &vm.node)
            || Self::equals(&self.owner, &vm.owner)
            || Self::equals(&self.status, &vm.status)
        {
            return true;
        }
        !self.tags.is_empty() && self.tags.iter().all(|tag| vm.tags.contains(tag))
    }
}

/// Definition of a virtual machine, as submitted to and stored by the
/// server.
///
/// Unset optional fields mean the server default. The trailing fields are
/// reported by the server and ignored on submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineDefinition {
    /// Common mutating-call parameters
    #[serde(flatten)]
    pub params: CommonParams,

    /// VM name
    pub name: String,

    /// DNS name without a domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// DNS domain part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,

    /// Server template to apply defaults from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Guest OS type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostype: Option<i32>,

    /// Number of virtual CPUs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,

    /// Memory in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<u64>,

    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Owning account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Target compute node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Assigned tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Enable monitoring for this VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitored: Option<bool>,

    /// Mark the server installed without deploying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,

    /// Storage pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zpool: Option<String>,

    /// CPU shares weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<u32>,

    /// ZFS IO priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zfs_io_priority: Option<u32>,

    /// Virtual CPU model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_type: Option<String>,

    /// VGA emulation type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vga: Option<String>,

    /// Static routes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub routes: HashMap<String, String>,

    /// VM metadata key/value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub mdata: HashMap<String, String>,

    /// Server-assigned identifier (reported only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// DNS resolvers (reported only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolvers: Vec<String>,

    /// Whether the VM is locked against changes (reported only)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,

    /// Definition creation time (reported only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl MachineDefinition {
    /// A minimal definition with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The server-assigned identifier, falling back to the name.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.uuid
            .map(|uuid| uuid.to_string())
            .unwrap_or_else(|| self.name.clone())
    }
}

impl Scoped for MachineDefinition {
    fn datacenter(&self) -> Option<&str> {
        self.params.datacenter()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.params.set_datacenter(dc);
    }
}

/// Definition of a virtual network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NicDefinition {
    /// Common mutating-call parameters
    #[serde(flatten)]
    pub params: CommonParams,

    /// NIC slot, counted from 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_id: Option<u32>,

    /// Network to attach to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<String>,

    /// Static IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// NIC emulation model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Register the address in DNS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<bool>,

    /// Inherit resolvers from the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_net_dns: Option<bool>,

    /// Static MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    /// Interface MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Whether this is the primary NIC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,

    /// Allow DHCP spoofing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_dhcp_spoofing: Option<bool>,

    /// Allow IP spoofing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_ip_spoofing: Option<bool>,

    /// Allow MAC spoofing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_mac_spoofing: Option<bool>,

    /// Allow restricted traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_restricted_traffic: Option<bool>,

    /// Allow unfiltered promiscuous mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unfiltered_promisc: Option<bool>,

    /// Additional allowed source IPs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_ips: Vec<String>,

    /// Enable monitoring over this NIC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<bool>,

    /// Set the default gateway from this NIC's network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_gateway: Option<bool>,

    /// Netmask (reported only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

impl Scoped for NicDefinition {
    fn datacenter(&self) -> Option<&str> {
        self.params.datacenter()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.params.set_datacenter(dc);
    }
}

/// Definition of a virtual disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskDefinition {
    /// Common mutating-call parameters
    #[serde(flatten)]
    pub params: CommonParams,

    /// Disk slot, counted from 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<u32>,

    /// Disk size in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Image to provision the disk from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Disk emulation model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Block size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,

    /// Compression algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    /// Storage pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zpool: Option<String>,

    /// Whether the disk is bootable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<bool>,

    /// Reserved space in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreservation: Option<u64>,

    /// Inherit tags from the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tags_inherit: Option<bool>,
}

impl Scoped for DiskDefinition {
    fn datacenter(&self) -> Option<&str> {
        self.params.datacenter()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.params.set_datacenter(dc);
    }
}

/// Everything needed to bring up a new machine in one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateMachineOpts {
    /// The machine definition
    pub vm: MachineDefinition,
    /// Disks to attach, in slot order
    pub disks: Vec<DiskDefinition>,
    /// NICs to attach, in slot order
    pub nics: Vec<NicDefinition>,
}

/// A network available to the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Common entity fields
    #[serde(flatten)]
    pub entity: GenericEntity,

    /// Network address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Netmask
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,

    /// Default gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// NIC tag the network rides on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tag: Option<String>,

    /// NIC tag type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tag_type: Option<String>,

    /// VLAN identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<i32>,

    /// VXLAN identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan_id: Option<i32>,

    /// Network MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i32>,

    /// DNS resolvers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolvers: Vec<String>,

    /// DNS domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,

    /// Reverse-DNS domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptr_domain: Option<String>,

    /// Pass DHCP traffic through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_passthrough: Option<bool>,

    /// Virtual datacenters the network is attached to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dcs: Vec<String>,
}

/// A disk image available for provisioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Common entity fields
    #[serde(flatten)]
    pub entity: GenericEntity,

    /// Image version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Image type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    /// Guest OS type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ostype: Option<i32>,

    /// Starting disk size in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Whether the root disk is resizable at deploy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<bool>,

    /// Whether a deploy phase runs after provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<bool>,

    /// Associated image tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Image state code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,

    /// Whether the image is bound to a single virtual datacenter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc_bound: Option<bool>,

    /// Raw manifest, present on remote-repository lookups only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<serde_json::Value>,

    /// Virtual datacenters the image is attached to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dcs: Vec<String>,
}

/// A configured remote image repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRepo {
    /// Repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Repository name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number of images on offer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u64>,

    /// Last successful refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<chrono::DateTime<chrono::Utc>>,

    /// Last refresh failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
