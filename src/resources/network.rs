// SPDX-License-Identifier: MIT OR Apache-2.0

//! Networks reachable from the datacenter's network folder.

use crate::api::ManagedObjectReference;

pub(crate) const NETWORK_PROPERTIES: &[&str] = &["name"];
pub(crate) const PORTGROUP_PROPERTIES: &[&str] =
    &["name", "config.key", "config.distributedVirtualSwitch"];
pub(crate) const SWITCH_PROPERTIES: &[&str] = &["uuid"];

/// What backs a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkKind {
    /// A standard vSwitch port group.
    Standard,
    /// A network managed outside the platform, e.g. by NSX.
    Opaque,
    /// A distributed port group.
    DistributedPortgroup {
        /// Port group key.
        key: String,
        /// UUID of the owning distributed switch.
        switch_uuid: String,
    },
}

/// A network as observed by one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub reference: ManagedObjectReference,
    pub name: String,
    pub kind: NetworkKind,
}

impl Network {
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        matches!(self.kind, NetworkKind::DistributedPortgroup { .. })
    }
}
