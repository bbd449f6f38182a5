// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strongly typed views of inventory objects.
//!
//! Each type is built from one [`crate::client::PropertySet`] and reflects
//! the remote state at the time of the retrieval that produced it.

mod compute;
mod datastore;
mod network;
mod vm;

pub use compute::{ComputeResource, ComputeResourceKind};
pub use datastore::{Datastore, DatastorePath};
pub use network::{Network, NetworkKind};
pub use vm::{ExtraConfig, PowerState, VirtualMachine};

pub(crate) use compute::COMPUTE_RESOURCE_PROPERTIES;
pub(crate) use datastore::DATASTORE_PROPERTIES;
pub(crate) use network::{NETWORK_PROPERTIES, PORTGROUP_PROPERTIES, SWITCH_PROPERTIES};
pub(crate) use vm::{VM_POWER_STATE, VM_PROPERTIES};
