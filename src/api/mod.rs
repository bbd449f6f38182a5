// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-level data model and the session seam.
//!
//! These types describe what the core sends to and receives from the remote
//! property collector and method dispatcher. Marshalling them onto a concrete
//! transport is the job of a [`Session`] implementation.

mod methods;
mod session;
mod types;

pub use methods::{Method, MethodResult, OptionValue, VirtualMachineConfigSpec};
pub use session::{Connector, ServiceContent, Session};
pub use types::{
    DynamicProperty, FaultKind, LocalizedMethodFault, ManagedObjectReference, ObjectContent,
    ObjectSpec, ObjectUpdate, ObjectUpdateKind, PropertyChange, PropertyChangeOp,
    PropertyFilterSpec, PropertyFilterUpdate, PropertySpec, SelectionSpec, TaskState,
    TraversalSpec, UpdateSet, Value, VirtualDevice, VirtualDisk, WaitOptions,
};
