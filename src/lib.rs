// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async client for vSphere-style managed-object inventories.
//!
//! The core resolves slash-separated inventory paths, reads properties in
//! batches, waits for remote tasks and builds folder and virtual machine
//! lifecycle operations on top. The wire transport lives behind the
//! [`api::Session`] trait.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod runtime;
pub mod testkit;

pub use client::{
    Datacenter, DatacenterFolder, InventoryKind, PropertySet, VsphereClient, VsphereClientConfig,
    VsphereClientConfigBuilder,
};
pub use error::{RemovalErrors, RemovalFailure, Result, VsphereError};
pub use resources::{
    ComputeResource, ComputeResourceKind, Datastore, DatastorePath, ExtraConfig, Network,
    NetworkKind, PowerState, VirtualMachine,
};
pub use runtime::Context;
