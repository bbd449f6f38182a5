// SPDX-License-Identifier: MIT OR Apache-2.0

//! The authenticated session the core drives.
//!
//! Establishing and authenticating a session, and marshalling calls onto the
//! wire, happen behind these traits. Implementations must be safe to share
//! between concurrent operations; the core holds no locks of its own.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::methods::{Method, MethodResult};
use super::types::{
    ManagedObjectReference, ObjectContent, PropertyFilterSpec, UpdateSet, WaitOptions,
};
use crate::error::Result;

/// Well-known singleton objects of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContent {
    /// Root of the inventory tree.
    pub root_folder: ManagedObjectReference,
    /// The session's default property collector.
    pub property_collector: ManagedObjectReference,
    /// Datastore file manager.
    pub file_manager: ManagedObjectReference,
    /// Session manager.
    pub session_manager: ManagedObjectReference,
}

/// An authenticated session capable of property queries and method calls.
///
/// Errors are reported as [`crate::VsphereError::Transport`] for network or
/// session failures and [`crate::VsphereError::Fault`] for faults raised by a
/// synchronous call.
#[async_trait]
pub trait Session: Send + Sync {
    /// Singleton references of this session.
    fn service_content(&self) -> &ServiceContent;

    /// `PropertyCollector.RetrieveProperties` against the default collector.
    async fn retrieve_properties(&self, spec: PropertyFilterSpec) -> Result<Vec<ObjectContent>>;

    /// Invoke `method` on `this`.
    async fn invoke_method(
        &self,
        this: &ManagedObjectReference,
        method: Method,
    ) -> Result<MethodResult>;

    /// `PropertyCollector.CreatePropertyCollector`; returns a private collector.
    async fn create_property_collector(&self) -> Result<ManagedObjectReference>;

    /// `PropertyCollector.CreateFilter` on `collector`.
    async fn create_filter(
        &self,
        collector: &ManagedObjectReference,
        spec: PropertyFilterSpec,
        partial_updates: bool,
    ) -> Result<ManagedObjectReference>;

    /// `PropertyCollector.WaitForUpdatesEx`.
    ///
    /// Returns `Ok(None)` when the remote wait elapsed without changes.
    async fn wait_for_updates(
        &self,
        collector: &ManagedObjectReference,
        version: &str,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>>;

    /// `PropertyCollector.DestroyPropertyCollector`; also drops its filters.
    async fn destroy_property_collector(&self, collector: &ManagedObjectReference) -> Result<()>;

    /// `SessionManager.Logout`.
    async fn logout(&self) -> Result<()>;
}

/// Produces authenticated sessions for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate against `endpoint`.
    async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn Session>>;
}
