// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lifecycle client.
//!
//! [`VsphereClient`] pins an authenticated session to one datacenter and
//! offers the folder, virtual machine, datastore and network operations an
//! orchestrator needs. Every operation resolves the paths it is given
//! afresh, so nothing observed by one call is trusted by the next.

mod remote;
mod resolver;
mod retriever;
mod task;


use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{
    Connector, FaultKind, ManagedObjectReference, Method, MethodResult, PropertySpec, Session,
    Value, WaitOptions,
};
use crate::error::{RemovalErrors, RemovalFailure, Result, VsphereError};
use crate::resources::{
    ComputeResource, Datastore, DatastorePath, ExtraConfig, Network, NetworkKind, PowerState,
    VirtualMachine, COMPUTE_RESOURCE_PROPERTIES, DATASTORE_PROPERTIES, NETWORK_PROPERTIES,
    PORTGROUP_PROPERTIES, SWITCH_PROPERTIES, VM_POWER_STATE, VM_PROPERTIES,
};
use crate::runtime::{Context, LoggingConfig, RequestLogger, RetryConfig};

use remote::Remote;
pub use resolver::{Datacenter, DatacenterFolder, InventoryKind, InventoryRoot};
use resolver::{segments, PathResolver};
pub use retriever::PropertySet;
use retriever::PropertyRetriever;
use task::TaskWaiter;

const TARGET: &str = "vsphere_api::client";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct VsphereClientConfig {
    /// SDK endpoint, e.g. `https://vcenter.example.com/sdk`. A bare host name
    /// is accepted and gets `https://` and `/sdk` added.
    pub endpoint: String,
    /// Inventory path of the datacenter every operation works in.
    pub datacenter: String,
    pub logging: LoggingConfig,
    /// Retry policy for establishing the session.
    pub retry: RetryConfig,
    /// Long-poll options for task waits.
    pub wait: WaitOptions,
}

impl Default for VsphereClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://127.0.0.1/sdk".to_string(),
            datacenter: String::new(),
            logging: LoggingConfig::default(),
            retry: RetryConfig::default(),
            wait: WaitOptions::default(),
        }
    }
}

impl VsphereClientConfig {
    /// Create a configuration for `endpoint` and `datacenter` with defaults
    /// for everything else.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            datacenter: datacenter.into(),
            ..Default::default()
        }
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder(
        endpoint: impl Into<String>,
        datacenter: impl Into<String>,
    ) -> VsphereClientConfigBuilder {
        VsphereClientConfigBuilder {
            config: Self::new(endpoint, datacenter),
        }
    }

    /// The endpoint as a URL.
    ///
    /// # Errors
    ///
    /// Returns [`VsphereError::Config`] if the endpoint does not parse or
    /// uses a scheme other than `http` or `https`.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = self.endpoint.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        let mut url = Url::parse(&with_scheme)
            .map_err(|e| VsphereError::Config(format!("Invalid endpoint URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VsphereError::Config(format!(
                "unsupported endpoint scheme {:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(VsphereError::Config("No host in endpoint".to_string()));
        }
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/sdk");
        }
        Ok(url)
    }
}

/// Builder for [`VsphereClientConfig`].
#[derive(Clone, Debug)]
pub struct VsphereClientConfigBuilder {
    config: VsphereClientConfig,
}

impl VsphereClientConfigBuilder {
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn wait(mut self, wait: WaitOptions) -> Self {
        self.config.wait = wait;
        self
    }

    /// Seconds the remote side may hold each task long-poll open.
    #[must_use]
    pub fn wait_max_seconds(mut self, seconds: i32) -> Self {
        self.config.wait.max_wait_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn build(self) -> VsphereClientConfig {
        self.config
    }
}

// ============================================================================
// Client
// ============================================================================

struct Inner {
    remote: Remote,
    datacenter: String,
    closed: AtomicBool,
}

/// A session pinned to one datacenter.
///
/// Clones share the session; closing any clone closes them all.
#[derive(Clone)]
pub struct VsphereClient {
    inner: Arc<Inner>,
    wait: WaitOptions,
}

impl fmt::Debug for VsphereClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsphereClient")
            .field("datacenter", &self.inner.datacenter)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl VsphereClient {
    /// Establish a session through `connector` and pin it to the configured
    /// datacenter.
    ///
    /// Transport errors while connecting are retried according to
    /// `config.retry`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vsphere_api_rs::api::Connector;
    /// use vsphere_api_rs::runtime::Context;
    /// use vsphere_api_rs::{VsphereClient, VsphereClientConfig};
    ///
    /// # async fn example(connector: &dyn Connector) -> vsphere_api_rs::Result<()> {
    /// let ctx = Context::background();
    /// let config = VsphereClientConfig::builder("vcenter.example.com", "dc0")
    ///     .wait_max_seconds(30)
    ///     .build();
    /// let client = VsphereClient::dial(&ctx, connector, config).await?;
    /// for ds in client.datastores(&ctx).await? {
    ///     println!("{} accessible={}", ds.name, ds.accessible);
    /// }
    /// client.close(&ctx).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`VsphereError::Config`] for an invalid endpoint or an empty
    /// datacenter name, or the connector's error once retries run out.
    pub async fn dial(
        ctx: &Context,
        connector: &dyn Connector,
        config: VsphereClientConfig,
    ) -> Result<Self> {
        let url = config.endpoint_url()?;
        if segments(&config.datacenter).is_empty() {
            return Err(VsphereError::Config(
                "datacenter name is required".to_string(),
            ));
        }

        let session = config
            .retry
            .execute(ctx, "connect", || ctx.run("connect", connector.connect(&url)))
            .await?;
        info!(
            target: TARGET,
            "connected to {} (datacenter {:?})", url, config.datacenter
        );

        let logger = Arc::new(RequestLogger::with_config(config.logging));
        Ok(Self::build(session, config.datacenter, logger, config.wait))
    }

    /// Wrap an already established session.
    #[must_use]
    pub fn from_session(
        session: Arc<dyn Session>,
        datacenter: impl Into<String>,
        logger: Arc<RequestLogger>,
    ) -> Self {
        Self::build(session, datacenter.into(), logger, WaitOptions::default())
    }

    fn build(
        session: Arc<dyn Session>,
        datacenter: String,
        logger: Arc<RequestLogger>,
        wait: WaitOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote: Remote::new(session, logger),
                datacenter,
                closed: AtomicBool::new(false),
            }),
            wait,
        }
    }

    /// Use different long-poll options for task waits on this handle.
    #[must_use]
    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// The logger every remote call is reported to.
    #[must_use]
    pub fn logger(&self) -> &Arc<RequestLogger> {
        self.inner.remote.logger()
    }

    /// The datacenter path this client is pinned to.
    #[must_use]
    pub fn datacenter_name(&self) -> &str {
        &self.inner.datacenter
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Log out and release the session.
    ///
    /// Logout runs at most once across all clones; later calls return `Ok`
    /// without contacting the remote side. Once started, logout completes
    /// even if `ctx` is cancelled while waiting for it.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let session = self.inner.remote.session().clone();
        let logger = self.inner.remote.logger().clone();
        let logout = tokio::spawn(async move {
            let span = logger.start("Logout");
            let result = session.logout().await;
            match &result {
                Ok(()) => logger.finish_success(span),
                Err(err) => logger.finish_error(span, &err.to_string()),
            }
            result
        });
        ctx.run("Logout", async {
            logout
                .await
                .map_err(|e| VsphereError::Transport(format!("logout task failed: {e}")))?
        })
        .await?;
        info!(target: TARGET, "session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(VsphereError::SessionClosed);
        }
        Ok(())
    }

    fn remote(&self) -> &Remote {
        &self.inner.remote
    }

    fn retriever(&self) -> PropertyRetriever<'_> {
        PropertyRetriever::new(self.remote())
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(self.remote())
    }

    /// Invoke `method` and, if it started a task, wait for the task.
    async fn run_task(
        &self,
        ctx: &Context,
        this: &ManagedObjectReference,
        method: Method,
    ) -> Result<Option<Value>> {
        match self.remote().invoke(ctx, this, method).await? {
            MethodResult::Task(task) => {
                TaskWaiter::new(self.remote(), self.wait)
                    .wait(ctx, task)
                    .await
            }
            MethodResult::Value(value) => Ok(Some(value)),
            MethodResult::Void => Ok(None),
        }
    }

    /// Read the pinned datacenter and its root folders.
    pub async fn datacenter(&self, ctx: &Context) -> Result<Datacenter> {
        self.ensure_open()?;
        self.resolver()
            .datacenter(ctx, &self.inner.datacenter)
            .await
            .map_err(|e| e.during(format!("looking up datacenter {:?}", self.inner.datacenter)))
    }

    // ========================================================================
    // Folders
    // ========================================================================

    /// Make sure the VM folder `path` exists, creating missing folders.
    ///
    /// Existing segments are left alone; each missing one is created in
    /// order. A folder created concurrently by someone else is accepted.
    /// Calling this for a path that already exists issues no creation call.
    ///
    /// Returns the reference of the deepest folder.
    pub async fn ensure_folder(&self, ctx: &Context, path: &str) -> Result<ManagedObjectReference> {
        self.ensure_open()?;
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let partial = self
            .resolver()
            .resolve_partial(ctx, &root, path)
            .await
            .map_err(|e| e.during(format!("resolving folder {path:?}")))?;

        if partial.missing.is_empty() {
            debug!(target: TARGET, "folder {:?} already exists", path);
            return Ok(partial.folder);
        }

        let mut current = partial.folder;
        for name in partial.missing {
            current = self
                .create_folder(ctx, &current, &name)
                .await
                .map_err(|e| e.during(format!("creating folder {name:?} of {path:?}")))?;
            info!(target: TARGET, "created folder {:?} ({})", name, current);
        }
        Ok(current)
    }

    async fn create_folder(
        &self,
        ctx: &Context,
        parent: &ManagedObjectReference,
        name: &str,
    ) -> Result<ManagedObjectReference> {
        let created = self
            .run_task(
                ctx,
                parent,
                Method::CreateFolder {
                    name: name.to_string(),
                },
            )
            .await;
        match created {
            Ok(Some(Value::Ref(folder))) => Ok(folder),
            Ok(other) => Err(VsphereError::Protocol(format!(
                "CreateFolder returned {}",
                other.as_ref().map_or("nothing", Value::kind)
            ))),
            Err(err) if err.is_fault(&FaultKind::DuplicateName) => {
                debug!(
                    target: TARGET,
                    "folder {:?} appeared concurrently, using it", name
                );
                self.resolver()
                    .find_child(ctx, parent, name, InventoryKind::Folder, name)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Move the VM folder `src` into the VM folder `dst`.
    ///
    /// An empty `dst` means the datacenter's VM folder itself.
    ///
    /// # Errors
    ///
    /// Fails with an error for which [`VsphereError::is_not_found`] holds if
    /// either path does not exist.
    pub async fn move_folder(&self, ctx: &Context, src: &str, dst: &str) -> Result<()> {
        self.ensure_open()?;
        if segments(src).is_empty() {
            return Err(VsphereError::Validation(
                "source folder path is empty".to_string(),
            ));
        }
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let action = || format!("moving folder {src:?} into {dst:?}");

        let resolver = self.resolver();
        let source = resolver
            .resolve_one(ctx, &root, src, InventoryKind::Folder)
            .await
            .map_err(|e| e.during(action()))?;
        let target = resolver
            .resolve_one(ctx, &root, dst, InventoryKind::Folder)
            .await
            .map_err(|e| e.during(action()))?;

        self.run_task(ctx, &target, Method::MoveIntoFolder { list: vec![source] })
            .await
            .map_err(|e| e.during(action()))?;
        info!(target: TARGET, "moved folder {:?} into {:?}", src, dst);
        Ok(())
    }

    /// Destroy the VM folder `path` and everything in it.
    pub async fn destroy_folder_tree(&self, ctx: &Context, path: &str) -> Result<()> {
        self.ensure_open()?;
        if segments(path).is_empty() {
            return Err(VsphereError::Validation(
                "refusing to destroy the root VM folder".to_string(),
            ));
        }
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let action = || format!("destroying folder {path:?}");

        let folder = self
            .resolver()
            .resolve_one(ctx, &root, path, InventoryKind::Folder)
            .await
            .map_err(|e| e.during(action()))?;
        self.run_task(ctx, &folder, Method::Destroy)
            .await
            .map_err(|e| e.during(action()))?;
        info!(target: TARGET, "destroyed folder {:?}", path);
        Ok(())
    }

    /// Move virtual machines into the VM folder `folder`.
    pub async fn move_vms_into(
        &self,
        ctx: &Context,
        folder: &str,
        vms: &[ManagedObjectReference],
    ) -> Result<()> {
        self.ensure_open()?;
        if vms.is_empty() {
            return Ok(());
        }
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let action = || format!("moving {} virtual machines into {folder:?}", vms.len());

        let target = self
            .resolver()
            .resolve_one(ctx, &root, folder, InventoryKind::Folder)
            .await
            .map_err(|e| e.during(action()))?;
        self.run_task(
            ctx,
            &target,
            Method::MoveIntoFolder {
                list: vms.to_vec(),
            },
        )
        .await
        .map_err(|e| e.during(action()))?;
        Ok(())
    }

    // ========================================================================
    // Virtual machines
    // ========================================================================

    /// Power off (if needed) and destroy every VM matching `pattern`.
    ///
    /// `pattern` is a VM folder path whose final segment is either a VM name
    /// or `*` for every VM below the folder. VMs are removed concurrently.
    /// A powered-on VM is destroyed only after its power-off task finished.
    ///
    /// # Errors
    ///
    /// Resolution failures are returned as-is. If any VM could not be
    /// removed, the others are still attempted and
    /// [`VsphereError::VmRemoval`] lists every failure in input order.
    pub async fn remove_virtual_machines(&self, ctx: &Context, pattern: &str) -> Result<()> {
        self.ensure_open()?;
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let vms = self
            .resolver()
            .resolve(ctx, &root, pattern, InventoryKind::VirtualMachine)
            .await
            .map_err(|e| e.during(format!("resolving virtual machines {pattern:?}")))?;
        let observed = self
            .retriever()
            .retrieve_many(ctx, &vms, &["name", VM_POWER_STATE])
            .await?;

        let results = join_all(observed.iter().map(|vm| self.remove_vm(ctx, vm))).await;

        let failures: Vec<RemovalFailure> = observed
            .iter()
            .zip(results)
            .filter_map(|(vm, result)| {
                result.err().map(|error| RemovalFailure {
                    name: vm.name().unwrap_or(&vm.reference().value).to_string(),
                    vm: vm.reference().clone(),
                    error,
                })
            })
            .collect();

        if failures.is_empty() {
            info!(
                target: TARGET,
                "removed {} virtual machines matching {:?}",
                observed.len(),
                pattern
            );
            return Ok(());
        }
        for failure in &failures {
            warn!(
                target: TARGET,
                "failed to remove {}: {}", failure.name, failure.error
            );
        }
        Err(VsphereError::VmRemoval(RemovalErrors {
            attempted: observed.len(),
            failures,
        }))
    }

    async fn remove_vm(&self, ctx: &Context, vm: &PropertySet) -> Result<()> {
        let reference = vm.reference();
        let name = vm.name().unwrap_or(&reference.value);

        if PowerState::from_props(vm)? == PowerState::PoweredOn {
            debug!(target: TARGET, "powering off {}", name);
            self.run_task(ctx, reference, Method::PowerOffVm)
                .await
                .map_err(|e| e.during(format!("powering off {name}")))?;
        }
        self.run_task(ctx, reference, Method::Destroy)
            .await
            .map_err(|e| e.during(format!("destroying {name}")))?;
        debug!(target: TARGET, "destroyed {}", name);
        Ok(())
    }

    /// Set or remove extra configuration keys on a VM.
    ///
    /// Keys with an empty value are removed. An empty `config` is a no-op.
    pub async fn update_virtual_machine_extra_config(
        &self,
        ctx: &Context,
        vm: &ManagedObjectReference,
        config: ExtraConfig,
    ) -> Result<()> {
        self.ensure_open()?;
        if config.is_empty() {
            return Ok(());
        }
        self.run_task(
            ctx,
            vm,
            Method::ReconfigVm {
                spec: config.into(),
            },
        )
        .await
        .map_err(|e| e.during(format!("reconfiguring {vm}")))?;
        Ok(())
    }

    /// The VMs matching `pattern`, in the order the platform returned them.
    pub async fn virtual_machines(
        &self,
        ctx: &Context,
        pattern: &str,
    ) -> Result<Vec<VirtualMachine>> {
        self.ensure_open()?;
        let root = self.datacenter(ctx).await?.root(DatacenterFolder::Vm);
        let vms = self
            .resolver()
            .resolve(ctx, &root, pattern, InventoryKind::VirtualMachine)
            .await
            .map_err(|e| e.during(format!("resolving virtual machines {pattern:?}")))?;
        self.retriever()
            .retrieve_many(ctx, &vms, VM_PROPERTIES)
            .await?
            .into_iter()
            .map(VirtualMachine::try_from)
            .collect()
    }

    // ========================================================================
    // Datastores
    // ========================================================================

    /// Delete a file such as `[datastore1] vm-0/disk.vmdk`.
    ///
    /// Deleting a file that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Any other fault is returned as [`VsphereError::Fault`], whose message
    /// is the remote one verbatim.
    pub async fn delete_datastore_file(&self, ctx: &Context, path: &str) -> Result<()> {
        self.ensure_open()?;
        path.parse::<DatastorePath>()?;
        let datacenter = self.datacenter(ctx).await?;
        let file_manager = self.remote().content().file_manager.clone();

        let deleted = self
            .run_task(
                ctx,
                &file_manager,
                Method::DeleteDatastoreFile {
                    name: path.to_owned(),
                    datacenter: Some(datacenter.reference),
                },
            )
            .await;
        match deleted {
            Ok(_) => {
                debug!(target: TARGET, "deleted {:?}", path);
                Ok(())
            }
            Err(err) if err.is_fault(&FaultKind::FileNotFound) => {
                debug!(target: TARGET, "{:?} already absent", path);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Every datastore in the datacenter, in remote order.
    pub async fn datastores(&self, ctx: &Context) -> Result<Vec<Datastore>> {
        self.ensure_open()?;
        let datacenter = self.datacenter(ctx).await?;
        self.retriever()
            .retrieve_subtree(
                ctx,
                &datacenter.datastore_folder,
                vec![PropertySpec::new("Datastore", DATASTORE_PROPERTIES)],
            )
            .await?
            .into_iter()
            .map(Datastore::try_from)
            .collect()
    }

    // ========================================================================
    // Compute and network
    // ========================================================================

    /// Every standalone host and cluster in the datacenter, in remote order.
    pub async fn compute_resources(&self, ctx: &Context) -> Result<Vec<ComputeResource>> {
        self.ensure_open()?;
        let datacenter = self.datacenter(ctx).await?;
        self.retriever()
            .retrieve_subtree(
                ctx,
                &datacenter.host_folder,
                vec![
                    PropertySpec::new("ComputeResource", COMPUTE_RESOURCE_PROPERTIES),
                    PropertySpec::new("ClusterComputeResource", COMPUTE_RESOURCE_PROPERTIES),
                ],
            )
            .await?
            .into_iter()
            .map(ComputeResource::try_from)
            .collect()
    }

    /// Every network in the datacenter, in remote order.
    ///
    /// Distributed port groups carry their key and the UUID of the switch
    /// that owns them; the switches are read in one batch.
    pub async fn networks(&self, ctx: &Context) -> Result<Vec<Network>> {
        self.ensure_open()?;
        let datacenter = self.datacenter(ctx).await?;
        let retriever = self.retriever();
        let found = retriever
            .retrieve_subtree(
                ctx,
                &datacenter.network_folder,
                vec![
                    PropertySpec::new("Network", NETWORK_PROPERTIES),
                    PropertySpec::new("OpaqueNetwork", NETWORK_PROPERTIES),
                    PropertySpec::new("DistributedVirtualPortgroup", PORTGROUP_PROPERTIES),
                ],
            )
            .await?;

        let mut switches: Vec<ManagedObjectReference> = Vec::new();
        for net in &found {
            if let Some(switch) = net.reference_of("config.distributedVirtualSwitch")? {
                if !switches.contains(switch) {
                    switches.push(switch.clone());
                }
            }
        }
        let mut uuids = HashMap::new();
        for switch in retriever
            .retrieve_many(ctx, &switches, SWITCH_PROPERTIES)
            .await?
        {
            let uuid = switch.string("uuid")?.unwrap_or_default().to_string();
            uuids.insert(switch.reference().clone(), uuid);
        }

        found
            .into_iter()
            .map(|net| {
                let kind = match net.reference().type_name.as_str() {
                    "OpaqueNetwork" => NetworkKind::Opaque,
                    "DistributedVirtualPortgroup" => NetworkKind::DistributedPortgroup {
                        key: net.string("config.key")?.unwrap_or_default().to_string(),
                        switch_uuid: net
                            .reference_of("config.distributedVirtualSwitch")?
                            .and_then(|s| uuids.get(s))
                            .cloned()
                            .unwrap_or_default(),
                    },
                    _ => NetworkKind::Standard,
                };
                Ok(Network {
                    name: net.name().unwrap_or_default().to_string(),
                    reference: net.reference().clone(),
                    kind,
                })
            })
            .collect()
    }
}
