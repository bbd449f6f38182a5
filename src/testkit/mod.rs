// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory sessions for tests.
//!
//! [`FakeSession`] keeps a small inventory graph and answers property
//! retrievals by honoring the traversal specs it is given, runs methods as
//! tasks with their side effects applied to the graph, and serves task
//! completion through per-collector long-polls. It records every call so
//! tests can assert on what was sent and in which order.
//!
//! ```
//! use std::sync::Arc;
//! use vsphere_api_rs::testkit::FakeSession;
//!
//! let fake = Arc::new(FakeSession::standard());
//! assert!(fake.lookup("/dc0/vm/foo/bar/vm-1").is_some());
//! assert_eq!(fake.open_collectors(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use url::Url;

use crate::api::{
    Connector, DynamicProperty, FaultKind, LocalizedMethodFault, ManagedObjectReference, Method,
    MethodResult, ObjectContent, ObjectUpdate, ObjectUpdateKind, OptionValue, PropertyChange,
    PropertyChangeOp, PropertyFilterSpec, PropertyFilterUpdate, PropertySpec, SelectionSpec,
    ServiceContent, Session, TraversalSpec, UpdateSet, Value, VirtualDevice, VirtualDisk,
    WaitOptions,
};
use crate::error::{Result, VsphereError};
use crate::resources::PowerState;

const CHILD_ENTITY: &str = "childEntity";

/// One recorded session call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Platform method name, e.g. `Destroy_Task` or `WaitForUpdatesEx`.
    pub method: String,
    /// The object the call was addressed to. For `RetrieveProperties`, the
    /// starting objects joined with `,`.
    pub target: String,
    /// Call-specific details, e.g. the folder name for `CreateFolder` or the
    /// terminal state delivered by `WaitForUpdatesEx`.
    pub args: Vec<String>,
    /// The task started by, or completed by, this call.
    pub task: Option<ManagedObjectReference>,
}

#[derive(Debug, Clone)]
struct FakeTask {
    method: String,
    target: ManagedObjectReference,
    error: Option<LocalizedMethodFault>,
    hang: bool,
}

#[derive(Debug, Default)]
struct FakeCollector {
    task: Option<ManagedObjectReference>,
    polls: u32,
    version: u64,
    noise_sent: bool,
}

#[derive(Debug, Clone)]
struct InjectedFault {
    method: String,
    target: Option<ManagedObjectReference>,
    fault: LocalizedMethodFault,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<ManagedObjectReference, Vec<DynamicProperty>>,
    children: HashMap<ManagedObjectReference, Vec<ManagedObjectReference>>,
    tasks: HashMap<ManagedObjectReference, FakeTask>,
    collectors: HashMap<ManagedObjectReference, FakeCollector>,
    files: HashSet<String>,
    faults: Vec<InjectedFault>,
    transport_failures: HashMap<String, String>,
    hanging: HashSet<String>,
    calls: Vec<Call>,
    next_id: u64,
    pending_polls: u32,
    noise: bool,
    race_folder_creation: bool,
    created_collectors: usize,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn record(&mut self, method: &str, target: String, args: Vec<String>) {
        self.calls.push(Call {
            method: method.to_string(),
            target,
            args,
            task: None,
        });
    }

    fn property(&self, obj: &ManagedObjectReference, name: &str) -> Option<Value> {
        if name == CHILD_ENTITY {
            return self.children.get(obj).map(|c| Value::Refs(c.clone()));
        }
        self.objects
            .get(obj)?
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.val.clone())
    }

    fn set_property(&mut self, obj: &ManagedObjectReference, name: &str, val: Value) {
        if let Some(props) = self.objects.get_mut(obj) {
            match props.iter_mut().find(|p| p.name == name) {
                Some(p) => p.val = val,
                None => props.push(DynamicProperty {
                    name: name.to_string(),
                    val,
                }),
            }
        }
    }

    fn insert(
        &mut self,
        parent: &ManagedObjectReference,
        obj: ManagedObjectReference,
        mut props: Vec<DynamicProperty>,
    ) {
        props.push(DynamicProperty::new("parent", parent.clone()));
        self.children.entry(parent.clone()).or_default().push(obj.clone());
        if obj.type_name == "Folder" {
            self.children.entry(obj.clone()).or_default();
        }
        self.objects.insert(obj, props);
    }

    fn detach(&mut self, obj: &ManagedObjectReference) {
        for siblings in self.children.values_mut() {
            siblings.retain(|c| c != obj);
        }
    }

    fn remove_tree(&mut self, obj: &ManagedObjectReference) {
        self.detach(obj);
        let mut stack = vec![obj.clone()];
        while let Some(next) = stack.pop() {
            if let Some(children) = self.children.remove(&next) {
                stack.extend(children);
            }
            self.objects.remove(&next);
        }
    }

    fn child_named(
        &self,
        parent: &ManagedObjectReference,
        name: &str,
    ) -> Option<ManagedObjectReference> {
        self.children.get(parent)?.iter().find(|c| {
            matches!(self.property(c, "name"), Some(Value::String(ref n)) if n == name)
        }).cloned()
    }

    fn injected(
        &self,
        method: &Method,
        this: &ManagedObjectReference,
    ) -> Option<LocalizedMethodFault> {
        self.faults
            .iter()
            .find(|f| f.method == method.name() && f.target.as_ref().map_or(true, |t| t == this))
            .map(|f| f.fault.clone())
    }

    fn missing(obj: &ManagedObjectReference) -> VsphereError {
        VsphereError::Fault(LocalizedMethodFault::new(
            FaultKind::ManagedObjectNotFound(Some(obj.clone())),
            format!(
                "The object '{obj}' has already been deleted or has not been completely created"
            ),
        ))
    }

    fn check_transport(&self, method: &str) -> Result<()> {
        match self.transport_failures.get(method) {
            Some(message) => Err(VsphereError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    /// Apply a method's side effects. Returns the synchronous result, if any.
    fn apply(
        &mut self,
        this: &ManagedObjectReference,
        method: &Method,
    ) -> std::result::Result<Option<Value>, LocalizedMethodFault> {
        match method {
            Method::CreateFolder { name } => {
                if self.race_folder_creation {
                    self.race_folder_creation = false;
                    let value = self.next("group-v");
                    self.insert(
                        this,
                        ManagedObjectReference::folder(value),
                        vec![DynamicProperty::new("name", name.as_str())],
                    );
                }
                if self.child_named(this, name).is_some() {
                    return Err(LocalizedMethodFault::new(
                        FaultKind::DuplicateName,
                        format!("The name '{name}' already exists."),
                    ));
                }
                let folder = ManagedObjectReference::folder(self.next("group-v"));
                self.insert(
                    this,
                    folder.clone(),
                    vec![DynamicProperty::new("name", name.as_str())],
                );
                Ok(Some(Value::Ref(folder)))
            }
            Method::MoveIntoFolder { list } => {
                for obj in list {
                    if !self.objects.contains_key(obj) {
                        return Err(LocalizedMethodFault::new(
                            FaultKind::ManagedObjectNotFound(Some(obj.clone())),
                            "",
                        ));
                    }
                }
                for obj in list {
                    self.detach(obj);
                    self.children.entry(this.clone()).or_default().push(obj.clone());
                    self.set_property(obj, "parent", Value::Ref(this.clone()));
                }
                Ok(None)
            }
            Method::Destroy => {
                self.remove_tree(this);
                Ok(None)
            }
            Method::PowerOffVm => {
                if self.property(this, "runtime.powerState") != Some(Value::from("poweredOn")) {
                    return Err(LocalizedMethodFault::new(
                        FaultKind::InvalidPowerState,
                        "The attempted operation cannot be performed in the current state \
                         (Powered off).",
                    ));
                }
                self.set_property(this, "runtime.powerState", Value::from("poweredOff"));
                Ok(None)
            }
            Method::ReconfigVm { spec } => {
                let mut current = match self.property(this, "config.extraConfig") {
                    Some(Value::Options(o)) => o,
                    _ => Vec::new(),
                };
                for option in &spec.extra_config {
                    current.retain(|o| o.key != option.key);
                    if !option.value.is_empty() {
                        current.push(option.clone());
                    }
                }
                self.set_property(this, "config.extraConfig", Value::Options(current));
                Ok(None)
            }
            Method::DeleteDatastoreFile { name, .. } => {
                if self.files.remove(name) {
                    Ok(None)
                } else {
                    Err(LocalizedMethodFault::new(
                        FaultKind::FileNotFound,
                        format!("File {name} was not found"),
                    ))
                }
            }
        }
    }

    fn follow(
        &self,
        obj: &ManagedObjectReference,
        selections: &[SelectionSpec],
        named: &HashMap<String, TraversalSpec>,
        reached: &mut Vec<ManagedObjectReference>,
    ) {
        for selection in selections {
            let traversal = match selection {
                SelectionSpec::Traversal(t) => t,
                SelectionSpec::Named(name) => match named.get(name) {
                    Some(t) => t,
                    None => continue,
                },
            };
            if obj.type_name != traversal.type_name {
                continue;
            }
            let targets = match self.property(obj, &traversal.path) {
                Some(Value::Refs(refs)) => refs,
                Some(Value::Ref(r)) => vec![r],
                _ => continue,
            };
            for target in targets {
                if !traversal.skip && !reached.contains(&target) {
                    reached.push(target.clone());
                }
                self.follow(&target, &traversal.select_set, named, reached);
            }
        }
    }

    fn collect(&self, spec: &PropertyFilterSpec) -> Result<Vec<ObjectContent>> {
        let mut named = HashMap::new();
        for object in &spec.object_set {
            register(&object.select_set, &mut named);
        }

        let mut reached = Vec::new();
        for object in &spec.object_set {
            if !self.objects.contains_key(&object.obj) {
                return Err(Self::missing(&object.obj));
            }
            if !object.skip && !reached.contains(&object.obj) {
                reached.push(object.obj.clone());
            }
            self.follow(&object.obj, &object.select_set, &named, &mut reached);
        }

        Ok(reached
            .into_iter()
            .filter_map(|obj| {
                let prop_spec = spec
                    .prop_set
                    .iter()
                    .find(|p| p.type_name == obj.type_name || p.type_name == "ManagedEntity")?;
                Some(self.content(&obj, prop_spec))
            })
            .collect())
    }

    fn content(&self, obj: &ManagedObjectReference, spec: &PropertySpec) -> ObjectContent {
        let prop_set = if spec.all {
            self.objects.get(obj).cloned().unwrap_or_default()
        } else {
            spec.path_set
                .iter()
                .filter_map(|name| {
                    self.property(obj, name).map(|val| DynamicProperty {
                        name: name.clone(),
                        val,
                    })
                })
                .collect()
        };
        ObjectContent {
            obj: obj.clone(),
            prop_set,
        }
    }
}

fn register(selections: &[SelectionSpec], named: &mut HashMap<String, TraversalSpec>) {
    for selection in selections {
        if let SelectionSpec::Traversal(t) = selection {
            if named.insert(t.name.clone(), t.clone()).is_none() {
                register(&t.select_set, named);
            }
        }
    }
}

fn change(name: &str, val: Value) -> PropertyChange {
    PropertyChange {
        name: name.to_string(),
        op: PropertyChangeOp::Assign,
        val,
    }
}

enum Poll {
    Ready(Option<UpdateSet>),
    Hang,
}

/// An in-memory [`Session`].
#[derive(Debug)]
pub struct FakeSession {
    content: ServiceContent,
    state: Mutex<State>,
    logouts: AtomicUsize,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    /// An empty inventory: just the root folder.
    #[must_use]
    pub fn new() -> Self {
        let content = ServiceContent {
            root_folder: ManagedObjectReference::folder("group-d1"),
            property_collector: ManagedObjectReference::new(
                "PropertyCollector",
                "propertyCollector",
            ),
            file_manager: ManagedObjectReference::new("FileManager", "FileManager"),
            session_manager: ManagedObjectReference::new("SessionManager", "SessionManager"),
        };
        let mut state = State {
            next_id: 100,
            ..State::default()
        };
        state.objects.insert(
            content.root_folder.clone(),
            vec![DynamicProperty::new("name", "Datacenters")],
        );
        state.children.insert(content.root_folder.clone(), Vec::new());
        Self {
            content,
            state: Mutex::new(state),
            logouts: AtomicUsize::new(0),
        }
    }

    /// The reference inventory most tests run against.
    ///
    /// ```text
    /// dc0
    /// ├── vm/foo/bar/{vm-0 (off), vm-1 (on, 10 GiB disk)}
    /// ├── host/{z0 (standalone), z1 (cluster)}
    /// ├── datastore/{datastore1 (inaccessible), datastore2}
    /// └── network/{VM Network, zing, arpa (opaque), yoink (dvportgroup on switch "yup")}
    /// ```
    #[must_use]
    pub fn standard() -> Self {
        let fake = Self::new();
        let root = fake.content.root_folder.clone();
        let dc = fake.add_datacenter(&root, "dc0");

        let foo = fake.add_folder(&dc.vm, "foo");
        let bar = fake.add_folder(&foo, "bar");
        let z0_pool = ManagedObjectReference::new("ResourcePool", "resgroup-11");
        fake.add_vm(&bar, "vm-0", PowerState::PoweredOff, Some(&z0_pool), Vec::new());
        fake.add_vm(
            &bar,
            "vm-1",
            PowerState::PoweredOn,
            Some(&z0_pool),
            vec![VirtualDisk {
                file_name: Some("[datastore2] vm-1/vm-1.vmdk".to_string()),
                capacity_in_kb: 10 * 1024 * 1024,
            }],
        );

        let ds1 = fake.add_datastore(&dc.datastore, "datastore1", false);
        let ds2 = fake.add_datastore(&dc.datastore, "datastore2", true);

        fake.add_object(
            &dc.host,
            ManagedObjectReference::new("ComputeResource", "domain-s10"),
            vec![
                DynamicProperty::new("name", "z0"),
                DynamicProperty::new("resourcePool", z0_pool.clone()),
                DynamicProperty::new("datastore", vec![ds1.clone()]),
            ],
        );
        fake.add_object(
            &dc.host,
            ManagedObjectReference::new("ClusterComputeResource", "domain-c12"),
            vec![
                DynamicProperty::new("name", "z1"),
                DynamicProperty::new(
                    "resourcePool",
                    ManagedObjectReference::new("ResourcePool", "resgroup-13"),
                ),
                DynamicProperty::new("datastore", vec![ds1, ds2]),
            ],
        );

        fake.add_object(
            &dc.network,
            ManagedObjectReference::new("Network", "network-0"),
            vec![DynamicProperty::new("name", "VM Network")],
        );
        fake.add_object(
            &dc.network,
            ManagedObjectReference::new("Network", "network-1"),
            vec![DynamicProperty::new("name", "zing")],
        );
        fake.add_object(
            &dc.network,
            ManagedObjectReference::new("OpaqueNetwork", "network-o2"),
            vec![DynamicProperty::new("name", "arpa")],
        );
        let dvs = ManagedObjectReference::new("VmwareDistributedVirtualSwitch", "dvs-0");
        fake.add_object(
            &dc.network,
            ManagedObjectReference::new("DistributedVirtualPortgroup", "dvportgroup-3"),
            vec![
                DynamicProperty::new("name", "yoink"),
                DynamicProperty::new("config.key", "hole"),
                DynamicProperty::new("config.distributedVirtualSwitch", dvs.clone()),
            ],
        );
        fake.add_object(
            &dc.network,
            dvs,
            vec![
                DynamicProperty::new("name", "dvs"),
                DynamicProperty::new("uuid", "yup"),
            ],
        );
        fake
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the fake's state from others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Add an arbitrary object below `parent`.
    pub fn add_object(
        &self,
        parent: &ManagedObjectReference,
        obj: ManagedObjectReference,
        props: Vec<DynamicProperty>,
    ) {
        self.state().insert(parent, obj, props);
    }

    /// Add a folder below `parent` and return it.
    pub fn add_folder(
        &self,
        parent: &ManagedObjectReference,
        name: &str,
    ) -> ManagedObjectReference {
        let mut state = self.state();
        let folder = ManagedObjectReference::folder(state.next("group-v"));
        state.insert(parent, folder.clone(), vec![DynamicProperty::new("name", name)]);
        folder
    }

    /// Add a datacenter with its four root folders.
    pub fn add_datacenter(&self, parent: &ManagedObjectReference, name: &str) -> FakeDatacenter {
        let mut state = self.state();
        let dc = FakeDatacenter {
            reference: ManagedObjectReference::new("Datacenter", state.next("datacenter")),
            vm: ManagedObjectReference::folder(state.next("group-v")),
            host: ManagedObjectReference::folder(state.next("group-h")),
            datastore: ManagedObjectReference::folder(state.next("group-s")),
            network: ManagedObjectReference::folder(state.next("group-n")),
        };
        state.insert(
            parent,
            dc.reference.clone(),
            vec![
                DynamicProperty::new("name", name),
                DynamicProperty::new("vmFolder", dc.vm.clone()),
                DynamicProperty::new("hostFolder", dc.host.clone()),
                DynamicProperty::new("datastoreFolder", dc.datastore.clone()),
                DynamicProperty::new("networkFolder", dc.network.clone()),
            ],
        );
        for (folder, folder_name) in [
            (&dc.vm, "vm"),
            (&dc.host, "host"),
            (&dc.datastore, "datastore"),
            (&dc.network, "network"),
        ] {
            state.insert(
                &dc.reference,
                folder.clone(),
                vec![DynamicProperty::new("name", folder_name)],
            );
        }
        // Root folders hang off the datacenter but are not its inventory children.
        state.children.remove(&dc.reference);
        dc
    }

    /// Add a virtual machine below `parent` and return it.
    pub fn add_vm(
        &self,
        parent: &ManagedObjectReference,
        name: &str,
        power: PowerState,
        pool: Option<&ManagedObjectReference>,
        disks: Vec<VirtualDisk>,
    ) -> ManagedObjectReference {
        let mut state = self.state();
        let vm = ManagedObjectReference::virtual_machine(state.next("vm"));
        let mut props = vec![
            DynamicProperty::new("name", name),
            DynamicProperty::new("runtime.powerState", power.as_str()),
            DynamicProperty {
                name: "config.hardware.device".to_string(),
                val: Value::Devices(disks.into_iter().map(VirtualDevice::Disk).collect()),
            },
        ];
        if let Some(pool) = pool {
            props.push(DynamicProperty::new("resourcePool", pool.clone()));
        }
        state.insert(parent, vm.clone(), props);
        vm
    }

    /// Add a datastore below `parent` and return it.
    pub fn add_datastore(
        &self,
        parent: &ManagedObjectReference,
        name: &str,
        accessible: bool,
    ) -> ManagedObjectReference {
        let mut state = self.state();
        let ds = ManagedObjectReference::new("Datastore", state.next("datastore"));
        state.insert(
            parent,
            ds.clone(),
            vec![
                DynamicProperty::new("name", name),
                DynamicProperty::new("summary.accessible", accessible),
            ],
        );
        ds
    }

    /// Make a datastore file exist, e.g. `[datastore1] vm-0/disk.vmdk`.
    pub fn add_datastore_file(&self, path: &str) {
        self.state().files.insert(path.to_string());
    }

    #[must_use]
    pub fn has_datastore_file(&self, path: &str) -> bool {
        self.state().files.contains(path)
    }

    /// Walk `path` by name from the root folder, taking the first match at
    /// every level. Datacenter root folders are reached by their names
    /// (`vm`, `host`, `datastore`, `network`).
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<ManagedObjectReference> {
        let state = self.state();
        let mut current = self.content.root_folder.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = if current.type_name == "Datacenter" {
                ["vmFolder", "hostFolder", "datastoreFolder", "networkFolder"]
                    .iter()
                    .filter_map(|p| match state.property(&current, p) {
                        Some(Value::Ref(r)) => Some(r),
                        _ => None,
                    })
                    .find(|r| state.property(r, "name") == Some(Value::from(segment)))?
            } else {
                state.child_named(&current, segment)?
            };
        }
        Some(current)
    }

    #[must_use]
    pub fn exists(&self, obj: &ManagedObjectReference) -> bool {
        self.state().objects.contains_key(obj)
    }

    /// Current value of a property.
    #[must_use]
    pub fn property(&self, obj: &ManagedObjectReference, name: &str) -> Option<Value> {
        self.state().property(obj, name)
    }

    /// The folder `obj` currently lives in.
    #[must_use]
    pub fn parent_of(&self, obj: &ManagedObjectReference) -> Option<ManagedObjectReference> {
        match self.property(obj, "parent") {
            Some(Value::Ref(parent)) => Some(parent),
            _ => None,
        }
    }

    /// Extra configuration of a VM as key/value pairs.
    #[must_use]
    pub fn extra_config(&self, vm: &ManagedObjectReference) -> Vec<OptionValue> {
        match self.property(vm, "config.extraConfig") {
            Some(Value::Options(options)) => options,
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Behavior
    // ------------------------------------------------------------------

    /// Make every call of `method` fail with `fault`. Task methods start
    /// the task and let it end in error.
    pub fn fail_method(&self, method: &str, fault: LocalizedMethodFault) {
        self.state().faults.push(InjectedFault {
            method: method.to_string(),
            target: None,
            fault,
        });
    }

    /// Like [`FakeSession::fail_method`], for calls on `target` only.
    pub fn fail_method_on(
        &self,
        method: &str,
        target: &ManagedObjectReference,
        fault: LocalizedMethodFault,
    ) {
        self.state().faults.push(InjectedFault {
            method: method.to_string(),
            target: Some(target.clone()),
            fault,
        });
    }

    /// Make every call named `method` fail with a transport error, e.g.
    /// `RetrieveProperties` or `WaitForUpdatesEx`.
    pub fn fail_transport(&self, method: &str, message: &str) {
        self.state()
            .transport_failures
            .insert(method.to_string(), message.to_string());
    }

    /// Tasks started by `method` never finish.
    pub fn hang_method(&self, method: &str) {
        self.state().hanging.insert(method.to_string());
    }

    /// Every collector answers its first `polls` long-polls with a timeout.
    pub fn set_pending_polls(&self, polls: u32) {
        self.state().pending_polls = polls;
    }

    /// Before the terminal update, deliver one batch holding an update for
    /// an unrelated object and a non-terminal state.
    pub fn set_stale_updates(&self, enabled: bool) {
        self.state().noise = enabled;
    }

    /// The next `CreateFolder` finds its folder already created by someone
    /// else.
    pub fn race_folder_creation(&self) {
        self.state().race_folder_creation = true;
    }

    // ------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------

    /// Every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Recorded calls named `method`, in order.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Number of recorded calls named `method`.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| c.method == method).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Collectors created and not yet destroyed.
    #[must_use]
    pub fn open_collectors(&self) -> usize {
        self.state().collectors.len()
    }

    /// Collectors created over the session's lifetime.
    #[must_use]
    pub fn created_collectors(&self) -> usize {
        self.state().created_collectors
    }

    #[must_use]
    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

/// References of a datacenter added with [`FakeSession::add_datacenter`].
#[derive(Debug, Clone)]
pub struct FakeDatacenter {
    pub reference: ManagedObjectReference,
    pub vm: ManagedObjectReference,
    pub host: ManagedObjectReference,
    pub datastore: ManagedObjectReference,
    pub network: ManagedObjectReference,
}

#[async_trait]
impl Session for FakeSession {
    fn service_content(&self) -> &ServiceContent {
        &self.content
    }

    async fn retrieve_properties(&self, spec: PropertyFilterSpec) -> Result<Vec<ObjectContent>> {
        let mut state = self.state();
        let target = spec
            .object_set
            .iter()
            .map(|o| o.obj.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let types = spec.prop_set.iter().map(|p| p.type_name.clone()).collect();
        state.record("RetrieveProperties", target, types);
        state.check_transport("RetrieveProperties")?;
        state.collect(&spec)
    }

    async fn invoke_method(
        &self,
        this: &ManagedObjectReference,
        method: Method,
    ) -> Result<MethodResult> {
        let mut state = self.state();
        let args = match &method {
            Method::CreateFolder { name } => vec![name.clone()],
            Method::MoveIntoFolder { list } => list.iter().map(|o| o.to_string()).collect(),
            Method::DeleteDatastoreFile { name, .. } => vec![name.clone()],
            Method::ReconfigVm { spec } => spec
                .extra_config
                .iter()
                .map(|o| format!("{}={}", o.key, o.value))
                .collect(),
            Method::Destroy | Method::PowerOffVm => Vec::new(),
        };
        state.record(method.name(), this.to_string(), args);
        state.check_transport(method.name())?;

        let injected = state.injected(&method, this);
        let is_file_manager = *this == self.content.file_manager;
        if !is_file_manager && !state.objects.contains_key(this) {
            return Err(State::missing(this));
        }

        if let Method::CreateFolder { .. } = method {
            if let Some(fault) = injected {
                return Err(VsphereError::Fault(fault));
            }
            return match state.apply(this, &method) {
                Ok(Some(value)) => Ok(MethodResult::Value(value)),
                Ok(None) => Ok(MethodResult::Void),
                Err(fault) => Err(VsphereError::Fault(fault)),
            };
        }

        let hang = state.hanging.contains(method.name());
        let error = match injected {
            Some(fault) => Some(fault),
            None if hang => None,
            None => state.apply(this, &method).err(),
        };
        let task = ManagedObjectReference::task(state.next("task"));
        state.tasks.insert(
            task.clone(),
            FakeTask {
                method: method.name().to_string(),
                target: this.clone(),
                error,
                hang,
            },
        );
        if let Some(call) = state.calls.last_mut() {
            call.task = Some(task.clone());
        }
        Ok(MethodResult::Task(task))
    }

    async fn create_property_collector(&self) -> Result<ManagedObjectReference> {
        let mut state = self.state();
        state.record(
            "CreatePropertyCollector",
            self.content.property_collector.to_string(),
            Vec::new(),
        );
        state.check_transport("CreatePropertyCollector")?;
        let collector = ManagedObjectReference::new("PropertyCollector", state.next("session"));
        state.collectors.insert(collector.clone(), FakeCollector::default());
        state.created_collectors += 1;
        Ok(collector)
    }

    async fn create_filter(
        &self,
        collector: &ManagedObjectReference,
        spec: PropertyFilterSpec,
        _partial_updates: bool,
    ) -> Result<ManagedObjectReference> {
        let mut state = self.state();
        state.record("CreateFilter", collector.to_string(), Vec::new());
        state.check_transport("CreateFilter")?;
        let task = spec
            .object_set
            .first()
            .map(|o| o.obj.clone())
            .ok_or_else(|| VsphereError::Protocol("filter without objects".to_string()))?;
        if !state.tasks.contains_key(&task) {
            return Err(State::missing(&task));
        }
        let filter = ManagedObjectReference::new("PropertyFilter", state.next("filter"));
        match state.collectors.get_mut(collector) {
            Some(c) => c.task = Some(task),
            None => return Err(State::missing(collector)),
        }
        Ok(filter)
    }

    async fn wait_for_updates(
        &self,
        collector: &ManagedObjectReference,
        _version: &str,
        _options: &WaitOptions,
    ) -> Result<Option<UpdateSet>> {
        let poll = {
            let mut state = self.state();
            state.check_transport("WaitForUpdatesEx")?;
            let pending_polls = state.pending_polls;
            let noise = state.noise;
            let c = state
                .collectors
                .get_mut(collector)
                .ok_or_else(|| State::missing(collector))?;
            let task_ref = c
                .task
                .clone()
                .ok_or_else(|| VsphereError::Protocol("collector has no filter".to_string()))?;
            c.polls += 1;
            c.version += 1;
            let version = c.version.to_string();
            let filter = ManagedObjectReference::new(
                "PropertyFilter",
                format!("{}-filter", collector.value),
            );

            if c.polls <= pending_polls {
                Poll::Ready(None)
            } else if noise && !c.noise_sent {
                c.noise_sent = true;
                Poll::Ready(Some(UpdateSet {
                    version,
                    truncated: false,
                    filter_set: vec![PropertyFilterUpdate {
                        filter,
                        object_set: vec![
                            ObjectUpdate {
                                kind: ObjectUpdateKind::Modify,
                                obj: ManagedObjectReference::task("task-unrelated"),
                                change_set: vec![change("info.state", Value::from("success"))],
                            },
                            ObjectUpdate {
                                kind: ObjectUpdateKind::Enter,
                                obj: task_ref,
                                change_set: vec![change("info.state", Value::from("running"))],
                            },
                        ],
                    }],
                }))
            } else {
                let task = state
                    .tasks
                    .get(&task_ref)
                    .cloned()
                    .ok_or_else(|| State::missing(&task_ref))?;
                if task.hang {
                    Poll::Hang
                } else {
                    let (terminal, error) = match task.error {
                        Some(fault) => ("error", Value::Fault(fault)),
                        None => ("success", Value::Null),
                    };
                    state.calls.push(Call {
                        method: "WaitForUpdatesEx".to_string(),
                        target: collector.to_string(),
                        args: vec![
                            terminal.to_string(),
                            task.method.clone(),
                            task.target.to_string(),
                        ],
                        task: Some(task_ref.clone()),
                    });
                    Poll::Ready(Some(UpdateSet {
                        version,
                        truncated: false,
                        filter_set: vec![PropertyFilterUpdate {
                            filter,
                            object_set: vec![ObjectUpdate {
                                kind: ObjectUpdateKind::Modify,
                                obj: task_ref,
                                change_set: vec![
                                    change("info.state", Value::from(terminal)),
                                    change("info.error", error),
                                    change("info.result", Value::Null),
                                ],
                            }],
                        }],
                    }))
                }
            }
        };
        match poll {
            Poll::Ready(updates) => Ok(updates),
            Poll::Hang => std::future::pending().await,
        }
    }

    async fn destroy_property_collector(&self, collector: &ManagedObjectReference) -> Result<()> {
        let mut state = self.state();
        state.record("DestroyPropertyCollector", collector.to_string(), Vec::new());
        state.check_transport("DestroyPropertyCollector")?;
        match state.collectors.remove(collector) {
            Some(_) => Ok(()),
            None => Err(State::missing(collector)),
        }
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.record("Logout", self.content.session_manager.to_string(), Vec::new());
        state.check_transport("Logout")
    }
}

/// A [`Connector`] handing out one shared [`FakeSession`].
#[derive(Debug)]
pub struct FakeConnector {
    session: Arc<FakeSession>,
    failures_left: AtomicUsize,
    connects: AtomicUsize,
    endpoints: Mutex<Vec<Url>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(session: Arc<FakeSession>) -> Self {
        Self {
            session,
            failures_left: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` connection attempts with a transport error.
    #[must_use]
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Number of connection attempts.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Endpoints connected to, in order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Url> {
        self.endpoints.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn Session>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(endpoint.clone());
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(VsphereError::Transport("connection refused".to_string()));
        }
        Ok(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ObjectSpec;

    #[test]
    fn test_standard_inventory_paths() {
        let fake = FakeSession::standard();
        assert!(fake.lookup("/dc0").is_some());
        assert!(fake.lookup("/dc0/vm/foo/bar").is_some());
        let vm1 = fake.lookup("/dc0/vm/foo/bar/vm-1").unwrap();
        assert_eq!(vm1.type_name, "VirtualMachine");
        assert_eq!(
            fake.property(&vm1, "runtime.powerState"),
            Some(Value::from("poweredOn"))
        );
        assert!(fake.lookup("/dc0/vm/nope").is_none());
    }

    #[tokio::test]
    async fn test_retrieve_unknown_object_faults() {
        let fake = FakeSession::standard();
        let gone = ManagedObjectReference::virtual_machine("vm-999");
        let err = fake
            .retrieve_properties(PropertyFilterSpec {
                prop_set: vec![PropertySpec::new("VirtualMachine", &["name"])],
                object_set: vec![ObjectSpec::single(gone.clone())],
            })
            .await
            .unwrap_err();
        assert!(err.is_fault(&FaultKind::ManagedObjectNotFound(Some(gone))));
    }

    #[tokio::test]
    async fn test_task_side_effects_apply() {
        let fake = FakeSession::standard();
        let vm1 = fake.lookup("/dc0/vm/foo/bar/vm-1").unwrap();
        let result = fake.invoke_method(&vm1, Method::PowerOffVm).await.unwrap();
        assert!(matches!(result, MethodResult::Task(_)));
        assert_eq!(
            fake.property(&vm1, "runtime.powerState"),
            Some(Value::from("poweredOff"))
        );
        assert_eq!(fake.calls_to("PowerOffVM_Task").len(), 1);
    }

    #[tokio::test]
    async fn test_connector_fails_then_connects() {
        let fake = Arc::new(FakeSession::new());
        let connector = FakeConnector::new(fake).failing(1);
        let url = Url::parse("https://vc.example.com/sdk").unwrap();
        assert!(connector.connect(&url).await.is_err());
        assert!(connector.connect(&url).await.is_ok());
        assert_eq!(connector.connects(), 2);
    }
}
