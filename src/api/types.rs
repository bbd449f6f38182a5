// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property-collector request, response and update types.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Managed Object Reference
// =============================================================================

/// A `(type, value)` handle to one remote managed object.
///
/// References are plain values: two references are equal when both the type
/// and the opaque id match. A reference is never assumed to remain valid
/// across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    /// Platform type name, e.g. `Folder` or `VirtualMachine`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Opaque object id, e.g. `vm-42`.
    pub value: String,
}

impl ManagedObjectReference {
    /// Create a new reference.
    #[must_use]
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }

    /// Shorthand for a `Folder` reference.
    #[must_use]
    pub fn folder(value: impl Into<String>) -> Self {
        Self::new("Folder", value)
    }

    /// Shorthand for a `VirtualMachine` reference.
    #[must_use]
    pub fn virtual_machine(value: impl Into<String>) -> Self {
        Self::new("VirtualMachine", value)
    }

    /// Shorthand for a `Task` reference.
    #[must_use]
    pub fn task(value: impl Into<String>) -> Self {
        Self::new("Task", value)
    }
}

impl fmt::Display for ManagedObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.value)
    }
}

// =============================================================================
// Property values
// =============================================================================

/// A disk attached to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VirtualDisk {
    /// Backing file, e.g. `[datastore1] vm-0/disk.vmdk`.
    pub file_name: Option<String>,
    /// Capacity in KiB.
    pub capacity_in_kb: i64,
}

/// A virtual hardware device as reported by `config.hardware.device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualDevice {
    /// A virtual disk.
    Disk(VirtualDisk),
    /// Any other device, identified by its platform type name.
    Other(String),
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unset property.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String, including enum-like strings such as `poweredOn`.
    String(String),
    /// Array of strings.
    Strings(Vec<String>),
    /// Reference to another managed object.
    Ref(ManagedObjectReference),
    /// Array of references.
    Refs(Vec<ManagedObjectReference>),
    /// Array of virtual devices.
    Devices(Vec<VirtualDevice>),
    /// Array of key/value option values.
    Options(Vec<crate::api::OptionValue>),
    /// A fault, as carried by `info.error`.
    Fault(LocalizedMethodFault),
}

impl Value {
    /// Platform-style name of the value's type, used in decoding errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::String(_) => "string",
            Value::Strings(_) => "ArrayOfString",
            Value::Ref(_) => "ManagedObjectReference",
            Value::Refs(_) => "ArrayOfManagedObjectReference",
            Value::Devices(_) => "ArrayOfVirtualDevice",
            Value::Options(_) => "ArrayOfOptionValue",
            Value::Fault(_) => "LocalizedMethodFault",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ManagedObjectReference> for Value {
    fn from(v: ManagedObjectReference) -> Self {
        Value::Ref(v)
    }
}

impl From<Vec<ManagedObjectReference>> for Value {
    fn from(v: Vec<ManagedObjectReference>) -> Self {
        Value::Refs(v)
    }
}

/// One `name → value` pair of a retrieved object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicProperty {
    /// Property path, possibly dotted (`summary.accessible`).
    pub name: String,
    /// Property value.
    pub val: Value,
}

impl DynamicProperty {
    /// Create a new property.
    #[must_use]
    pub fn new(name: impl Into<String>, val: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            val: val.into(),
        }
    }
}

/// The retrieved properties of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectContent {
    /// The object the properties belong to.
    pub obj: ManagedObjectReference,
    /// Properties in the order the remote side returned them.
    pub prop_set: Vec<DynamicProperty>,
}

// =============================================================================
// Filter specs
// =============================================================================

/// Which properties to collect for objects of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Type the spec applies to. `ManagedEntity` matches every inventory object.
    pub type_name: String,
    /// Collect every property of the type.
    pub all: bool,
    /// Property paths to collect.
    pub path_set: Vec<String>,
}

impl PropertySpec {
    /// Collect the given paths for objects of `type_name`.
    #[must_use]
    pub fn new(type_name: impl Into<String>, paths: &[&str]) -> Self {
        Self {
            type_name: type_name.into(),
            all: false,
            path_set: paths.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// A relationship to follow from an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalSpec {
    /// Name other selection specs can use to refer back to this one.
    pub name: String,
    /// Type the traversal starts from.
    pub type_name: String,
    /// Property holding the reference(s) to follow, e.g. `childEntity`.
    pub path: String,
    /// Exclude the traversal targets themselves from the result.
    pub skip: bool,
    /// Further selections applied to the targets.
    pub select_set: Vec<SelectionSpec>,
}

/// Either an inline traversal or a reference to a named one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionSpec {
    /// Refers to a [`TraversalSpec`] by name; enables recursion.
    Named(String),
    /// An inline traversal.
    Traversal(TraversalSpec),
}

/// Starting object of a retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// The starting object.
    pub obj: ManagedObjectReference,
    /// Exclude the starting object itself from the result.
    pub skip: bool,
    /// Relationships to follow from the starting object.
    pub select_set: Vec<SelectionSpec>,
}

impl ObjectSpec {
    /// An object spec that selects just `obj`.
    #[must_use]
    pub fn single(obj: ManagedObjectReference) -> Self {
        Self {
            obj,
            skip: false,
            select_set: Vec::new(),
        }
    }
}

/// A complete retrieval or subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyFilterSpec {
    /// What to collect per type.
    pub prop_set: Vec<PropertySpec>,
    /// Where to start and what to follow.
    pub object_set: Vec<ObjectSpec>,
}

// =============================================================================
// Updates
// =============================================================================

/// Options for the long-poll update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Seconds the remote side may hold the call open before returning empty.
    pub max_wait_seconds: Option<i32>,
    /// Upper bound on object updates per response.
    pub max_object_updates: Option<i32>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            max_wait_seconds: Some(60),
            max_object_updates: None,
        }
    }
}

/// How an object's membership in a filter changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectUpdateKind {
    /// Object entered the filter; carries the full initial state.
    Enter,
    /// Object properties changed.
    Modify,
    /// Object left the filter.
    Leave,
}

/// How a single property changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyChangeOp {
    /// Element added.
    Add,
    /// Element removed.
    Remove,
    /// Property assigned.
    Assign,
    /// Removed because a containing property was removed.
    IndirectRemove,
}

/// One property change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Property path.
    pub name: String,
    /// Kind of change.
    pub op: PropertyChangeOp,
    /// New value; [`Value::Null`] for removals.
    pub val: Value,
}

/// Changes to one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    /// Kind of update.
    pub kind: ObjectUpdateKind,
    /// The object that changed.
    pub obj: ManagedObjectReference,
    /// Property changes.
    pub change_set: Vec<PropertyChange>,
}

/// Changes reported by one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilterUpdate {
    /// The filter that produced the updates.
    pub filter: ManagedObjectReference,
    /// Object updates.
    pub object_set: Vec<ObjectUpdate>,
}

/// The result of one long-poll call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSet {
    /// Version to pass to the next call.
    pub version: String,
    /// Per-filter updates.
    pub filter_set: Vec<PropertyFilterUpdate>,
    /// More updates are pending; call again right away.
    pub truncated: bool,
}

// =============================================================================
// Tasks and faults
// =============================================================================

/// `info.state` of a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting to run.
    Queued,
    /// In progress.
    Running,
    /// Completed successfully.
    Success,
    /// Completed with a fault.
    Error,
}

impl TaskState {
    /// Parse the platform's wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The platform's wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Whether the task has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a remote fault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// A datastore file does not exist.
    FileNotFound,
    /// The session is not authenticated.
    NotAuthenticated,
    /// A referenced managed object no longer exists.
    ManagedObjectNotFound(Option<ManagedObjectReference>),
    /// An object with the same name already exists in the container.
    DuplicateName,
    /// The operation is not valid in the VM's current power state.
    InvalidPowerState,
    /// The session lacks a privilege.
    NoPermission,
    /// An argument was rejected.
    InvalidArgument,
    /// Any other fault, by platform type name.
    Other(String),
}

impl FaultKind {
    /// Map a platform fault type name onto a kind.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "FileNotFound" => Self::FileNotFound,
            "NotAuthenticated" => Self::NotAuthenticated,
            "ManagedObjectNotFound" => Self::ManagedObjectNotFound(None),
            "DuplicateName" => Self::DuplicateName,
            "InvalidPowerState" => Self::InvalidPowerState,
            "NoPermission" => Self::NoPermission,
            "InvalidArgument" => Self::InvalidArgument,
            other => Self::Other(other.to_string()),
        }
    }

    /// The platform fault type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::FileNotFound => "FileNotFound",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::ManagedObjectNotFound(_) => "ManagedObjectNotFound",
            Self::DuplicateName => "DuplicateName",
            Self::InvalidPowerState => "InvalidPowerState",
            Self::NoPermission => "NoPermission",
            Self::InvalidArgument => "InvalidArgument",
            Self::Other(name) => name,
        }
    }
}

/// A fault together with the remote side's human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMethodFault {
    /// Fault kind.
    pub kind: FaultKind,
    /// Localized message; may be empty.
    pub localized_message: String,
}

impl LocalizedMethodFault {
    /// Create a fault.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            localized_message: message.into(),
        }
    }
}

impl fmt::Display for LocalizedMethodFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.localized_message.is_empty() {
            f.write_str(self.kind.type_name())
        } else {
            f.write_str(&self.localized_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_equality_is_structural() {
        let a = ManagedObjectReference::new("VirtualMachine", "vm-1");
        let b = ManagedObjectReference::virtual_machine("vm-1");
        assert_eq!(a, b);
        assert_ne!(a, ManagedObjectReference::folder("vm-1"));
        assert_eq!(a.to_string(), "VirtualMachine:vm-1");
    }

    #[test]
    fn test_task_state_parse() {
        assert_eq!(TaskState::parse("success"), Some(TaskState::Success));
        assert_eq!(TaskState::parse("running"), Some(TaskState::Running));
        assert_eq!(TaskState::parse("bogus"), None);
        assert!(TaskState::Error.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
    }

    #[test]
    fn test_fault_kind_names() {
        assert_eq!(
            FaultKind::from_type_name("FileNotFound"),
            FaultKind::FileNotFound
        );
        let other = FaultKind::from_type_name("HostConnectFault");
        assert_eq!(other, FaultKind::Other("HostConnectFault".to_string()));
        assert_eq!(other.type_name(), "HostConnectFault");
    }

    #[test]
    fn test_fault_display_prefers_message() {
        let fault = LocalizedMethodFault::new(FaultKind::NotAuthenticated, "nope");
        assert_eq!(fault.to_string(), "nope");

        let bare = LocalizedMethodFault::new(FaultKind::DuplicateName, "");
        assert_eq!(bare.to_string(), "DuplicateName");
    }
}
