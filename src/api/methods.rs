// SPDX-License-Identifier: MIT OR Apache-2.0

//! State-changing remote methods invoked by the lifecycle operations.

use serde::{Deserialize, Serialize};

use super::types::{ManagedObjectReference, Value};

/// A key/value entry of a VM's `extraConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    /// Option key.
    pub key: String,
    /// Option value. An empty value removes the key on reconfiguration.
    pub value: String,
}

impl OptionValue {
    /// Create an option value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The subset of a VM reconfiguration spec the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VirtualMachineConfigSpec {
    /// Extra configuration entries to set or remove.
    pub extra_config: Vec<OptionValue>,
}

/// A remote method call, addressed to the object it is invoked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// `Folder.CreateFolder`; synchronous, returns the new folder.
    CreateFolder {
        /// Name of the new child folder.
        name: String,
    },
    /// `Folder.MoveIntoFolder_Task`.
    MoveIntoFolder {
        /// Entities to move into the folder.
        list: Vec<ManagedObjectReference>,
    },
    /// `ManagedEntity.Destroy_Task`; removes the entity and its contents.
    Destroy,
    /// `VirtualMachine.PowerOffVM_Task`.
    PowerOffVm,
    /// `VirtualMachine.ReconfigVM_Task`.
    ReconfigVm {
        /// Reconfiguration spec.
        spec: VirtualMachineConfigSpec,
    },
    /// `FileManager.DeleteDatastoreFile_Task`.
    DeleteDatastoreFile {
        /// Datastore path, e.g. `[datastore1] vm-0/disk.vmdk`.
        name: String,
        /// Datacenter the datastore path is relative to.
        datacenter: Option<ManagedObjectReference>,
    },
}

impl Method {
    /// The platform method name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Method::CreateFolder { .. } => "CreateFolder",
            Method::MoveIntoFolder { .. } => "MoveIntoFolder_Task",
            Method::Destroy => "Destroy_Task",
            Method::PowerOffVm => "PowerOffVM_Task",
            Method::ReconfigVm { .. } => "ReconfigVM_Task",
            Method::DeleteDatastoreFile { .. } => "DeleteDatastoreFile_Task",
        }
    }
}

/// What a method call returned synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodResult {
    /// The method returned no value.
    Void,
    /// The method completed synchronously with a value.
    Value(Value),
    /// The method started a task that must be waited on.
    Task(ManagedObjectReference),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(
            Method::CreateFolder {
                name: "foo".to_string()
            }
            .name(),
            "CreateFolder"
        );
        assert_eq!(Method::Destroy.name(), "Destroy_Task");
        assert_eq!(Method::PowerOffVm.name(), "PowerOffVM_Task");
        assert_eq!(
            Method::DeleteDatastoreFile {
                name: "[ds] f".to_string(),
                datacenter: None,
            }
            .name(),
            "DeleteDatastoreFile_Task"
        );
    }
}
