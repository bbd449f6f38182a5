// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed views of virtual machines and their extra configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::api::{
    ManagedObjectReference, OptionValue, VirtualDevice, VirtualDisk, VirtualMachineConfigSpec,
};
use crate::client::PropertySet;
use crate::error::{Result, VsphereError};

// =============================================================================
// PowerState
// =============================================================================

/// `runtime.powerState` of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl PowerState {
    /// Parse the platform's wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "poweredOn" => Some(Self::PoweredOn),
            "poweredOff" => Some(Self::PoweredOff),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }

    /// The platform's wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoweredOn => "poweredOn",
            Self::PoweredOff => "poweredOff",
            Self::Suspended => "suspended",
        }
    }

    pub(crate) fn from_props(props: &PropertySet) -> Result<Self> {
        let raw = props.string(VM_POWER_STATE)?.ok_or_else(|| {
            VsphereError::Protocol(format!("{} has no power state", props.reference()))
        })?;
        Self::parse(raw)
            .ok_or_else(|| VsphereError::Protocol(format!("unknown power state {raw:?}")))
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// VirtualMachine
// =============================================================================

pub(crate) const VM_POWER_STATE: &str = "runtime.powerState";

/// Properties read for every enumerated virtual machine.
pub(crate) const VM_PROPERTIES: &[&str] = &[
    "name",
    VM_POWER_STATE,
    "config.hardware.device",
    "resourcePool",
];

/// A virtual machine as observed by one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMachine {
    pub reference: ManagedObjectReference,
    pub name: String,
    pub power_state: PowerState,
    /// `None` for templates.
    pub resource_pool: Option<ManagedObjectReference>,
    /// Attached disks in device order.
    pub disks: Vec<VirtualDisk>,
}

impl VirtualMachine {
    /// Sum of all disk capacities, in MiB.
    #[must_use]
    pub fn disk_capacity_mib(&self) -> i64 {
        self.disks.iter().map(|d| d.capacity_in_kb).sum::<i64>() / 1024
    }

    #[must_use]
    pub fn is_powered_on(&self) -> bool {
        self.power_state == PowerState::PoweredOn
    }
}

impl TryFrom<PropertySet> for VirtualMachine {
    type Error = VsphereError;

    fn try_from(props: PropertySet) -> Result<Self> {
        let disks = props
            .devices("config.hardware.device")?
            .iter()
            .filter_map(|d| match d {
                VirtualDevice::Disk(disk) => Some(disk.clone()),
                VirtualDevice::Other(_) => None,
            })
            .collect();
        Ok(Self {
            name: props.name().unwrap_or_default().to_string(),
            power_state: PowerState::from_props(&props)?,
            resource_pool: props.reference_of("resourcePool")?.cloned(),
            disks,
            reference: props.reference().clone(),
        })
    }
}

// =============================================================================
// ExtraConfig
// =============================================================================

/// Key/value pairs for a VM's `extraConfig`.
///
/// An empty value removes the key. Keys are kept sorted so the same map
/// always produces the same reconfiguration request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraConfig {
    entries: BTreeMap<String, String>,
}

impl ExtraConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Remove `key` from the VM's configuration.
    #[must_use]
    pub fn remove(self, key: impl Into<String>) -> Self {
        self.set(key, "")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtraConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for ExtraConfig {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<ExtraConfig> for VirtualMachineConfigSpec {
    fn from(config: ExtraConfig) -> Self {
        Self {
            extra_config: config
                .entries
                .into_iter()
                .map(|(k, v)| OptionValue::new(k, v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DynamicProperty, ObjectContent, Value};

    fn vm_set(state: &str) -> PropertySet {
        PropertySet::from(ObjectContent {
            obj: ManagedObjectReference::virtual_machine("vm-1"),
            prop_set: vec![
                DynamicProperty::new("name", "vm-1"),
                DynamicProperty::new(VM_POWER_STATE, state),
                DynamicProperty {
                    name: "config.hardware.device".to_string(),
                    val: Value::Devices(vec![
                        VirtualDevice::Other("VirtualE1000".to_string()),
                        VirtualDevice::Disk(VirtualDisk {
                            file_name: Some("[datastore2] vm-1/vm-1.vmdk".to_string()),
                            capacity_in_kb: 10 * 1024 * 1024,
                        }),
                    ]),
                },
            ],
        })
    }

    #[test]
    fn test_power_state_parse() {
        assert_eq!(PowerState::parse("poweredOn"), Some(PowerState::PoweredOn));
        assert_eq!(PowerState::parse("suspended"), Some(PowerState::Suspended));
        assert_eq!(PowerState::parse("on"), None);
        assert_eq!(PowerState::PoweredOff.to_string(), "poweredOff");
    }

    #[test]
    fn test_vm_from_properties() {
        let vm = VirtualMachine::try_from(vm_set("poweredOn")).unwrap();
        assert_eq!(vm.name, "vm-1");
        assert!(vm.is_powered_on());
        assert_eq!(vm.disks.len(), 1);
        assert_eq!(vm.disk_capacity_mib(), 10 * 1024);
        assert_eq!(vm.resource_pool, None);
    }

    #[test]
    fn test_vm_unknown_power_state() {
        let err = VirtualMachine::try_from(vm_set("warm")).unwrap_err();
        assert!(matches!(err, VsphereError::Protocol(_)));
    }

    #[test]
    fn test_extra_config_is_sorted() {
        let spec: VirtualMachineConfigSpec = ExtraConfig::new()
            .set("zeta", "1")
            .set("alpha", "2")
            .remove("guestinfo.old")
            .into();
        let keys: Vec<_> = spec.extra_config.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "guestinfo.old", "zeta"]);
        assert_eq!(spec.extra_config[1].value, "");
    }

    #[test]
    fn test_extra_config_from_hash_map() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        let config = ExtraConfig::from(map);
        assert_eq!(config.len(), 2);
        assert_eq!(config.iter().next(), Some(("a", "1")));
    }
}
