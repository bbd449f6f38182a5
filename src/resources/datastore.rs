// SPDX-License-Identifier: MIT OR Apache-2.0

//! Datastores and datastore paths.

use std::fmt;
use std::str::FromStr;

use crate::api::ManagedObjectReference;
use crate::client::PropertySet;
use crate::error::{Result, VsphereError};

/// Properties read for every enumerated datastore.
pub(crate) const DATASTORE_PROPERTIES: &[&str] = &["name", "summary.accessible"];

/// A datastore as observed by one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastore {
    pub reference: ManagedObjectReference,
    pub name: String,
    /// Whether the datastore is currently reachable from the platform.
    pub accessible: bool,
}

impl TryFrom<PropertySet> for Datastore {
    type Error = VsphereError;

    fn try_from(props: PropertySet) -> Result<Self> {
        Ok(Self {
            name: props.name().unwrap_or_default().to_string(),
            accessible: props.boolean("summary.accessible")?.unwrap_or(false),
            reference: props.reference().clone(),
        })
    }
}

/// A file location of the form `[datastore] path/to/file`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatastorePath {
    pub datastore: String,
    pub path: String,
}

impl DatastorePath {
    #[must_use]
    pub fn new(datastore: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
            path: path.into(),
        }
    }
}

impl FromStr for DatastorePath {
    type Err = VsphereError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VsphereError::Validation(format!("invalid datastore path {s:?}"));
        let rest = s.trim().strip_prefix('[').ok_or_else(invalid)?;
        let (datastore, path) = rest.split_once(']').ok_or_else(invalid)?;
        if datastore.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(datastore, path.trim_start()))
    }
}

impl fmt::Display for DatastorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}]", self.datastore)
        } else {
            write!(f, "[{}] {}", self.datastore, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DynamicProperty, ObjectContent};

    #[test]
    fn test_parse_datastore_path() {
        let path: DatastorePath = "[datastore1] vm-0/disk.vmdk".parse().unwrap();
        assert_eq!(path.datastore, "datastore1");
        assert_eq!(path.path, "vm-0/disk.vmdk");
        assert_eq!(path.to_string(), "[datastore1] vm-0/disk.vmdk");
    }

    #[test]
    fn test_parse_datastore_root() {
        let path: DatastorePath = "[shared]".parse().unwrap();
        assert_eq!(path.path, "");
        assert_eq!(path.to_string(), "[shared]");
    }

    #[test]
    fn test_reject_malformed_paths() {
        for bad in ["datastore1/vm-0", "[] vm-0", "[datastore1 vm-0"] {
            assert!(
                matches!(bad.parse::<DatastorePath>(), Err(VsphereError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_datastore_from_properties() {
        let ds = Datastore::try_from(PropertySet::from(ObjectContent {
            obj: ManagedObjectReference::new("Datastore", "datastore-2"),
            prop_set: vec![
                DynamicProperty::new("name", "datastore2"),
                DynamicProperty::new("summary.accessible", true),
            ],
        }))
        .unwrap();
        assert_eq!(ds.name, "datastore2");
        assert!(ds.accessible);
    }
}
