// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compute resources: standalone hosts and clusters.

use crate::api::ManagedObjectReference;
use crate::client::PropertySet;
use crate::error::{Result, VsphereError};

pub(crate) const COMPUTE_RESOURCE_PROPERTIES: &[&str] = &["name", "resourcePool", "datastore"];

/// Whether a compute resource is a single host or a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeResourceKind {
    Standalone,
    Cluster,
}

/// A compute resource as observed by one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeResource {
    pub reference: ManagedObjectReference,
    pub name: String,
    pub kind: ComputeResourceKind,
    /// Root resource pool.
    pub resource_pool: Option<ManagedObjectReference>,
    /// Datastores reachable from this resource, in remote order.
    pub datastores: Vec<ManagedObjectReference>,
}

impl TryFrom<PropertySet> for ComputeResource {
    type Error = VsphereError;

    fn try_from(props: PropertySet) -> Result<Self> {
        let kind = match props.reference().type_name.as_str() {
            "ClusterComputeResource" => ComputeResourceKind::Cluster,
            _ => ComputeResourceKind::Standalone,
        };
        Ok(Self {
            name: props.name().unwrap_or_default().to_string(),
            kind,
            resource_pool: props.reference_of("resourcePool")?.cloned(),
            datastores: props.references("datastore")?.to_vec(),
            reference: props.reference().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DynamicProperty, ObjectContent};

    #[test]
    fn test_cluster_from_properties() {
        let cr = ComputeResource::try_from(PropertySet::from(ObjectContent {
            obj: ManagedObjectReference::new("ClusterComputeResource", "domain-c8"),
            prop_set: vec![
                DynamicProperty::new("name", "z1"),
                DynamicProperty::new(
                    "resourcePool",
                    ManagedObjectReference::new("ResourcePool", "resgroup-9"),
                ),
                DynamicProperty::new(
                    "datastore",
                    vec![ManagedObjectReference::new("Datastore", "datastore-2")],
                ),
            ],
        }))
        .unwrap();
        assert_eq!(cr.kind, ComputeResourceKind::Cluster);
        assert_eq!(cr.datastores.len(), 1);
        assert!(cr.resource_pool.is_some());
    }

    #[test]
    fn test_standalone_without_datastores() {
        let cr = ComputeResource::try_from(PropertySet::from(ObjectContent {
            obj: ManagedObjectReference::new("ComputeResource", "domain-s1"),
            prop_set: vec![DynamicProperty::new("name", "z0")],
        }))
        .unwrap();
        assert_eq!(cr.kind, ComputeResourceKind::Standalone);
        assert!(cr.datastores.is_empty());
        assert_eq!(cr.resource_pool, None);
    }
}
