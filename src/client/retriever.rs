// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched property retrieval.
//!
//! Every read the client performs goes through [`PropertyRetriever`], and
//! every read is fresh: nothing retrieved here outlives the operation that
//! asked for it.

use std::collections::{HashMap, HashSet};

use crate::api::{
    DynamicProperty, FaultKind, LocalizedMethodFault, ManagedObjectReference, ObjectContent,
    ObjectSpec, OptionValue, PropertyFilterSpec, PropertySpec, SelectionSpec, TraversalSpec, Value,
    VirtualDevice,
};
use crate::client::remote::Remote;
use crate::error::{Result, VsphereError};
use crate::runtime::Context;

/// Base type matching every inventory object.
const MANAGED_ENTITY: &str = "ManagedEntity";
const CHILD_ENTITY: &str = "childEntity";
const FOLDER_RECURSION: &str = "traverseFolders";

/// The properties of one object from one retrieval, in remote order.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySet {
    obj: ManagedObjectReference,
    props: Vec<DynamicProperty>,
}

impl From<ObjectContent> for PropertySet {
    fn from(content: ObjectContent) -> Self {
        Self {
            obj: content.obj,
            props: content.prop_set,
        }
    }
}

impl PropertySet {
    /// The object these properties belong to.
    #[must_use]
    pub fn reference(&self) -> &ManagedObjectReference {
        &self.obj
    }

    /// Raw value of a property, if it was returned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.props.iter().find(|p| p.name == name).map(|p| &p.val)
    }

    /// Property names in remote order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.iter().map(|p| p.name.as_str())
    }

    fn mismatch(&self, name: &str, expected: &str, got: &Value) -> VsphereError {
        VsphereError::Protocol(format!(
            "property {name:?} of {} is {}, expected {expected}",
            self.obj,
            got.kind()
        ))
    }

    /// The `name` property, if present and a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self.get("name") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// A string property.
    pub fn string(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch(name, "string", other)),
        }
    }

    /// A boolean property.
    pub fn boolean(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(name, "boolean", other)),
        }
    }

    /// A reference-valued property.
    pub fn reference_of(&self, name: &str) -> Result<Option<&ManagedObjectReference>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Ref(r)) => Ok(Some(r)),
            Some(other) => Err(self.mismatch(name, "ManagedObjectReference", other)),
        }
    }

    /// A reference-array property; absent means empty.
    pub fn references(&self, name: &str) -> Result<&[ManagedObjectReference]> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Refs(r)) => Ok(r),
            Some(other) => Err(self.mismatch(name, "ArrayOfManagedObjectReference", other)),
        }
    }

    /// A device-array property; absent means empty.
    pub fn devices(&self, name: &str) -> Result<&[VirtualDevice]> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Devices(d)) => Ok(d),
            Some(other) => Err(self.mismatch(name, "ArrayOfVirtualDevice", other)),
        }
    }

    /// An option-value-array property; absent means empty.
    pub fn options(&self, name: &str) -> Result<&[OptionValue]> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Options(o)) => Ok(o),
            Some(other) => Err(self.mismatch(name, "ArrayOfOptionValue", other)),
        }
    }

    /// A reference property that must be present.
    pub fn require_reference(&self, name: &str) -> Result<&ManagedObjectReference> {
        self.reference_of(name)?.ok_or_else(|| {
            VsphereError::Protocol(format!("{} has no {name:?} property", self.obj))
        })
    }
}

/// Issues property retrievals against the session.
pub(crate) struct PropertyRetriever<'a> {
    remote: &'a Remote,
}

impl<'a> PropertyRetriever<'a> {
    pub(crate) fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }

    async fn retrieve(
        &self,
        ctx: &Context,
        spec: PropertyFilterSpec,
        subject: &ManagedObjectReference,
    ) -> Result<Vec<ObjectContent>> {
        self.remote.retrieve(ctx, spec).await.map_err(|err| match err {
            VsphereError::Fault(LocalizedMethodFault {
                kind: FaultKind::ManagedObjectNotFound(obj),
                ..
            }) => VsphereError::ObjectNotFound(obj.unwrap_or_else(|| subject.clone())),
            other => other,
        })
    }

    /// Properties of a single known object.
    pub(crate) async fn retrieve_one(
        &self,
        ctx: &Context,
        obj: &ManagedObjectReference,
        props: &[&str],
    ) -> Result<PropertySet> {
        let mut found = self.retrieve_many(ctx, std::slice::from_ref(obj), props).await?;
        found
            .pop()
            .ok_or_else(|| VsphereError::ObjectNotFound(obj.clone()))
    }

    /// Properties of several objects in one round trip, in input order.
    pub(crate) async fn retrieve_many(
        &self,
        ctx: &Context,
        objs: &[ManagedObjectReference],
        props: &[&str],
    ) -> Result<Vec<PropertySet>> {
        let Some(first) = objs.first() else {
            return Ok(Vec::new());
        };

        let mut types = HashSet::new();
        let prop_set = objs
            .iter()
            .filter(|o| types.insert(o.type_name.as_str()))
            .map(|o| PropertySpec::new(o.type_name.clone(), props))
            .collect();
        let spec = PropertyFilterSpec {
            prop_set,
            object_set: objs.iter().cloned().map(ObjectSpec::single).collect(),
        };

        let mut by_ref: HashMap<ManagedObjectReference, ObjectContent> = self
            .retrieve(ctx, spec, first)
            .await?
            .into_iter()
            .map(|c| (c.obj.clone(), c))
            .collect();

        objs.iter()
            .map(|obj| {
                by_ref
                    .remove(obj)
                    .map(PropertySet::from)
                    .ok_or_else(|| VsphereError::ObjectNotFound(obj.clone()))
            })
            .collect()
    }

    /// Direct children of a folder, with `props` selected on each.
    pub(crate) async fn retrieve_children(
        &self,
        ctx: &Context,
        container: &ManagedObjectReference,
        props: &[&str],
    ) -> Result<Vec<PropertySet>> {
        let spec = PropertyFilterSpec {
            prop_set: vec![PropertySpec::new(MANAGED_ENTITY, props)],
            object_set: vec![ObjectSpec {
                obj: container.clone(),
                skip: true,
                select_set: vec![SelectionSpec::Traversal(TraversalSpec {
                    name: "folderChildren".to_string(),
                    type_name: "Folder".to_string(),
                    path: CHILD_ENTITY.to_string(),
                    skip: false,
                    select_set: Vec::new(),
                })],
            }],
        };
        let found = self.retrieve(ctx, spec, container).await?;
        Ok(found.into_iter().map(PropertySet::from).collect())
    }

    /// Every object below `container` whose type one of `prop_set` names,
    /// with that spec's properties selected.
    ///
    /// Intermediate folders are followed recursively on the remote side, so
    /// this is a single round trip. Results keep the remote order.
    pub(crate) async fn retrieve_subtree(
        &self,
        ctx: &Context,
        container: &ManagedObjectReference,
        prop_set: Vec<PropertySpec>,
    ) -> Result<Vec<PropertySet>> {
        let types: Vec<String> = prop_set.iter().map(|p| p.type_name.clone()).collect();
        let spec = PropertyFilterSpec {
            prop_set,
            object_set: vec![ObjectSpec {
                obj: container.clone(),
                skip: true,
                select_set: vec![SelectionSpec::Traversal(TraversalSpec {
                    name: FOLDER_RECURSION.to_string(),
                    type_name: "Folder".to_string(),
                    path: CHILD_ENTITY.to_string(),
                    skip: false,
                    select_set: vec![SelectionSpec::Named(FOLDER_RECURSION.to_string())],
                })],
            }],
        };
        let found = self.retrieve(ctx, spec, container).await?;
        Ok(found
            .into_iter()
            .filter(|c| types.contains(&c.obj.type_name))
            .map(PropertySet::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_props() -> PropertySet {
        PropertySet::from(ObjectContent {
            obj: ManagedObjectReference::virtual_machine("vm-7"),
            prop_set: vec![
                DynamicProperty::new("name", "web-0"),
                DynamicProperty::new("runtime.powerState", "poweredOn"),
                DynamicProperty::new(
                    "resourcePool",
                    ManagedObjectReference::new("ResourcePool", "rp-1"),
                ),
            ],
        })
    }

    #[test]
    fn test_typed_accessors() {
        let props = vm_props();
        assert_eq!(props.name(), Some("web-0"));
        assert_eq!(
            props.string("runtime.powerState").unwrap(),
            Some("poweredOn")
        );
        assert_eq!(
            props.reference_of("resourcePool").unwrap().map(|r| r.value.as_str()),
            Some("rp-1")
        );
        assert!(props.references("datastore").unwrap().is_empty());
        assert_eq!(props.boolean("summary.accessible").unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_is_protocol_error() {
        let props = vm_props();
        let err = props.boolean("name").unwrap_err();
        assert!(matches!(err, VsphereError::Protocol(_)));
        assert!(err.to_string().contains("\"name\""));
    }

    #[test]
    fn test_require_reference() {
        let props = vm_props();
        assert!(props.require_reference("resourcePool").is_ok());
        assert!(matches!(
            props.require_reference("parent"),
            Err(VsphereError::Protocol(_))
        ));
    }

    #[test]
    fn test_names_keep_remote_order() {
        let props = vm_props();
        assert_eq!(
            props.names().collect::<Vec<_>>(),
            vec!["name", "runtime.powerState", "resourcePool"]
        );
    }
}
