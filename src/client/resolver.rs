// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash-separated inventory path resolution.
//!
//! Paths are resolved one segment at a time, starting at one of the
//! datacenter's root folders:
//!
//! - every non-final segment must name exactly one child `Folder`
//! - a final literal segment must name exactly one child of the requested kind
//! - a final `*` selects every object of the requested kind anywhere below
//!   the folder matched so far
//!
//! Names are compared byte for byte. Empty segments are ignored, so
//! `"/foo//bar/"` and `"foo/bar"` are the same path.

use std::fmt;

use crate::api::{ManagedObjectReference, PropertySpec};
use crate::client::retriever::{PropertyRetriever, PropertySet};
use crate::client::remote::Remote;
use crate::error::{Result, VsphereError};
use crate::runtime::Context;

const WILDCARD: &str = "*";

/// The kinds of inventory object the client knows how to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    Folder,
    Datacenter,
    ComputeResource,
    ClusterComputeResource,
    HostSystem,
    ResourcePool,
    VirtualMachine,
    VirtualApp,
    Datastore,
    StoragePod,
    Network,
    OpaqueNetwork,
    DistributedVirtualPortgroup,
    DistributedVirtualSwitch,
}

impl InventoryKind {
    /// Parse a platform type name. Unknown types yield `None`.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "Folder" => Self::Folder,
            "Datacenter" => Self::Datacenter,
            "ComputeResource" => Self::ComputeResource,
            "ClusterComputeResource" => Self::ClusterComputeResource,
            "HostSystem" => Self::HostSystem,
            "ResourcePool" => Self::ResourcePool,
            "VirtualMachine" => Self::VirtualMachine,
            "VirtualApp" => Self::VirtualApp,
            "Datastore" => Self::Datastore,
            "StoragePod" => Self::StoragePod,
            "Network" => Self::Network,
            "OpaqueNetwork" => Self::OpaqueNetwork,
            "DistributedVirtualPortgroup" => Self::DistributedVirtualPortgroup,
            "VmwareDistributedVirtualSwitch" | "DistributedVirtualSwitch" => {
                Self::DistributedVirtualSwitch
            }
            _ => return None,
        })
    }

    /// The platform type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Folder => "Folder",
            Self::Datacenter => "Datacenter",
            Self::ComputeResource => "ComputeResource",
            Self::ClusterComputeResource => "ClusterComputeResource",
            Self::HostSystem => "HostSystem",
            Self::ResourcePool => "ResourcePool",
            Self::VirtualMachine => "VirtualMachine",
            Self::VirtualApp => "VirtualApp",
            Self::Datastore => "Datastore",
            Self::StoragePod => "StoragePod",
            Self::Network => "Network",
            Self::OpaqueNetwork => "OpaqueNetwork",
            Self::DistributedVirtualPortgroup => "DistributedVirtualPortgroup",
            Self::DistributedVirtualSwitch => "DistributedVirtualSwitch",
        }
    }

    /// The kind of a reference, if it is one the client knows.
    #[must_use]
    pub fn of(reference: &ManagedObjectReference) -> Option<Self> {
        Self::from_type_name(&reference.type_name)
    }

    /// Whether path resolution descends into objects of this kind.
    #[must_use]
    pub fn is_container(&self) -> bool {
        match self {
            Self::Folder => true,
            Self::Datacenter
            | Self::ComputeResource
            | Self::ClusterComputeResource
            | Self::HostSystem
            | Self::ResourcePool
            | Self::VirtualMachine
            | Self::VirtualApp
            | Self::Datastore
            | Self::StoragePod
            | Self::Network
            | Self::OpaqueNetwork
            | Self::DistributedVirtualPortgroup
            | Self::DistributedVirtualSwitch => false,
        }
    }

    /// Every kind a search for `self` accepts, `self` first.
    #[must_use]
    pub fn family(&self) -> &'static [InventoryKind] {
        match self {
            Self::ComputeResource => &[Self::ComputeResource, Self::ClusterComputeResource],
            Self::Network => &[
                Self::Network,
                Self::OpaqueNetwork,
                Self::DistributedVirtualPortgroup,
            ],
            Self::Folder => &[Self::Folder],
            Self::Datacenter => &[Self::Datacenter],
            Self::ClusterComputeResource => &[Self::ClusterComputeResource],
            Self::HostSystem => &[Self::HostSystem],
            Self::ResourcePool => &[Self::ResourcePool],
            Self::VirtualMachine => &[Self::VirtualMachine],
            Self::VirtualApp => &[Self::VirtualApp],
            Self::Datastore => &[Self::Datastore],
            Self::StoragePod => &[Self::StoragePod],
            Self::OpaqueNetwork => &[Self::OpaqueNetwork],
            Self::DistributedVirtualPortgroup => &[Self::DistributedVirtualPortgroup],
            Self::DistributedVirtualSwitch => &[Self::DistributedVirtualSwitch],
        }
    }

    fn accepts(&self, reference: &ManagedObjectReference) -> bool {
        Self::of(reference).is_some_and(|kind| self.family().contains(&kind))
    }
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Which of a datacenter's root folders a path starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatacenterFolder {
    Vm,
    Host,
    Datastore,
    Network,
}

impl DatacenterFolder {
    fn segment(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Host => "host",
            Self::Datastore => "datastore",
            Self::Network => "network",
        }
    }
}

/// Datacenter properties read on every lookup.
pub(crate) const DATACENTER_PROPERTIES: &[&str] = &[
    "name",
    "vmFolder",
    "hostFolder",
    "datastoreFolder",
    "networkFolder",
];

/// A datacenter and its root folders, as read by one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datacenter {
    pub reference: ManagedObjectReference,
    pub name: String,
    pub vm_folder: ManagedObjectReference,
    pub host_folder: ManagedObjectReference,
    pub datastore_folder: ManagedObjectReference,
    pub network_folder: ManagedObjectReference,
}

impl Datacenter {
    /// The root folder of one inventory tree.
    #[must_use]
    pub fn root(&self, which: DatacenterFolder) -> InventoryRoot {
        let folder = match which {
            DatacenterFolder::Vm => &self.vm_folder,
            DatacenterFolder::Host => &self.host_folder,
            DatacenterFolder::Datastore => &self.datastore_folder,
            DatacenterFolder::Network => &self.network_folder,
        };
        InventoryRoot {
            folder: folder.clone(),
            path: format!("/{}/{}", self.name, which.segment()),
        }
    }
}

impl TryFrom<PropertySet> for Datacenter {
    type Error = VsphereError;

    fn try_from(props: PropertySet) -> Result<Self> {
        Ok(Self {
            reference: props.reference().clone(),
            name: props.name().unwrap_or_default().to_string(),
            vm_folder: props.require_reference("vmFolder")?.clone(),
            host_folder: props.require_reference("hostFolder")?.clone(),
            datastore_folder: props.require_reference("datastoreFolder")?.clone(),
            network_folder: props.require_reference("networkFolder")?.clone(),
        })
    }
}

/// A folder that relative paths are resolved against, with its display path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRoot {
    pub folder: ManagedObjectReference,
    pub path: String,
}

impl InventoryRoot {
    fn join(&self, segments: &[&str]) -> String {
        if segments.is_empty() {
            return self.path.clone();
        }
        format!("{}/{}", self.path.trim_end_matches('/'), segments.join("/"))
    }
}

/// The non-empty segments of a path.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A path resolved as far as it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartialPath {
    /// Deepest existing folder.
    pub folder: ManagedObjectReference,
    /// Segments below it that do not exist yet, in order.
    pub missing: Vec<String>,
}

/// Resolves paths through fresh property retrievals.
pub(crate) struct PathResolver<'a> {
    remote: &'a Remote,
    retriever: PropertyRetriever<'a>,
}

impl<'a> PathResolver<'a> {
    pub(crate) fn new(remote: &'a Remote) -> Self {
        Self {
            remote,
            retriever: PropertyRetriever::new(remote),
        }
    }

    /// Look up a datacenter by its path from the root folder.
    pub(crate) async fn datacenter(&self, ctx: &Context, name: &str) -> Result<Datacenter> {
        let root = InventoryRoot {
            folder: self.remote.content().root_folder.clone(),
            path: String::new(),
        };
        let found = self
            .resolve_one(ctx, &root, name, InventoryKind::Datacenter)
            .await?;
        let props = self
            .retriever
            .retrieve_one(ctx, &found, DATACENTER_PROPERTIES)
            .await?;
        Datacenter::try_from(props)
    }

    /// Children of `parent` named `name` whose kind `kind` accepts.
    ///
    /// Same-named siblings of other kinds are not returned, so they never
    /// make a lookup ambiguous.
    pub(crate) async fn children_named(
        &self,
        ctx: &Context,
        parent: &ManagedObjectReference,
        name: &str,
        kind: InventoryKind,
    ) -> Result<Vec<ManagedObjectReference>> {
        let children = self
            .retriever
            .retrieve_children(ctx, parent, &["name"])
            .await?;
        Ok(children
            .into_iter()
            .filter(|c| kind.accepts(c.reference()) && c.name() == Some(name))
            .map(|c| c.reference().clone())
            .collect())
    }

    /// The unique child of `parent` named `name` of kind `kind`.
    pub(crate) async fn find_child(
        &self,
        ctx: &Context,
        parent: &ManagedObjectReference,
        name: &str,
        kind: InventoryKind,
        path: &str,
    ) -> Result<ManagedObjectReference> {
        let mut matches = self.children_named(ctx, parent, name, kind).await?;
        match matches.len() {
            0 => Err(VsphereError::NotFound {
                path: path.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            n => Err(VsphereError::AmbiguousPath {
                path: path.to_string(),
                matches: n,
            }),
        }
    }

    async fn descend(
        &self,
        ctx: &Context,
        root: &InventoryRoot,
        segments: &[&str],
    ) -> Result<ManagedObjectReference> {
        let mut current = root.folder.clone();
        for (i, segment) in segments.iter().enumerate() {
            if *segment == WILDCARD {
                return Err(VsphereError::Validation(format!(
                    "{:?}: wildcard is only allowed as the final segment",
                    root.join(segments)
                )));
            }
            let path = root.join(&segments[..=i]);
            current = self
                .find_child(ctx, &current, segment, InventoryKind::Folder, &path)
                .await?;
        }
        Ok(current)
    }

    /// Resolve `path` below `root` to objects of kind `leaf`.
    ///
    /// A literal final segment yields exactly one object. A final `*` yields
    /// every matching object in the subtree, in remote order, and fails with
    /// [`VsphereError::NotFound`] when there are none.
    pub(crate) async fn resolve(
        &self,
        ctx: &Context,
        root: &InventoryRoot,
        path: &str,
        leaf: InventoryKind,
    ) -> Result<Vec<ManagedObjectReference>> {
        let segments = segments(path);
        let Some((last, parents)) = segments.split_last() else {
            return match leaf {
                InventoryKind::Folder => Ok(vec![root.folder.clone()]),
                _ => Err(VsphereError::Validation(format!(
                    "empty path for {leaf} lookup"
                ))),
            };
        };
        let parent = self.descend(ctx, root, parents).await?;
        let full = root.join(&segments);

        if *last == WILDCARD {
            let prop_set = leaf
                .family()
                .iter()
                .map(|k| PropertySpec::new(k.type_name(), &["name"]))
                .collect();
            let found = self
                .retriever
                .retrieve_subtree(ctx, &parent, prop_set)
                .await?;
            if found.is_empty() {
                return Err(VsphereError::NotFound { path: full });
            }
            return Ok(found.iter().map(|p| p.reference().clone()).collect());
        }

        let found = self.find_child(ctx, &parent, last, leaf, &full).await?;
        Ok(vec![found])
    }

    /// Resolve a path that must name a single object.
    pub(crate) async fn resolve_one(
        &self,
        ctx: &Context,
        root: &InventoryRoot,
        path: &str,
        leaf: InventoryKind,
    ) -> Result<ManagedObjectReference> {
        if segments(path).last() == Some(&WILDCARD) {
            return Err(VsphereError::Validation(format!(
                "{path:?}: expected a single {leaf}, not a wildcard"
            )));
        }
        let mut found = self.resolve(ctx, root, path, leaf).await?;
        found.pop().ok_or_else(|| VsphereError::NotFound {
            path: root.join(&segments(path)),
        })
    }

    /// Walk as many folder segments of `path` as exist.
    pub(crate) async fn resolve_partial(
        &self,
        ctx: &Context,
        root: &InventoryRoot,
        path: &str,
    ) -> Result<PartialPath> {
        let segments = segments(path);
        let mut current = root.folder.clone();
        for (i, segment) in segments.iter().enumerate() {
            if *segment == WILDCARD {
                return Err(VsphereError::Validation(format!(
                    "{path:?}: wildcard is not a folder name"
                )));
            }
            let mut matches = self
                .children_named(ctx, &current, segment, InventoryKind::Folder)
                .await?;
            match matches.len() {
                0 => {
                    return Ok(PartialPath {
                        folder: current,
                        missing: segments[i..].iter().map(|s| (*s).to_string()).collect(),
                    })
                }
                1 => current = matches.remove(0),
                n => {
                    return Err(VsphereError::AmbiguousPath {
                        path: root.join(&segments[..=i]),
                        matches: n,
                    })
                }
            }
        }
        Ok(PartialPath {
            folder: current,
            missing: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_ignore_empty() {
        assert_eq!(segments("/foo//bar/"), vec!["foo", "bar"]);
        assert_eq!(segments("foo/bar"), vec!["foo", "bar"]);
        assert!(segments("///").is_empty());
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_segments_keep_case_and_spaces() {
        assert_eq!(segments("Foo/ bar"), vec!["Foo", " bar"]);
    }

    #[test]
    fn test_inventory_kind_round_trip_names() {
        for kind in [
            InventoryKind::Folder,
            InventoryKind::Datacenter,
            InventoryKind::ClusterComputeResource,
            InventoryKind::VirtualMachine,
            InventoryKind::DistributedVirtualPortgroup,
        ] {
            assert_eq!(InventoryKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(InventoryKind::from_type_name("Alarm"), None);
        assert_eq!(
            InventoryKind::from_type_name("VmwareDistributedVirtualSwitch"),
            Some(InventoryKind::DistributedVirtualSwitch)
        );
    }

    #[test]
    fn test_only_folders_are_containers() {
        assert!(InventoryKind::Folder.is_container());
        assert!(!InventoryKind::Datacenter.is_container());
        assert!(!InventoryKind::VirtualApp.is_container());
    }

    #[test]
    fn test_compute_resource_family_accepts_clusters() {
        let cluster = ManagedObjectReference::new("ClusterComputeResource", "domain-c7");
        assert!(InventoryKind::ComputeResource.accepts(&cluster));
        assert!(!InventoryKind::HostSystem.accepts(&cluster));
        let unknown = ManagedObjectReference::new("Alarm", "alarm-1");
        assert!(!InventoryKind::Folder.accepts(&unknown));
    }

    #[test]
    fn test_datacenter_roots() {
        let dc = Datacenter {
            reference: ManagedObjectReference::new("Datacenter", "datacenter-2"),
            name: "dc0".to_string(),
            vm_folder: ManagedObjectReference::folder("group-v3"),
            host_folder: ManagedObjectReference::folder("group-h4"),
            datastore_folder: ManagedObjectReference::folder("group-s5"),
            network_folder: ManagedObjectReference::folder("group-n6"),
        };
        let root = dc.root(DatacenterFolder::Vm);
        assert_eq!(root.folder.value, "group-v3");
        assert_eq!(root.path, "/dc0/vm");
        assert_eq!(root.join(&["foo", "bar"]), "/dc0/vm/foo/bar");
        assert_eq!(dc.root(DatacenterFolder::Network).path, "/dc0/network");
    }
}
