//! Resolved devicetree model
//!
//! The tree arrives fully resolved from an upstream parser/resolver as JSON.
//! Cross references in the document are node paths; loading turns them into
//! [`NodeId`] indices into the node table so that lookups never own the
//! target node (the dependency graph is not a tree).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse model: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Node path must be absolute: {0}")]
    InvalidPath(String),
    #[error("Duplicate node path: {0}")]
    DuplicatePath(String),
    #[error("Unknown node {path} referenced from {referenced_from}")]
    UnknownNode {
        path: String,
        referenced_from: String,
    },
    #[error("Invalid value for property '{name}' on {node}: {source}")]
    InvalidProperty {
        node: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Index of a node in the tree's node table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//=============================================================================
// Input document
//=============================================================================

/// Top-level JSON document produced by the resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeDoc {
    /// Devicetree source the model was built from
    #[serde(default)]
    pub source: Option<String>,
    /// Directories the bindings were loaded from
    #[serde(default)]
    pub bindings_dirs: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDoc>,
    /// /chosen property name -> node path
    #[serde(default)]
    pub chosen: IndexMap<String, String>,
    /// Dependency cycles reported by the resolver, as groups of node paths
    #[serde(default)]
    pub cycles: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDoc {
    pub path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub matching_compat: Option<String>,
    #[serde(default)]
    pub compats: Vec<String>,
    #[serde(default)]
    pub binding_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub unit_addr: Option<u64>,
    /// Bus type the node sits on (e.g. "spi", "i2c")
    #[serde(default)]
    pub on_bus: Option<String>,
    #[serde(default)]
    pub bus_node: Option<String>,
    #[serde(default)]
    pub dep_ordinal: usize,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub required_by: Vec<String>,
    #[serde(default)]
    pub regs: Vec<Register>,
    #[serde(default)]
    pub interrupts: Vec<EntryDoc>,
    #[serde(default)]
    pub props: Vec<PropDoc>,
}

/// A (controller, cells) pair before the controller path is resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryDoc {
    pub controller: String,
    #[serde(default)]
    pub data: IndexMap<String, u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropKind,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub enum_index: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

//=============================================================================
// Resolved model
//=============================================================================

/// Property type as declared by the node's binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropKind {
    Boolean,
    String,
    Int,
    Array,
    StringArray,
    Uint8Array,
    Phandle,
    Phandles,
    PhandleArray,
    Path,
    Compound,
}

/// One `reg` entry; `name` comes from `reg-names`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Register {
    pub addr: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// A phandle-array entry or an interrupt: a controller plus named cells
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerAndData {
    pub controller: NodeId,
    pub data: IndexMap<String, u64>,
    pub name: Option<String>,
}

pub type Interrupt = ControllerAndData;

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Boolean(bool),
    String(String),
    Int(i64),
    Array(Vec<i64>),
    StringArray(Vec<String>),
    Uint8Array(Vec<u8>),
    Phandle(NodeId),
    Phandles(Vec<NodeId>),
    PhandleArray(Vec<ControllerAndData>),
    Path(NodeId),
    Compound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropValue,
    pub enum_index: Option<u64>,
    pub description: Option<String>,
}

impl Property {
    pub fn kind(&self) -> PropKind {
        match &self.value {
            PropValue::Boolean(_) => PropKind::Boolean,
            PropValue::String(_) => PropKind::String,
            PropValue::Int(_) => PropKind::Int,
            PropValue::Array(_) => PropKind::Array,
            PropValue::StringArray(_) => PropKind::StringArray,
            PropValue::Uint8Array(_) => PropKind::Uint8Array,
            PropValue::Phandle(_) => PropKind::Phandle,
            PropValue::Phandles(_) => PropKind::Phandles,
            PropValue::PhandleArray(_) => PropKind::PhandleArray,
            PropValue::Path(_) => PropKind::Path,
            PropValue::Compound => PropKind::Compound,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub path: String,
    /// Last path component, e.g. "uart@4000c000"
    pub name: String,
    pub enabled: bool,
    pub matching_compat: Option<String>,
    pub compats: Vec<String>,
    pub binding_path: Option<String>,
    pub description: Option<String>,
    pub label: Option<String>,
    pub aliases: Vec<String>,
    pub unit_addr: Option<u64>,
    pub on_bus: Option<String>,
    pub bus_node: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub dep_ordinal: usize,
    pub depends_on: Vec<NodeId>,
    pub required_by: Vec<NodeId>,
    pub regs: Vec<Register>,
    pub interrupts: Vec<Interrupt>,
    pub props: Vec<Property>,
}

impl Node {
    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn has_compat(&self, compat: &str) -> bool {
        self.compats.iter().any(|c| c == compat)
    }

    /// Flash partitions mark write protection with a true `read-only` property
    pub fn read_only(&self) -> bool {
        matches!(
            self.prop("read-only").map(|p| &p.value),
            Some(PropValue::Boolean(true))
        )
    }

    /// Node is a flash partition (recognized by name, not by binding)
    pub fn is_partition(&self) -> bool {
        self.name.starts_with("partition@")
    }
}

/// The resolved tree, indexed by [`NodeId`]
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub source: Option<String>,
    pub bindings_dirs: Vec<String>,
    nodes: Vec<Node>,
    by_path: HashMap<String, NodeId>,
    /// Node ids sorted by dependency ordinal; ties keep document order
    order: Vec<NodeId>,
    compat2enabled: BTreeMap<String, Vec<NodeId>>,
    chosen: HashMap<String, NodeId>,
    cycles: Vec<Vec<NodeId>>,
}

impl std::ops::Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl Tree {
    /// Load a model from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let doc: TreeDoc = serde_json::from_str(json)?;
        Self::from_doc(doc)
    }

    /// Load a model from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Resolve path references in `doc` into node indices
    pub fn from_doc(doc: TreeDoc) -> Result<Self, ModelError> {
        let mut by_path = HashMap::new();
        for (i, node) in doc.nodes.iter().enumerate() {
            if !node.path.starts_with('/') {
                return Err(ModelError::InvalidPath(node.path.clone()));
            }
            if by_path.insert(node.path.clone(), NodeId(i)).is_some() {
                return Err(ModelError::DuplicatePath(node.path.clone()));
            }
        }

        let lookup = |path: &str, from: &str| -> Result<NodeId, ModelError> {
            by_path
                .get(path)
                .copied()
                .ok_or_else(|| ModelError::UnknownNode {
                    path: path.to_string(),
                    referenced_from: from.to_string(),
                })
        };
        let lookup_all = |paths: &[String], from: &str| -> Result<Vec<NodeId>, ModelError> {
            paths.iter().map(|p| lookup(p, from)).collect()
        };

        let mut nodes = Vec::with_capacity(doc.nodes.len());
        for (i, nd) in doc.nodes.into_iter().enumerate() {
            let parent = match parent_path(&nd.path) {
                Some(pp) => Some(lookup(pp, &nd.path)?),
                None => None,
            };
            let bus_node = match &nd.bus_node {
                Some(bp) => Some(lookup(bp, &nd.path)?),
                None => None,
            };
            let interrupts = nd
                .interrupts
                .iter()
                .map(|e| resolve_entry(e, &nd.path, &lookup))
                .collect::<Result<Vec<_>, _>>()?;
            let props = nd
                .props
                .into_iter()
                .map(|p| resolve_prop(p, &nd.path, &lookup))
                .collect::<Result<Vec<_>, _>>()?;

            nodes.push(Node {
                id: NodeId(i),
                name: node_name(&nd.path).to_string(),
                enabled: nd.enabled,
                matching_compat: nd.matching_compat,
                compats: nd.compats,
                binding_path: nd.binding_path,
                description: nd.description,
                label: nd.label,
                aliases: nd.aliases,
                unit_addr: nd.unit_addr,
                on_bus: nd.on_bus,
                bus_node,
                parent,
                dep_ordinal: nd.dep_ordinal,
                depends_on: lookup_all(&nd.depends_on, &nd.path)?,
                required_by: lookup_all(&nd.required_by, &nd.path)?,
                regs: nd.regs,
                interrupts,
                props,
                path: nd.path,
            });
        }

        let mut order: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        order.sort_by_key(|id| nodes[id.0].dep_ordinal);

        let mut compat2enabled: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        for id in &order {
            let node = &nodes[id.0];
            if !node.enabled {
                continue;
            }
            for compat in &node.compats {
                compat2enabled.entry(compat.clone()).or_default().push(*id);
            }
        }

        let mut chosen = HashMap::new();
        for (name, path) in &doc.chosen {
            chosen.insert(name.clone(), lookup(path, "/chosen")?);
        }

        let cycles = doc
            .cycles
            .iter()
            .map(|group| lookup_all(group, "cycle report"))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            nodes = nodes.len(),
            compats = compat2enabled.len(),
            "Resolved devicetree model"
        );

        Ok(Self {
            source: doc.source,
            bindings_dirs: doc.bindings_dirs,
            nodes,
            by_path,
            order,
            compat2enabled,
            chosen,
            cycles,
        })
    }

    /// All nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All nodes sorted by dependency ordinal
    pub fn in_dependency_order(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(|id| &self.nodes[id.0])
    }

    pub fn by_path(&self, path: &str) -> Option<&Node> {
        self.by_path.get(path).map(|id| &self.nodes[id.0])
    }

    /// Node pointed at by the /chosen property `name`
    pub fn chosen(&self, name: &str) -> Option<&Node> {
        self.chosen.get(name).map(|id| &self.nodes[id.0])
    }

    /// Enabled nodes bearing `compat`, in dependency order
    pub fn enabled_with_compat(&self, compat: &str) -> &[NodeId] {
        self.compat2enabled
            .get(compat)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Distinct compatibles appearing on enabled nodes, sorted
    pub fn enabled_compats(&self) -> impl Iterator<Item = &str> {
        self.compat2enabled.keys().map(String::as_str)
    }

    /// Rank of `id` among the enabled nodes bearing `compat`
    pub fn instance_index(&self, id: NodeId, compat: &str) -> Option<usize> {
        self.enabled_with_compat(compat).iter().position(|n| *n == id)
    }

    pub fn cycles(&self) -> &[Vec<NodeId>] {
        &self.cycles
    }

    /// Flash controller owning a partition node.
    ///
    /// Partitions live at `<flash>/partitions/partition@N`. When the flash
    /// node is a `soc-nv-flash` the controller is its parent, otherwise the
    /// flash node itself is the controller.
    pub fn flash_controller(&self, partition: NodeId) -> Option<&Node> {
        let parent = self[partition].parent?;
        let flash = &self[self[parent].parent?];
        if flash.matching_compat.as_deref() == Some("soc-nv-flash") {
            flash.parent.map(|id| &self[id])
        } else {
            Some(flash)
        }
    }
}

fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

fn node_name(path: &str) -> &str {
    if path == "/" {
        return path;
    }
    path.rsplit('/').next().unwrap_or(path)
}

fn resolve_entry<F>(
    entry: &EntryDoc,
    from: &str,
    lookup: &F,
) -> Result<ControllerAndData, ModelError>
where
    F: Fn(&str, &str) -> Result<NodeId, ModelError>,
{
    Ok(ControllerAndData {
        controller: lookup(&entry.controller, from)?,
        data: entry.data.clone(),
        name: entry.name.clone(),
    })
}

fn resolve_prop<F>(doc: PropDoc, from: &str, lookup: &F) -> Result<Property, ModelError>
where
    F: Fn(&str, &str) -> Result<NodeId, ModelError>,
{
    let invalid = |source| ModelError::InvalidProperty {
        node: from.to_string(),
        name: doc.name.clone(),
        source,
    };
    let raw = doc.value.clone();

    let value = match doc.kind {
        PropKind::Boolean => {
            // A present boolean property without a value is true
            if raw.is_null() {
                PropValue::Boolean(true)
            } else {
                PropValue::Boolean(serde_json::from_value(raw).map_err(invalid)?)
            }
        }
        PropKind::String => PropValue::String(serde_json::from_value(raw).map_err(invalid)?),
        PropKind::Int => PropValue::Int(serde_json::from_value(raw).map_err(invalid)?),
        PropKind::Array => PropValue::Array(serde_json::from_value(raw).map_err(invalid)?),
        PropKind::StringArray => {
            PropValue::StringArray(serde_json::from_value(raw).map_err(invalid)?)
        }
        PropKind::Uint8Array => {
            PropValue::Uint8Array(serde_json::from_value(raw).map_err(invalid)?)
        }
        PropKind::Phandle => {
            let path: String = serde_json::from_value(raw).map_err(invalid)?;
            PropValue::Phandle(lookup(&path, from)?)
        }
        PropKind::Path => {
            let path: String = serde_json::from_value(raw).map_err(invalid)?;
            PropValue::Path(lookup(&path, from)?)
        }
        PropKind::Phandles => {
            let paths: Vec<String> = serde_json::from_value(raw).map_err(invalid)?;
            PropValue::Phandles(
                paths
                    .iter()
                    .map(|p| lookup(p, from))
                    .collect::<Result<_, _>>()?,
            )
        }
        PropKind::PhandleArray => {
            let entries: Vec<EntryDoc> = serde_json::from_value(raw).map_err(invalid)?;
            PropValue::PhandleArray(
                entries
                    .iter()
                    .map(|e| resolve_entry(e, from, lookup))
                    .collect::<Result<_, _>>()?,
            )
        }
        PropKind::Compound => PropValue::Compound,
    };

    Ok(Property {
        name: doc.name,
        value,
        enum_index: doc.enum_index,
        description: doc.description,
    })
}
