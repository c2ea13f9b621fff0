//! Node naming schemes
//!
//! Each enabled node with a matching binding can be addressed four ways:
//!
//! - by path: `PATH_SOC_UART_4000C000`
//! - by instance, once per compatible: `INST_0_VENDOR_UART`
//! - by alias, twice per `/aliases` entry: `ALIAS_SERIAL0` and the older
//!   `VENDOR_UART_SERIAL0`
//! - by the legacy positional identifier: `VENDOR_UART_4000C000`
//!
//! The legacy identifier names the primary definition of every node-scoped
//! fact; the others are aliases (or, for registers, repeated definitions
//! reusing the primary value).

use crate::error::GenError;
use crate::ident::{sanitize, unit_hex};
use crate::model::{Node, Tree};
use crate::options::GenOptions;

/// Which flavour of `/aliases` identifier an alias is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// `ALIAS_<ALIAS>`
    Alias,
    /// `<COMPAT>_<ALIAS>`, kept for backward compatibility
    Compat,
}

/// All identifiers of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub path: String,
    pub instances: Vec<String>,
    pub aliases: Vec<(String, AliasKind)>,
    pub legacy: String,
    /// Whether the path identifier takes part in emission
    pub emit_path: bool,
}

impl NodeIdentity {
    /// Compute the identifiers of an enabled node with a matching compatible
    pub fn resolve(tree: &Tree, node: &Node, options: &GenOptions) -> Result<Self, GenError> {
        let compat = matching_compat(node)?;

        let mut instances = Vec::with_capacity(node.compats.len());
        for c in &node.compats {
            let index = tree
                .instance_index(node.id, c)
                .ok_or_else(|| GenError::NotAnInstance {
                    path: node.path.clone(),
                    compat: c.clone(),
                })?;
            instances.push(instance_ident(index, c));
        }

        let compat_s = sanitize(compat);
        let mut aliases = Vec::with_capacity(node.aliases.len() * 2);
        for alias in &node.aliases {
            let alias_s = sanitize(alias);
            aliases.push((format!("ALIAS_{alias_s}"), AliasKind::Alias));
            aliases.push((format!("{compat_s}_{alias_s}"), AliasKind::Compat));
        }

        Ok(Self {
            path: path_ident(&node.path),
            instances,
            aliases,
            legacy: legacy_ident(tree, node)?,
            emit_path: options.path_identifiers,
        })
    }

    /// Identifiers register facts are written under, in emission order:
    /// legacy, instances, aliases, then the path identifier when enabled.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes = vec![self.legacy.as_str()];
        schemes.extend(self.instances.iter().map(String::as_str));
        schemes.extend(self.aliases.iter().map(|(a, _)| a.as_str()));
        if self.emit_path {
            schemes.push(self.path.as_str());
        }
        schemes
    }

    /// Prefixes node-scoped aliases are formed from: alias identifiers,
    /// instance identifiers, then the path identifier when enabled. The flag
    /// marks backward-compatibility prefixes.
    pub fn secondaries(&self) -> Vec<(&str, bool)> {
        let mut out: Vec<(&str, bool)> = self
            .aliases
            .iter()
            .map(|(a, kind)| (a.as_str(), *kind == AliasKind::Compat))
            .collect();
        out.extend(self.instances.iter().map(|i| (i.as_str(), false)));
        if self.emit_path {
            out.push((self.path.as_str(), false));
        }
        out
    }
}

fn matching_compat(node: &Node) -> Result<&str, GenError> {
    node.matching_compat
        .as_deref()
        .ok_or_else(|| GenError::NotAnInstance {
            path: node.path.clone(),
            compat: "<none>".to_string(),
        })
}

/// `PATH_<path>`, with the leading `/` dropped first so that
/// `/soc/uart@4000c000` gives `PATH_SOC_UART_4000C000` rather than
/// `PATH__SOC_UART_4000C000`
pub fn path_ident(path: &str) -> String {
    format!("PATH_{}", sanitize(path.trim_start_matches('/')))
}

/// `INST_<index>_<compat>`
pub fn instance_ident(index: usize, compat: &str) -> String {
    format!("INST_{index}_{}", sanitize(compat))
}

/// Positional identifier: optional bus prefix, the matching compatible,
/// then the unit address, the parent's unit address plus the node name, or
/// the bare node name, whichever is available first.
///
/// Nothing guarantees this is unique; it is kept as-is because existing
/// code refers to these names.
pub fn legacy_ident(tree: &Tree, node: &Node) -> Result<String, GenError> {
    let compat = matching_compat(node)?;
    let mut ident = String::new();

    if let Some(bus_id) = node.bus_node {
        let bus = &tree[bus_id];
        let bus_compat = bus
            .matching_compat
            .as_deref()
            .ok_or_else(|| GenError::IncompleteBus {
                path: bus.path.clone(),
                what: "matching compatible",
            })?;
        let bus_addr = bus.unit_addr.ok_or_else(|| GenError::IncompleteBus {
            path: bus.path.clone(),
            what: "unit address",
        })?;
        ident.push_str(&format!("{}_{}_", sanitize(bus_compat), unit_hex(bus_addr)));
    }

    ident.push_str(&sanitize(compat));
    ident.push('_');

    let parent_addr = node.parent.and_then(|p| tree[p].unit_addr);
    match (node.unit_addr, parent_addr) {
        (Some(addr), _) => ident.push_str(&unit_hex(addr)),
        (None, Some(addr)) => {
            ident.push_str(&format!("{}_{}", unit_hex(addr), sanitize(&node.name)));
        }
        (None, None) => ident.push_str(&sanitize(&node.name)),
    }

    Ok(ident)
}
