//! Emitters for node facts
//!
//! - [`regs`]: `reg` base addresses and sizes
//! - [`irqs`]: interrupt numbers and cells
//! - [`props`]: binding properties by type
//! - [`phandles`]: phandle-array entries, clocks and SPI chip selects
//! - [`bus`]: bus membership and instance existence flags
//! - [`flash`]: flash partitions and /chosen derived facts

pub mod bus;
pub mod flash;
pub mod irqs;
pub mod phandles;
pub mod props;
pub mod regs;

use std::io::Write;

use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::model::{Node, Tree};
use crate::naming::NodeIdentity;
use crate::options::GenOptions;

/// A node together with its identifiers, used to write node-scoped facts
pub struct NodeScope<'a> {
    pub tree: &'a Tree,
    pub node: &'a Node,
    pub identity: NodeIdentity,
    deprecation: Option<&'a str>,
}

impl<'a> NodeScope<'a> {
    pub fn new(tree: &'a Tree, node: &'a Node, options: &'a GenOptions) -> Result<Self, GenError> {
        Ok(Self {
            tree,
            node,
            identity: NodeIdentity::resolve(tree, node, options)?,
            deprecation: options.compat_alias_deprecation.as_deref(),
        })
    }

    /// Write `<legacy>_<ident> = value` with `<alias>_<ident>` for every
    /// secondary identifier of the node.
    ///
    /// `name_alias` (from `reg-names`, `interrupt-names` and the like) adds
    /// `<legacy>_<name_alias>` and `<alias>_<name_alias>` as well. Returns
    /// the primary symbol.
    pub fn out<W: Write>(
        &self,
        sink: &mut Sink<W>,
        ident: &str,
        value: &Value,
        name_alias: Option<&str>,
    ) -> Result<String, GenError> {
        let primary = format!("{}_{}", self.identity.legacy, ident);
        let secondaries = self.identity.secondaries();

        let mut current = Vec::new();
        let mut deprecated = Vec::new();
        let mut push = |prefix: &str, legacy: bool, suffix: &str| {
            let alias = format!("{prefix}_{suffix}");
            if legacy && self.deprecation.is_some() {
                deprecated.push(alias);
            } else {
                current.push(alias);
            }
        };

        for (prefix, legacy) in &secondaries {
            push(*prefix, *legacy, ident);
        }
        if let Some(name) = name_alias {
            push(self.identity.legacy.as_str(), false, name);
            for (prefix, legacy) in &secondaries {
                push(*prefix, *legacy, name);
            }
        }

        let symbol = sink.emit(&primary, value, &current, None)?;
        if !deprecated.is_empty() {
            sink.alias(&primary, &deprecated, self.deprecation)?;
        }
        Ok(symbol)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    const MODEL: &str = r#"{ "nodes": [
        { "path": "/" },
        { "path": "/soc" },
        { "path": "/soc/adc@5000", "unit_addr": 20480, "aliases": ["adc-0"],
          "matching_compat": "vendor,adc", "compats": ["vendor,adc"] }
    ] }"#;

    #[test]
    fn test_out_with_name_alias() {
        let tree = Tree::from_json(MODEL).unwrap();
        let options = GenOptions::default();
        let scope = NodeScope::new(&tree, tree.by_path("/soc/adc@5000").unwrap(), &options)
            .unwrap();
        let mut sink = sink();
        let sym = scope
            .out(&mut sink, "IRQ_0", &Value::Int(7), Some("IRQ_EOC"))
            .unwrap();
        assert_eq!(sym, "DT_VENDOR_ADC_5000_IRQ_0");

        let (header, _) = outputs(sink);
        let names: Vec<_> = defines(&header).into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "DT_VENDOR_ADC_5000_IRQ_0",
                "DT_ALIAS_ADC_0_IRQ_0",
                "DT_VENDOR_ADC_ADC_0_IRQ_0",
                "DT_INST_0_VENDOR_ADC_IRQ_0",
                "DT_VENDOR_ADC_5000_IRQ_EOC",
                "DT_ALIAS_ADC_0_IRQ_EOC",
                "DT_VENDOR_ADC_ADC_0_IRQ_EOC",
                "DT_INST_0_VENDOR_ADC_IRQ_EOC",
            ]
        );
    }

    #[test]
    fn test_out_with_deprecated_compat_aliases() {
        let tree = Tree::from_json(MODEL).unwrap();
        let options = GenOptions {
            compat_alias_deprecation: Some("use DT_ALIAS_* instead".to_string()),
            ..GenOptions::default()
        };
        let scope = NodeScope::new(&tree, tree.by_path("/soc/adc@5000").unwrap(), &options)
            .unwrap();
        let mut sink = sink();
        scope
            .out(&mut sink, "RESOLUTION", &Value::Int(12), None)
            .unwrap();

        let (header, conf) = outputs(sink);
        let warned: Vec<_> = header.lines().filter(|l| l.contains("__WARN")).collect();
        assert_eq!(warned.len(), 1);
        assert!(warned[0].starts_with("#define DT_VENDOR_ADC_ADC_0_RESOLUTION"));
        assert!(warned[0]
            .ends_with("__WARN(\"use DT_ALIAS_* instead\") DT_VENDOR_ADC_5000_RESOLUTION"));
        assert_eq!(conf_value(&conf, "DT_VENDOR_ADC_ADC_0_RESOLUTION").as_deref(), Some("12"));
    }
}
