//! Traversal driver
//!
//! Walks the tree in dependency order, describing each node in a comment and
//! running the emitters on it, then writes the tree-wide facts.

use std::io::Write;
use tracing::{debug, info};

use crate::emit::{Sink, Value};
use crate::emitters::bus::{write_bus, write_existence_flags};
use crate::emitters::flash::{write_addr_size, write_flash, write_flash_partition};
use crate::emitters::irqs::write_irqs;
use crate::emitters::phandles::{write_clocks, write_spi_dev};
use crate::emitters::props::write_props;
use crate::emitters::regs::write_regs;
use crate::emitters::NodeScope;
use crate::error::GenError;
use crate::ident::sanitize;
use crate::model::{Node, Tree};
use crate::options::GenOptions;

/// Chosen nodes whose first register is published as a memory region
const CHOSEN_REGIONS: &[(&str, &str)] = &[
    ("zephyr,ccm", "CCM"),
    ("zephyr,dtcm", "DTCM"),
    ("zephyr,ipc_shm", "IPC_SHM"),
];

/// One generation run over a tree
pub struct Generator<'a, W: Write> {
    tree: &'a Tree,
    options: &'a GenOptions,
    sink: Sink<W>,
    flash_area_num: usize,
}

impl<'a, W: Write> Generator<'a, W> {
    pub fn new(tree: &'a Tree, options: &'a GenOptions, header: W, conf: W) -> Self {
        Self {
            tree,
            options,
            sink: Sink::new(header, conf, options),
            flash_area_num: 0,
        }
    }

    /// Write everything and hand back the flushed streams
    pub fn run(mut self) -> Result<(W, W), GenError> {
        self.write_top_comment()?;

        let tree = self.tree;
        let mut instances = 0;
        for node in tree.in_dependency_order() {
            self.write_node_comment(node)?;

            // Partitions are recognized by name, whatever their binding
            if node.is_partition() {
                write_flash_partition(tree, &mut self.sink, node, self.flash_area_num)?;
                self.flash_area_num += 1;
            }

            if node.enabled && node.matching_compat.is_some() {
                self.write_node(node)?;
                instances += 1;
            }
        }

        self.write_tree_facts()?;

        info!(
            nodes = tree.nodes().count(),
            instances,
            flash_areas = self.flash_area_num,
            symbols = self.sink.defined(),
            "Generated devicetree symbols"
        );
        self.sink.finish()
    }

    fn write_top_comment(&mut self) -> Result<(), GenError> {
        if let Some(cycle) = self.tree.cycles().first() {
            return Err(GenError::Cycle(
                cycle.iter().map(|id| self.tree[*id].path.clone()).collect(),
            ));
        }

        let dirs: Vec<String> = self
            .tree
            .bindings_dirs
            .iter()
            .map(|dir| self.options.relativize(dir))
            .collect();

        let mut s = format!(
            "Generated by dtsym\n\nDTS input file:\n  {}\n\nDirectories with bindings:\n  {}\n\n\
             Nodes in dependency order (ordinal and path):\n",
            self.tree.source.as_deref().unwrap_or("(unknown)"),
            dirs.join(", "),
        );
        for node in self.tree.in_dependency_order() {
            s.push_str(&ordinal_line(node));
        }
        s.push_str(
            "\nDefinitions derived from these nodes in dependency order are next,\n\
             followed by tree-wide information (active compatibles, chosen nodes,\n\
             etc.).\n",
        );

        self.sink.comment(&s, false)
    }

    fn write_node_comment(&mut self, node: &Node) -> Result<(), GenError> {
        let mut s = format!("Devicetree node:\n  {}\n", node.path);

        match &node.matching_compat {
            Some(compat) => {
                let binding = node
                    .binding_path
                    .as_deref()
                    .map(|p| self.options.relativize(p))
                    .unwrap_or_default();
                s.push_str(&format!("\nBinding (compatible = {compat}):\n  {binding}\n"));
            }
            None => s.push_str("\nNo matching binding.\n"),
        }

        s.push_str(&format!("\nDependency Ordinal: {}\n", node.dep_ordinal));

        for (title, deps) in [("Requires", &node.depends_on), ("Supports", &node.required_by)] {
            if deps.is_empty() {
                continue;
            }
            s.push_str(&format!("\n{title}:\n"));
            for dep in deps {
                s.push_str(&ordinal_line(&self.tree[*dep]));
            }
        }

        if let Some(description) = &node.description {
            s.push_str("\nDescription:\n");
            for line in description.lines() {
                s.push_str(&format!("  {line}\n"));
            }
        }

        if !node.enabled {
            s.push_str("\nNode is disabled.\n");
        }

        self.sink.comment(&s, true)
    }

    fn write_node(&mut self, node: &'a Node) -> Result<(), GenError> {
        debug!(path = %node.path, ordinal = node.dep_ordinal, "Writing node");

        let scope = NodeScope::new(self.tree, node, self.options)?;
        let sink = &mut self.sink;
        write_regs(&scope, sink)?;
        write_irqs(&scope, sink)?;
        write_props(&scope, sink)?;
        write_clocks(&scope, sink)?;
        write_spi_dev(&scope, sink)?;
        write_bus(&scope, sink)?;
        write_existence_flags(&scope, sink)
    }

    fn write_tree_facts(&mut self) -> Result<(), GenError> {
        self.sink
            .comment("Compatibles appearing on enabled nodes", true)?;
        for compat in self.tree.enabled_compats() {
            self.sink.emit(
                &format!("COMPAT_{}", sanitize(compat)),
                &Value::FLAG,
                &[],
                None,
            )?;
        }

        for (chosen, prefix) in CHOSEN_REGIONS {
            write_addr_size(self.tree, &mut self.sink, chosen, prefix)?;
        }
        write_flash(self.tree, &mut self.sink, self.flash_area_num)
    }
}

fn ordinal_line(node: &Node) -> String {
    format!("  {:<3} {}\n", node.dep_ordinal, node.path)
}

/// Run the generator over `tree`, writing to `header` and `conf`
pub fn generate<W: Write>(
    tree: &Tree,
    options: &GenOptions,
    header: W,
    conf: W,
) -> Result<(W, W), GenError> {
    Generator::new(tree, options, header, conf).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SCENARIO: &str = r#"{
        "source": "/ws/zephyr/boards/demo/demo.dts",
        "bindings_dirs": ["/ws/zephyr/dts/bindings", "/ws/app/dts/bindings"],
        "nodes": [
            { "path": "/", "dep_ordinal": 0, "required_by": ["/soc"] },
            { "path": "/soc", "dep_ordinal": 1, "depends_on": ["/"],
              "required_by": ["/soc/x@1000"] },
            { "path": "/soc/x@1000", "dep_ordinal": 2, "depends_on": ["/soc"],
              "unit_addr": 4096,
              "matching_compat": "vendor,x", "compats": ["vendor,x"],
              "binding_path": "/ws/zephyr/dts/bindings/vendor,x.yaml",
              "description": "Example device\nwith two lines",
              "regs": [{ "addr": 4096, "size": 512 }],
              "props": [{ "name": "foo-bar", "type": "int", "value": 5 }] },
            { "path": "/soc/x@2000", "dep_ordinal": 3, "enabled": false, "unit_addr": 8192,
              "matching_compat": "vendor,x", "compats": ["vendor,x"],
              "regs": [{ "addr": 8192, "size": 512 }] }
        ]
    }"#;

    fn generate_str(json: &str, options: &GenOptions) -> Result<(String, String), GenError> {
        let tree = Tree::from_json(json).unwrap();
        let (header, conf) = generate(&tree, options, Vec::new(), Vec::new())?;
        Ok((
            String::from_utf8(header).unwrap(),
            String::from_utf8(conf).unwrap(),
        ))
    }

    /// Header symbols with alias chains followed to the literal value
    fn resolved_defines(header: &str) -> HashMap<String, String> {
        let raw: HashMap<String, String> = header
            .lines()
            .filter_map(|l| l.strip_prefix("#define "))
            .filter_map(|l| l.split_once(' '))
            .map(|(name, value)| {
                let value = value.trim_start();
                let value = match value.strip_prefix("__WARN(") {
                    Some(rest) => rest.split_once(") ").map_or(rest, |(_, v)| v),
                    None => value,
                };
                (name.to_string(), value.to_string())
            })
            .collect();

        raw.iter()
            .map(|(name, value)| {
                let mut value = value;
                while let Some(next) = raw.get(value) {
                    value = next;
                }
                (name.clone(), value.clone())
            })
            .collect()
    }

    fn conf_lines(conf: &str) -> Vec<(String, String)> {
        conf.lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .map(|l| {
                let (name, value) = l.split_once('=').unwrap();
                (name.to_string(), value.to_string())
            })
            .collect()
    }

    #[test]
    fn test_vendor_x_scenario() {
        let (header, conf) = generate_str(SCENARIO, &GenOptions::default()).unwrap();
        let defs = resolved_defines(&header);
        let conf: HashMap<_, _> = conf_lines(&conf).into_iter().collect();

        for (name, value) in [
            ("DT_INST_0_VENDOR_X_BASE_ADDRESS", "0x1000"),
            ("DT_INST_0_VENDOR_X_BASE_ADDRESS_0", "0x1000"),
            ("DT_INST_0_VENDOR_X_SIZE", "512"),
            ("DT_VENDOR_X_1000_BASE_ADDRESS", "0x1000"),
            ("DT_VENDOR_X_1000_FOO_BAR", "5"),
            ("DT_INST_0_VENDOR_X_FOO_BAR", "5"),
            ("DT_INST_0_VENDOR_X", "1"),
            ("DT_COMPAT_VENDOR_X", "1"),
        ] {
            assert_eq!(defs.get(name).map(String::as_str), Some(value), "header {name}");
            assert_eq!(conf.get(name).map(String::as_str), Some(value), "conf {name}");
        }

        // The disabled node gets a comment but no symbols
        assert!(header.contains(" * Node is disabled."));
        assert!(!defs.keys().any(|k| k.contains("2000")));
    }

    #[test]
    fn test_header_conf_parity() {
        let (header, conf) = generate_str(SCENARIO, &GenOptions::default()).unwrap();
        let defs = resolved_defines(&header);
        let conf = conf_lines(&conf);
        assert!(!conf.is_empty());
        for (name, value) in &conf {
            assert_eq!(defs.get(name), Some(value), "{name}");
        }
        let initializers = defs.values().filter(|v| v.starts_with('{')).count();
        assert_eq!(defs.len(), conf.len() + initializers);
    }

    #[test]
    fn test_comments() {
        let options = GenOptions {
            base_dir: Some("/ws/zephyr".into()),
            ..GenOptions::default()
        };
        let (header, conf) = generate_str(SCENARIO, &options).unwrap();

        assert!(header.starts_with("/*\n * Generated by dtsym\n *\n * DTS input file:\n"));
        assert!(header.contains(
            " * Directories with bindings:\n *   $ZEPHYR_BASE/dts/bindings, /ws/app/dts/bindings\n"
        ));
        assert!(header.contains(" *   0   /\n *   1   /soc\n *   2   /soc/x@1000\n"));
        assert!(header.contains(
            " * Binding (compatible = vendor,x):\n *   $ZEPHYR_BASE/dts/bindings/vendor,x.yaml\n"
        ));
        assert!(header.contains(" * Requires:\n *   1   /soc\n"));
        assert!(header.contains(" * Supports:\n *   2   /soc/x@1000\n"));
        assert!(header.contains(" * Description:\n *   Example device\n *   with two lines\n"));
        assert!(header.contains(" * No matching binding.\n"));
        assert!(conf.starts_with("# Generated by dtsym\n#\n# DTS input file:\n"));
        assert!(
            conf.contains("\n# Compatibles appearing on enabled nodes\nDT_COMPAT_VENDOR_X=1\n")
        );
    }

    #[test]
    fn test_cycle_is_fatal() {
        let json = r#"{
            "nodes": [
                { "path": "/", "dep_ordinal": 0 },
                { "path": "/a", "dep_ordinal": 1 },
                { "path": "/b", "dep_ordinal": 1 }
            ],
            "cycles": [["/a", "/b"]]
        }"#;
        let err = generate_str(json, &GenOptions::default()).unwrap_err();
        match err {
            GenError::Cycle(paths) => assert_eq!(paths, vec!["/a", "/b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partitions_and_absent_chosen() {
        let json = r#"{
            "nodes": [
                { "path": "/", "dep_ordinal": 0 },
                { "path": "/flash@0", "dep_ordinal": 1, "label": "FLASH",
                  "matching_compat": "jedec,spi-nor", "compats": ["jedec,spi-nor"],
                  "unit_addr": 0 },
                { "path": "/flash@0/partitions", "dep_ordinal": 2 },
                { "path": "/flash@0/partitions/partition@1000", "dep_ordinal": 4,
                  "label": "storage", "regs": [{ "addr": 4096, "size": 4096 }] },
                { "path": "/flash@0/partitions/partition@0", "dep_ordinal": 3,
                  "label": "boot", "regs": [{ "addr": 0, "size": 4096 }] }
            ]
        }"#;
        let (header, conf) = generate_str(json, &GenOptions::default()).unwrap();
        let conf: HashMap<_, _> = conf_lines(&conf).into_iter().collect();

        let get = |name: &str| conf.get(name).map(String::as_str);
        // Indices follow dependency order, not document order
        assert_eq!(get("DT_FLASH_AREA_BOOT_ID"), Some("0"));
        assert_eq!(get("DT_FLASH_AREA_0_OFFSET"), Some("0"));
        assert_eq!(get("DT_FLASH_AREA_STORAGE_ID"), Some("1"));
        assert_eq!(get("DT_FLASH_AREA_1_OFFSET_0"), Some("4096"));
        assert_eq!(get("DT_FLASH_AREA_1_DEV"), Some("\"FLASH\""));
        assert_eq!(get("DT_FLASH_AREA_NUM"), Some("2"));
        assert_eq!(get("DT_FLASH_BASE_ADDRESS"), Some("0"));
        assert_eq!(get("DT_FLASH_SIZE"), Some("0"));
        assert_eq!(get("DT_CODE_PARTITION_OFFSET"), Some("0"));
        assert!(!header.contains("CCM"));
    }

    #[test]
    fn test_multiple_registers_across_schemes() {
        let json = r#"{
            "nodes": [
                { "path": "/", "dep_ordinal": 0 },
                { "path": "/dma@4000", "dep_ordinal": 1, "unit_addr": 16384,
                  "aliases": ["dma-0"],
                  "matching_compat": "vendor,dma", "compats": ["vendor,dma"],
                  "regs": [{ "addr": 16384, "size": 256 }, { "addr": 20480, "size": 16 }] }
            ]
        }"#;
        let options = GenOptions {
            path_identifiers: true,
            ..GenOptions::default()
        };
        let (header, _) = generate_str(json, &options).unwrap();
        let defs = resolved_defines(&header);

        for scheme in [
            "VENDOR_DMA_4000",
            "INST_0_VENDOR_DMA",
            "ALIAS_DMA_0",
            "VENDOR_DMA_DMA_0",
            "PATH_DMA_4000",
        ] {
            assert_eq!(
                defs.get(&format!("DT_{scheme}_BASE_ADDRESS_1")).map(String::as_str),
                Some("0x5000"),
                "{scheme}"
            );
            assert_eq!(
                defs.get(&format!("DT_{scheme}_SIZE_0")).map(String::as_str),
                Some("256"),
                "{scheme}"
            );
            assert!(!defs.contains_key(&format!("DT_{scheme}_BASE_ADDRESS")));
        }
    }

    #[test]
    fn test_clocks_from_several_controllers() {
        let json = r#"{
            "nodes": [
                { "path": "/", "dep_ordinal": 0 },
                { "path": "/rcc", "dep_ordinal": 1, "label": "RCC" },
                { "path": "/lse", "dep_ordinal": 2, "label": "LSE",
                  "compats": ["fixed-clock"],
                  "props": [{ "name": "clock-frequency", "type": "int", "value": 32768 }] },
                { "path": "/rtc@0", "dep_ordinal": 3, "unit_addr": 0,
                  "matching_compat": "st,rtc", "compats": ["st,rtc"],
                  "props": [{ "name": "clocks", "type": "phandle-array", "value": [
                      { "controller": "/rcc", "data": { "bus": 1, "bits": 2 } },
                      { "controller": "/lse", "data": {} }
                  ] }] }
            ]
        }"#;
        let (header, conf) = generate_str(json, &GenOptions::default()).unwrap();
        let defs = resolved_defines(&header);
        let get = |name: &str| defs.get(name).map(String::as_str);

        assert_eq!(get("DT_ST_RTC_0_CLOCK_CONTROLLER"), Some("\"RCC\""));
        assert_eq!(get("DT_INST_0_ST_RTC_CLOCK_CONTROLLER"), Some("\"RCC\""));
        assert_eq!(get("DT_INST_0_ST_RTC_CLOCKS_CLOCK_FREQUENCY"), Some("32768"));
        assert_eq!(get("DT_INST_0_ST_RTC_CLOCK_BITS"), Some("2"));
        assert_eq!(conf.matches("DT_ST_RTC_0_CLOCK_CONTROLLER=").count(), 1);
    }

    #[test]
    fn test_alias_cannot_redefine_primary() {
        // `/b/bar` is aliased `foo`, so its compat alias `VENDOR_X_FOO`
        // lands on the legacy identifier of `/a/foo`
        let json = r#"{
            "nodes": [
                { "path": "/", "dep_ordinal": 0 },
                { "path": "/a", "dep_ordinal": 1 },
                { "path": "/b", "dep_ordinal": 2 },
                { "path": "/a/foo", "dep_ordinal": 3,
                  "matching_compat": "vendor,x", "compats": ["vendor,x"],
                  "props": [{ "name": "speed", "type": "int", "value": 1 }] },
                { "path": "/b/bar", "dep_ordinal": 4, "aliases": ["foo"],
                  "matching_compat": "vendor,x", "compats": ["vendor,x"],
                  "props": [{ "name": "speed", "type": "int", "value": 2 }] }
            ]
        }"#;
        let err = generate_str(json, &GenOptions::default()).unwrap_err();
        match err {
            GenError::ConflictingDefinition {
                symbol,
                previous,
                value,
                ..
            } => {
                assert_eq!(symbol, "DT_VENDOR_X_FOO_SPEED");
                assert_eq!(previous, "1");
                assert_eq!(value, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// A node exercising every naming scheme and value shape
    const RICH: &str = r#"{
        "nodes": [
            { "path": "/", "dep_ordinal": 0 },
            { "path": "/soc", "dep_ordinal": 1 },
            { "path": "/soc/intc@e000e100", "dep_ordinal": 2, "unit_addr": 3758153984,
              "matching_compat": "arm,v7m-nvic", "compats": ["arm,v7m-nvic"],
              "label": "NVIC" },
            { "path": "/soc/gpio@1000", "dep_ordinal": 3, "unit_addr": 4096,
              "matching_compat": "vendor,gpio", "compats": ["vendor,gpio"],
              "label": "GPIO_0" },
            { "path": "/soc/pwm@2000", "dep_ordinal": 4, "unit_addr": 8192,
              "matching_compat": "vendor,pwm", "compats": ["vendor,pwm"],
              "label": "PWM_0" },
            { "path": "/soc/uart@4000", "dep_ordinal": 5, "unit_addr": 16384,
              "aliases": ["serial-0"], "label": "UART_0",
              "matching_compat": "vendor,uart", "compats": ["vendor,uart"],
              "regs": [{ "addr": 16384, "size": 256 }],
              "interrupts": [
                  { "controller": "/soc/intc@e000e100",
                    "data": { "irq": 5, "priority": 1 }, "name": "rx" }
              ],
              "props": [
                  { "name": "current-speed", "type": "int", "value": 115200 },
                  { "name": "mode", "type": "string", "value": "say \"hi\"",
                    "enum_index": 2 },
                  { "name": "fifo", "type": "array", "value": [4, 8] },
                  { "name": "mac", "type": "uint8-array", "value": [1, 171] },
                  { "name": "names", "type": "string-array", "value": ["a", "b"] },
                  { "name": "hw-flow-control", "type": "boolean" },
                  { "name": "reset-gpios", "type": "phandle-array", "value": [
                      { "controller": "/soc/gpio@1000", "data": { "pin": 4, "flags": 1 } }
                  ] },
                  { "name": "pwms", "type": "phandle-array", "value": [
                      { "controller": "/soc/pwm@2000",
                        "data": { "channel": 3, "period": 1000 }, "name": "tx" },
                      { "controller": "/soc/pwm@2000",
                        "data": { "channel": 4, "period": 2000 } }
                  ] }
              ] }
        ]
    }"#;

    fn rich_options() -> GenOptions {
        GenOptions {
            path_identifiers: true,
            compat_alias_deprecation: Some("use DT_ALIAS_*".to_string()),
            ..GenOptions::default()
        }
    }

    #[test]
    fn test_header_conf_parity_rich() {
        for (json, options) in [
            (SCENARIO, GenOptions::default()),
            (RICH, rich_options()),
        ] {
            let (header, conf) = generate_str(json, &options).unwrap();
            let defs = resolved_defines(&header);
            let conf = conf_lines(&conf);
            assert!(!conf.is_empty());

            // Every conf key once, with the header's value
            let mut seen = std::collections::HashSet::new();
            for (name, value) in &conf {
                assert!(seen.insert(name), "{name} twice in conf");
                assert_eq!(defs.get(name), Some(value), "{name}");
            }
            // Every header symbol once
            let header_names = header
                .lines()
                .filter(|l| l.starts_with("#define "))
                .count();
            assert_eq!(header_names, defs.len());

            let initializers = defs.values().filter(|v| v.starts_with('{')).count();
            assert_eq!(defs.len(), conf.len() + initializers);
        }
    }

    #[test]
    fn test_rich_node_values() {
        let (header, _) = generate_str(RICH, &rich_options()).unwrap();
        let defs = resolved_defines(&header);
        let get = |name: &str| defs.get(name).map(String::as_str);

        assert_eq!(get("DT_VENDOR_UART_4000_IRQ_0"), Some("5"));
        assert_eq!(get("DT_VENDOR_UART_4000_IRQ_RX_PRIORITY"), Some("1"));
        assert_eq!(get("DT_VENDOR_UART_4000_MODE"), Some("\"say \\\"hi\\\"\""));
        assert_eq!(get("DT_VENDOR_UART_4000_MODE_ENUM"), Some("2"));
        assert_eq!(get("DT_VENDOR_UART_4000_FIFO"), Some("{4, 8}"));
        assert_eq!(get("DT_VENDOR_UART_4000_MAC"), Some("{0x01, 0xab}"));
        // Cells keep binding order
        assert_eq!(
            get("DT_VENDOR_UART_4000_RESET_GPIOS"),
            Some("{\"GPIO_0\", 4, 1}")
        );
        assert_eq!(get("DT_VENDOR_UART_4000_PWMS_TX"), Some("{\"PWM_0\", 3, 1000}"));
        assert!(header.contains("__WARN(\"use DT_ALIAS_*\") DT_VENDOR_UART_4000_"));
    }

    #[test]
    fn test_schemes_agree() {
        let (header, _) = generate_str(RICH, &rich_options()).unwrap();
        let defs = resolved_defines(&header);
        let legacy = "DT_VENDOR_UART_4000_";

        let mut checked = 0;
        for (name, value) in &defs {
            let Some(suffix) = name.strip_prefix(legacy) else {
                continue;
            };
            for scheme in [
                "INST_0_VENDOR_UART",
                "ALIAS_SERIAL_0",
                "VENDOR_UART_SERIAL_0",
                "PATH_SOC_UART_4000",
            ] {
                let other = format!("DT_{scheme}_{suffix}");
                assert_eq!(defs.get(&other), Some(value), "{other}");
            }
            checked += 1;
        }
        assert!(checked > 20);
    }
}
