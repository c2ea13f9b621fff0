//! Binding properties, dispatched on the property type

use std::io::Write;
use tracing::debug;

use super::phandles::write_phandle_val_list;
use super::NodeScope;
use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::ident::sanitize;
use crate::model::{PropKind, PropValue, Property};

/// Properties written by a dedicated emitter, or not at all
const HANDLED_ELSEWHERE: &[&str] = &[
    "reg",
    "compatible",
    "status",
    "interrupts",
    "interrupt-controller",
    "gpio-controller",
    "clocks",
];

pub fn write_props<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    for prop in &scope.node.props {
        if !should_write(prop) {
            debug!(node = %scope.node.path, prop = %prop.name, "Skipping property");
            continue;
        }

        if let Some(description) = &prop.description {
            sink.comment(description, false)?;
        }

        let ident = sanitize(&prop.name);
        match &prop.value {
            PropValue::Boolean(_) => {
                scope.out(sink, &ident, &Value::FLAG, None)?;
            }
            PropValue::String(s) => {
                scope.out(sink, &ident, &Value::Str(s.clone()), None)?;
            }
            PropValue::Int(v) => {
                scope.out(sink, &ident, &Value::Int(*v), None)?;
            }
            PropValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    scope.out(sink, &format!("{ident}_{i}"), &Value::Int(*v), None)?;
                }
                let elems = values.iter().map(i64::to_string).collect();
                scope.out(sink, &ident, &Value::Init(elems), None)?;
            }
            PropValue::StringArray(values) => {
                for (i, s) in values.iter().enumerate() {
                    scope.out(sink, &format!("{ident}_{i}"), &Value::Str(s.clone()), None)?;
                }
            }
            PropValue::Uint8Array(bytes) => {
                let elems = bytes.iter().map(|b| format!("0x{b:02x}")).collect();
                scope.out(sink, &ident, &Value::Init(elems), None)?;
            }
            PropValue::PhandleArray(entries) => {
                write_phandle_val_list(scope, sink, &ident, entries)?;
            }
            // Filtered out by should_write()
            PropValue::Phandle(_)
            | PropValue::Phandles(_)
            | PropValue::Path(_)
            | PropValue::Compound => {}
        }

        if let Some(index) = prop.enum_index {
            scope.out(sink, &format!("{ident}_ENUM"), &Value::Uint(index), None)?;
        }
    }
    Ok(())
}

/// Whether `prop` gets symbols from [`write_props`]
pub fn should_write(prop: &Property) -> bool {
    // `#address-cells` and friends, and mapping tables like `gpio-map`
    if prop.name.starts_with('#') || prop.name.ends_with("-map") {
        return false;
    }
    if HANDLED_ELSEWHERE.contains(&prop.name.as_str()) {
        return false;
    }
    // An absent symbol stands for false
    if prop.value == PropValue::Boolean(false) {
        return false;
    }
    !matches!(
        prop.kind(),
        PropKind::Phandle | PropKind::Phandles | PropKind::Path | PropKind::Compound
    )
}

/// Render a scalar property value, as used by tree-wide facts
pub fn scalar(prop: &Property) -> Option<Value> {
    match &prop.value {
        PropValue::Boolean(b) => Some(Value::Int(i64::from(*b))),
        PropValue::Int(v) => Some(Value::Int(*v)),
        PropValue::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}
