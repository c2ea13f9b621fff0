//! Bus membership and instance existence flags

use std::io::Write;

use super::NodeScope;
use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::ident::sanitize;

/// `<node>_BUS_NAME` plus a global `<COMPAT>_BUS_<BUS>` flag per compatible
pub fn write_bus<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    let Some(bus_id) = scope.node.bus_node else {
        return Ok(());
    };
    let bus = &scope.tree[bus_id];

    let label = bus.label.as_deref().ok_or_else(|| GenError::MissingLabel {
        role: "bus",
        path: bus.path.clone(),
    })?;
    scope.out(sink, "BUS_NAME", &Value::Str(sanitize(label)), None)?;

    let on_bus = scope
        .node
        .on_bus
        .as_deref()
        .ok_or_else(|| GenError::IncompleteBus {
            path: bus.path.clone(),
            what: "bus type",
        })?;
    let on_bus = sanitize(on_bus);
    for compat in &scope.node.compats {
        sink.emit(
            &format!("{}_BUS_{on_bus}", sanitize(compat)),
            &Value::FLAG,
            &[],
            None,
        )?;
    }
    Ok(())
}

/// `INST_<n>_<COMPAT>` flag for every compatible of the node
pub fn write_existence_flags<W: Write>(
    scope: &NodeScope,
    sink: &mut Sink<W>,
) -> Result<(), GenError> {
    for instance in &scope.identity.instances {
        sink.emit(instance, &Value::FLAG, &[], None)?;
    }
    Ok(())
}
