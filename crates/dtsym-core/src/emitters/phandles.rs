//! Phandle-array entries, clocks and SPI chip selects
//!
//! A `pwms = <&pwm0 10 20 &pwm1 30 40>;` property produces:
//!
//! ```text
//! <node>_PWMS_CONTROLLER_0  "PWM_0"
//! <node>_PWMS_CHANNEL_0     10
//! <node>_PWMS_0             {"PWM_0", 10, 20}
//! ...
//! <node>_PWMS_COUNT         2
//! <node>_PWMS               {DT_<node>_PWMS_0, DT_<node>_PWMS_1}
//! ```
//!
//! With a single entry the `_0` suffixes, `_COUNT` and the outer
//! initializer are left out.

use std::io::Write;

use super::NodeScope;
use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::ident::{quote, sanitize};
use crate::model::{ControllerAndData, PropValue};

pub fn write_phandle_val_list<W: Write>(
    scope: &NodeScope,
    sink: &mut Sink<W>,
    ident: &str,
    entries: &[ControllerAndData],
) -> Result<(), GenError> {
    let multiple = entries.len() > 1;

    let mut initializers = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        initializers.push(write_entry(scope, sink, entry, multiple.then_some(i), ident)?);
    }

    if multiple {
        scope.out(sink, &format!("{ident}_COUNT"), &Value::from(initializers.len()), None)?;
        scope.out(sink, ident, &Value::Init(initializers), None)?;
    }
    Ok(())
}

/// Write one entry, index-qualified when `index` is set. Returns the symbol
/// of the entry's initializer.
fn write_entry<W: Write>(
    scope: &NodeScope,
    sink: &mut Sink<W>,
    entry: &ControllerAndData,
    index: Option<usize>,
    ident: &str,
) -> Result<String, GenError> {
    let suffix = index.map(|i| format!("_{i}")).unwrap_or_default();
    let name = entry.name.as_deref().map(sanitize);
    let mut initializer = Vec::with_capacity(entry.data.len() + 1);

    if let Some(label) = &scope.tree[entry.controller].label {
        let ctrl_ident = format!("{ident}_CONTROLLER");
        let name_alias = name.as_ref().map(|n| format!("{n}_{ctrl_ident}"));
        initializer.push(quote(label));
        scope.out(
            sink,
            &format!("{ctrl_ident}{suffix}"),
            &Value::Str(label.clone()),
            name_alias.as_deref(),
        )?;
    }

    for (cell, value) in &entry.data {
        let cell_ident = format!("{ident}_{}", sanitize(cell));
        let name_alias = name.as_ref().map(|n| format!("{n}_{cell_ident}"));
        scope.out(
            sink,
            &format!("{cell_ident}{suffix}"),
            &Value::Uint(*value),
            name_alias.as_deref(),
        )?;
    }
    initializer.extend(entry.data.values().map(u64::to_string));

    let name_alias = name.as_ref().map(|n| format!("{ident}_{n}"));
    scope.out(
        sink,
        &format!("{ident}{suffix}"),
        &Value::Init(initializer),
        name_alias.as_deref(),
    )
}

/// `clocks` keeps its own historical naming: `CLOCK_<CELL>_<i>` rather than
/// `CLOCKS_<CELL>_<i>`.
///
/// `CLOCK_CONTROLLER` and `CLOCKS_CLOCK_FREQUENCY` carry no index, so only
/// the first clock providing each one defines it.
pub fn write_clocks<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    let Some(PropValue::PhandleArray(clocks)) = scope.node.prop("clocks").map(|p| &p.value)
    else {
        return Ok(());
    };

    let mut controller_written = false;
    let mut frequency_written = false;
    for (i, clock) in clocks.iter().enumerate() {
        let controller = &scope.tree[clock.controller];

        if let Some(label) = &controller.label {
            if !controller_written {
                scope.out(sink, "CLOCK_CONTROLLER", &Value::Str(label.clone()), None)?;
                controller_written = true;
            }
        }

        for (cell, value) in &clock.data {
            let cell = sanitize(cell);
            let name_alias = (i == 0).then(|| format!("CLOCK_{cell}"));
            scope.out(
                sink,
                &format!("CLOCK_{cell}_{i}"),
                &Value::Uint(*value),
                name_alias.as_deref(),
            )?;
        }

        if !controller.has_compat("fixed-clock") {
            continue;
        }
        let frequency = match controller.prop("clock-frequency").map(|p| &p.value) {
            Some(PropValue::Int(hz)) => *hz,
            _ => {
                return Err(GenError::MissingClockFrequency {
                    path: controller.path.clone(),
                })
            }
        };
        if !frequency_written {
            scope.out(sink, "CLOCKS_CLOCK_FREQUENCY", &Value::Int(frequency), None)?;
            frequency_written = true;
        }
    }
    Ok(())
}

/// Chip select GPIO of a device on an SPI bus, picked from the bus
/// controller's `cs-gpios` by the device's `reg` address
pub fn write_spi_dev<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    let node = scope.node;
    if node.on_bus.as_deref() != Some("spi") {
        return Ok(());
    }
    let Some(bus_id) = node.bus_node else {
        return Ok(());
    };
    let Some(PropValue::PhandleArray(cs_gpios)) =
        scope.tree[bus_id].prop("cs-gpios").map(|p| &p.value)
    else {
        return Ok(());
    };

    let reg = node.regs.first().ok_or_else(|| GenError::RegisterCount {
        path: node.path.clone(),
        what: "SPI device needs a 'reg' property to select its chip select".to_string(),
    })?;
    let cs = usize::try_from(reg.addr)
        .ok()
        .and_then(|i| cs_gpios.get(i))
        .ok_or_else(|| GenError::ChipSelect {
            path: node.path.clone(),
            index: reg.addr,
            count: cs_gpios.len(),
        })?;

    write_entry(scope, sink, cs, None, "CS_GPIOS")?;
    Ok(())
}
