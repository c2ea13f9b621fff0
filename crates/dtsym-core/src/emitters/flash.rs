//! Flash partitions and facts derived from /chosen
//!
//! Unlike the node-scoped emitters these write global symbols, so they take
//! the tree directly instead of a [`NodeScope`](super::NodeScope).

use std::io::Write;

use super::props::scalar;
use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::ident::sanitize;
use crate::model::{Node, Tree};

/// Write `FLASH_AREA_<LABEL>_*` and `FLASH_AREA_<index>_*` for a partition
pub fn write_flash_partition<W: Write>(
    tree: &Tree,
    sink: &mut Sink<W>,
    partition: &Node,
    index: usize,
) -> Result<(), GenError> {
    let label = partition
        .label
        .as_deref()
        .ok_or_else(|| GenError::MissingLabel {
            role: "flash partition",
            path: partition.path.clone(),
        })?;
    let controller = tree
        .flash_controller(partition.id)
        .ok_or_else(|| GenError::OrphanPartition {
            path: partition.path.clone(),
        })?;

    for prefix in [
        format!("FLASH_AREA_{}", sanitize(label)),
        format!("FLASH_AREA_{index}"),
    ] {
        write_partition_prefix(sink, &prefix, partition, controller, index)?;
    }
    Ok(())
}

fn write_partition_prefix<W: Write>(
    sink: &mut Sink<W>,
    prefix: &str,
    partition: &Node,
    controller: &Node,
    index: usize,
) -> Result<(), GenError> {
    sink.emit(&format!("{prefix}_ID"), &Value::from(index), &[], None)?;
    sink.emit(
        &format!("{prefix}_READ_ONLY"),
        &Value::Int(i64::from(partition.read_only())),
        &[],
        None,
    )?;

    for (i, reg) in partition.regs.iter().enumerate() {
        let region_alias = |what: &str| {
            if i == 0 {
                vec![format!("{prefix}_{what}")]
            } else {
                Vec::new()
            }
        };
        sink.emit(
            &format!("{prefix}_OFFSET_{i}"),
            &Value::Uint(reg.addr),
            &region_alias("OFFSET"),
            None,
        )?;
        sink.emit(
            &format!("{prefix}_SIZE_{i}"),
            &Value::Uint(reg.size),
            &region_alias("SIZE"),
            None,
        )?;
    }

    if let Some(label) = &controller.label {
        sink.emit(&format!("{prefix}_DEV"), &Value::Str(label.clone()), &[], None)?;
    }
    Ok(())
}

/// `<prefix>_BASE_ADDRESS` and `<prefix>_SIZE` (in KiB) of the node pointed
/// at by `/chosen/<chosen>`, if there is one
pub fn write_addr_size<W: Write>(
    tree: &Tree,
    sink: &mut Sink<W>,
    chosen: &str,
    prefix: &str,
) -> Result<(), GenError> {
    let Some(node) = tree.chosen(chosen) else {
        return Ok(());
    };
    let reg = node.regs.first().ok_or_else(|| GenError::RegisterCount {
        path: node.path.clone(),
        what: format!("missing 'reg' property in node pointed at by /chosen/{chosen}"),
    })?;

    sink.comment(&format!("/chosen/{chosen} ({})", node.path), true)?;
    sink.emit(&format!("{prefix}_BASE_ADDRESS"), &Value::Hex(reg.addr), &[], None)?;
    sink.emit(&format!("{prefix}_SIZE"), &Value::Uint(reg.size / 1024), &[], None)?;
    Ok(())
}

/// Tree-wide flash facts: the zephyr,flash node, the code partition and the
/// partition count
pub fn write_flash<W: Write>(
    tree: &Tree,
    sink: &mut Sink<W>,
    flash_area_num: usize,
) -> Result<(), GenError> {
    write_flash_node(tree, sink)?;
    write_code_partition(tree, sink)?;

    if flash_area_num != 0 {
        sink.comment("Number of flash partitions", true)?;
        sink.emit("FLASH_AREA_NUM", &Value::from(flash_area_num), &[], None)?;
    }
    Ok(())
}

fn chosen_comment(chosen: &str, node: Option<&Node>) -> String {
    let path = node.map_or("missing", |n| n.path.as_str());
    format!("/chosen/{chosen} ({path})")
}

fn write_flash_node<W: Write>(tree: &Tree, sink: &mut Sink<W>) -> Result<(), GenError> {
    let node = tree.chosen("zephyr,flash");
    sink.comment(&chosen_comment("zephyr,flash", node), true)?;

    let Some(node) = node else {
        sink.emit("FLASH_BASE_ADDRESS", &Value::Int(0), &[], None)?;
        sink.emit("FLASH_SIZE", &Value::Int(0), &[], None)?;
        return Ok(());
    };

    let [reg] = node.regs.as_slice() else {
        return Err(GenError::RegisterCount {
            path: node.path.clone(),
            what: format!(
                "expected zephyr,flash to have a single register, has {}",
                node.regs.len()
            ),
        });
    };

    // QSPI flash is mapped through the second register of its bus controller
    let bus_regs = node.bus_node.map(|id| tree[id].regs.as_slice());
    let reg = match bus_regs {
        Some([_, mapped]) if node.on_bus.as_deref() == Some("spi") => mapped,
        _ => reg,
    };

    sink.emit("FLASH_BASE_ADDRESS", &Value::Hex(reg.addr), &[], None)?;
    if reg.size != 0 {
        sink.emit("FLASH_SIZE", &Value::Uint(reg.size / 1024), &[], None)?;
    }

    for (prop, ident) in [
        ("erase-block-size", "FLASH_ERASE_BLOCK_SIZE"),
        ("write-block-size", "FLASH_WRITE_BLOCK_SIZE"),
    ] {
        if let Some(value) = node.prop(prop).and_then(scalar) {
            sink.emit(ident, &value, &[], None)?;
        }
    }
    Ok(())
}

fn write_code_partition<W: Write>(tree: &Tree, sink: &mut Sink<W>) -> Result<(), GenError> {
    let node = tree.chosen("zephyr,code-partition");
    sink.comment(&chosen_comment("zephyr,code-partition", node), true)?;

    let Some(node) = node else {
        sink.emit("CODE_PARTITION_OFFSET", &Value::Int(0), &[], None)?;
        sink.emit("CODE_PARTITION_SIZE", &Value::Int(0), &[], None)?;
        return Ok(());
    };

    let reg = node.regs.first().ok_or_else(|| GenError::RegisterCount {
        path: node.path.clone(),
        what: "missing 'reg' property on zephyr,code-partition".to_string(),
    })?;
    sink.emit("CODE_PARTITION_OFFSET", &Value::Uint(reg.addr), &[], None)?;
    sink.emit("CODE_PARTITION_SIZE", &Value::Uint(reg.size), &[], None)?;
    Ok(())
}
