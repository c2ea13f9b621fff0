//! Interrupt numbers and cells
//!
//! The `irq` cell is written as a multi-level number: each interrupt
//! controller that is itself wired to a parent controller shifts the number
//! left by 8 bits and ORs in its own line on the parent.

use std::io::Write;

use super::NodeScope;
use crate::emit::{Sink, Value};
use crate::error::GenError;
use crate::ident::sanitize;
use crate::model::{Interrupt, Node, Tree};

/// Cell holding the interrupt number
const IRQ_CELL: &str = "irq";

/// Interrupt controller whose `type` cell selects an offset into its
/// interrupt ID space
const GIC_COMPAT: &str = "arm,gic";

pub fn write_irqs<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    let node = scope.node;

    for (index, irq) in node.interrupts.iter().enumerate() {
        for (cell, &cell_value) in &irq.data {
            let mut ident = format!("IRQ_{index}");
            let value = if cell == IRQ_CELL {
                let mut number = cell_value;
                if scope.tree[irq.controller].has_compat(GIC_COMPAT) {
                    number = map_gic_irq_type(scope.tree, node, index, irq, number)?;
                }
                encode_multi_level_irq(scope.tree, irq, number)?
            } else {
                ident.push_str(&format!("_{}", sanitize(cell)));
                cell_value
            };

            let name_alias = irq.name.as_deref().map(|name| {
                let mut alias = format!("IRQ_{}", sanitize(name));
                if cell != IRQ_CELL {
                    alias.push_str(&format!("_{}", sanitize(cell)));
                }
                alias
            });
            scope.out(sink, &ident, &Value::Uint(value), name_alias.as_deref())?;
        }
    }
    Ok(())
}

/// GIC SPIs start at ID 32 and PPIs at 16
fn map_gic_irq_type(
    tree: &Tree,
    node: &Node,
    index: usize,
    irq: &Interrupt,
    number: u64,
) -> Result<u64, GenError> {
    let irq_type = irq
        .data
        .get("type")
        .copied()
        .ok_or_else(|| GenError::MissingInterruptCell {
            controller: tree[irq.controller].path.clone(),
            cell: "type",
        })?;
    match irq_type {
        0 => Ok(number + 32),
        1 => Ok(number + 16),
        irq_type => Err(GenError::InvalidInterruptType {
            path: node.path.clone(),
            index,
            irq_type,
        }),
    }
}

/// Fold `number` through the chain of parent interrupt controllers
pub fn encode_multi_level_irq(tree: &Tree, irq: &Interrupt, number: u64) -> Result<u64, GenError> {
    let mut encoded = number;
    let mut controller = &tree[irq.controller];
    let mut visited = vec![controller.id];

    while let Some(parent_irq) = controller.interrupts.first() {
        let parent_number = parent_irq
            .data
            .get(IRQ_CELL)
            .copied()
            .ok_or_else(|| GenError::MissingInterruptCell {
                controller: tree[parent_irq.controller].path.clone(),
                cell: IRQ_CELL,
            })?;
        encoded = (encoded << 8) | parent_number;

        controller = &tree[parent_irq.controller];
        if visited.contains(&controller.id) {
            return Err(GenError::Cycle(
                visited.iter().map(|id| tree[*id].path.clone()).collect(),
            ));
        }
        visited.push(controller.id);
    }
    Ok(encoded)
}
