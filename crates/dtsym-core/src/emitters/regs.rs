//! `reg` base addresses and sizes
//!
//! Every naming scheme gets its own full set of register definitions rather
//! than aliases, but all of them carry the value rendered the first time.

use std::io::Write;

use super::NodeScope;
use crate::emit::{Fact, Sink, Value};
use crate::error::GenError;
use crate::ident::{hex, sanitize};

pub fn write_regs<W: Write>(scope: &NodeScope, sink: &mut Sink<W>) -> Result<(), GenError> {
    if scope.node.regs.is_empty() {
        return Ok(());
    }

    sink.comment("BASE_ADDRESS and SIZE macros from the \"reg\" property", false)?;
    for ident in scope.identity.schemes() {
        write_regs_for(scope, sink, ident)?;
    }
    Ok(())
}

fn write_regs_for<W: Write>(
    scope: &NodeScope,
    sink: &mut Sink<W>,
    ident: &str,
) -> Result<(), GenError> {
    let node = scope.node;
    let single = node.regs.len() == 1;

    for (i, reg) in node.regs.iter().enumerate() {
        let addr = match sink.recall(node.id, Fact::RegAddress(i)) {
            Some(rendered) => rendered.to_string(),
            None => hex(reg.addr),
        };
        let size = match sink.recall(node.id, Fact::RegSize(i)) {
            Some(rendered) => Some(rendered.to_string()),
            None => (reg.size != 0).then(|| reg.size.to_string()),
        };

        write_reg(sink, ident, "", &format!("_{i}"), &addr, size.as_deref())?;
        if single {
            write_reg(sink, ident, "", "", &addr, size.as_deref())?;
        }
        if let Some(name) = &reg.name {
            let name = format!("{}_", sanitize(name));
            write_reg(sink, ident, &name, "", &addr, size.as_deref())?;
        }

        sink.remember(node.id, Fact::RegAddress(i), addr);
        if let Some(size) = size {
            sink.remember(node.id, Fact::RegSize(i), size);
        }
    }
    Ok(())
}

fn write_reg<W: Write>(
    sink: &mut Sink<W>,
    ident: &str,
    name: &str,
    suffix: &str,
    addr: &str,
    size: Option<&str>,
) -> Result<(), GenError> {
    sink.emit(
        &format!("{ident}_{name}BASE_ADDRESS{suffix}"),
        &Value::Token(addr.to_string()),
        &[],
        None,
    )?;
    if let Some(size) = size {
        sink.emit(
            &format!("{ident}_{name}SIZE{suffix}"),
            &Value::Token(size.to_string()),
            &[],
            None,
        )?;
    }
    Ok(())
}
