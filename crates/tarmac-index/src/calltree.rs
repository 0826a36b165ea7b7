//! The call-tree / flame-graph builder (§4.4, §6 "Flame-graph output").
//!
//! Walks C4 in order, reconstructing the live call stack from each node's
//! `call_depth` (a cheaper substitute for `calltree.hh`'s `CallTreeVisitor`
//! machinery, since our per-node LRT annotation already makes depth
//! transitions cheap to read off directly rather than needing a visitor
//! callback tree).

use std::collections::HashMap;

use tarmac_core::{Addr, Line, Off, Time, KNOWN_INVALID_PC};
use tarmac_tree::Arena;

use crate::seqtree::SequentialPayload;

/// One recorded call/trace site, grounded on the original's `TarmacSite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TarmacSite {
    pub addr: Addr,
    pub time: Time,
    pub line: Line,
    pub pos: Off,
}

impl From<&SequentialPayload> for TarmacSite {
    fn from(node: &SequentialPayload) -> Self {
        TarmacSite { addr: node.pc, time: node.mod_time, line: node.first_line, pos: node.byte_pos }
    }
}

fn frame_name(pc: Addr, symbols: Option<&tarmac_elf::SymbolTable>) -> String {
    match symbols {
        Some(table) => table.get_symbolic_address(pc, true),
        None => format!("{pc:#x}"),
    }
}

/// Collapsed-stack counts: one tick per retired instruction group,
/// attributed to the full call stack live at that group (§6). Groups
/// carrying [`KNOWN_INVALID_PC`] are skipped rather than treated as depth
/// transitions (§4.6). Returned sorted by stack text for determinism.
pub fn flame_graph_counts<Ar: Arena>(
    arena: &Ar,
    seq_root: Off,
    symbols: Option<&tarmac_elf::SymbolTable>,
) -> tarmac_tree::arena::Result<Vec<(String, u64)>> {
    let mut stack: Vec<Addr> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();

    tarmac_tree::walk::<SequentialPayload, crate::seqtree::LrtAnnotation, _>(
        arena,
        seq_root,
        tarmac_tree::Order::InOrder,
        &mut |node: &SequentialPayload| {
            if node.pc == KNOWN_INVALID_PC {
                return;
            }
            let depth = node.call_depth as usize;
            stack.truncate(depth);
            stack.push(node.pc);
            let key = stack.iter().map(|&pc| frame_name(pc, symbols)).collect::<Vec<_>>().join(";");
            *counts.entry(key).or_insert(0) += 1;
        },
    )?;

    let mut out: Vec<(String, u64)> = counts.into_iter().collect();
    out.sort();
    Ok(out)
}

/// Render flame-graph counts in the collapsed-stack text format (§6):
/// `frame1;frame2;...;frameN count`, one line per stack.
pub fn render_flame_graph(counts: &[(String, u64)]) -> String {
    counts.iter().map(|(stack, count)| format!("{stack} {count}\n")).collect()
}
