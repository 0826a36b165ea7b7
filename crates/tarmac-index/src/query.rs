//! C8: the read-only query layer (§4.7). `IndexNavigator` wraps a finished
//! index (its three tree roots plus an optional ELF collaborator) and
//! exposes the public lookup operations; every failure mode is a negative
//! result, never a panic or an error return (§7 "Lookup").

use tarmac_core::{Addr, Depth, Line, Off, RegisterId, Space, Time};
use tarmac_tree::Arena;

use crate::memtree::Direction;
use crate::seqtree::SequentialPayload;
use crate::{bypctree, memtree, seqtree};

/// The three persistent tree roots a finished index is built from (§3.2).
#[derive(Debug, Clone, Copy)]
pub struct Roots {
    pub seq_root: Off,
    pub bypc_root: Off,
}

/// A read-only view over a finished index, plus the optional ELF
/// collaborator used for symbol lookups.
pub struct IndexNavigator<'a, Ar: Arena> {
    arena: &'a Ar,
    roots: Roots,
    symbols: Option<&'a tarmac_elf::SymbolTable>,
}

impl<'a, Ar: Arena> IndexNavigator<'a, Ar> {
    pub fn new(arena: &'a Ar, roots: Roots, symbols: Option<&'a tarmac_elf::SymbolTable>) -> Self {
        IndexNavigator { arena, roots, symbols }
    }

    /// The node whose `[first_line, first_line+line_extent)` window
    /// contains `line`.
    pub fn node_at_line(&self, line: Line) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
        seqtree::node_at_line(self.arena, self.roots.seq_root, line)
    }

    pub fn node_at_time(&self, time: Time) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
        seqtree::node_at_time(self.arena, self.roots.seq_root, time)
    }

    pub fn previous_node(
        &self,
        node: &SequentialPayload,
    ) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
        seqtree::previous_node(self.arena, self.roots.seq_root, node)
    }

    pub fn next_node(&self, node: &SequentialPayload) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
        seqtree::next_node(self.arena, self.roots.seq_root, node)
    }

    /// `end = false` → the first node in the trace; `end = true` → the
    /// last.
    pub fn find_buffer_limit(&self, end: bool) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
        seqtree::find_buffer_limit(self.arena, self.roots.seq_root, end)
    }

    pub fn getmem(
        &self,
        memroot: Off,
        space: Space,
        addr: Addr,
        size: usize,
    ) -> tarmac_tree::arena::Result<(Vec<u8>, Vec<bool>, Line)> {
        memtree::read(self.arena, memroot, space, addr, size)
    }

    /// Bit 0 = AArch64 (§4.7).
    pub fn get_iflags(&self, memroot: Off) -> tarmac_tree::arena::Result<u32> {
        let (bytes, _mask, _line) = memtree::read(self.arena, memroot, Space::Register, 0x4000, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// `None` if any byte of the register is undefined (§4.7).
    pub fn get_reg_bytes(&self, memroot: Off, reg: RegisterId) -> tarmac_tree::arena::Result<Option<Vec<u8>>> {
        let iflags = self.get_iflags(memroot)?;
        let Some((addr, width)) = tarmac_core::resolve_register(reg, iflags) else {
            return Ok(None);
        };
        let (bytes, mask, _line) = memtree::read(self.arena, memroot, Space::Register, addr, width as usize)?;
        if mask.iter().all(|&b| b) {
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }

    /// As [`Self::get_reg_bytes`], additionally failing when the register
    /// is wider than 64 bits (§4.7).
    pub fn get_reg_value(&self, memroot: Off, reg: RegisterId) -> tarmac_tree::arena::Result<Option<u64>> {
        let Some(bytes) = self.get_reg_bytes(memroot, reg)? else { return Ok(None) };
        if bytes.len() > 8 {
            return Ok(None);
        }
        let mut padded = [0u8; 8];
        padded[8 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Some(u64::from_be_bytes(padded)))
    }

    pub fn find_next_mod(
        &self,
        memroot: Off,
        space: Space,
        addr: Addr,
        min_line: Line,
        direction: Direction,
    ) -> tarmac_tree::arena::Result<Option<(Addr, Addr)>> {
        memtree::find_next_mod(self.arena, memroot, space, addr, min_line, direction)
    }

    /// First occurrence of `pc` at or after `line`, via C5 (§4.5).
    pub fn find_next_instance(
        &self,
        pc: Addr,
        line: Line,
    ) -> tarmac_tree::arena::Result<Option<bypctree::ByPcPayload>> {
        bypctree::find_next_instance(self.arena, self.roots.bypc_root, pc, line)
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<(Addr, u64)> {
        self.symbols?.lookup_symbol(name)
    }

    pub fn get_symbolic_address(&self, addr: Addr, fallback: bool) -> String {
        match self.symbols {
            Some(table) => table.get_symbolic_address(addr, fallback),
            None if fallback => format!("{addr:#x}"),
            None => String::new(),
        }
    }

    pub fn lrt_rank(&self, line: Line, d_lo: Depth, d_hi: Depth) -> tarmac_tree::arena::Result<u64> {
        seqtree::lrt_rank(self.arena, self.roots.seq_root, line, d_lo, d_hi)
    }

    pub fn lrt_select(&self, k: u64, d_lo: Depth, d_hi: Depth) -> tarmac_tree::arena::Result<Option<Line>> {
        seqtree::lrt_select(self.arena, self.roots.seq_root, k, d_lo, d_hi)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn lrt_translate(
        &self,
        n: u64,
        in_lo: Depth,
        in_hi: Depth,
        out_lo: Depth,
        out_hi: Depth,
    ) -> tarmac_tree::arena::Result<u64> {
        seqtree::lrt_translate(self.arena, self.roots.seq_root, n, in_lo, in_hi, out_lo, out_hi)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn lrt_translate_may_fail(
        &self,
        n: u64,
        in_lo: Depth,
        in_hi: Depth,
        out_lo: Depth,
        out_hi: Depth,
    ) -> tarmac_tree::arena::Result<(bool, u64)> {
        seqtree::lrt_translate_may_fail(self.arena, self.roots.seq_root, n, in_lo, in_hi, out_lo, out_hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use tarmac_core::RegPrefix;
    use tarmac_tree::ArenaWriter;

    fn index_trace(lines: &[&str]) -> (ArenaWriter, Roots) {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
        let mut w = ArenaWriter::create(path, false, false).unwrap();
        let mut ix = Indexer::new(&mut w, false, None).unwrap();
        let mut pos: Off = 0;
        for (i, line) in lines.iter().enumerate() {
            let len = line.len() as u32 + 1;
            ix.feed_line(&mut w, (i + 1) as Line, pos, len, line, |_| {}).unwrap();
            pos += len as Off;
        }
        let roots = ix.finish(&mut w, |_| {}).unwrap();
        (w, Roots { seq_root: roots.seq_root, bypc_root: roots.bypc_root })
    }

    #[test]
    fn navigator_reads_register_and_symbol_state_s1() {
        let (w, roots) = index_trace(&["IT 0x1000 E mov r0, #1", "R r0 00000001"]);
        let nav = IndexNavigator::new(&w, roots, None);
        let node = nav.node_at_line(1).unwrap().unwrap();
        let r0 = RegisterId { prefix: RegPrefix::R, index: 0 };
        let value = nav.get_reg_value(node.memory_root, r0).unwrap().unwrap();
        assert_eq!(value, 1);
        assert_eq!(nav.get_iflags(node.memory_root).unwrap(), 0);
        assert_eq!(nav.get_symbolic_address(0x1000, true), "0x1000");
    }

    #[test]
    fn undefined_register_is_a_negative_result_not_a_panic() {
        let (w, roots) = index_trace(&["IT 0x1000 E nop"]);
        let nav = IndexNavigator::new(&w, roots, None);
        let node = nav.node_at_line(1).unwrap().unwrap();
        let r3 = RegisterId { prefix: RegPrefix::R, index: 3 };
        assert_eq!(nav.get_reg_value(node.memory_root, r3).unwrap(), None);
    }

    #[test]
    fn find_next_instance_delegates_to_by_pc_tree() {
        let (w, roots) = index_trace(&["IT 0x1000 E nop", "IT 0x2000 E nop", "IT 0x1000 E nop"]);
        let nav = IndexNavigator::new(&w, roots, None);
        let found = nav.find_next_instance(0x1000, 2).unwrap().unwrap();
        assert_eq!(found.first_line, 3);
    }

    #[test]
    fn symbol_lookup_without_collaborator_falls_back_to_hex() {
        let (w, roots) = index_trace(&["IT 0x1000 E nop"]);
        let nav = IndexNavigator::new(&w, roots, None);
        assert_eq!(nav.lookup_symbol("foo"), None);
        assert_eq!(nav.get_symbolic_address(0x1000, false), "");
    }
}
