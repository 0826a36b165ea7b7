//! C7: the indexer driver (§4.6). Streams parser events over a text trace
//! and builds the C3/C4/C5 trees incrementally, one instruction group at a
//! time.

use tarmac_core::{Addr, Depth, Line, Off, Space, Time, TarmacError, KNOWN_INVALID_PC};
use tarmac_parser::{CallHint, Event};
use tarmac_tree::ArenaMut;

use crate::seqtree::SequentialPayload;
use crate::{bypctree, memtree, seqtree};

/// A pending memory or register write, buffered until its group closes.
struct PendingWrite {
    space: Space,
    addr: Addr,
    bytes: Vec<u8>,
}

/// The in-progress instruction group, opened by the most recent retire
/// (or, for writes seen before any retire, by [`KNOWN_INVALID_PC`]).
struct PendingGroup {
    first_line: Line,
    byte_pos: Off,
    byte_extent: u32,
    pc: Addr,
    is_retire: bool,
    call_depth: Depth,
    writes: Vec<PendingWrite>,
}

/// Streaming driver over a text trace. Owns the running `memroot`/`depth`/
/// `time` state described in §4.6 and the two tree roots it is building.
pub struct Indexer {
    memroot: Off,
    depth: Depth,
    time: Time,
    iflags: u32,
    seq_root: Off,
    bypc_root: Off,
    pending: Option<PendingGroup>,
    groups_closed: u64,
    progress_interval: Option<u64>,
}

/// Final tree roots produced by a completed indexing run.
pub struct IndexRoots {
    pub memroot: Off,
    pub seq_root: Off,
    pub bypc_root: Off,
}

impl Indexer {
    /// `aarch64` seeds the one pseudo-register `get_iflags` reads back
    /// (§4.7); `progress_interval`, when set, is the group count between
    /// `show_progress_meter` callbacks (§4.6).
    pub fn new<Ar: ArenaMut>(
        arena: &mut Ar,
        aarch64: bool,
        progress_interval: Option<u64>,
    ) -> tarmac_tree::arena::Result<Self> {
        let iflags: u32 = aarch64 as u32;
        let memroot = memtree::write(arena, tarmac_tree::NIL, Space::Register, 0x4000, &iflags.to_le_bytes(), 0)?;
        Ok(Indexer {
            memroot,
            depth: 0,
            time: 0,
            iflags,
            seq_root: tarmac_tree::NIL,
            bypc_root: tarmac_tree::NIL,
            pending: None,
            groups_closed: 0,
            progress_interval,
        })
    }

    /// Feed one line of trace text. `line_no` is 1-based; `byte_pos` and
    /// `byte_len` locate the line in the trace file (§3.3 `byte_pos`).
    pub fn feed_line<Ar: ArenaMut>(
        &mut self,
        arena: &mut Ar,
        line_no: Line,
        byte_pos: Off,
        byte_len: u32,
        text: &str,
        mut on_progress: impl FnMut(u64),
    ) -> tarmac_core::Result<()> {
        let event = match tarmac_parser::parse(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "skipping unparsable trace line");
                None
            }
        };
        match event {
            None => {}
            Some(Event::Call(hint)) => self.apply_call_hint(hint),
            Some(Event::InstructionRetire { pc, executed, .. }) => {
                self.close_group(arena, &mut on_progress)?;
                self.pending = Some(PendingGroup {
                    first_line: line_no,
                    byte_pos,
                    byte_extent: byte_len,
                    pc,
                    is_retire: executed,
                    call_depth: self.depth,
                    writes: Vec::new(),
                });
            }
            Some(Event::RegisterWrite { reg, bytes }) => {
                let (addr, _) = tarmac_core::resolve_register(reg, self.iflags)
                    .ok_or_else(|| TarmacError::format(format!("register {reg} out of range")))?;
                self.ensure_pending(line_no, byte_pos, byte_len);
                self.pending_mut().writes.push(PendingWrite { space: Space::Register, addr, bytes });
            }
            Some(Event::MemoryAccess { addr, bytes, read }) if !read => {
                self.ensure_pending(line_no, byte_pos, byte_len);
                self.pending_mut().writes.push(PendingWrite { space: Space::Memory, addr, bytes });
            }
            Some(Event::MemoryAccess { .. }) => {}
        }
        Ok(())
    }

    /// Close the final pending group and return the three tree roots.
    pub fn finish<Ar: ArenaMut>(
        mut self,
        arena: &mut Ar,
        mut on_progress: impl FnMut(u64),
    ) -> tarmac_core::Result<IndexRoots> {
        self.close_group(arena, &mut on_progress)?;
        Ok(IndexRoots { memroot: self.memroot, seq_root: self.seq_root, bypc_root: self.bypc_root })
    }

    fn apply_call_hint(&mut self, hint: CallHint) {
        match hint {
            CallHint::Call => self.depth += 1,
            CallHint::Return => self.depth = self.depth.saturating_sub(1),
        }
    }

    /// Writes before the first retire still need somewhere to land; open an
    /// implicit group carrying the unresolved-PC sentinel (§4.6).
    fn ensure_pending(&mut self, line_no: Line, byte_pos: Off, byte_len: u32) {
        if self.pending.is_none() {
            self.pending = Some(PendingGroup {
                first_line: line_no,
                byte_pos,
                byte_extent: byte_len,
                pc: KNOWN_INVALID_PC,
                is_retire: false,
                call_depth: self.depth,
                writes: Vec::new(),
            });
        }
    }

    fn pending_mut(&mut self) -> &mut PendingGroup {
        self.pending.as_mut().expect("ensure_pending called first")
    }

    fn close_group<Ar: ArenaMut>(
        &mut self,
        arena: &mut Ar,
        on_progress: &mut impl FnMut(u64),
    ) -> tarmac_core::Result<()> {
        let Some(group) = self.pending.take() else { return Ok(()) };

        for write in &group.writes {
            self.memroot = memtree::write(arena, self.memroot, write.space, write.addr, &write.bytes, group.first_line)?;
        }

        let line_extent = 1;
        let payload = SequentialPayload {
            first_line: group.first_line,
            line_extent,
            byte_pos: group.byte_pos,
            byte_extent: group.byte_extent,
            mod_time: self.time,
            pc: group.pc,
            memory_root: self.memroot,
            call_depth: group.call_depth,
            is_retire: group.is_retire,
        };
        self.seq_root = seqtree::insert(arena, self.seq_root, payload)?;
        self.bypc_root = bypctree::insert(arena, self.bypc_root, group.pc, group.first_line)?;

        self.time += 1;
        self.groups_closed += 1;
        if let Some(interval) = self.progress_interval {
            if interval > 0 && self.groups_closed % interval == 0 {
                on_progress(self.groups_closed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarmac_core::RegisterId;
    use tarmac_tree::ArenaWriter;

    fn writer() -> ArenaWriter {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
        ArenaWriter::create(path, false, false).unwrap()
    }

    /// Literal S1 scenario: three retiring instructions each writing R0,
    /// indexed end to end and recovered via `node_at_line`/`memtree::read`.
    #[test]
    fn indexes_three_retiring_instructions_s1() {
        let mut w = writer();
        let mut ix = Indexer::new(&mut w, false, None).unwrap();
        let trace = ["IT 0x1000 E mov r0, #1", "R r0 00000001", "IT 0x1004 E mov r0, #2", "R r0 00000002", "IT 0x1008 E mov r0, #3", "R r0 00000003"];
        let mut pos: Off = 0;
        for (i, line) in trace.iter().enumerate() {
            let len = line.len() as u32 + 1;
            ix.feed_line(&mut w, (i + 1) as Line, pos, len, line, |_| {}).unwrap();
            pos += len as Off;
        }
        let roots = ix.finish(&mut w, |_| {}).unwrap();

        let first = seqtree::node_at_line(&w, roots.seq_root, 1).unwrap().unwrap();
        assert_eq!(first.pc, 0x1000);
        let second = seqtree::node_at_line(&w, roots.seq_root, 3).unwrap().unwrap();
        assert_eq!(second.pc, 0x1004);
        let third = seqtree::node_at_line(&w, roots.seq_root, 5).unwrap().unwrap();
        assert_eq!(third.pc, 0x1008);

        let r0 = RegisterId { prefix: tarmac_core::RegPrefix::R, index: 0 };
        let (addr, width) = tarmac_core::resolve_register(r0, 0).unwrap();
        let (bytes, mask, _line) = memtree::read(&w, third.memory_root, Space::Register, addr, width as usize).unwrap();
        assert!(mask.iter().all(|&b| b));
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x03]);

        let found = bypctree::find_next_instance(&w, roots.bypc_root, 0x1004, 0).unwrap().unwrap();
        assert_eq!(found.first_line, 3);
    }

    #[test]
    fn call_hints_track_depth() {
        let mut w = writer();
        let mut ix = Indexer::new(&mut w, false, None).unwrap();
        let trace = ["IT 0x1000 E bl callee", "CALL", "IT 0x2000 E push", "RET", "IT 0x1004 E mov r0, #0"];
        let mut pos: Off = 0;
        for (i, line) in trace.iter().enumerate() {
            let len = line.len() as u32 + 1;
            ix.feed_line(&mut w, (i + 1) as Line, pos, len, line, |_| {}).unwrap();
            pos += len as Off;
        }
        let roots = ix.finish(&mut w, |_| {}).unwrap();

        let caller = seqtree::node_at_line(&w, roots.seq_root, 1).unwrap().unwrap();
        assert_eq!(caller.call_depth, 0);
        let callee = seqtree::node_at_line(&w, roots.seq_root, 3).unwrap().unwrap();
        assert_eq!(callee.call_depth, 1);
        let returned = seqtree::node_at_line(&w, roots.seq_root, 5).unwrap().unwrap();
        assert_eq!(returned.call_depth, 0);
    }

    #[test]
    fn writes_before_first_retire_use_invalid_pc_sentinel() {
        let mut w = writer();
        let mut ix = Indexer::new(&mut w, false, None).unwrap();
        let trace = ["R r1 00000009", "IT 0x1000 E mov r0, #1"];
        let mut pos: Off = 0;
        for (i, line) in trace.iter().enumerate() {
            let len = line.len() as u32 + 1;
            ix.feed_line(&mut w, (i + 1) as Line, pos, len, line, |_| {}).unwrap();
            pos += len as Off;
        }
        let roots = ix.finish(&mut w, |_| {}).unwrap();
        let first = seqtree::node_at_line(&w, roots.seq_root, 1).unwrap().unwrap();
        assert_eq!(first.pc, KNOWN_INVALID_PC);
        assert!(!first.is_retire);
    }

    #[test]
    fn progress_meter_reports_every_n_groups() {
        let mut w = writer();
        let mut ix = Indexer::new(&mut w, false, Some(2)).unwrap();
        let mut reports = Vec::new();
        let mut pos: Off = 0;
        for i in 0..4u32 {
            let line = format!("IT 0x{:x} E nop", 0x1000 + i);
            let len = line.len() as u32 + 1;
            ix.feed_line(&mut w, i + 1, pos, len, &line, |n| reports.push(n)).unwrap();
            pos += len as Off;
        }
        ix.finish(&mut w, |n| reports.push(n)).unwrap();
        assert_eq!(reports, vec![2, 4]);
    }
}
