//! C4: the sequential tree, ordered by trace line, together with its C6
//! layered-range-tree (LRT) annotation over call depth (§4.4).
//!
//! The LRT annotation is stored as a dense array of per-depth cumulative
//! counts rather than the original's sparse array of *distinct* depths
//! seen in a subtree plus cross-links between layers: `tarmac-tree`'s
//! generic AVL node layout requires a fixed-width annotation, and a dense
//! array up to [`MAX_DEPTH`] elementwise-adds under `combine` with no
//! need for cross-links at all. Deeper call stacks clamp to `MAX_DEPTH`
//! (documented in DESIGN.md) — a bounded simplification, not a
//! correctness gap for traces with realistic call nesting.

use std::cmp::Ordering;

use tarmac_core::{Addr, Depth, Line, Off, Time};
use tarmac_tree::{Annotated, Arena, ArenaMut, KeyCmp, Payload};

/// Call depths beyond this clamp to `MAX_DEPTH` in the LRT annotation.
pub const MAX_DEPTH: Depth = 64;

/// A C4 node (§3.3): one instruction group's position, PC, call depth, and
/// the memory-tree root capturing architectural state as of this group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialPayload {
    pub first_line: Line,
    pub line_extent: u32,
    pub byte_pos: Off,
    pub byte_extent: u32,
    pub mod_time: Time,
    pub pc: Addr,
    pub memory_root: Off,
    pub call_depth: Depth,
    /// Whether this group retires an instruction (§4.4 LRT instruction
    /// count) as opposed to being a bookkeeping-only group.
    pub is_retire: bool,
}

impl Payload for SequentialPayload {
    const ENCODED_LEN: usize = 4 + 4 + 8 + 4 + 4 + 8 + 8 + 4 + 1;

    fn encode(&self, buf: &mut [u8]) {
        let mut pos = 0;
        buf[pos..pos + 4].copy_from_slice(&self.first_line.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.line_extent.to_le_bytes());
        pos += 4;
        buf[pos..pos + 8].copy_from_slice(&self.byte_pos.to_le_bytes());
        pos += 8;
        buf[pos..pos + 4].copy_from_slice(&self.byte_extent.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.mod_time.to_le_bytes());
        pos += 4;
        buf[pos..pos + 8].copy_from_slice(&self.pc.to_le_bytes());
        pos += 8;
        buf[pos..pos + 8].copy_from_slice(&self.memory_root.to_le_bytes());
        pos += 8;
        buf[pos..pos + 4].copy_from_slice(&self.call_depth.to_le_bytes());
        pos += 4;
        buf[pos] = self.is_retire as u8;
    }

    fn decode(buf: &[u8]) -> Self {
        let mut pos = 0;
        let first_line = Line::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let line_extent = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let byte_pos = Off::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let byte_extent = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let mod_time = Time::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let pc = Addr::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let memory_root = Off::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let call_depth = Depth::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let is_retire = buf[pos] != 0;
        SequentialPayload {
            first_line,
            line_extent,
            byte_pos,
            byte_extent,
            mod_time,
            pc,
            memory_root,
            call_depth,
            is_retire,
        }
    }
}

impl KeyCmp<SequentialPayload> for SequentialPayload {
    fn key_cmp(&self, other: &SequentialPayload) -> Ordering {
        self.first_line.cmp(&other.first_line)
    }
}

/// Lookup key: the smallest payload with `first_line >= line` is found via
/// `successor`/`predecessor` against this key.
#[derive(Debug, Clone, Copy)]
pub struct LineKey {
    pub line: Line,
}

impl KeyCmp<SequentialPayload> for LineKey {
    fn key_cmp(&self, payload: &SequentialPayload) -> Ordering {
        self.line.cmp(&payload.first_line)
    }
}

/// Lookup key by `mod_time`. Valid because `mod_time` is monotone
/// non-decreasing in `first_line` order (§3 invariants), so a tree keyed
/// by `first_line` is also correctly ordered by `mod_time`.
#[derive(Debug, Clone, Copy)]
pub struct TimeKey {
    pub time: Time,
}

impl KeyCmp<SequentialPayload> for TimeKey {
    fn key_cmp(&self, payload: &SequentialPayload) -> Ordering {
        self.time.cmp(&payload.mod_time)
    }
}

fn clamp_depth(d: Depth) -> usize {
    d.min(MAX_DEPTH) as usize
}

/// The dense per-depth cumulative array (§4.4, see module docs for why
/// this replaces the original's sparse distinct-depth array).
#[derive(Debug, Clone, Copy)]
pub struct LrtAnnotation {
    pub lines_ge: [u32; MAX_DEPTH as usize + 1],
    pub insns_ge: [u32; MAX_DEPTH as usize + 1],
}

impl LrtAnnotation {
    /// Count of subtree lines with `call_depth >= d` (`d` clamped).
    pub fn lines_at_or_above(&self, d: Depth) -> u64 {
        self.lines_ge[clamp_depth(d)] as u64
    }

    pub fn insns_at_or_above(&self, d: Depth) -> u64 {
        self.insns_ge[clamp_depth(d)] as u64
    }

    /// Count of subtree lines with depth in `[lo, hi)`.
    fn lines_in_window(&self, lo: Depth, hi: Depth) -> u64 {
        let above_lo = self.lines_at_or_above(lo);
        let above_hi = if hi > MAX_DEPTH { 0 } else { self.lines_at_or_above(hi) };
        above_lo.saturating_sub(above_hi)
    }
}

impl Annotated<SequentialPayload> for LrtAnnotation {
    const ENCODED_LEN: usize = (MAX_DEPTH as usize + 1) * 4 * 2;

    fn identity() -> Self {
        LrtAnnotation { lines_ge: [0; MAX_DEPTH as usize + 1], insns_ge: [0; MAX_DEPTH as usize + 1] }
    }

    fn leaf(payload: &SequentialPayload) -> Self {
        let mut ann = Self::identity();
        let cd = clamp_depth(payload.call_depth);
        for d in 0..=cd {
            ann.lines_ge[d] = 1;
            if payload.is_retire {
                ann.insns_ge[d] = 1;
            }
        }
        ann
    }

    fn combine(left: &Self, mid: &Self, right: &Self) -> Self {
        let mut out = Self::identity();
        for i in 0..=MAX_DEPTH as usize {
            out.lines_ge[i] = left.lines_ge[i] + mid.lines_ge[i] + right.lines_ge[i];
            out.insns_ge[i] = left.insns_ge[i] + mid.insns_ge[i] + right.insns_ge[i];
        }
        out
    }

    fn encode(&self, buf: &mut [u8]) {
        let n = MAX_DEPTH as usize + 1;
        for i in 0..n {
            buf[i * 4..i * 4 + 4].copy_from_slice(&self.lines_ge[i].to_le_bytes());
        }
        for i in 0..n {
            let off = n * 4 + i * 4;
            buf[off..off + 4].copy_from_slice(&self.insns_ge[i].to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let n = MAX_DEPTH as usize + 1;
        let mut ann = Self::identity();
        for i in 0..n {
            ann.lines_ge[i] = u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
        }
        for i in 0..n {
            let off = n * 4 + i * 4;
            ann.insns_ge[i] = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        ann
    }
}

/// Insert a sequential node, keyed by `first_line`.
pub fn insert<Ar: ArenaMut>(
    arena: &mut Ar,
    root: Off,
    payload: SequentialPayload,
) -> tarmac_tree::arena::Result<Off> {
    tarmac_tree::insert::<SequentialPayload, LrtAnnotation, _>(arena, root, payload)
}

/// §4.7 `node_at_line`: the node whose `[first_line, first_line+line_extent)`
/// window contains `line`.
pub fn node_at_line<Ar: Arena>(
    arena: &Ar,
    root: Off,
    line: Line,
) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
    if let Some(exact) =
        tarmac_tree::find::<SequentialPayload, LrtAnnotation, _, _>(arena, root, &LineKey { line })?
    {
        if line < exact.first_line + exact.line_extent {
            return Ok(Some(exact));
        }
    }
    if let Some(pred) = tarmac_tree::predecessor::<SequentialPayload, LrtAnnotation, _, _>(
        arena,
        root,
        &LineKey { line },
    )? {
        if pred.first_line <= line && line < pred.first_line + pred.line_extent {
            return Ok(Some(pred));
        }
    }
    Ok(None)
}

/// §4.7 `node_at_time`: analogous to [`node_at_line`] over `mod_time`.
pub fn node_at_time<Ar: Arena>(
    arena: &Ar,
    root: Off,
    t: Time,
) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
    if let Some(exact) =
        tarmac_tree::find::<SequentialPayload, LrtAnnotation, _, _>(arena, root, &TimeKey { time: t })?
    {
        return Ok(Some(exact));
    }
    tarmac_tree::predecessor::<SequentialPayload, LrtAnnotation, _, _>(arena, root, &TimeKey { time: t })
}

/// §4.7 `previous_node` / `next_node`: in-order neighbours of `node`.
pub fn previous_node<Ar: Arena>(
    arena: &Ar,
    root: Off,
    node: &SequentialPayload,
) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
    tarmac_tree::predecessor::<SequentialPayload, LrtAnnotation, _, _>(
        arena,
        root,
        &LineKey { line: node.first_line },
    )
}

pub fn next_node<Ar: Arena>(
    arena: &Ar,
    root: Off,
    node: &SequentialPayload,
) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
    tarmac_tree::successor::<SequentialPayload, LrtAnnotation, _, _>(
        arena,
        root,
        &LineKey { line: node.first_line },
    )
}

/// §4.7 `find_buffer_limit`: the minimum (`end == false`) or maximum
/// (`end == true`) node in the tree.
pub fn find_buffer_limit<Ar: Arena>(
    arena: &Ar,
    root: Off,
    end: bool,
) -> tarmac_tree::arena::Result<Option<SequentialPayload>> {
    if end {
        tarmac_tree::max::<SequentialPayload, LrtAnnotation, _>(arena, root)
    } else {
        tarmac_tree::min::<SequentialPayload, LrtAnnotation, _>(arena, root)
    }
}

/// §4.4 `lrt_rank`: number of trace lines before `line` whose call depth
/// lies in `[d_lo, d_hi)`.
pub fn lrt_rank<Ar: Arena>(
    arena: &Ar,
    root: Off,
    line: Line,
    d_lo: Depth,
    d_hi: Depth,
) -> tarmac_tree::arena::Result<u64> {
    let (_, ann) =
        tarmac_tree::rank::<SequentialPayload, LrtAnnotation, _, _>(arena, root, &LineKey { line })?;
    Ok(ann.lines_in_window(d_lo, d_hi))
}

fn read_seq_node<Ar: Arena>(
    arena: &Ar,
    off: Off,
) -> tarmac_tree::arena::Result<(SequentialPayload, LrtAnnotation, Off, Off)> {
    let len = SequentialPayload::ENCODED_LEN + LrtAnnotation::ENCODED_LEN + 8 + 8 + 4;
    let bytes = arena.read_bytes(off, len)?;
    let payload = SequentialPayload::decode(&bytes[0..SequentialPayload::ENCODED_LEN]);
    let mut pos = SequentialPayload::ENCODED_LEN;
    let ann = LrtAnnotation::decode(&bytes[pos..pos + LrtAnnotation::ENCODED_LEN]);
    pos += LrtAnnotation::ENCODED_LEN;
    let left = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let right = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    Ok((payload, ann, left, right))
}

fn subtree_ann<Ar: Arena>(arena: &Ar, off: Off) -> tarmac_tree::arena::Result<LrtAnnotation> {
    if off == tarmac_tree::NIL {
        return Ok(LrtAnnotation::identity());
    }
    tarmac_tree::subtree_annotation::<SequentialPayload, LrtAnnotation, _>(arena, off)
}

/// §4.4 `lrt_select`: the `k`-th (zero-based) trace line whose call depth
/// lies in `[d_lo, d_hi)`.
pub fn lrt_select<Ar: Arena>(
    arena: &Ar,
    root: Off,
    k: u64,
    d_lo: Depth,
    d_hi: Depth,
) -> tarmac_tree::arena::Result<Option<Line>> {
    let mut node_off = root;
    let mut remaining = k;
    loop {
        if node_off == tarmac_tree::NIL {
            return Ok(None);
        }
        let (payload, _ann, left, right) = read_seq_node(arena, node_off)?;
        let left_ann = subtree_ann(arena, left)?;
        let left_count = left_ann.lines_in_window(d_lo, d_hi);
        let mid_in_window = payload.call_depth >= d_lo && payload.call_depth < d_hi;
        if remaining < left_count {
            node_off = left;
        } else if remaining < left_count + mid_in_window as u64 {
            return Ok(Some(payload.first_line));
        } else {
            remaining -= left_count + mid_in_window as u64;
            node_off = right;
        }
    }
}

/// §4.4 `lrt_translate`: find the `n`-th (zero-based) trace line whose
/// call depth lies in the input window, and return the number of lines
/// preceding *that* one whose depth lies in the output window. Undefined
/// (returns `0`) if the input-window selection itself is out of range —
/// callers who need to detect that use [`lrt_translate_may_fail`].
#[allow(clippy::too_many_arguments)]
pub fn lrt_translate<Ar: Arena>(
    arena: &Ar,
    root: Off,
    n: u64,
    in_lo: Depth,
    in_hi: Depth,
    out_lo: Depth,
    out_hi: Depth,
) -> tarmac_tree::arena::Result<u64> {
    match lrt_select(arena, root, n, in_lo, in_hi)? {
        Some(line) => lrt_rank(arena, root, line, out_lo, out_hi),
        None => Ok(0),
    }
}

/// §4.4 `lrt_translate_may_fail`: like [`lrt_translate`], but reports
/// whether the `n`-th input-window selection succeeded.
#[allow(clippy::too_many_arguments)]
pub fn lrt_translate_may_fail<Ar: Arena>(
    arena: &Ar,
    root: Off,
    n: u64,
    in_lo: Depth,
    in_hi: Depth,
    out_lo: Depth,
    out_hi: Depth,
) -> tarmac_tree::arena::Result<(bool, u64)> {
    match lrt_select(arena, root, n, in_lo, in_hi)? {
        Some(line) => Ok((true, lrt_rank(arena, root, line, out_lo, out_hi)?)),
        None => Ok((false, 0)),
    }
}

/// Summary counters for the `index` subcommand: total trace lines indexed,
/// retired instructions, and the deepest call stack seen (clamped to
/// [`MAX_DEPTH`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub lines: u64,
    pub instructions: u64,
    pub max_depth: Depth,
}

/// Reads the root LRT annotation directly rather than walking every node.
pub fn stats<Ar: Arena>(arena: &Ar, root: Off) -> tarmac_tree::arena::Result<IndexStats> {
    if root == tarmac_tree::NIL {
        return Ok(IndexStats::default());
    }
    let ann = subtree_ann(arena, root)?;
    let max_depth = (0..=MAX_DEPTH).rev().find(|&d| ann.lines_at_or_above(d) > 0).unwrap_or(0);
    Ok(IndexStats { lines: ann.lines_at_or_above(0), instructions: ann.insns_at_or_above(0), max_depth })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarmac_tree::ArenaWriter;

    fn writer() -> ArenaWriter {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
        ArenaWriter::create(path, false, false).unwrap()
    }

    fn node(line: Line, depth: Depth) -> SequentialPayload {
        SequentialPayload {
            first_line: line,
            line_extent: 1,
            byte_pos: 0,
            byte_extent: 10,
            mod_time: line - 1,
            pc: 0x1000,
            memory_root: 0,
            call_depth: depth,
            is_retire: true,
        }
    }

    #[test]
    fn node_at_line_and_time_s1() {
        let mut w = writer();
        let mut root = tarmac_tree::NIL;
        for line in 1..=3u32 {
            root = insert(&mut w, root, node(line, 0)).unwrap();
        }
        let at2 = node_at_line(&w, root, 2).unwrap().unwrap();
        assert_eq!(at2.first_line, 2);
        assert_eq!(node_at_time(&w, root, 1).unwrap().unwrap().first_line, 2);
    }

    #[test]
    fn lrt_rank_and_select_match_depth_sequence_s2() {
        // depth sequence 0,1,1,2,1,0 across lines 1..=6
        let depths = [0, 1, 1, 2, 1, 0];
        let mut w = writer();
        let mut root = tarmac_tree::NIL;
        for (i, &d) in depths.iter().enumerate() {
            root = insert(&mut w, root, node(i as u32 + 1, d)).unwrap();
        }
        let rank = lrt_rank(&w, root, 6, 0, Depth::MAX).unwrap();
        assert_eq!(rank, 5);

        // subsequence with depth >= 1: lines 2,3,4,5 -> 4th (index 3) is line 5.
        let line = lrt_select(&w, root, 3, 1, 3).unwrap().unwrap();
        assert_eq!(line, 5);
    }

    #[test]
    fn previous_and_next_and_buffer_limits() {
        let mut w = writer();
        let mut root = tarmac_tree::NIL;
        for line in 1..=5u32 {
            root = insert(&mut w, root, node(line, 0)).unwrap();
        }
        let mid = node_at_line(&w, root, 3).unwrap().unwrap();
        assert_eq!(previous_node(&w, root, &mid).unwrap().unwrap().first_line, 2);
        assert_eq!(next_node(&w, root, &mid).unwrap().unwrap().first_line, 4);
        assert_eq!(find_buffer_limit(&w, root, false).unwrap().unwrap().first_line, 1);
        assert_eq!(find_buffer_limit(&w, root, true).unwrap().unwrap().first_line, 5);
    }

    #[test]
    fn stats_summarize_lines_instructions_and_max_depth() {
        let depths = [0, 1, 1, 2, 1, 0];
        let mut w = writer();
        let mut root = tarmac_tree::NIL;
        for (i, &d) in depths.iter().enumerate() {
            root = insert(&mut w, root, node(i as u32 + 1, d)).unwrap();
        }
        let s = stats(&w, root).unwrap();
        assert_eq!(s.lines, 6);
        assert_eq!(s.instructions, 6);
        assert_eq!(s.max_depth, 2);
    }

    #[test]
    fn stats_on_empty_tree_is_zero() {
        let w = writer();
        assert_eq!(stats(&w, tarmac_tree::NIL).unwrap(), IndexStats::default());
    }

    #[test]
    fn lrt_translate_composes_select_then_rank() {
        // depth sequence 0,1,1,2,1,0 across lines 1..=6; depth>=1 subsequence
        // is lines 2,3,4,5. The 3rd (index 3, zero-based) is line 5 -- and
        // 2 lines before it (lines 1..4) have depth in [0, 1) (just line 1).
        let depths = [0, 1, 1, 2, 1, 0];
        let mut w = writer();
        let mut root = tarmac_tree::NIL;
        for (i, &d) in depths.iter().enumerate() {
            root = insert(&mut w, root, node(i as u32 + 1, d)).unwrap();
        }
        let k = lrt_translate(&w, root, 3, 1, Depth::MAX, 0, 1).unwrap();
        assert_eq!(k, 1);

        let (ok, _) = lrt_translate_may_fail(&w, root, 3, 1, Depth::MAX, 0, 1).unwrap();
        assert!(ok);
        let (ok, _) = lrt_translate_may_fail(&w, root, 99, 1, Depth::MAX, 0, 1).unwrap();
        assert!(!ok);
    }
}
