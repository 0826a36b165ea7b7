//! C3: the memory tree (§4.3).
//!
//! A persistent map from disjoint `[lo, hi]` byte ranges (tagged `space`)
//! to blob contents, keyed by `(space, lo)`. "Writing" a range shaves or
//! removes every payload it overlaps and inserts a fresh payload covering
//! exactly the written bytes.

use std::cmp::Ordering;

use tarmac_core::{Addr, Line, Off, Space};
use tarmac_tree::{Annotated, Arena, ArenaMut, KeyCmp, Payload, NIL};

/// A leaf of the memory tree (§3.1). `contents` addresses either a raw
/// blob (`raw == true`) or a memory sub-tree root (`raw == false`) when
/// the range has been shaved by a partial overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPayload {
    pub space: Space,
    pub lo: Addr,
    pub hi: Addr,
    pub raw: bool,
    pub contents: Off,
    pub last_write_line: Line,
}

impl MemoryPayload {
    fn intersects(&self, space: Space, lo: Addr, hi: Addr) -> bool {
        self.space == space && self.lo <= hi && lo <= self.hi
    }
}

impl Payload for MemoryPayload {
    // space:1 + lo:8 + hi:8 + raw:1 + contents:8 + last_write_line:4
    const ENCODED_LEN: usize = 1 + 8 + 8 + 1 + 8 + 4;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.space.tag();
        buf[1..9].copy_from_slice(&self.lo.to_le_bytes());
        buf[9..17].copy_from_slice(&self.hi.to_le_bytes());
        buf[17] = self.raw as u8;
        buf[18..26].copy_from_slice(&self.contents.to_le_bytes());
        buf[26..30].copy_from_slice(&self.last_write_line.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        MemoryPayload {
            space: Space::from_tag(buf[0]).expect("valid space tag"),
            lo: Addr::from_le_bytes(buf[1..9].try_into().unwrap()),
            hi: Addr::from_le_bytes(buf[9..17].try_into().unwrap()),
            raw: buf[17] != 0,
            contents: Off::from_le_bytes(buf[18..26].try_into().unwrap()),
            last_write_line: Line::from_le_bytes(buf[26..30].try_into().unwrap()),
        }
    }
}

fn space_order(s: Space) -> u8 {
    s.tag()
}

impl KeyCmp<MemoryPayload> for MemoryPayload {
    fn key_cmp(&self, other: &MemoryPayload) -> Ordering {
        (space_order(self.space), self.lo).cmp(&(space_order(other.space), other.lo))
    }
}

/// A lookup key for the outer memory tree: `(space, addr)`.
#[derive(Debug, Clone, Copy)]
pub struct MemKey {
    pub space: Space,
    pub addr: Addr,
}

impl KeyCmp<MemoryPayload> for MemKey {
    fn key_cmp(&self, payload: &MemoryPayload) -> Ordering {
        (space_order(self.space), self.addr).cmp(&(space_order(payload.space), payload.lo))
    }
}

/// The "latest write" annotation (§3.2): the max `last_write_line` over a
/// subtree, used to prune [`find_next_mod`] descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAnnotation {
    pub latest: Line,
}

impl Annotated<MemoryPayload> for MemAnnotation {
    const ENCODED_LEN: usize = 4;

    fn identity() -> Self {
        MemAnnotation { latest: 0 }
    }

    fn leaf(payload: &MemoryPayload) -> Self {
        MemAnnotation { latest: payload.last_write_line }
    }

    fn combine(left: &Self, mid: &Self, right: &Self) -> Self {
        MemAnnotation { latest: left.latest.max(mid.latest).max(right.latest) }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.latest.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        MemAnnotation { latest: Line::from_le_bytes(buf.try_into().unwrap()) }
    }
}

/// A leaf of the inner memory sub-tree (§3.6): always a raw blob
/// reference, covering a sub-range of the outer shaved payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMemoryPayload {
    pub lo: Addr,
    pub hi: Addr,
    pub contents: Off,
}

impl Payload for SubMemoryPayload {
    const ENCODED_LEN: usize = 8 + 8 + 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.lo.to_le_bytes());
        buf[8..16].copy_from_slice(&self.hi.to_le_bytes());
        buf[16..24].copy_from_slice(&self.contents.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        SubMemoryPayload {
            lo: Addr::from_le_bytes(buf[0..8].try_into().unwrap()),
            hi: Addr::from_le_bytes(buf[8..16].try_into().unwrap()),
            contents: Off::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

impl KeyCmp<SubMemoryPayload> for SubMemoryPayload {
    fn key_cmp(&self, other: &SubMemoryPayload) -> Ordering {
        self.lo.cmp(&other.lo)
    }
}

#[derive(Debug, Clone, Copy)]
struct SubMemKey {
    addr: Addr,
}

impl KeyCmp<SubMemoryPayload> for SubMemKey {
    fn key_cmp(&self, payload: &SubMemoryPayload) -> Ordering {
        self.addr.cmp(&payload.lo)
    }
}

fn write_blob<Ar: ArenaMut>(arena: &mut Ar, bytes: &[u8]) -> tarmac_tree::arena::Result<Off> {
    arena.append(bytes, 1)
}

fn read_blob<Ar: Arena>(arena: &Ar, off: Off, len: usize) -> tarmac_tree::arena::Result<Vec<u8>> {
    arena.read_bytes(off, len)
}

/// Collect every payload whose range intersects `[lo, hi]`. Ranges are
/// disjoint and keyed ascending by `lo`, so predecessor-then-walk-right
/// finds them all.
fn intersecting<Ar: Arena>(
    arena: &Ar,
    root: Off,
    space: Space,
    lo: Addr,
    hi: Addr,
) -> tarmac_tree::arena::Result<Vec<MemoryPayload>> {
    let mut out = Vec::new();

    // The payload starting exactly at `lo`, if any (neither predecessor
    // nor successor of `lo` matches an exact key).
    if let Some(exact) =
        tarmac_tree::find::<MemoryPayload, MemAnnotation, _, _>(arena, root, &MemKey { space, addr: lo })?
    {
        if exact.intersects(space, lo, hi) {
            out.push(exact);
        }
    }

    // The one payload that may start before `lo` and straddle it.
    if let Some(pred) =
        tarmac_tree::predecessor::<MemoryPayload, MemAnnotation, _, _>(arena, root, &MemKey { space, addr: lo })?
    {
        if pred.intersects(space, lo, hi) {
            out.push(pred);
        }
    }

    // Every payload whose key lies strictly inside (lo, hi].
    let mut cur_key = MemKey { space, addr: lo };
    loop {
        match tarmac_tree::successor::<MemoryPayload, MemAnnotation, _, _>(arena, root, &cur_key)? {
            Some(p) if p.space == space && p.lo <= hi => {
                out.push(p);
                cur_key = MemKey { space, addr: p.lo };
            }
            _ => break,
        }
    }
    Ok(out)
}

/// Remove the overlapping sub-range `[lo, hi]` from a shaved payload's
/// inner sub-tree (or create one, if this is the first shave of a raw
/// payload), returning the replacement outer payload for what remains of
/// `old` outside `[lo, hi]`.
fn shave<Ar: ArenaMut>(
    arena: &mut Ar,
    old: MemoryPayload,
    lo: Addr,
    hi: Addr,
) -> tarmac_tree::arena::Result<MemoryPayload> {
    let sub_root = if old.raw {
        let mut root = NIL;
        if old.lo < lo {
            let len = (lo - old.lo) as usize;
            let bytes = read_blob(arena, old.contents, (old.hi - old.lo + 1) as usize)?;
            let blob = write_blob(arena, &bytes[..len])?;
            root = tarmac_tree::insert::<SubMemoryPayload, tarmac_tree::NoAnnotation, _>(
                arena,
                root,
                SubMemoryPayload { lo: old.lo, hi: lo - 1, contents: blob },
            )?;
        }
        if old.hi > hi {
            let skip = (hi + 1 - old.lo) as usize;
            let bytes = read_blob(arena, old.contents, (old.hi - old.lo + 1) as usize)?;
            let blob = write_blob(arena, &bytes[skip..])?;
            root = tarmac_tree::insert::<SubMemoryPayload, tarmac_tree::NoAnnotation, _>(
                arena,
                root,
                SubMemoryPayload { lo: hi + 1, hi: old.hi, contents: blob },
            )?;
        }
        root
    } else {
        let mut root = old.contents;
        let members = collect_sub(arena, root)?;
        for m in members {
            if m.hi < lo || m.lo > hi {
                continue;
            }
            root = tarmac_tree::remove::<SubMemoryPayload, tarmac_tree::NoAnnotation, _, _>(
                arena,
                root,
                &SubMemKey { addr: m.lo },
            )?;
            if m.lo < lo {
                let keep_len = (lo - m.lo) as usize;
                let bytes = read_blob(arena, m.contents, (m.hi - m.lo + 1) as usize)?;
                let blob = write_blob(arena, &bytes[..keep_len])?;
                root = tarmac_tree::insert::<SubMemoryPayload, tarmac_tree::NoAnnotation, _>(
                    arena,
                    root,
                    SubMemoryPayload { lo: m.lo, hi: lo - 1, contents: blob },
                )?;
            }
            if m.hi > hi {
                let skip = (hi + 1 - m.lo) as usize;
                let bytes = read_blob(arena, m.contents, (m.hi - m.lo + 1) as usize)?;
                let blob = write_blob(arena, &bytes[skip..])?;
                root = tarmac_tree::insert::<SubMemoryPayload, tarmac_tree::NoAnnotation, _>(
                    arena,
                    root,
                    SubMemoryPayload { lo: hi + 1, hi: m.hi, contents: blob },
                )?;
            }
        }
        root
    };
    Ok(MemoryPayload { space: old.space, lo: old.lo, hi: old.hi, raw: false, contents: sub_root, last_write_line: old.last_write_line })
}

fn collect_sub<Ar: Arena>(arena: &Ar, root: Off) -> tarmac_tree::arena::Result<Vec<SubMemoryPayload>> {
    let mut out = Vec::new();
    tarmac_tree::walk::<SubMemoryPayload, tarmac_tree::NoAnnotation, _>(
        arena,
        root,
        tarmac_tree::Order::InOrder,
        &mut |p| out.push(*p),
    )?;
    Ok(out)
}

/// Write `bytes` (length `bytes.len()`) at `[addr, addr+bytes.len())` in
/// `space`, stamping `line` as the write's `last_write_line`. Returns the
/// new tree root (§4.3).
pub fn write<Ar: ArenaMut>(
    arena: &mut Ar,
    old_root: Off,
    space: Space,
    addr: Addr,
    bytes: &[u8],
    line: Line,
) -> tarmac_tree::arena::Result<Off> {
    if bytes.is_empty() {
        return Ok(old_root);
    }
    let hi = addr + bytes.len() as Addr - 1;
    let mut root = old_root;

    for victim in intersecting(arena, old_root, space, addr, hi)? {
        root = tarmac_tree::remove::<MemoryPayload, MemAnnotation, _, _>(
            arena,
            root,
            &MemKey { space, addr: victim.lo },
        )?;
        let fully_contained = addr <= victim.lo && victim.hi <= hi;
        if fully_contained {
            continue;
        }
        if victim.lo < addr {
            let left = shave(arena, victim, addr.max(victim.lo), victim.hi.min(hi))?;
            // Keep only the portion of `left` that remains outside [addr,hi].
            let kept = MemoryPayload { hi: (addr - 1).min(victim.hi), ..left };
            root = tarmac_tree::insert::<MemoryPayload, MemAnnotation, _>(arena, root, kept)?;
        }
        if victim.hi > hi {
            let right = shave(arena, victim, victim.lo.max(addr), hi.min(victim.hi))?;
            let kept = MemoryPayload { lo: (hi + 1).max(victim.lo), ..right };
            root = tarmac_tree::insert::<MemoryPayload, MemAnnotation, _>(arena, root, kept)?;
        }
    }

    let blob = write_blob(arena, bytes)?;
    let payload = MemoryPayload { space, lo: addr, hi, raw: true, contents: blob, last_write_line: line };
    tarmac_tree::insert::<MemoryPayload, MemAnnotation, _>(arena, root, payload)
}

/// Read `size` bytes at `[addr, addr+size)` in `space` (§4.3). Bytes not
/// covered by any payload come back as `0` with `defined_mask` bit unset.
/// `last_write_line` is the max over every payload that contributed a
/// defined byte.
pub fn read<Ar: Arena>(
    arena: &Ar,
    root: Off,
    space: Space,
    addr: Addr,
    size: usize,
) -> tarmac_tree::arena::Result<(Vec<u8>, Vec<bool>, Line)> {
    let mut out = vec![0u8; size];
    let mut defined = vec![false; size];
    let mut last_line = 0;
    if size == 0 {
        return Ok((out, defined, last_line));
    }
    let hi = addr + size as Addr - 1;
    for payload in intersecting(arena, root, space, addr, hi)? {
        last_line = last_line.max(payload.last_write_line);
        fill_from_payload(arena, &payload, addr, &mut out, &mut defined)?;
    }
    Ok((out, defined, last_line))
}

fn fill_from_payload<Ar: Arena>(
    arena: &Ar,
    payload: &MemoryPayload,
    base_addr: Addr,
    out: &mut [u8],
    defined: &mut [bool],
) -> tarmac_tree::arena::Result<()> {
    if payload.raw {
        let bytes = read_blob(arena, payload.contents, (payload.hi - payload.lo + 1) as usize)?;
        for (i, &b) in bytes.iter().enumerate() {
            let a = payload.lo + i as Addr;
            if a < base_addr || (a - base_addr) as usize >= out.len() {
                continue;
            }
            let idx = (a - base_addr) as usize;
            out[idx] = b;
            defined[idx] = true;
        }
    } else {
        for sub in collect_sub(arena, payload.contents)? {
            let bytes = read_blob(arena, sub.contents, (sub.hi - sub.lo + 1) as usize)?;
            for (i, &b) in bytes.iter().enumerate() {
                let a = sub.lo + i as Addr;
                if a < base_addr || (a - base_addr) as usize >= out.len() {
                    continue;
                }
                let idx = (a - base_addr) as usize;
                out[idx] = b;
                defined[idx] = true;
            }
        }
    }
    Ok(())
}

/// Direction for [`find_next_mod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Find the smallest (or largest, per `direction`) range intersecting
/// `[addr, ..)` whose `last_write_line >= min_line` (§4.3). Prunes
/// subtrees via the `latest` annotation rather than visiting every node.
pub fn find_next_mod<Ar: Arena>(
    arena: &Ar,
    root: Off,
    space: Space,
    addr: Addr,
    min_line: Line,
    direction: Direction,
) -> tarmac_tree::arena::Result<Option<(Addr, Addr)>> {
    let mut best: Option<MemoryPayload> = None;
    find_next_mod_rec(arena, root, space, addr, min_line, direction, &mut best)?;
    Ok(best.map(|p| (p.lo, p.hi)))
}

fn find_next_mod_rec<Ar: Arena>(
    arena: &Ar,
    node_off: Off,
    space: Space,
    addr: Addr,
    min_line: Line,
    direction: Direction,
    best: &mut Option<MemoryPayload>,
) -> tarmac_tree::arena::Result<()> {
    if node_off == NIL {
        return Ok(());
    }
    let ann = tarmac_tree::subtree_annotation::<MemoryPayload, MemAnnotation, _>(arena, node_off)?;
    if ann.latest < min_line {
        return Ok(());
    }
    let (left, right, payload) = read_node_raw(arena, node_off)?;

    match direction {
        Direction::Forward => {
            find_next_mod_rec(arena, left, space, addr, min_line, direction, best)?;
            if best.is_none()
                && payload.space == space
                && payload.hi >= addr
                && payload.last_write_line >= min_line
            {
                *best = Some(payload);
            }
            if best.is_none() {
                find_next_mod_rec(arena, right, space, addr, min_line, direction, best)?;
            }
        }
        Direction::Backward => {
            find_next_mod_rec(arena, right, space, addr, min_line, direction, best)?;
            if best.is_none()
                && payload.space == space
                && payload.lo <= addr
                && payload.last_write_line >= min_line
            {
                *best = Some(payload);
            }
            if best.is_none() {
                find_next_mod_rec(arena, left, space, addr, min_line, direction, best)?;
            }
        }
    }
    Ok(())
}

fn read_node_raw<Ar: Arena>(
    arena: &Ar,
    off: Off,
) -> tarmac_tree::arena::Result<(Off, Off, MemoryPayload)> {
    let len = MemoryPayload::ENCODED_LEN + MemAnnotation::ENCODED_LEN + 8 + 8 + 4;
    let bytes = arena.read_bytes(off, len)?;
    let payload = MemoryPayload::decode(&bytes[0..MemoryPayload::ENCODED_LEN]);
    let mut pos = MemoryPayload::ENCODED_LEN + MemAnnotation::ENCODED_LEN;
    let left = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let right = Off::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
    Ok((left, right, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarmac_tree::ArenaWriter;

    fn writer() -> ArenaWriter {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
        ArenaWriter::create(path, false, false).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut w = writer();
        let root = write(&mut w, NIL, Space::Memory, 0x2000, &[0xDE, 0xAD, 0xBE, 0xEF], 10).unwrap();
        let (bytes, def, line) = read(&w, root, Space::Memory, 0x2000, 4).unwrap();
        assert_eq!(bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(def.iter().all(|&d| d));
        assert_eq!(line, 10);
    }

    #[test]
    fn overwrite_partial_range_shaves_old_payload_s3() {
        let mut w = writer();
        let mut root = write(&mut w, NIL, Space::Memory, 0x2000, &[0xDE, 0xAD, 0xBE, 0xEF], 10).unwrap();
        root = write(&mut w, root, Space::Memory, 0x2001, &[0xCA, 0xFE], 20).unwrap();
        let (bytes, def, line) = read(&w, root, Space::Memory, 0x2000, 4).unwrap();
        assert_eq!(bytes, vec![0xDE, 0xCA, 0xFE, 0xEF]);
        assert!(def.iter().all(|&d| d));
        assert_eq!(line, 20);

        let r = find_next_mod(&w, root, Space::Memory, 0x1000, 15, Direction::Forward).unwrap();
        assert_eq!(r, Some((0x2001, 0x2002)));
    }

    #[test]
    fn undefined_bytes_report_zero_and_unset_mask() {
        let w = writer();
        let (bytes, def, line) = read(&w, NIL, Space::Memory, 0x3000, 4).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert!(def.iter().all(|&d| !d));
        assert_eq!(line, 0);
    }

    #[test]
    fn disjoint_ranges_coexist() {
        let mut w = writer();
        let mut root = write(&mut w, NIL, Space::Memory, 0x1000, &[1, 2, 3], 1).unwrap();
        root = write(&mut w, root, Space::Register, 0x1000, &[9, 9, 9], 2).unwrap();
        let (mem_bytes, _, _) = read(&w, root, Space::Memory, 0x1000, 3).unwrap();
        let (reg_bytes, _, _) = read(&w, root, Space::Register, 0x1000, 3).unwrap();
        assert_eq!(mem_bytes, vec![1, 2, 3]);
        assert_eq!(reg_bytes, vec![9, 9, 9]);
    }

    #[test]
    fn fully_contained_overwrite_removes_old_payload() {
        let mut w = writer();
        let mut root = write(&mut w, NIL, Space::Memory, 0x1000, &[1, 2, 3, 4], 1).unwrap();
        root = write(&mut w, root, Space::Memory, 0x1000, &[9, 9, 9, 9], 2).unwrap();
        let (bytes, _, line) = read(&w, root, Space::Memory, 0x1000, 4).unwrap();
        assert_eq!(bytes, vec![9, 9, 9, 9]);
        assert_eq!(line, 2);
    }
}
