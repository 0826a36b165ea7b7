//! C5: the by-PC tree (§4.5). Keyed by `(pc, first_line)`, so a successor
//! query answers "first occurrence of `pc` at or after line L". No
//! annotation.

use std::cmp::Ordering;

use tarmac_core::{Addr, Line, Off};
use tarmac_tree::{Arena, ArenaMut, KeyCmp, NoAnnotation, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByPcPayload {
    pub pc: Addr,
    pub first_line: Line,
}

impl Payload for ByPcPayload {
    const ENCODED_LEN: usize = 8 + 4;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.pc.to_le_bytes());
        buf[8..12].copy_from_slice(&self.first_line.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        ByPcPayload {
            pc: Addr::from_le_bytes(buf[0..8].try_into().unwrap()),
            first_line: Line::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }
}

impl KeyCmp<ByPcPayload> for ByPcPayload {
    fn key_cmp(&self, other: &ByPcPayload) -> Ordering {
        (self.pc, self.first_line).cmp(&(other.pc, other.first_line))
    }
}

/// Lookup key: the smallest payload with `(pc, first_line) > (pc, line)`.
#[derive(Debug, Clone, Copy)]
pub struct ByPcKey {
    pub pc: Addr,
    pub line: Line,
}

impl KeyCmp<ByPcPayload> for ByPcKey {
    fn key_cmp(&self, payload: &ByPcPayload) -> Ordering {
        (self.pc, self.line).cmp(&(payload.pc, payload.first_line))
    }
}

pub fn insert<Ar: ArenaMut>(arena: &mut Ar, root: Off, pc: Addr, first_line: Line) -> tarmac_tree::arena::Result<Off> {
    tarmac_tree::insert::<ByPcPayload, NoAnnotation, _>(arena, root, ByPcPayload { pc, first_line })
}

/// First occurrence of `pc` at or after `line` (§4.5).
pub fn find_next_instance<Ar: Arena>(
    arena: &Ar,
    root: Off,
    pc: Addr,
    line: Line,
) -> tarmac_tree::arena::Result<Option<ByPcPayload>> {
    if let Some(exact) =
        tarmac_tree::find::<ByPcPayload, NoAnnotation, _, _>(arena, root, &ByPcPayload { pc, first_line: line })?
    {
        return Ok(Some(exact));
    }
    let candidate =
        tarmac_tree::successor::<ByPcPayload, NoAnnotation, _, _>(arena, root, &ByPcKey { pc, line })?;
    Ok(candidate.filter(|c| c.pc == pc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarmac_tree::{ArenaWriter, NIL};

    fn writer() -> ArenaWriter {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path().to_path_buf();
        ArenaWriter::create(path, false, false).unwrap()
    }

    #[test]
    fn successor_after_line_is_next_pc_occurrence_property_7() {
        let mut w = writer();
        let mut root = NIL;
        for (pc, line) in [(0x1000, 1), (0x1004, 2), (0x1000, 3), (0x1000, 7)] {
            root = insert(&mut w, root, pc, line).unwrap();
        }
        let next = find_next_instance(&w, root, 0x1000, 4).unwrap().unwrap();
        assert_eq!(next.first_line, 7);
        let exact = find_next_instance(&w, root, 0x1000, 3).unwrap().unwrap();
        assert_eq!(exact.first_line, 3);
        assert!(find_next_instance(&w, root, 0x2000, 0).unwrap().is_none());
    }
}
