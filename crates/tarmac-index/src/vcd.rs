//! VCD output (§6 "VCD output"): a value-change dump of register state
//! across a trace's sequential tree, in the IEEE 1364-2005
//! `$var`/`$scope`/`$dumpvars`/`$end` grammar. Identifiers are assigned
//! densely from the printable-ASCII range `!`..`~` (base-94).

use std::fmt::Write as _;

use tarmac_core::{Off, RegisterId, Space};
use tarmac_tree::Arena;

use crate::{memtree, seqtree};

const VCD_BASE: u64 = 94;

/// The `n`-th densely-assigned VCD identifier (zero-based), drawn from the
/// 94 printable ASCII characters `!`..`~`.
pub fn vcd_identifier(mut n: u64) -> String {
    let mut digits = vec![(n % VCD_BASE) as u8];
    n /= VCD_BASE;
    while n > 0 {
        digits.push((n % VCD_BASE) as u8);
        n /= VCD_BASE;
    }
    digits.reverse();
    digits.into_iter().map(|d| (b'!' + d) as char).collect()
}

/// MSB-first bit string for a register read, with undefined bytes
/// rendered as `x` bits (§7 "Parse": undefined state shows as unknown,
/// never a fabricated value).
fn reg_bitstring(bytes: &[u8], mask: &[bool]) -> String {
    let mut s = String::with_capacity(bytes.len() * 8);
    for (i, byte) in bytes.iter().enumerate() {
        let defined = mask.get(i).copied().unwrap_or(false);
        for bit in (0..8).rev() {
            s.push(if !defined { 'x' } else if (byte >> bit) & 1 == 1 { '1' } else { '0' });
        }
    }
    s
}

/// Dump `registers`' values over every node in the sequential tree as a
/// VCD stream, timescale `timescale_ns` nanoseconds.
pub fn write_vcd<Ar: Arena>(
    arena: &Ar,
    seq_root: Off,
    registers: &[RegisterId],
    timescale_ns: u32,
    out: &mut String,
) -> tarmac_tree::arena::Result<()> {
    let ids: Vec<String> = (0..registers.len() as u64).map(vcd_identifier).collect();

    writeln!(out, "$timescale {timescale_ns}ns $end").unwrap();
    writeln!(out, "$scope module tarmac $end").unwrap();
    for (reg, id) in registers.iter().zip(&ids) {
        let (_, width) = tarmac_core::resolve_register(*reg, 0).unwrap_or((0, 1));
        writeln!(out, "$var wire {} {id} {reg} $end", width * 8).unwrap();
    }
    writeln!(out, "$upscope $end").unwrap();
    writeln!(out, "$enddefinitions $end").unwrap();

    let mut last: Vec<Option<String>> = vec![None; registers.len()];
    let mut dumped_header = false;
    let mut node_off = seqtree::find_buffer_limit(arena, seq_root, false)?;

    while let Some(node) = node_off {
        let iflags = {
            let (bytes, _mask, _line) = memtree::read(arena, node.memory_root, Space::Register, 0x4000, 4)?;
            u32::from_le_bytes(bytes.try_into().unwrap())
        };
        let mut bitstrings = Vec::with_capacity(registers.len());
        for reg in registers {
            let bits = match tarmac_core::resolve_register(*reg, iflags) {
                Some((addr, width)) => {
                    let (bytes, mask, _line) =
                        memtree::read(arena, node.memory_root, Space::Register, addr, width as usize)?;
                    reg_bitstring(&bytes, &mask)
                }
                None => "x".to_string(),
            };
            bitstrings.push(bits);
        }

        if !dumped_header {
            writeln!(out, "#{}", node.mod_time).unwrap();
            writeln!(out, "$dumpvars").unwrap();
            for (bits, id) in bitstrings.iter().zip(&ids) {
                writeln!(out, "b{bits} {id}").unwrap();
            }
            writeln!(out, "$end").unwrap();
            last = bitstrings.into_iter().map(Some).collect();
            dumped_header = true;
        } else {
            let mut body = String::new();
            let mut any = false;
            for (i, bits) in bitstrings.iter().enumerate() {
                if last[i].as_deref() != Some(bits.as_str()) {
                    writeln!(body, "b{bits} {}", ids[i]).unwrap();
                    last[i] = Some(bits.clone());
                    any = true;
                }
            }
            if any {
                writeln!(out, "#{}", node.mod_time).unwrap();
                out.push_str(&body);
            }
        }

        node_off = seqtree::next_node(arena, seq_root, &node)?;
    }
    Ok(())
}
