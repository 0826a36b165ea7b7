//! Register id parsing and the flat register address map (§4.7, §9).
//!
//! The register space is a flat byte array partitioned by register-class
//! prefix. Each class has a descriptor giving its slot width, element
//! count and either a fixed stride (ordinary classes) or a dependency on
//! another class (the AArch32/AArch64 single/double FP aliases, and the
//! 32-bit view of the 64-bit general registers).

use crate::types::Addr;

/// One register-class prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegPrefix {
    /// AArch32 general-purpose registers r0..r15.
    R,
    /// AArch64 general-purpose registers x0..x30.
    X,
    /// 32-bit view of the AArch64 general registers (w0..w30).
    W,
    /// 128-bit vector registers q0..q31.
    Q,
    /// 64-bit view of the vector registers (d0..d31).
    D,
    /// 32-bit view of the vector registers (s0..s31).
    S,
    /// Program status register (cpsr alias).
    Psr,
    /// Program counter.
    Pc,
    /// AArch64 stack pointer.
    Sp,
    /// Pseudo-register holding architectural mode flags; not a real
    /// register name, excluded from name lookup.
    InternalFlags,
}

const ALL_PREFIXES: &[RegPrefix] = &[
    RegPrefix::R,
    RegPrefix::X,
    RegPrefix::W,
    RegPrefix::Q,
    RegPrefix::D,
    RegPrefix::S,
    RegPrefix::Psr,
    RegPrefix::Pc,
    RegPrefix::Sp,
    RegPrefix::InternalFlags,
];

/// A register reference: a class prefix plus an index within that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId {
    pub prefix: RegPrefix,
    pub index: u32,
}

impl RegisterId {
    pub const fn new(prefix: RegPrefix, index: u32) -> Self {
        RegisterId { prefix, index }
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = class_info(self.prefix);
        write!(f, "{}", info.name)?;
        if info.count > 1 {
            write!(f, "{}", self.index)?;
        }
        Ok(())
    }
}

struct ClassInfo {
    name: &'static str,
    slot_size: u32,
    count: u32,
    layout: Layout,
}

enum Layout {
    /// A plain bank of `count` registers of `slot_size` bytes each, laid
    /// out at `base + index * stride`.
    Plain { base: Addr, stride: u32 },
    /// Low `slot_size` bytes of the corresponding `x` register.
    WAlias,
    /// Low `slot_size` bytes of the corresponding `q` register, with
    /// AArch32 and AArch64 computing a different address (§4.7).
    FpAlias,
}

fn class_info(prefix: RegPrefix) -> ClassInfo {
    match prefix {
        RegPrefix::R => ClassInfo {
            name: "r",
            slot_size: 4,
            count: 16,
            layout: Layout::Plain { base: 0x0000, stride: 4 },
        },
        RegPrefix::X => ClassInfo {
            name: "x",
            slot_size: 8,
            count: 31,
            layout: Layout::Plain { base: 0x1000, stride: 8 },
        },
        RegPrefix::W => {
            ClassInfo { name: "w", slot_size: 4, count: 31, layout: Layout::WAlias }
        }
        RegPrefix::Q => ClassInfo {
            name: "q",
            slot_size: 16,
            count: 32,
            layout: Layout::Plain { base: 0x2000, stride: 16 },
        },
        RegPrefix::D => ClassInfo { name: "d", slot_size: 8, count: 32, layout: Layout::FpAlias },
        RegPrefix::S => ClassInfo { name: "s", slot_size: 4, count: 32, layout: Layout::FpAlias },
        RegPrefix::Psr => ClassInfo {
            name: "psr",
            slot_size: 4,
            count: 1,
            layout: Layout::Plain { base: 0x3000, stride: 4 },
        },
        RegPrefix::Pc => ClassInfo {
            name: "pc",
            slot_size: 8,
            count: 1,
            layout: Layout::Plain { base: 0x3010, stride: 8 },
        },
        RegPrefix::Sp => ClassInfo {
            name: "sp",
            slot_size: 8,
            count: 1,
            layout: Layout::Plain { base: 0x3020, stride: 8 },
        },
        RegPrefix::InternalFlags => ClassInfo {
            name: "iflags",
            slot_size: 4,
            count: 1,
            layout: Layout::Plain { base: 0x4000, stride: 4 },
        },
    }
}

const X_BASE: Addr = 0x1000;
const Q_BASE: Addr = 0x2000;

/// Resolve a [`RegisterId`] to its byte offset and width within the
/// register address space, given the current `iflags` (bit 0 = AArch64).
///
/// Returns `None` if `index` is out of range for the class.
pub fn resolve(reg: RegisterId, iflags: u32) -> Option<(Addr, u32)> {
    let info = class_info(reg.prefix);
    if reg.index >= info.count {
        return None;
    }
    let aarch64 = iflags & 1 != 0;
    let offset = match info.layout {
        Layout::Plain { base, stride } => base + (reg.index as Addr) * (stride as Addr),
        Layout::WAlias => X_BASE + (reg.index as Addr) * 8,
        Layout::FpAlias if reg.prefix == RegPrefix::D => {
            if aarch64 {
                Q_BASE + (reg.index as Addr) * 16
            } else {
                Q_BASE + (reg.index as Addr / 2) * 16 + (reg.index as Addr % 2) * 8
            }
        }
        Layout::FpAlias => {
            // s registers.
            if aarch64 {
                Q_BASE + (reg.index as Addr) * 16
            } else {
                Q_BASE + (reg.index as Addr / 4) * 16 + (reg.index as Addr % 4) * 4
            }
        }
    };
    Some((offset, info.slot_size))
}

fn split_name(name: &str) -> (&str, &str) {
    let digit_start = name.find(|c: char| c.is_ascii_digit()).unwrap_or(name.len());
    name.split_at(digit_start)
}

/// Parse a register name into a [`RegisterId`].
///
/// Preserves a quirk from the original implementation (§9 Open Questions):
/// an unsuffixed name (e.g. `"pc"`, not `"pc0"`) resolves only when the
/// matching class is a singleton; a suffixed name resolves only when the
/// class has more than one register.
pub fn lookup_reg_name(name: &str) -> Option<RegisterId> {
    let (prefix, suffix) = split_name(name);

    for &p in ALL_PREFIXES {
        if p == RegPrefix::InternalFlags {
            continue; // not a real register name
        }
        let info = class_info(p);
        if !prefix.eq_ignore_ascii_case(info.name) {
            continue;
        }
        if suffix.is_empty() {
            if info.count != 1 {
                continue;
            }
            return Some(RegisterId::new(p, 0));
        } else {
            if info.count == 1 {
                continue;
            }
            let index: u32 = suffix.parse().ok()?;
            if index >= info.count {
                continue;
            }
            return Some(RegisterId::new(p, index));
        }
    }

    // Aliases.
    if prefix.eq_ignore_ascii_case("msp") && suffix.is_empty() {
        return Some(RegisterId::new(RegPrefix::R, 13));
    }
    if prefix.eq_ignore_ascii_case("lr") && suffix.is_empty() {
        return Some(RegisterId::new(RegPrefix::R, 14));
    }
    if prefix.eq_ignore_ascii_case("cpsr") && suffix.is_empty() {
        return Some(RegisterId::new(RegPrefix::Psr, 0));
    }
    if prefix.eq_ignore_ascii_case("e") && !suffix.is_empty() {
        let index: u32 = suffix.parse().ok()?;
        if index < class_info(RegPrefix::X).count {
            return Some(RegisterId::new(RegPrefix::X, index));
        }
    }

    None
}
