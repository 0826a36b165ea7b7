//! A line-oriented parser for the textual Tarmac trace format (§6).
//!
//! The real collaborator's grammar is out of scope for the core index
//! (§1: "specified only at its interface"); this crate implements a
//! minimal, explicit grammar sufficient to drive and test the indexer
//! end-to-end, documented here rather than reverse-engineered from a
//! production parser:
//!
//! ```text
//! IT <hex-pc> <E|N> <disassembly...>   instruction retire (E = executed)
//! R <reg-name> <hex-bytes>             register write
//! MW <hex-addr> <hex-bytes>            memory write
//! MR <hex-addr> <hex-bytes>            memory read
//! CALL                                 call-hint: next retire is a callee
//! RET                                  call-hint: next retire returns
//! ```
//! Blank lines and lines starting with `#` are ignored.

use tarmac_core::Addr;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized trace line: {0:?}")]
    Unrecognized(String),
    #[error("bad hex value {0:?} in trace line")]
    BadHex(String),
    #[error("unknown register name {0:?}")]
    BadRegister(String),
    #[error("truncated trace line: {0:?}")]
    Truncated(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallHint {
    Call,
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    InstructionRetire { pc: Addr, disassembly: String, executed: bool },
    RegisterWrite { reg: tarmac_core::RegisterId, bytes: Vec<u8> },
    MemoryAccess { addr: Addr, bytes: Vec<u8>, read: bool },
    Call(CallHint),
}

fn parse_hex_addr(s: &str) -> Result<Addr> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Addr::from_str_radix(s, 16).map_err(|_| ParseError::BadHex(s.to_string()))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(ParseError::BadHex(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ParseError::BadHex(s.to_string())))
        .collect()
}

/// Parse one trace line, returning `None` for blank/comment lines that
/// carry no event.
pub fn parse(line: &str) -> Result<Option<Event>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace();
    let tag = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
    match tag {
        "IT" => {
            let pc = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let pc = parse_hex_addr(pc)?;
            let exec = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let executed = match exec {
                "E" => true,
                "N" => false,
                _ => return Err(ParseError::Unrecognized(line.to_string())),
            };
            let disassembly = tokens.collect::<Vec<_>>().join(" ");
            Ok(Some(Event::InstructionRetire { pc, disassembly, executed }))
        }
        "R" => {
            let name = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let bytes_tok = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let reg = tarmac_core::lookup_reg_name(name)
                .ok_or_else(|| ParseError::BadRegister(name.to_string()))?;
            let bytes = parse_hex_bytes(bytes_tok)?;
            Ok(Some(Event::RegisterWrite { reg, bytes }))
        }
        "MW" | "MR" => {
            let addr = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let addr = parse_hex_addr(addr)?;
            let bytes_tok = tokens.next().ok_or_else(|| ParseError::Truncated(line.to_string()))?;
            let bytes = parse_hex_bytes(bytes_tok)?;
            Ok(Some(Event::MemoryAccess { addr, bytes, read: tag == "MR" }))
        }
        "CALL" => Ok(Some(Event::Call(CallHint::Call))),
        "RET" => Ok(Some(Event::Call(CallHint::Return))),
        _ => Err(ParseError::Unrecognized(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instruction_retire() {
        let ev = parse("IT 0x1000 E mov r0, #1").unwrap().unwrap();
        assert_eq!(
            ev,
            Event::InstructionRetire { pc: 0x1000, disassembly: "mov r0, #1".to_string(), executed: true }
        );
    }

    #[test]
    fn parses_register_write() {
        let ev = parse("R r0 00000001").unwrap().unwrap();
        match ev {
            Event::RegisterWrite { reg, bytes } => {
                assert_eq!(reg.prefix, tarmac_core::RegPrefix::R);
                assert_eq!(reg.index, 0);
                assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x01]);
            }
            _ => panic!("expected register write"),
        }
    }

    #[test]
    fn parses_memory_write_and_read() {
        let w = parse("MW 0x2000 DEADBEEF").unwrap().unwrap();
        assert_eq!(w, Event::MemoryAccess { addr: 0x2000, bytes: vec![0xDE, 0xAD, 0xBE, 0xEF], read: false });
        let r = parse("MR 0x2000 DEADBEEF").unwrap().unwrap();
        assert_eq!(r, Event::MemoryAccess { addr: 0x2000, bytes: vec![0xDE, 0xAD, 0xBE, 0xEF], read: true });
    }

    #[test]
    fn parses_call_hints() {
        assert_eq!(parse("CALL").unwrap().unwrap(), Event::Call(CallHint::Call));
        assert_eq!(parse("RET").unwrap().unwrap(), Event::Call(CallHint::Return));
    }

    #[test]
    fn blank_and_comment_lines_produce_no_event() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# a comment").unwrap(), None);
    }

    #[test]
    fn unrecognized_tag_is_a_parse_error() {
        assert!(parse("XYZ bogus").is_err());
    }

    #[test]
    fn bad_register_name_is_a_parse_error() {
        assert!(matches!(parse("R bogus 00"), Err(ParseError::BadRegister(_))));
    }
}
