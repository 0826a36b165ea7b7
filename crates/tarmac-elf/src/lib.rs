//! C9: the ELF collaborator (§4.7 "Symbols"). Address→symbol and
//! symbol→address lookup over a target ELF binary, via `goblin`.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ElfError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a recognized ELF file: {0}")]
    Parse(#[from] goblin::error::Error),
}

pub type Result<T> = std::result::Result<T, ElfError>;

/// One named, addressed symbol surviving mapping-symbol exclusion (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

fn is_mapping_symbol(name: &str) -> bool {
    matches!(name.as_bytes().first(), Some(b'$'))
        && matches!(name.as_bytes().get(1), Some(b'a' | b't' | b'x' | b'd'))
        && name.as_bytes().get(2).map_or(true, |&b| b == b'.')
}

/// A loaded symbol table, kept sorted by address for nearest-preceding
/// lookups.
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ElfError::Io { path: path.to_path_buf(), source })?;
        let elf = goblin::elf::Elf::parse(&bytes)?;

        let mut symbols: Vec<Symbol> = elf
            .syms
            .iter()
            .filter(|sym| sym.st_value != 0 || sym.st_size != 0)
            .filter_map(|sym| {
                let name = elf.strtab.get_at(sym.st_name)?;
                if name.is_empty() || is_mapping_symbol(name) {
                    return None;
                }
                Some(Symbol { name: name.to_string(), addr: sym.st_value, size: sym.st_size })
            })
            .collect();
        symbols.sort_by_key(|s| s.addr);
        Ok(SymbolTable { symbols })
    }

    pub fn from_symbols(symbols: Vec<Symbol>) -> Self {
        let mut symbols: Vec<Symbol> =
            symbols.into_iter().filter(|s| !s.name.is_empty() && !is_mapping_symbol(&s.name)).collect();
        symbols.sort_by_key(|s| s.addr);
        SymbolTable { symbols }
    }

    /// `name` or `name#N` (zero-based, among symbols sharing `name`) → the
    /// symbol's `(addr, size)` (§4.7).
    pub fn lookup_symbol(&self, query: &str) -> Option<(u64, u64)> {
        let (base, n) = split_disambiguator(query);
        self.symbols.iter().filter(|s| s.name == base).nth(n).map(|s| (s.addr, s.size))
    }

    /// The "best" symbol covering `addr`: a sized symbol whose range
    /// contains it (tightest fit wins ties), else the nearest symbol at or
    /// before `addr` of any size (§4.7).
    fn best_symbol(&self, addr: u64) -> Option<&Symbol> {
        let containing = self
            .symbols
            .iter()
            .filter(|s| s.size > 0 && s.addr <= addr && addr < s.addr + s.size)
            .min_by_key(|s| s.size);
        if containing.is_some() {
            return containing;
        }
        self.symbols.iter().filter(|s| s.addr <= addr).max_by_key(|s| s.addr)
    }

    fn is_ambiguous(&self, name: &str) -> bool {
        self.symbols.iter().filter(|s| s.name == name).count() > 1
    }

    /// The decorated name of the best symbol covering `addr`, or a hex
    /// literal (`fallback = true`) / empty string (`fallback = false`) when
    /// none matches (§4.7).
    pub fn get_symbolic_address(&self, addr: u64, fallback: bool) -> String {
        match self.best_symbol(addr) {
            Some(sym) if self.is_ambiguous(&sym.name) => format!("{}@{:#x}", sym.name, sym.addr),
            Some(sym) => sym.name.clone(),
            None if fallback => format!("{addr:#x}"),
            None => String::new(),
        }
    }
}

fn split_disambiguator(query: &str) -> (&str, usize) {
    if let Some(pos) = query.rfind('#') {
        if let Ok(n) = query[pos + 1..].parse::<usize>() {
            return (&query[..pos], n);
        }
    }
    (query, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        SymbolTable::from_symbols(vec![
            Symbol { name: "foo".to_string(), addr: 0x1000, size: 8 },
            Symbol { name: "foo".to_string(), addr: 0x2000, size: 4 },
            Symbol { name: "bar".to_string(), addr: 0x3000, size: 0 },
            Symbol { name: "$a".to_string(), addr: 0x1000, size: 0 },
        ])
    }

    /// Literal S4 scenario.
    #[test]
    fn duplicate_symbol_names_are_disambiguated_s4() {
        let t = table();
        assert_eq!(t.get_symbolic_address(0x1002, false), "foo@0x1000");
        assert_eq!(t.lookup_symbol("foo#1"), Some((0x2000, 4)));
    }

    #[test]
    fn unsized_symbol_matches_by_nearest_preceding_address() {
        let t = table();
        assert_eq!(t.get_symbolic_address(0x3005, false), "bar");
    }

    #[test]
    fn no_match_reports_fallback_or_empty() {
        let t = table();
        assert_eq!(t.get_symbolic_address(0x10, false), "");
        assert_eq!(t.get_symbolic_address(0x10, true), "0x10");
    }

    #[test]
    fn mapping_symbols_are_not_indexed() {
        let t = table();
        assert_eq!(t.lookup_symbol("$a"), None);
    }
}
