//! Subcommand argument structs and their `execute()` bodies, one `impl`
//! block per subcommand in a single module file — mirrors
//! `miden-vm/src/tools/mod.rs`, which holds `Analyze`/`ExecutionDetails`/
//! `AsmOpStats` together rather than splitting each into its own file.

use std::path::{Path, PathBuf};

use clap::Parser;
use tarmac_core::{Result as TarmacResult, TarmacError};
use tarmac_index::calltree;
use tarmac_index::driver;
use tarmac_index::query::{IndexNavigator, Roots};
use tarmac_tree::ArenaReader;

/// Flags shared by every subcommand (§6).
#[derive(Debug, Parser)]
pub struct CommonArgs {
    /// Trace file(s) to index or query
    #[arg(required = true)]
    pub trace: Vec<PathBuf>,

    /// ELF image to resolve symbols against
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Force a rebuild of the index even if a valid one already exists
    #[arg(long)]
    pub index: bool,

    /// Never build an index; fail if one isn't already present and valid
    #[arg(long)]
    pub no_index: bool,

    /// Build the index and exit without running the query
    #[arg(long)]
    pub only_index: bool,

    /// Path to the index file (default: `<trace>.tarmac-index`)
    #[arg(long)]
    pub index_file: Option<PathBuf>,

    /// The traced CPU is big-endian
    #[arg(long)]
    pub big_endian: bool,

    /// The traced CPU is little-endian (default)
    #[arg(long)]
    pub little_endian: bool,

    /// The traced CPU is AArch64 (affects FP register aliasing, §4.7)
    #[arg(long)]
    pub aarch64: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Report indexing progress every N instruction groups
    #[arg(long)]
    pub progress: Option<u64>,
}

impl CommonArgs {
    fn index_path_for(&self, trace: &Path) -> PathBuf {
        self.index_file.clone().unwrap_or_else(|| trace.with_extension("tarmac-index"))
    }

    /// Ensures a valid index exists for `trace[0]`, rebuilding it per the
    /// `--index`/`--no-index`/`--only-index` flags (§6). Returns `None`
    /// when `--only-index` means the caller should stop after building.
    fn resolve_index(&self) -> TarmacResult<Option<PathBuf>> {
        let trace = &self.trace[0];
        let index_path = self.index_path_for(trace);
        let valid = tarmac_tree::arena::magic_number_ok(&index_path);

        if self.no_index {
            if !valid {
                return Err(TarmacError::format(format!(
                    "no valid index at {} and --no-index was given",
                    index_path.display()
                )));
            }
        } else if self.index || !valid {
            driver::build_index(trace, &index_path, self.aarch64, self.big_endian, self.progress, |n| {
                tracing::info!(groups = n, "indexing progress");
            })?;
        }

        if self.only_index {
            Ok(None)
        } else {
            Ok(Some(index_path))
        }
    }

    fn load_symbols(&self) -> TarmacResult<Option<tarmac_elf::SymbolTable>> {
        let Some(image) = &self.image else { return Ok(None) };
        tarmac_elf::SymbolTable::load(image)
            .map(Some)
            .map_err(|err| match err {
                tarmac_elf::ElfError::Io { path, source } => TarmacError::io(path, source),
                other => TarmacError::format(other.to_string()),
            })
    }
}

#[derive(Debug, Parser)]
pub struct IndexArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl IndexArgs {
    pub fn execute(&self) -> TarmacResult<()> {
        for trace in &self.common.trace {
            let index_path = self.common.index_path_for(trace);
            let path = driver::build_index(
                trace,
                &index_path,
                self.common.aarch64,
                self.common.big_endian,
                self.common.progress,
                |n| tracing::info!(groups = n, "indexing progress"),
            )?;
            let reader = ArenaReader::open(&path)?;
            let stats = tarmac_index::seqtree::stats(&reader, reader.footer.seq_root)?;
            println!("wrote {}", path.display());
            println!(
                "  {} lines, {} instructions, max call depth {}",
                stats.lines, stats.instructions, stats.max_depth
            );
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct CallinfoArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Symbol name (optionally `name#N`) or `0x`-prefixed address
    query: String,
}

/// `0x`-prefixed hex address, or `None` if `query` isn't one (§6
/// "callinfo": a query is either an address or a symbol name).
fn parse_hex_addr(query: &str) -> Option<tarmac_core::Addr> {
    let hex = query.strip_prefix("0x")?;
    tarmac_core::Addr::from_str_radix(hex, 16).ok()
}

/// Prints every call/trace site for `pc`, in the style of the original
/// `callinfo` tool: one line per site giving its time, trace line, and
/// byte position (grounded on `tools/callinfo.cpp`'s `CallInfo::run(Addr)`).
fn print_call_sites<Ar: tarmac_tree::Arena>(nav: &IndexNavigator<Ar>, pc: tarmac_core::Addr) -> TarmacResult<()> {
    let pc = pc & !1; // strip Thumb bit, as the original does
    let mut line = 0;
    let mut any = false;
    while let Some(hit) = nav.find_next_instance(pc, line)? {
        if let Some(node) = nav.node_at_line(hit.first_line)? {
            println!(" - time: {} (line:{}, pos:{})", node.mod_time, node.first_line, node.byte_pos);
            any = true;
        }
        line = hit.first_line + 1;
    }
    if !any {
        println!(" - no occurrences found");
    }
    Ok(())
}

impl CallinfoArgs {
    pub fn execute(&self) -> TarmacResult<()> {
        let Some(index_path) = self.common.resolve_index()? else { return Ok(()) };
        let reader = ArenaReader::open(&index_path)?;
        let symbols = self.common.load_symbols()?;
        let roots = Roots { seq_root: reader.footer.seq_root, bypc_root: reader.footer.bypc_root };
        let nav = IndexNavigator::new(&reader, roots, symbols.as_ref());

        if let Some(pc) = parse_hex_addr(&self.query) {
            return print_call_sites(&nav, pc);
        }

        let Some(table) = &symbols else {
            println!("No image, symbol '{}' can not be looked up !", self.query);
            return Ok(());
        };
        let Some((addr, size)) = table.lookup_symbol(&self.query) else {
            println!("Symbol '{}' not found !", self.query);
            return Ok(());
        };
        println!("Symbol '{}' at {addr:#x} ({size} bytes) called from :", self.query);
        print_call_sites(&nav, addr)
    }
}

#[derive(Debug, Parser)]
pub struct FlamegraphArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write the flame graph here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

impl FlamegraphArgs {
    pub fn execute(&self) -> TarmacResult<()> {
        let Some(index_path) = self.common.resolve_index()? else { return Ok(()) };
        let reader = ArenaReader::open(&index_path)?;
        let symbols = self.common.load_symbols()?;
        let counts = calltree::flame_graph_counts(&reader, reader.footer.seq_root, symbols.as_ref())?;
        let text = calltree::render_flame_graph(&counts);
        match &self.out {
            Some(path) => std::fs::write(path, text).map_err(|e| TarmacError::io(path, e))?,
            None => print!("{text}"),
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct VcdArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Register to dump (repeatable), e.g. `--reg r0 --reg r1`
    #[arg(long = "reg")]
    registers: Vec<String>,

    /// VCD timescale in nanoseconds
    #[arg(long, default_value_t = 1)]
    timescale: u32,

    /// Write the VCD stream here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

impl VcdArgs {
    pub fn execute(&self) -> TarmacResult<()> {
        let Some(index_path) = self.common.resolve_index()? else { return Ok(()) };
        let reader = ArenaReader::open(&index_path)?;
        let registers = self
            .registers
            .iter()
            .map(|name| {
                tarmac_core::lookup_reg_name(name)
                    .ok_or_else(|| TarmacError::format(format!("unknown register {name:?}")))
            })
            .collect::<TarmacResult<Vec<_>>>()?;

        let mut out = String::new();
        tarmac_index::vcd::write_vcd(&reader, reader.footer.seq_root, &registers, self.timescale, &mut out)?;
        match &self.out {
            Some(path) => std::fs::write(path, out).map_err(|e| TarmacError::io(path, e))?,
            None => print!("{out}"),
        }
        Ok(())
    }
}

