//! Ties the C7 indexer to actual trace/index files on disk: the glue the
//! CLI tools call into (§6 "Text trace" / "Index file format").

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tarmac_core::{Line, Off, Result as TarmacResult, TarmacError};
use tarmac_tree::ArenaWriter;

use crate::indexer::Indexer;

/// Stream `trace_path` line by line through the indexer and write a
/// finalized index file at `index_path`. `byte_pos`/`byte_extent` recorded
/// per line exclude the trailing newline, so `byte_pos..byte_pos+byte_extent`
/// is exactly the trace line's text (§8 property 4).
pub fn build_index(
    trace_path: &Path,
    index_path: &Path,
    aarch64: bool,
    big_endian_trace: bool,
    progress_interval: Option<u64>,
    mut on_progress: impl FnMut(u64),
) -> TarmacResult<PathBuf> {
    let file = File::open(trace_path).map_err(|e| TarmacError::io(trace_path, e))?;
    let mut reader = BufReader::new(file);
    let mut writer = ArenaWriter::create(index_path, aarch64, big_endian_trace)?;
    let mut indexer = Indexer::new(&mut writer, aarch64, progress_interval)?;

    let mut pos: Off = 0;
    let mut line_no: Line = 0;
    let mut raw = String::new();
    loop {
        raw.clear();
        let n = reader.read_line(&mut raw).map_err(|e| TarmacError::io(trace_path, e))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let text = raw.trim_end_matches(['\n', '\r']);
        let byte_extent = text.len() as u32;
        indexer.feed_line(&mut writer, line_no, pos, byte_extent, text, &mut on_progress)?;
        pos += n as Off;
    }

    let roots = indexer.finish(&mut writer, &mut on_progress)?;
    let path = writer.finalize(roots.seq_root, roots.bypc_root, 1)?;
    Ok(path)
}

/// Slice the original trace line out of `trace_path` using the byte range
/// a sequential payload recorded for it.
pub fn read_trace_line(trace_path: &Path, byte_pos: Off, byte_extent: u32) -> TarmacResult<String> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = File::open(trace_path).map_err(|e| TarmacError::io(trace_path, e))?;
    file.seek(SeekFrom::Start(byte_pos as u64)).map_err(|e| TarmacError::io(trace_path, e))?;
    let mut buf = vec![0u8; byte_extent as usize];
    file.read_exact(&mut buf).map_err(|e| TarmacError::io(trace_path, e))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IndexNavigator, Roots};
    use tarmac_tree::ArenaReader;

    /// Literal S1 scenario, driven end to end through real files.
    #[test]
    fn builds_and_reads_back_an_index_s1() {
        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("trace.txt");
        std::fs::write(&trace_path, "IT 0x1000 E mov r0, #1\nR r0 00000001\nIT 0x1004 E mov r0, #2\nR r0 00000002\nIT 0x1008 E mov r0, #3\nR r0 00000003\n").unwrap();
        let index_path = dir.path().join("trace.idx");

        build_index(&trace_path, &index_path, false, false, None, |_| {}).unwrap();

        let reader = ArenaReader::open(&index_path).unwrap();
        let roots = Roots { seq_root: reader.footer.seq_root, bypc_root: reader.footer.bypc_root };
        let nav = IndexNavigator::new(&reader, roots, None);

        let node = nav.node_at_line(3).unwrap().unwrap();
        assert_eq!(node.pc, 0x1004);
        let line_text = read_trace_line(&trace_path, node.byte_pos, node.byte_extent).unwrap();
        assert_eq!(line_text, "IT 0x1004 E mov r0, #2");
    }
}
