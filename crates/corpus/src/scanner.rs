use crate::error::{CorpusError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Scanner over the flat-file corpus directory.
///
/// One record per line, byte-tolerant text, no schema. The file list is
/// cached and refreshed via [`CorpusScanner::reload`]; each
/// [`CorpusScanner::scan`] walks the whole corpus from disk again, so
/// files ingested between scans become visible without restarting.
pub struct CorpusScanner {
    dir: PathBuf,
    files: RwLock<Vec<PathBuf>>,
}

impl CorpusScanner {
    /// Open (and create if missing) the corpus directory and load the
    /// initial file list.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let scanner = Self {
            dir,
            files: RwLock::new(Vec::new()),
        };
        scanner.reload()?;
        Ok(scanner)
    }

    /// Re-list the corpus directory. Returns the number of files found.
    pub fn reload(&self) -> Result<usize> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        let count = files.len();
        *self.files.write().unwrap_or_else(|e| e.into_inner()) = files;
        log::info!("Corpus loaded: {count} files");
        Ok(count)
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stream every line satisfying `predicate`, in file order.
    ///
    /// Lines are decoded lossily (undecodable bytes become replacement
    /// characters), stripped of trailing whitespace, and empty lines are
    /// skipped. A file that cannot be read is logged and skipped; the scan
    /// continues over the remaining files. The iterator is finite and
    /// carries no cursor between calls.
    pub fn scan<P>(&self, predicate: P) -> LineScan<P>
    where
        P: Fn(&str) -> bool,
    {
        LineScan {
            files: self.files().into_iter(),
            current: None,
            predicate,
            buf: Vec::new(),
        }
    }

    /// Copy `src` into the corpus directory. The copy lands under a
    /// temporary name and is renamed into place, so a scan running
    /// concurrently sees either the old file or the complete new one,
    /// never a half-written file. Visible to scans after the follow-up
    /// [`CorpusScanner::reload`] this performs.
    pub fn ingest_file(&self, src: &Path) -> Result<PathBuf> {
        if !src.is_file() {
            return Err(CorpusError::NotAFile(src.to_path_buf()));
        }
        let name = src
            .file_name()
            .ok_or_else(|| CorpusError::NotAFile(src.to_path_buf()))?;
        let dest = self.dir.join(name);
        let tmp = self.dir.join(format!(".{}.ingest", name.to_string_lossy()));

        std::fs::copy(src, &tmp)?;
        std::fs::rename(&tmp, &dest)?;
        self.reload()?;
        log::info!("Ingested {} into corpus", dest.display());
        Ok(dest)
    }

    /// Walk the whole corpus counting lines and bytes. Unreadable files
    /// are skipped, like during a scan.
    pub fn stats(&self) -> CorpusStats {
        let files = self.files();
        let mut stats = CorpusStats {
            files: files.len(),
            lines: 0,
            bytes: 0,
        };
        for path in &files {
            match std::fs::metadata(path) {
                Ok(meta) => stats.bytes += meta.len(),
                Err(e) => {
                    log::warn!("Failed to stat {}: {e}", path.display());
                    continue;
                }
            }
            let scan = LineScan {
                files: vec![path.clone()].into_iter(),
                current: None,
                predicate: |_: &str| true,
                buf: Vec::new(),
            };
            stats.lines += scan.count() as u64;
        }
        stats
    }
}

/// Corpus-wide size counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorpusStats {
    pub files: usize,
    /// Non-empty lines only, matching what a scan can yield.
    pub lines: u64,
    pub bytes: u64,
}

/// Lazy line iterator produced by [`CorpusScanner::scan`].
pub struct LineScan<P> {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, BufReader<File>)>,
    predicate: P,
    buf: Vec<u8>,
}

impl<P> Iterator for LineScan<P>
where
    P: Fn(&str) -> bool,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let Some((path, reader)) = self.current.as_mut() else {
                let path = self.files.next()?;
                match File::open(&path) {
                    Ok(file) => self.current = Some((path, BufReader::new(file))),
                    Err(e) => {
                        log::warn!("Skipping unreadable corpus file {}: {e}", path.display())
                    }
                }
                continue;
            };

            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.current = None;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Read error in {}, skipping rest of file: {e}", path.display());
                    self.current = None;
                    continue;
                }
            }

            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if (self.predicate)(line) {
                return Some(line.to_string());
            }
        }
    }
}
