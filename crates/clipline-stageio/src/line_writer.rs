//! Append-only writer for the shared pipeline log, serialized across
//! concurrent stage processes with an advisory file lock (§4.5).
//!
//! The orchestrator runs stages as separate OS processes, so an in-process
//! mutex can't keep their log lines from interleaving mid-write; `fs2`'s
//! `lock_exclusive` takes a real OS-level lock on the shared file for the
//! duration of one line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::Result;

pub struct LineLockedWriter {
    file: Mutex<File>,
}

impl LineLockedWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append `line` (a single already-newline-terminated record) while
    /// holding an exclusive lock on the underlying file.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut file = self.file.lock().expect("line writer mutex poisoned");
        file.lock_exclusive()?;
        let result = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let _ = file.unlock();
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn appends_across_multiple_writers_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.log");

        let a = LineLockedWriter::open(&path).unwrap();
        let b = LineLockedWriter::open(&path).unwrap();
        a.write_line("first\n").unwrap();
        b.write_line("second\n").unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
