//! Append-only JSONL sink shared by every `portal` process.
//!
//! Several CLI invocations can log to the same file at once, so each event
//! must reach the file as one complete line in a single `write` on an
//! `O_APPEND` descriptor. Nothing is buffered in userspace: a line is on disk
//! (and visible to `tail -f`) as soon as the event is recorded.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Cloneable handle to the log file. Also serves as its own `MakeWriter`.
#[derive(Clone)]
pub struct FileLogWriter {
    file: Arc<Mutex<File>>,
}

impl FileLogWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for FileLogWriter {
    /// Callers hand over whole lines; the lock keeps threads of this process
    /// from splitting one, append mode keeps other processes from doing so.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for FileLogWriter {
    type Writer = FileLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("portal.jsonl");

        FileLogWriter::open(&path)
            .unwrap()
            .write_all(b"{\"n\":1}\n")
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"n\":1}\n");
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portal.jsonl");

        FileLogWriter::open(&path).unwrap().write_all(b"one\n").unwrap();
        FileLogWriter::open(&path).unwrap().write_all(b"two\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_concurrent_writers_keep_lines_whole() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portal.jsonl");

        // Two independent handles stand in for two processes
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|tag| {
                let writer = FileLogWriter::open(&path).unwrap();
                std::thread::spawn(move || {
                    let line = format!("{}\n", tag.repeat(512));
                    for _ in 0..50 {
                        writer.make_writer().write_all(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 100);
        for line in lines {
            assert!(line == "a".repeat(512) || line == "b".repeat(512));
        }
    }
}
