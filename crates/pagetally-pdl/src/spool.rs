// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input sources and spooling of non-seekable streams to scratch files.
//
// Every parser works on a filesystem path: PCL is memory-mapped, DVI seeks to
// its postamble, container formats open a ZIP central directory and external
// converters want a file argument. Anything that is not already a regular
// file on disk is copied into a temporary file first. The temporary file is
// removed when the owning `SpooledInput` is dropped.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use pagetally_core::error::Result;

/// Copy granularity when spooling a stream.
const SPOOL_BLOCK_SIZE: usize = 1024 * 1024;

/// Where a job's bytes come from.
pub enum InputSource {
    /// A regular file. Used in place without copying.
    Path(PathBuf),
    /// Standard input, identified as `-`.
    Stdin,
    /// Any other byte stream, identified by `name` in reports and errors.
    Reader {
        name: String,
        reader: Box<dyn Read + Send>,
    },
}

impl InputSource {
    /// Interpret a command-line argument: `-` is standard input, anything else a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::Path(PathBuf::from(arg))
        }
    }

    /// Identifier used in reports and error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Stdin => "-".to_string(),
            Self::Reader { name, .. } => name.clone(),
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Stdin => f.write_str("Stdin"),
            Self::Reader { name, .. } => f.debug_struct("Reader").field("name", name).finish(),
        }
    }
}

/// A job's data as a random-access file, spooled if necessary.
#[derive(Debug)]
pub struct SpooledInput {
    name: String,
    path: PathBuf,
    // Keeps the scratch copy alive; deleted on drop.
    _scratch: Option<NamedTempFile>,
}

impl SpooledInput {
    /// Resolve `source` to a file, copying streams into `scratch_dir`.
    pub fn open(source: InputSource, scratch_dir: &Path) -> Result<Self> {
        let name = source.name();
        match source {
            InputSource::Path(path) => Ok(Self {
                name,
                path,
                _scratch: None,
            }),
            InputSource::Stdin => Self::spool(name, io::stdin().lock(), scratch_dir),
            InputSource::Reader { reader, .. } => Self::spool(name, reader, scratch_dir),
        }
    }

    fn spool(name: String, mut reader: impl Read, scratch_dir: &Path) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("pagetally_")
            .suffix(".prn")
            .tempfile_in(scratch_dir)?;

        let mut writer = BufWriter::new(scratch.as_file());
        let mut block = vec![0u8; SPOOL_BLOCK_SIZE];
        let mut total = 0u64;
        loop {
            let read = match reader.read(&mut block) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            writer.write_all(&block[..read])?;
            total += read as u64;
        }
        writer.flush()?;
        drop(writer);

        debug!(input = %name, bytes = total, scratch = %scratch.path().display(), "spooled input");
        Ok(Self {
            name,
            path: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the data lives in a scratch copy.
    pub fn is_spooled(&self) -> bool {
        self._scratch.is_some()
    }

    /// Open the data for reading.
    pub fn reopen(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stream_is_spooled_and_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let source = InputSource::Reader {
            name: "job-42".into(),
            reader: Box::new(Cursor::new(b"%!PS-Adobe-3.0\n".to_vec())),
        };
        let spooled = SpooledInput::open(source, dir.path()).unwrap();
        assert!(spooled.is_spooled());
        assert_eq!(spooled.name(), "job-42");
        assert_eq!(std::fs::read(spooled.path()).unwrap(), b"%!PS-Adobe-3.0\n");

        let scratch = spooled.path().to_path_buf();
        let file_name = scratch.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("pagetally_") && file_name.ends_with(".prn"));
        drop(spooled);
        assert!(!scratch.exists());
    }

    #[test]
    fn paths_are_used_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("job.pcl");
        std::fs::write(&file, b"\x1bE").unwrap();
        let spooled = SpooledInput::open(InputSource::Path(file.clone()), dir.path()).unwrap();
        assert!(!spooled.is_spooled());
        assert_eq!(spooled.path(), file);
    }

    #[test]
    fn dash_means_stdin() {
        assert!(matches!(InputSource::from_arg("-"), InputSource::Stdin));
        assert_eq!(InputSource::from_arg("a.ps").name(), "a.ps");
    }
}
