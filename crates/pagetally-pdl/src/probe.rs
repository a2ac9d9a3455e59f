// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detection probes — the head and tail blocks every detector looks at.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use pagetally_core::error::Result;

/// Bytes captured from the start of a job.
pub const FIRST_BLOCK_SIZE: u64 = 16 * 1024;

/// Bytes captured from the end of a job.
pub const LAST_BLOCK_SIZE: u64 = 256;

/// Head and tail of a job, captured once and shared by all detectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionProbe {
    /// Up to [`FIRST_BLOCK_SIZE`] bytes from offset 0.
    pub head: Vec<u8>,
    /// The last `min(LAST_BLOCK_SIZE, len)` bytes.
    pub tail: Vec<u8>,
}

impl DetectionProbe {
    /// Capture both blocks from a seekable reader, leaving it rewound.
    pub fn capture<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;

        reader.seek(SeekFrom::Start(0))?;
        let mut head = Vec::with_capacity(FIRST_BLOCK_SIZE.min(len) as usize);
        reader.by_ref().take(FIRST_BLOCK_SIZE).read_to_end(&mut head)?;

        let tail_len = LAST_BLOCK_SIZE.min(len);
        reader.seek(SeekFrom::Start(len - tail_len))?;
        let mut tail = Vec::with_capacity(tail_len as usize);
        reader.by_ref().take(tail_len).read_to_end(&mut tail)?;

        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { head, tail })
    }

    /// Capture from a file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        Self::capture(&mut file)
    }

    /// Probe over in-memory data.
    pub fn from_bytes(data: &[u8]) -> Self {
        let head_len = data.len().min(FIRST_BLOCK_SIZE as usize);
        let tail_len = data.len().min(LAST_BLOCK_SIZE as usize);
        Self {
            head: data[..head_len].to_vec(),
            tail: data[data.len() - tail_len..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn short_input_is_both_head_and_tail() {
        let probe = DetectionProbe::capture(&mut Cursor::new(b"%!PS\n".to_vec())).unwrap();
        assert_eq!(probe.head, b"%!PS\n");
        assert_eq!(probe.tail, b"%!PS\n");
    }

    #[test]
    fn long_input_is_truncated() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 256) as u8).collect();
        let mut cursor = Cursor::new(data.clone());
        let probe = DetectionProbe::capture(&mut cursor).unwrap();
        assert_eq!(probe.head.len(), FIRST_BLOCK_SIZE as usize);
        assert_eq!(probe.tail, &data[data.len() - 256..]);
        assert_eq!(cursor.position(), 0);
        assert_eq!(probe, DetectionProbe::from_bytes(&data));
    }
}
