// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Zenographics ZjStream — chunk walk counting start/end page records.

use std::io::{BufReader, Read, Seek, SeekFrom};

use tracing::{debug, instrument};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

const CHUNK_HEADER: usize = 16;
const START_PAGE: u32 = 2;
const END_PAGE: u32 = 3;

/// Byte order announced by the stream signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `ZJZJ`
    Little,
    /// `JZJZ`
    Big,
}

impl ByteOrder {
    fn u32_at(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }
}

/// Fixed part of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub total_size: u32,
    pub chunk_type: u32,
    pub items: u32,
}

impl ChunkHeader {
    fn parse(raw: &[u8; CHUNK_HEADER], order: ByteOrder) -> Self {
        Self {
            total_size: order.u32_at(&raw[0..4]),
            chunk_type: order.u32_at(&raw[4..8]),
            items: order.u32_at(&raw[8..12]),
        }
    }
}

fn malformed(detail: impl Into<String>) -> PagetallyError {
    PagetallyError::malformed("ZjStream", detail)
}

/// Fill `buf` completely, or report how many bytes were available.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// Walk the chunks after the signature and return `max(start pages, end pages)`.
pub fn count_chunks<R: Read + Seek>(reader: &mut R, order: ByteOrder) -> Result<u64> {
    reader.seek(SeekFrom::Start(4))?;
    let (mut starts, mut ends) = (0u64, 0u64);
    let mut raw = [0u8; CHUNK_HEADER];
    loop {
        match read_full(reader, &mut raw)? {
            0 => break,
            CHUNK_HEADER => {}
            short => return Err(malformed(format!("truncated chunk header ({short} bytes)"))),
        }
        let header = ChunkHeader::parse(&raw, order);
        if (header.total_size as usize) < CHUNK_HEADER {
            return Err(malformed(format!("chunk size {} is too small", header.total_size)));
        }
        reader.seek(SeekFrom::Current(i64::from(header.total_size) - CHUNK_HEADER as i64))?;
        match header.chunk_type {
            START_PAGE => starts += 1,
            END_PAGE => ends += 1,
            _ => {}
        }
    }
    debug!(starts, ends, "ZjStream chunks");
    Ok(starts.max(ends))
}

/// Parser for ZjStream host-based printer data.
#[derive(Debug)]
pub struct ZjStreamParser {
    job: JobData,
    order: ByteOrder,
}

impl ZjStreamParser {
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }
}

impl FormatParser for ZjStreamParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::ZjStream,
        open_mode: OpenMode::Binary,
        required: &[],
        to_tiff: &[],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        let order = match probe.head.get(..4) {
            Some(b"ZJZJ") => ByteOrder::Little,
            Some(b"JZJZ") => ByteOrder::Big,
            _ => return Err(not_this_format(PdlFormat::ZjStream)),
        };
        Ok(Self {
            job: job.clone(),
            order,
        })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display(), order = ?self.order))]
    fn count_pages(&self) -> Result<u64> {
        let mut reader = BufReader::new(self.job.open()?);
        count_chunks(&mut reader, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(order: ByteOrder, chunk_type: u32, payload: usize) -> Vec<u8> {
        let size = (CHUNK_HEADER + payload) as u32;
        let mut out = Vec::new();
        for value in [size, chunk_type, 0] {
            out.extend_from_slice(&match order {
                ByteOrder::Little => value.to_le_bytes(),
                ByteOrder::Big => value.to_be_bytes(),
            });
        }
        out.extend_from_slice(&[0; 4]);
        out.extend(std::iter::repeat_n(0xaa, payload));
        out
    }

    fn stream(order: ByteOrder, types: &[u32]) -> Vec<u8> {
        let mut data = match order {
            ByteOrder::Little => b"ZJZJ".to_vec(),
            ByteOrder::Big => b"JZJZ".to_vec(),
        };
        for (index, chunk_type) in types.iter().enumerate() {
            data.extend(chunk(order, *chunk_type, index * 3));
        }
        data
    }

    #[test]
    fn counts_pages_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let data = stream(order, &[0, 2, 3, 2, 3, 2, 3, 1]);
            assert_eq!(count_chunks(&mut Cursor::new(data), order).unwrap(), 3);
        }
    }

    #[test]
    fn unbalanced_pages_take_the_max() {
        let data = stream(ByteOrder::Little, &[0, 2, 2, 3, 1]);
        assert_eq!(count_chunks(&mut Cursor::new(data), ByteOrder::Little).unwrap(), 2);
    }

    #[test]
    fn truncated_header_is_malformed() {
        let mut data = stream(ByteOrder::Big, &[2, 3]);
        data.extend_from_slice(&[0, 0, 0]);
        let err = count_chunks(&mut Cursor::new(data), ByteOrder::Big).unwrap_err();
        assert!(matches!(err, PagetallyError::MalformedData { .. }));
    }

    #[test]
    fn undersized_chunk_is_malformed() {
        let mut data = b"ZJZJ".to_vec();
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0; 12]);
        let err = count_chunks(&mut Cursor::new(data), ByteOrder::Little).unwrap_err();
        assert!(matches!(err, PagetallyError::MalformedData { .. }));
    }

    #[test]
    fn signature_selects_byte_order() {
        let job = JobData::new("unused", std::env::temp_dir());
        let parser = ZjStreamParser::open(&job, &DetectionProbe::from_bytes(b"JZJZ....")).unwrap();
        assert_eq!(parser.byte_order(), ByteOrder::Big);
        assert!(ZjStreamParser::open(&job, &DetectionProbe::from_bytes(b"ZJZ")).is_err());
    }
}
