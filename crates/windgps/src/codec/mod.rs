//! Binary layout of logger blocks and records.
//!
//! A log file is a sequence of fixed-size blocks. Each block is a little-endian
//! `u32` header count, `records_per_block` records and `padding_bytes` opaque
//! fill bytes. The header count is written by the logger as the number of
//! records per block, but it is only trusted after [`layout`] has
//! cross-validated it against every block in the file.
//!
//! One record is:
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0  | 4 | `local_millis` (`u32`) |
//! | 4  | 4 | `latitude` (`f32`) |
//! | 8  | 4 | `longitude` (`f32`) |
//! | 12 | 4 | `gps_time_packed` (`u32`) |
//! | 16 | 4 | `gps_date_packed` (`u32`) |
//! | 20 | W | `wind_text` (W bytes, default 128) |

pub mod layout;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Size of the block header count field.
pub const HEADER_SIZE: usize = 4;

/// Size of the fixed numeric part of a record.
pub const RECORD_FIXED_SIZE: usize = 20;

/// Default width of the wind text buffer in the logger firmware.
pub const DEFAULT_WIND_TEXT_LEN: usize = 128;

/// Number of records per block and fill bytes after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockGeometry {
    /// Records stored in every block.
    pub records_per_block: u32,
    /// Fill bytes after the records.
    pub padding_bytes: u32,
}

impl BlockGeometry {
    /// Create a new geometry.
    #[must_use]
    pub fn new(records_per_block: u32, padding_bytes: u32) -> Self {
        Self {
            records_per_block,
            padding_bytes,
        }
    }

    /// Same geometry with a different record count.
    #[must_use]
    pub fn with_records_per_block(self, records_per_block: u32) -> Self {
        Self {
            records_per_block,
            ..self
        }
    }

    /// Same geometry with a different padding length.
    #[must_use]
    pub fn with_padding_bytes(self, padding_bytes: u32) -> Self {
        Self {
            padding_bytes,
            ..self
        }
    }
}

impl std::fmt::Display for BlockGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records/block, {} padding bytes",
            self.records_per_block, self.padding_bytes
        )
    }
}

/// One sensor sample as written by the logger.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Local millisecond counter.
    pub local_millis: u32,
    /// Latitude in degrees.
    pub latitude: f32,
    /// Longitude in degrees.
    pub longitude: f32,
    /// GPS time as `HHMMSScc`.
    pub gps_time_packed: u32,
    /// GPS date as `DDMMYY`.
    pub gps_date_packed: u32,
    /// Raw wind sensor text, fixed width and not necessarily NUL terminated.
    pub wind_text: Vec<u8>,
}

/// One decoded block, header and padding included.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    /// Advisory record count from the block header.
    pub header_count: u32,
    /// Records in file order.
    pub records: Vec<Record>,
    /// Opaque fill bytes.
    pub padding: Vec<u8>,
}

/// Encoder/decoder for blocks of a given record width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCodec {
    wind_text_len: usize,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new(DEFAULT_WIND_TEXT_LEN)
    }
}

impl RecordCodec {
    /// Create a codec for records with a wind text buffer of `wind_text_len` bytes.
    #[must_use]
    pub fn new(wind_text_len: usize) -> Self {
        Self { wind_text_len }
    }

    /// Width of the wind text buffer.
    #[must_use]
    pub fn wind_text_len(&self) -> usize {
        self.wind_text_len
    }

    /// Size of one record in bytes.
    #[must_use]
    pub fn record_size(&self) -> usize {
        RECORD_FIXED_SIZE + self.wind_text_len
    }

    /// Size of one block in bytes under `geometry`.
    #[must_use]
    pub fn block_size(&self, geometry: BlockGeometry) -> usize {
        HEADER_SIZE
            + geometry.records_per_block as usize * self.record_size()
            + geometry.padding_bytes as usize
    }

    /// Decode the block at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TruncatedInput`] if `bytes` is shorter than one block.
    pub fn decode_block(&self, bytes: &[u8], geometry: BlockGeometry) -> Result<RawBlock> {
        let needed = self.block_size(geometry);
        if bytes.len() < needed {
            return Err(Error::TruncatedInput {
                needed,
                available: bytes.len(),
            });
        }

        let header_count = read_u32(bytes, 0);
        let record_size = self.record_size();
        let records_end = HEADER_SIZE + geometry.records_per_block as usize * record_size;

        let records = bytes[HEADER_SIZE..records_end]
            .chunks_exact(record_size)
            .map(|chunk| self.decode_record(chunk))
            .collect();

        Ok(RawBlock {
            header_count,
            records,
            padding: bytes[records_end..needed].to_vec(),
        })
    }

    /// Decode one record from exactly `record_size()` bytes.
    fn decode_record(&self, bytes: &[u8]) -> Record {
        Record {
            local_millis: read_u32(bytes, 0),
            latitude: f32::from_bits(read_u32(bytes, 4)),
            longitude: f32::from_bits(read_u32(bytes, 8)),
            gps_time_packed: read_u32(bytes, 12),
            gps_date_packed: read_u32(bytes, 16),
            wind_text: bytes[RECORD_FIXED_SIZE..RECORD_FIXED_SIZE + self.wind_text_len].to_vec(),
        }
    }

    /// Append the encoding of `block` to `out`.
    ///
    /// Wind text longer than the buffer is cut; shorter text is NUL padded.
    pub fn encode_block(&self, block: &RawBlock, out: &mut Vec<u8>) {
        out.extend_from_slice(&block.header_count.to_le_bytes());
        for record in &block.records {
            self.encode_record(record, out);
        }
        out.extend_from_slice(&block.padding);
    }

    fn encode_record(&self, record: &Record, out: &mut Vec<u8>) {
        out.extend_from_slice(&record.local_millis.to_le_bytes());
        out.extend_from_slice(&record.latitude.to_bits().to_le_bytes());
        out.extend_from_slice(&record.longitude.to_bits().to_le_bytes());
        out.extend_from_slice(&record.gps_time_packed.to_le_bytes());
        out.extend_from_slice(&record.gps_date_packed.to_le_bytes());

        let text = &record.wind_text[..record.wind_text.len().min(self.wind_text_len)];
        out.extend_from_slice(text);
        out.resize(out.len() + self.wind_text_len - text.len(), 0);
    }

    /// Read only the header count of the block at `offset`.
    #[must_use]
    pub(crate) fn header_at(bytes: &[u8], offset: usize) -> Option<u32> {
        let end = offset.checked_add(HEADER_SIZE)?;
        bytes.get(offset..end).map(|b| read_u32(b, 0))
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic capture builders shared by the decoder tests.

    use super::{BlockGeometry, RawBlock, Record, RecordCodec};

    /// A record whose fields are derived from its sequence number.
    pub fn record(seq: u32) -> Record {
        let text = format!("S2 {}.5 D {}", seq % 20, (seq * 7) % 360);
        Record {
            local_millis: 1_000 + seq * 200,
            latitude: 47.6 + seq as f32 * 1e-5,
            longitude: -122.3 - seq as f32 * 1e-5,
            gps_time_packed: 12_000_000 + seq * 100,
            gps_date_packed: 150_321,
            wind_text: text.into_bytes(),
        }
    }

    /// Encode `blocks` blocks of sequential records under `geometry`.
    ///
    /// Padding is filled with `0xAA` so a misaligned header read never
    /// lands on a plausible count.
    pub fn capture(codec: &RecordCodec, geometry: BlockGeometry, blocks: u32) -> Vec<u8> {
        capture_with_headers(codec, geometry, blocks, |_| geometry.records_per_block)
    }

    /// Like [`capture`], but with the header count of block `i` given by `header`.
    pub fn capture_with_headers(
        codec: &RecordCodec,
        geometry: BlockGeometry,
        blocks: u32,
        header: impl Fn(u32) -> u32,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        let mut seq = 0;
        for i in 0..blocks {
            let records = (0..geometry.records_per_block)
                .map(|_| {
                    seq += 1;
                    record(seq)
                })
                .collect();
            let block = RawBlock {
                header_count: header(i),
                records,
                padding: vec![0xAA; geometry.padding_bytes as usize],
            };
            codec.encode_block(&block, &mut out);
        }
        out
    }
}
