//! Streaming decode of whole captures.
//!
//! A capture session is an ordered set of files that share one block
//! geometry. Files are decoded one block at a time from a buffered reader,
//! and the records of every file are concatenated in the order given.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::layout::LayoutDiscoverer;
use super::{BlockGeometry, RawBlock, Record, RecordCodec};
use crate::error::{Error, Result};

/// Iterator over the blocks of a reader.
///
/// Stops cleanly at a block boundary. A partial block at the end of the
/// stream is logged and skipped.
#[derive(Debug)]
pub struct BlockReader<R> {
    reader: R,
    codec: RecordCodec,
    geometry: BlockGeometry,
    buf: Vec<u8>,
    blocks_read: usize,
    hasher: blake3::Hasher,
    done: bool,
}

impl<R: Read> BlockReader<R> {
    /// Create a block reader over `reader`.
    pub fn new(reader: R, codec: RecordCodec, geometry: BlockGeometry) -> Self {
        Self {
            reader,
            codec,
            geometry,
            buf: vec![0; codec.block_size(geometry)],
            blocks_read: 0,
            hasher: blake3::Hasher::new(),
            done: false,
        }
    }

    /// Number of complete blocks returned so far.
    #[must_use]
    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// BLAKE3 hash of the bytes of every complete block read so far.
    #[must_use]
    pub fn content_hash(&self) -> blake3::Hash {
        self.hasher.finalize()
    }

    /// Read until the buffer is full or the reader is exhausted.
    fn fill(&mut self) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let filled = match self.fill() {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(Error::Io(e)));
            }
        };

        if filled < self.buf.len() {
            self.done = true;
            if filled > 0 {
                warn!(
                    bytes = filled,
                    block = self.blocks_read,
                    "Ignoring partial block at end of file"
                );
            }
            return None;
        }

        self.hasher.update(&self.buf);
        self.blocks_read += 1;
        Some(self.codec.decode_block(&self.buf, self.geometry))
    }
}

/// Records of one file.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Geometry used to decode it.
    pub geometry: BlockGeometry,
    /// Complete blocks decoded.
    pub block_count: usize,
    /// Records in file order.
    pub records: Vec<Record>,
    /// BLAKE3 hash of the decoded block bytes.
    pub content_hash: blake3::Hash,
}

/// Records of an ordered file set.
#[derive(Debug, Clone)]
pub struct DecodedCapture {
    /// Geometry discovered on the first file.
    pub geometry: BlockGeometry,
    /// Records of every file, concatenated in the order given.
    pub records: Vec<Record>,
    /// Per-file decode results, without their records.
    pub files: Vec<FileStats>,
    /// Hash over the per-file content hashes, in order.
    pub source_hash: String,
}

/// Decode statistics for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Path of the file.
    pub path: PathBuf,
    /// Geometry used to decode it.
    pub geometry: BlockGeometry,
    /// Complete blocks decoded.
    pub block_count: usize,
    /// Records decoded.
    pub record_count: usize,
}

/// Decodes capture files into one flat record sequence.
#[derive(Debug, Clone, Copy)]
pub struct BlockStreamDecoder {
    codec: RecordCodec,
    discoverer: LayoutDiscoverer,
    nominal: BlockGeometry,
    revalidate_per_file: bool,
}

impl BlockStreamDecoder {
    /// Create a decoder.
    ///
    /// `nominal` seeds layout discovery. When `revalidate_per_file` is set,
    /// discovery runs on every file instead of only the first.
    #[must_use]
    pub fn new(
        codec: RecordCodec,
        discoverer: LayoutDiscoverer,
        nominal: BlockGeometry,
        revalidate_per_file: bool,
    ) -> Self {
        Self {
            codec,
            discoverer,
            nominal,
            revalidate_per_file,
        }
    }

    /// Decode one file with a known geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file cannot be opened,
    /// [`Error::TruncatedInput`] if it holds no complete block, or
    /// [`Error::Io`] if a read fails part way.
    pub fn decode_file(
        &self,
        path: impl AsRef<Path>,
        geometry: BlockGeometry,
    ) -> Result<DecodedFile> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file.metadata().map_or(0, |m| m.len());

        let mut reader = BlockReader::new(BufReader::new(file), self.codec, geometry);
        let mut records = Vec::new();
        for block in reader.by_ref() {
            records.extend(block?.records);
        }

        if reader.blocks_read() == 0 {
            return Err(Error::TruncatedInput {
                needed: self.codec.block_size(geometry),
                available: usize::try_from(len).unwrap_or(usize::MAX),
            });
        }

        debug!(
            path = %path.display(),
            blocks = reader.blocks_read(),
            records = records.len(),
            "Decoded file"
        );

        Ok(DecodedFile {
            path: path.to_path_buf(),
            geometry,
            block_count: reader.blocks_read(),
            records,
            content_hash: reader.content_hash(),
        })
    }

    /// Discover the geometry on the first file and decode every file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyFileSet`] if `paths` is empty, and propagates
    /// discovery and decode errors; any error aborts the whole set.
    pub fn decode_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<DecodedCapture> {
        let Some(first) = paths.first() else {
            return Err(Error::EmptyFileSet);
        };

        let geometry = self.discoverer.discover_file(first, self.nominal)?.geometry;
        info!(%geometry, "Block layout discovered");

        let mut records = Vec::new();
        let mut files = Vec::with_capacity(paths.len());
        let mut source = blake3::Hasher::new();

        for (i, path) in paths.iter().enumerate() {
            let file_geometry = if self.revalidate_per_file && i > 0 {
                let found = self.discoverer.discover_file(path, self.nominal)?.geometry;
                if found != geometry {
                    warn!(
                        path = %path.as_ref().display(),
                        %found,
                        expected = %geometry,
                        "File geometry differs from first file"
                    );
                }
                found
            } else {
                geometry
            };

            let decoded = self.decode_file(path, file_geometry)?;
            source.update(decoded.content_hash.as_bytes());
            files.push(FileStats {
                path: decoded.path,
                geometry: decoded.geometry,
                block_count: decoded.block_count,
                record_count: decoded.records.len(),
            });
            records.extend(decoded.records);
        }

        info!(files = files.len(), records = records.len(), "Decoded capture");

        Ok(DecodedCapture {
            geometry,
            records,
            files,
            source_hash: source.finalize().to_hex().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::capture;
    use super::super::layout::DEFAULT_MAX_ATTEMPTS;
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("windgps_stream_{}_{name}", std::process::id()))
    }

    fn decoder(nominal: BlockGeometry, revalidate: bool) -> BlockStreamDecoder {
        let codec = RecordCodec::default();
        BlockStreamDecoder::new(
            codec,
            LayoutDiscoverer::new(codec, DEFAULT_MAX_ATTEMPTS),
            nominal,
            revalidate,
        )
    }

    #[test]
    fn test_block_reader_yields_every_block() {
        let codec = RecordCodec::default();
        let geometry = BlockGeometry::new(5, 95);
        let bytes = capture(&codec, geometry, 3);

        let mut reader = BlockReader::new(bytes.as_slice(), codec, geometry);
        let blocks: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(reader.blocks_read(), 3);
        assert_eq!(blocks[2].records[4].local_millis, 1_000 + 15 * 200);
    }

    #[test]
    fn test_block_reader_skips_partial_tail() {
        let codec = RecordCodec::default();
        let geometry = BlockGeometry::new(5, 95);
        let mut bytes = capture(&codec, geometry, 2);
        bytes.extend_from_slice(&[9; 100]);

        let blocks: Vec<_> = BlockReader::new(bytes.as_slice(), codec, geometry)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_block_reader_empty() {
        let codec = RecordCodec::default();
        let mut reader = BlockReader::new(&[0u8; 0][..], codec, BlockGeometry::new(5, 95));
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_decode_files_preserves_order() {
        let codec = RecordCodec::default();
        let truth = BlockGeometry::new(5, 95);
        let a = temp_path("order_a.bin");
        let b = temp_path("order_b.bin");
        std::fs::write(&a, capture(&codec, truth, 2)).unwrap();
        std::fs::write(&b, capture(&codec, truth, 3)).unwrap();

        let decoded = decoder(BlockGeometry::new(5, 90), false)
            .decode_files(&[&b, &a])
            .unwrap();
        assert_eq!(decoded.geometry, truth);
        assert_eq!(decoded.records.len(), 25);
        assert_eq!(decoded.files[0].path, b);
        assert_eq!(decoded.files[0].record_count, 15);
        assert_eq!(decoded.files[1].record_count, 10);
        // b's records come first, then a restarts the sequence
        assert_eq!(decoded.records[14].local_millis, 1_000 + 15 * 200);
        assert_eq!(decoded.records[15].local_millis, 1_000 + 200);
        assert_eq!(decoded.source_hash.len(), 64);

        let _ = std::fs::remove_file(&a);
        let _ = std::fs::remove_file(&b);
    }

    #[test]
    fn test_decode_files_source_hash_depends_on_order() {
        let codec = RecordCodec::default();
        let truth = BlockGeometry::new(5, 95);
        let a = temp_path("hash_a.bin");
        let b = temp_path("hash_b.bin");
        std::fs::write(&a, capture(&codec, truth, 2)).unwrap();
        std::fs::write(&b, capture(&codec, truth, 3)).unwrap();

        let d = decoder(truth, false);
        let ab = d.decode_files(&[&a, &b]).unwrap();
        let ba = d.decode_files(&[&b, &a]).unwrap();
        let ab_again = d.decode_files(&[&a, &b]).unwrap();
        assert_ne!(ab.source_hash, ba.source_hash);
        assert_eq!(ab.source_hash, ab_again.source_hash);

        let _ = std::fs::remove_file(&a);
        let _ = std::fs::remove_file(&b);
    }

    #[test]
    fn test_decode_files_empty() {
        let paths: [PathBuf; 0] = [];
        let err = decoder(BlockGeometry::new(5, 90), false)
            .decode_files(&paths)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyFileSet));
    }

    #[test]
    fn test_decode_files_layout_not_found_propagates() {
        let a = temp_path("garbage.bin");
        let mut bytes = vec![0u8; 5000];
        bytes[..4].copy_from_slice(&5u32.to_le_bytes());
        for (i, b) in bytes.iter_mut().enumerate().skip(4) {
            *b = u8::try_from(i % 251).unwrap();
        }
        std::fs::write(&a, &bytes).unwrap();

        let codec = RecordCodec::default();
        let d = BlockStreamDecoder::new(
            codec,
            LayoutDiscoverer::new(codec, 3),
            BlockGeometry::new(5, 90),
            false,
        );
        let err = d.decode_files(&[&a]).unwrap_err();
        assert!(matches!(err, Error::LayoutNotFound { .. }));

        let _ = std::fs::remove_file(&a);
    }

    #[test]
    fn test_decode_file_truncated() {
        let a = temp_path("short.bin");
        std::fs::write(&a, [5u8, 0, 0, 0, 1, 2, 3]).unwrap();

        let err = decoder(BlockGeometry::new(5, 95), false)
            .decode_file(&a, BlockGeometry::new(5, 95))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedInput {
                needed: 839,
                available: 7
            }
        ));

        let _ = std::fs::remove_file(&a);
    }

    #[test]
    fn test_revalidate_per_file_uses_each_geometry() {
        let codec = RecordCodec::default();
        let a = temp_path("reval_a.bin");
        let b = temp_path("reval_b.bin");
        std::fs::write(&a, capture(&codec, BlockGeometry::new(5, 95), 2)).unwrap();
        std::fs::write(&b, capture(&codec, BlockGeometry::new(5, 97), 2)).unwrap();

        let decoded = decoder(BlockGeometry::new(5, 90), true)
            .decode_files(&[&a, &b])
            .unwrap();
        assert_eq!(decoded.geometry, BlockGeometry::new(5, 95));
        assert_eq!(decoded.files[1].geometry, BlockGeometry::new(5, 97));
        assert_eq!(decoded.records.len(), 20);
        assert_eq!(decoded.records[19].local_millis, 1_000 + 10 * 200);

        let _ = std::fs::remove_file(&a);
        let _ = std::fs::remove_file(&b);
    }
}
