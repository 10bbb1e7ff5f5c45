//----------------------------------------------------------------------------------------------
// Module recorder
// Recorder writer (C11): appends classified frames into a chunked, LZ4-compressed `.xmraw` log
// with constant-memory back-pressure. Byte-for-byte grounded in
// pyxcp/recorder/reco.py's FILE_HEADER_STRUCT / CONTAINER_HEADER_STRUCT / DAQ_RECORD_STRUCT and
// XcpLogFileWriter; see spec.md section 4.11.

pub mod reader;

use std::fs::OpenOptions;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::MmapMut;
use thiserror::Error;

use crate::policy::AcquisitionPolicy;
use crate::types::FrameCategory;

pub const FILE_EXTENSION: &str = "xmraw";
pub const MAGIC: &[u8; 16] = b"ASAMINT::XCP_RAW";
pub const FILE_HEADER_SIZE: usize = 16 + 2 + 2 + 2 + 4 + 4 + 4 + 4; // 40 bytes
pub const CONTAINER_HEADER_SIZE: usize = 4 + 4 + 4; // 12 bytes
pub const RECORD_HEADER_SIZE: usize = 1 + 2 + 8 + 4; // category, counter, timestamp_ns(f64), length

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid file magic")]
    BadMagic,
    #[error("maximum preallocated file size exceeded")]
    CapacityExceeded,
    #[error("duplicate slave counter {0} (strict mode)")]
    DuplicateCounter(u16),
    #[error("LZ4 (de)compression failed: {0}")]
    Compression(String),
    #[error("truncated recording: {0}")]
    Truncated(String),
}

fn category_code(category: FrameCategory) -> u8 {
    match category {
        FrameCategory::Daq => 1,
        FrameCategory::Stim => 2,
        FrameCategory::Cmd => 3,
        FrameCategory::Response => 4,
        FrameCategory::Error => 5,
        FrameCategory::Event => 6,
        FrameCategory::Serv => 7,
        FrameCategory::Metadata => 8,
    }
}

pub fn category_from_code(code: u8) -> Option<FrameCategory> {
    Some(match code {
        1 => FrameCategory::Daq,
        2 => FrameCategory::Stim,
        3 => FrameCategory::Cmd,
        4 => FrameCategory::Response,
        5 => FrameCategory::Error,
        6 => FrameCategory::Event,
        7 => FrameCategory::Serv,
        8 => FrameCategory::Metadata,
        _ => return None,
    })
}

/// How the writer (and the replaying reader) treats a duplicate slave-side sequence counter.
/// The source drops duplicates silently with a warning; spec.md section 9's Open Question asks
/// for this to be a config choice rather than a silently-picked behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStrictness {
    Lenient,
    Strict,
}

struct PendingRecord {
    category: u8,
    counter: u16,
    timestamp_ns: f64,
    payload: Vec<u8>,
}

/// Appends classified frames into a pre-allocated, memory-mapped `.xmraw` file. `add_frame` is
/// O(1) amortized: records accumulate in `pending` until `chunk_size` bytes are reached, then are
/// LZ4-compressed and flushed as one container, bounding memory regardless of session duration
/// (spec.md section 8, property 6's sibling guarantee for the recorder).
pub struct RecorderWriter {
    file: std::fs::File,
    mmap: MmapMut,
    container_header_offset: usize,
    current_offset: usize,
    chunk_size_bytes: usize,
    compression_level: u32,
    pending: Vec<PendingRecord>,
    pending_uncompressed_size: usize,
    total_record_count: u32,
    num_containers: u32,
    total_size_compressed: u32,
    total_size_uncompressed: u32,
    prealloc_bytes: u64,
    strictness: RecorderStrictness,
    last_counter: Option<u16>,
    closed: bool,
}

impl RecorderWriter {
    /// `file_stem` is the path without `.xmraw`; `prealloc_mb` preallocates a sparse file,
    /// `chunk_size_kb` is the uncompressed-bytes threshold that triggers a container flush.
    pub fn create(
        file_stem: impl AsRef<Path>,
        prealloc_mb: u64,
        chunk_size_kb: u64,
        compression_level: u32,
        strictness: RecorderStrictness,
    ) -> Result<Self, RecorderError> {
        let path = file_stem.as_ref().with_extension(FILE_EXTENSION);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        let prealloc_bytes = prealloc_mb * 1024 * 1024;
        file.set_len(prealloc_bytes.max((FILE_HEADER_SIZE + CONTAINER_HEADER_SIZE) as u64))?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(RecorderWriter {
            file,
            mmap,
            container_header_offset: FILE_HEADER_SIZE,
            current_offset: FILE_HEADER_SIZE + CONTAINER_HEADER_SIZE,
            chunk_size_bytes: (chunk_size_kb * 1024) as usize,
            compression_level,
            pending: Vec::new(),
            pending_uncompressed_size: 0,
            total_record_count: 0,
            num_containers: 0,
            total_size_compressed: 0,
            total_size_uncompressed: 0,
            prealloc_bytes,
            strictness,
            last_counter: None,
            closed: false,
        })
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), RecorderError> {
        if offset + data.len() > self.mmap.len() {
            return Err(RecorderError::CapacityExceeded);
        }
        self.mmap[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Appends one classified frame. Returns `Ok(())` even when the strict duplicate-counter
    /// check drops a frame under `Lenient` mode; under `Strict` mode a duplicate counter is a
    /// hard error.
    pub fn add_frame(&mut self, category: FrameCategory, counter: u16, timestamp_ns: f64, payload: &[u8]) -> Result<(), RecorderError> {
        if category == FrameCategory::Daq {
            if let Some(last) = self.last_counter {
                if last == counter {
                    match self.strictness {
                        RecorderStrictness::Lenient => {
                            log::warn!("recorder: dropping duplicate DAQ counter {counter}");
                            return Ok(());
                        }
                        RecorderStrictness::Strict => return Err(RecorderError::DuplicateCounter(counter)),
                    }
                }
            }
            self.last_counter = Some(counter);
        }

        let record_len = RECORD_HEADER_SIZE + payload.len();
        self.pending_uncompressed_size += record_len;
        self.pending.push(PendingRecord { category: category_code(category), counter, timestamp_ns, payload: payload.to_vec() });
        if self.pending_uncompressed_size >= self.chunk_size_bytes {
            self.flush_container()?;
        }
        Ok(())
    }

    fn flush_container(&mut self) -> Result<(), RecorderError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut raw = Vec::with_capacity(self.pending_uncompressed_size);
        for rec in &self.pending {
            raw.write_u8(rec.category)?;
            raw.write_u16::<LittleEndian>(rec.counter)?;
            raw.write_f64::<LittleEndian>(rec.timestamp_ns)?;
            raw.write_u32::<LittleEndian>(rec.payload.len() as u32)?;
            raw.extend_from_slice(&rec.payload);
        }
        let compressed = lz4_flex::block::compress(&raw);
        let record_count = self.pending.len() as u32;
        let uncompressed_size = raw.len() as u32;
        let compressed_size = compressed.len() as u32;

        let mut hdr = Vec::with_capacity(CONTAINER_HEADER_SIZE);
        hdr.write_u32::<LittleEndian>(record_count)?;
        hdr.write_u32::<LittleEndian>(compressed_size)?;
        hdr.write_u32::<LittleEndian>(uncompressed_size)?;

        self.write_at(self.current_offset, &compressed)?;
        self.write_at(self.container_header_offset, &hdr)?;

        self.container_header_offset = self.current_offset + compressed.len();
        self.current_offset = self.container_header_offset + CONTAINER_HEADER_SIZE;
        self.pending.clear();
        self.pending_uncompressed_size = 0;
        self.total_record_count += record_count;
        self.num_containers += 1;
        self.total_size_uncompressed += uncompressed_size;
        self.total_size_compressed += compressed_size;
        Ok(())
    }

    fn write_file_header(&mut self) -> Result<(), RecorderError> {
        let mut hdr = Vec::with_capacity(FILE_HEADER_SIZE);
        hdr.extend_from_slice(MAGIC);
        hdr.write_u16::<LittleEndian>(FILE_HEADER_SIZE as u16)?;
        hdr.write_u16::<LittleEndian>(0x0100)?;
        hdr.write_u16::<LittleEndian>(0)?; // options
        hdr.write_u32::<LittleEndian>(self.num_containers)?;
        hdr.write_u32::<LittleEndian>(self.total_record_count)?;
        hdr.write_u32::<LittleEndian>(self.total_size_compressed)?;
        hdr.write_u32::<LittleEndian>(self.total_size_uncompressed)?;
        self.write_at(0, &hdr)
    }

    /// Flushes the in-memory chunk (if any), writes the final header counters, and truncates the
    /// file to the exact used size. Idempotent; safe to call multiple times.
    pub fn finalize(&mut self) -> Result<(), RecorderError> {
        if self.closed {
            return Ok(());
        }
        self.flush_container()?;
        self.write_file_header()?;
        self.mmap.flush()?;
        self.file.set_len(self.current_offset as u64)?;
        self.closed = true;
        Ok(())
    }

    pub fn compression_ratio(&self) -> Option<f64> {
        if self.total_size_compressed == 0 {
            None
        } else {
            Some(self.total_size_uncompressed as f64 / self.total_size_compressed as f64)
        }
    }

    pub fn prealloc_bytes(&self) -> u64 {
        self.prealloc_bytes
    }
}

impl Drop for RecorderWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.finalize();
        }
    }
}

/// Adapts a `RecorderWriter` to the acquisition-policy interface (C4) so a session can be
/// configured to record DAQ/STIM traffic directly, mirroring pyxcp's FrameRecorderPolicy.
pub struct RecorderPolicy {
    writer: parking_lot::Mutex<RecorderWriter>,
    start: std::time::Instant,
}

impl RecorderPolicy {
    pub fn new(writer: RecorderWriter) -> Self {
        RecorderPolicy { writer: parking_lot::Mutex::new(writer), start: std::time::Instant::now() }
    }
}

impl AcquisitionPolicy for RecorderPolicy {
    fn feed(&self, category: FrameCategory, counter: u16, timestamp_ns: u64, payload: &[u8]) {
        let ts = timestamp_ns as f64;
        let _ = self.start; // timestamps are already absolute ns from the session's clock
        if let Err(e) = self.writer.lock().add_frame(category, counter, ts, payload) {
            log::error!("recorder: failed to append frame: {e}");
        }
    }

    fn finalize(&self) {
        if let Err(e) = self.writer.lock().finalize() {
            log::error!("recorder: finalize failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::reader::RecorderReader;

    /// Scenario S5 from spec.md section 8: write many frames, round-trip through the reader.
    #[test]
    fn round_trip_preserves_every_frame() {
        let dir = std::env::temp_dir().join(format!("xcp_core_recorder_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let stem = dir.join("roundtrip");

        let mut writer = RecorderWriter::create(&stem, 4, 16, 1, RecorderStrictness::Lenient).unwrap();
        let n = 2000;
        let mut expected = Vec::with_capacity(n);
        for i in 0..n {
            let category = if i % 5 == 0 { FrameCategory::Event } else { FrameCategory::Daq };
            let counter = (i % 65536) as u16;
            let ts = i as f64 * 1000.0;
            let payload: Vec<u8> = (0..((i % 17) + 1)).map(|b| (b + i) as u8).collect();
            writer.add_frame(category, counter, ts, &payload).unwrap();
            expected.push((category, counter, ts, payload));
        }
        writer.finalize().unwrap();

        let reader = RecorderReader::open(&stem).unwrap();
        let records: Vec<_> = reader.iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), expected.len());
        for (got, (cat, ctr, ts, payload)) in records.iter().zip(expected.iter()) {
            assert_eq!(got.category, *cat);
            assert_eq!(got.counter, *ctr);
            assert_eq!(got.timestamp_ns, *ts);
            assert_eq!(&got.payload, payload);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn strict_mode_rejects_duplicate_daq_counters() {
        let dir = std::env::temp_dir().join(format!("xcp_core_recorder_strict_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let stem = dir.join("strict");
        let mut writer = RecorderWriter::create(&stem, 1, 16, 1, RecorderStrictness::Strict).unwrap();
        writer.add_frame(FrameCategory::Daq, 5, 0.0, &[1]).unwrap();
        let err = writer.add_frame(FrameCategory::Daq, 5, 1.0, &[2]).unwrap_err();
        assert!(matches!(err, RecorderError::DuplicateCounter(5)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
