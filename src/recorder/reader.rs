//----------------------------------------------------------------------------------------------
// Module recorder::reader
// Recorder reader (C12): memory-maps a `.xmraw` file and replays its containers as a lazy
// iterator of frames, decompressing one container at a time. Grounded in
// pyxcp/recorder/reco.py's XcpLogFileReader (`frames` generator, `get`); see spec.md section
// 4.12.

use std::path::Path;

use byteorder::{ByteOrder as _, LittleEndian};
use memmap2::Mmap;

use super::{category_from_code, RecorderError, CONTAINER_HEADER_SIZE, FILE_HEADER_SIZE, MAGIC, RECORD_HEADER_SIZE};
use crate::types::FrameCategory;

/// One replayed record, decoded from the file's on-disk layout.
#[derive(Debug, Clone)]
pub struct ReplayedFrame {
    pub category: FrameCategory,
    pub counter: u16,
    pub timestamp_ns: f64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FileHeader {
    num_containers: u32,
    total_record_count: u32,
}

/// Read-only, memory-mapped handle onto a completed `.xmraw` file.
pub struct RecorderReader {
    mmap: Mmap,
    header: FileHeader,
}

impl RecorderReader {
    pub fn open(file_stem: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = file_stem.as_ref().with_extension(super::FILE_EXTENSION);
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < FILE_HEADER_SIZE || &mmap[0..16] != MAGIC {
            return Err(RecorderError::BadMagic);
        }
        let num_containers = LittleEndian::read_u32(&mmap[22..26]);
        let total_record_count = LittleEndian::read_u32(&mmap[26..30]);
        Ok(RecorderReader { mmap, header: FileHeader { num_containers, total_record_count } })
    }

    pub fn num_containers(&self) -> u32 {
        self.header.num_containers
    }

    pub fn total_record_count(&self) -> u32 {
        self.header.total_record_count
    }

    /// Lazily decompresses and yields every record across every container, in file order.
    pub fn iter(&self) -> Result<RecordIter<'_>, RecorderError> {
        Ok(RecordIter { mmap: &self.mmap, offset: FILE_HEADER_SIZE, containers_left: self.header.num_containers, current: None })
    }

    /// Drains the whole file into a columnar `RecordTable`, for callers that hand the recording
    /// to a dataframe library rather than processing it frame by frame.
    pub fn as_table(&self) -> Result<RecordTable, RecorderError> {
        let mut table = RecordTable {
            categories: Vec::with_capacity(self.header.total_record_count as usize),
            counters: Vec::with_capacity(self.header.total_record_count as usize),
            timestamps_ns: Vec::with_capacity(self.header.total_record_count as usize),
            payloads: Vec::with_capacity(self.header.total_record_count as usize),
        };
        for frame in self.iter()? {
            let frame = frame?;
            table.categories.push(frame.category);
            table.counters.push(frame.counter);
            table.timestamps_ns.push(frame.timestamp_ns);
            table.payloads.push(frame.payload);
        }
        Ok(table)
    }
}

/// Columnar materialization of a recording: one vector per field, all the same length, indexed
/// by record position.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    pub categories: Vec<FrameCategory>,
    pub counters: Vec<u16>,
    pub timestamps_ns: Vec<f64>,
    pub payloads: Vec<Vec<u8>>,
}

impl RecordTable {
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

struct CurrentContainer {
    data: Vec<u8>,
    cursor: usize,
}

pub struct RecordIter<'a> {
    mmap: &'a [u8],
    offset: usize,
    containers_left: u32,
    current: Option<CurrentContainer>,
}

impl<'a> RecordIter<'a> {
    fn load_next_container(&mut self) -> Result<bool, RecorderError> {
        if self.containers_left == 0 {
            return Ok(false);
        }
        let hdr = self.mmap.get(self.offset..self.offset + CONTAINER_HEADER_SIZE).ok_or_else(|| {
            RecorderError::Truncated(format!("container header at offset {} runs past end of file", self.offset))
        })?;
        let _record_count = LittleEndian::read_u32(&hdr[0..4]);
        let compressed_size = LittleEndian::read_u32(&hdr[4..8]) as usize;
        let uncompressed_size = LittleEndian::read_u32(&hdr[8..12]) as usize;
        let body_offset = self.offset + CONTAINER_HEADER_SIZE;
        let compressed = self.mmap.get(body_offset..body_offset + compressed_size).ok_or_else(|| {
            RecorderError::Truncated(format!("container body at offset {body_offset} ({compressed_size} bytes) runs past end of file"))
        })?;
        let data = lz4_flex::block::decompress(compressed, uncompressed_size)
            .map_err(|e| RecorderError::Compression(e.to_string()))?;
        self.offset = body_offset + compressed_size;
        self.containers_left -= 1;
        self.current = Some(CurrentContainer { data, cursor: 0 });
        Ok(true)
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<ReplayedFrame, RecorderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(container) = &mut self.current {
                if container.cursor < container.data.len() {
                    let buf = match container.data.get(container.cursor..) {
                        Some(b) if b.len() >= RECORD_HEADER_SIZE => b,
                        _ => return Some(Err(RecorderError::Truncated("record header runs past end of container".into()))),
                    };
                    let category_code = buf[0];
                    let counter = LittleEndian::read_u16(&buf[1..3]);
                    let timestamp_ns = LittleEndian::read_f64(&buf[3..11]);
                    let length = LittleEndian::read_u32(&buf[11..15]) as usize;
                    let payload = match buf.get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + length) {
                        Some(p) => p.to_vec(),
                        None => return Some(Err(RecorderError::Truncated("record payload runs past end of container".into()))),
                    };
                    container.cursor += RECORD_HEADER_SIZE + length;
                    let category = match category_from_code(category_code) {
                        Some(c) => c,
                        None => return Some(Err(RecorderError::Compression(format!("unknown frame category code {category_code}")))),
                    };
                    return Some(Ok(ReplayedFrame { category, counter, timestamp_ns, payload }));
                }
                self.current = None;
            }
            match self.load_next_container() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
