//! MPEG audio frame validation and stream location.
//!
//! Streams are found by sync search. A sync pattern alone is two bytes and
//! shows up constantly in unrelated binary data, so a hit only counts once it
//! chains into a run of consecutive valid frames.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ToolConfig;
use crate::cursor::{ByteCursor, ByteRange, ScanWindow};
use crate::error::Result;

/// kbps, indexed `[version][layer][bitrate_index]`; version 0 = MPEG-1,
/// 1 = MPEG-2 and 2.5; layer 0 = Layer I.
const BITRATES: [[[u32; 16]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

const SAMPLE_RATES: [[u32; 3]; 3] = [[44100, 48000, 32000], [22050, 24000, 16000], [11025, 12000, 8000]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

impl MpegVersion {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            3 => Some(Self::V1),
            2 => Some(Self::V2),
            0 => Some(Self::V25),
            _ => None,
        }
    }

    fn rate_row(&self) -> usize {
        match self {
            Self::V1 => 0,
            Self::V2 => 1,
            Self::V25 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MpegFrameHeader {
    pub version: MpegVersion,
    /// 1, 2 or 3.
    pub layer: u8,
    pub crc: bool,
    pub bitrate_index: u8,
    pub sample_rate_index: u8,
    pub padding: bool,
    pub channel_mode: u8,
    /// kbps.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub frame_size: u32,
}

impl MpegFrameHeader {
    pub fn parse(bytes: [u8; 4]) -> Option<Self> {
        let header = BigEndian::read_u32(&bytes);
        if (header >> 21) != 0x7FF {
            return None;
        }

        let version = MpegVersion::from_bits((header >> 19) & 0x03)?;
        let layer = match (header >> 17) & 0x03 {
            3 => 1u8,
            2 => 2,
            1 => 3,
            _ => return None,
        };
        let crc = (header >> 16) & 0x01 == 0;
        let bitrate_index = ((header >> 12) & 0x0F) as u8;
        let sample_rate_index = ((header >> 10) & 0x03) as u8;
        let padding = (header >> 9) & 0x01 == 1;
        let channel_mode = ((header >> 6) & 0x03) as u8;

        if bitrate_index == 0 || bitrate_index == 15 || sample_rate_index == 3 {
            return None;
        }

        let table = if version == MpegVersion::V1 { 0 } else { 1 };
        let bitrate = BITRATES[table][usize::from(layer - 1)][usize::from(bitrate_index)];
        let sample_rate = SAMPLE_RATES[version.rate_row()][usize::from(sample_rate_index)];
        let pad = u32::from(padding);

        let frame_size = match layer {
            1 => (12 * bitrate * 1000 / sample_rate + pad) * 4,
            3 if version != MpegVersion::V1 => 72 * bitrate * 1000 / sample_rate + pad,
            _ => 144 * bitrate * 1000 / sample_rate + pad,
        };

        Some(Self {
            version,
            layer,
            crc,
            bitrate_index,
            sample_rate_index,
            padding,
            channel_mode,
            bitrate,
            sample_rate,
            frame_size,
        })
    }
}

pub fn is_frame_sync_valid(bytes: [u8; 4]) -> bool {
    MpegFrameHeader::parse(bytes).is_some()
}

pub fn frame_size(bytes: [u8; 4]) -> Option<u32> {
    MpegFrameHeader::parse(bytes).map(|h| h.frame_size)
}

/// A run of consecutive valid frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MpegStream {
    pub index: usize,
    pub start: u64,
    pub len: u64,
    pub frames: u32,
    pub first: MpegFrameHeader,
}

fn header_at<R: Read + Seek>(window: &mut ScanWindow, cursor: &mut ByteCursor<R>, pos: u64) -> Result<Option<[u8; 4]>> {
    Ok(window.bytes(cursor, pos, 4)?.map(|b| [b[0], b[1], b[2], b[3]]))
}

/// Finds every run of at least `min_frames` valid frames inside `region`.
pub fn locate_streams<R: Read + Seek>(cursor: &mut ByteCursor<R>, region: ByteRange, min_frames: u32) -> Result<Vec<MpegStream>> {
    let end = region.end.min(cursor.len());
    let min_frames = min_frames.max(1);
    let mut window = ScanWindow::new(crate::config::DEFAULT_CHUNK_SIZE);
    let mut streams = Vec::new();
    let mut pos = region.start;

    while pos + 4 <= end {
        let Some(bytes) = header_at(&mut window, cursor, pos)? else { break };
        let Some(first) = MpegFrameHeader::parse(bytes) else {
            pos += 1;
            continue;
        };

        let mut cur = pos;
        let mut frames = 0u32;
        while cur + 4 <= end {
            let Some(size) = header_at(&mut window, cursor, cur)?.and_then(frame_size) else { break };
            let size = u64::from(size);
            if size < 4 || cur + size > end {
                break;
            }
            cur += size;
            frames += 1;
        }

        if frames >= min_frames {
            let stream = MpegStream { index: streams.len(), start: pos, len: cur - pos, frames, first };
            debug!("MPEG stream {} at 0x{:X}: {} frames, {} bytes", stream.index, pos, frames, stream.len);
            streams.push(stream);
            pos = cur;
        } else {
            pos += 1;
        }
    }

    Ok(streams)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MpegExtraction {
    pub dir: PathBuf,
    pub streams: Vec<MpegStream>,
}

/// Writes every stream in `path` to `<out_dir>/<stem>_mpeg/audio_<n>.mp3`.
pub fn extract_streams<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_dir: Q, cfg: &ToolConfig) -> Result<MpegExtraction> {
    let path = path.as_ref();
    let mut cursor = ByteCursor::open(path)?;
    let whole = ByteRange::new(0, cursor.len());
    let streams = locate_streams(&mut cursor, whole, cfg.mpeg_min_frames)?;

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let dir = out_dir.as_ref().join(format!("{stem}_mpeg"));
    if streams.is_empty() {
        info!("No MPEG streams found in {}", path.display());
        return Ok(MpegExtraction { dir, streams });
    }

    fs::create_dir_all(&dir)?;
    for stream in &streams {
        let out = dir.join(format!("audio_{}.mp3", stream.index));
        let mut sink = BufWriter::new(File::create(&out)?);
        cursor.copy_range(stream.start, stream.len, &mut sink, cfg.chunk_size())?;
        sink.flush()?;
        info!(
            "Extracted MPEG audio [Index {}] at 0x{:X} ({} bytes, {} frames)",
            stream.index, stream.start, stream.len, stream.frames
        );
    }
    info!("Extracted {} MPEG streams to {}", streams.len(), dir.display());
    Ok(MpegExtraction { dir, streams })
}
