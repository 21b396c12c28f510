use serde::Serialize;
use std::fmt;
use std::io::{Read, Seek};
use tracing::{debug, warn};

use crate::cursor::{align, ByteCursor, ByteRange};
use crate::error::{BoundsError, Error, FormatError, Result};

pub const FSB4_MAGIC: &[u8; 4] = b"FSB4";

/// Fixed part of every bank header: magic plus five u32 fields.
pub const BANK_HEADER_SIZE: u64 = 24;
/// Variant that carries a 16-byte hash and 8 reserved bytes after the fields.
pub const EXTENDED_HEADER_SIZE: u64 = 48;
pub const SAMPLE_NAME_LEN: usize = 30;
pub const DATA_ALIGN: u64 = 32;
pub const MAX_SAMPLES: u32 = 2000;

/// Bank flag: every sample entry stores its own data-region offset at
/// [`entry::DATA_OFFSET`] instead of relying on accumulation.
pub const FLAG_EXPLICIT_OFFSETS: u32 = 0x0000_0100;

const PLAUSIBLE_ENTRY_SIZE: std::ops::RangeInclusive<u16> = 32..=512;

/// Field offsets inside one sample-header entry.
pub mod entry {
    pub const SIZE: u64 = 0;
    pub const NAME: u64 = 2;
    pub const SAMPLE_COUNT: u64 = 32;
    pub const COMPRESSED_SIZE: u64 = 36;
    pub const UNCOMPRESSED_SIZE: u64 = 40;
    pub const LOOP_START: u64 = 44;
    pub const LOOP_END: u64 = 48;
    pub const MODE: u64 = 52;
    pub const FREQUENCY: u64 = 56;
    pub const CHANNELS: u64 = 66;
    pub const DATA_OFFSET: u64 = 76;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Codec {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    PcmFloat,
    GcAdpcm,
    ImaAdpcm,
    Vag,
    Hevag,
    Xma,
    Mpeg,
    Celt,
    At9,
    Xwma,
    Vorbis,
    Unknown,
}

impl Codec {
    const BY_MODE_BIT: [(u32, Codec); 15] = [
        (0x0000_0008, Codec::Pcm8),
        (0x0000_0010, Codec::Pcm16),
        (0x0000_0020, Codec::Pcm24),
        (0x0000_0040, Codec::Pcm32),
        (0x0000_0080, Codec::PcmFloat),
        (0x0000_0100, Codec::GcAdpcm),
        (0x0000_0200, Codec::ImaAdpcm),
        (0x0000_0400, Codec::Vag),
        (0x0000_0800, Codec::Hevag),
        (0x0000_1000, Codec::Xma),
        (0x0000_2000, Codec::Mpeg),
        (0x0000_4000, Codec::Celt),
        (0x0000_8000, Codec::At9),
        (0x0001_0000, Codec::Xwma),
        (0x0002_0000, Codec::Vorbis),
    ];

    /// Lowest set format bit wins.
    pub fn from_mode(mode: u32) -> Self {
        Self::BY_MODE_BIT
            .iter()
            .find(|(bit, _)| mode & bit != 0)
            .map(|&(_, codec)| codec)
            .unwrap_or(Codec::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pcm8 => "PCM8",
            Self::Pcm16 => "PCM16",
            Self::Pcm24 => "PCM24",
            Self::Pcm32 => "PCM32",
            Self::PcmFloat => "PCMFLOAT",
            Self::GcAdpcm => "GCADPCM",
            Self::ImaAdpcm => "IMAADPCM",
            Self::Vag => "VAG",
            Self::Hevag => "HEVAG",
            Self::Xma => "XMA",
            Self::Mpeg => "MPEG",
            Self::Celt => "CELT",
            Self::At9 => "AT9",
            Self::Xwma => "XWMA",
            Self::Vorbis => "VORBIS",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mpeg => "mp3",
            Self::Vorbis => "ogg",
            Self::Pcm8 | Self::Pcm16 | Self::Pcm24 | Self::Pcm32 | Self::PcmFloat => "wav",
            _ => "bin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fsb4Mode(pub u32);

impl Fsb4Mode {
    pub fn codec(&self) -> Codec {
        Codec::from_mode(self.0)
    }

    pub fn format_name(&self) -> &'static str {
        self.codec().name()
    }
}

/// A heuristic answer plus whether the input left any room for doubt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detected<T> {
    pub value: T,
    pub confident: bool,
}

/// Decides between the 24-byte and 48-byte main header layouts.
///
/// `at_24` is the u16 found 24 bytes into the bank. In the short layout that
/// is the first sample entry's size field, so a plausible entry size that
/// fits inside the sample table selects 24. Otherwise 48 is assumed, and the
/// answer is only confident when the u16 at 48 looks like an entry size too.
pub fn detect_main_header_size(at_24: Option<u16>, at_48: Option<u16>, sample_table_size: u32) -> Detected<u64> {
    let plausible = |v: Option<u16>| {
        v.is_some_and(|s| PLAUSIBLE_ENTRY_SIZE.contains(&s) && u32::from(s) <= sample_table_size)
    };
    if plausible(at_24) {
        Detected { value: BANK_HEADER_SIZE, confident: true }
    } else {
        Detected { value: EXTENDED_HEADER_SIZE, confident: plausible(at_48) }
    }
}

/// Picks the payload size from the two size fields. The larger one wins,
/// which covers both known field orderings without version detection.
pub fn choose_data_size(compressed: u32, uncompressed: u32) -> Detected<u32> {
    Detected {
        value: compressed.max(uncompressed),
        confident: compressed == uncompressed || compressed.min(uncompressed) == 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FsbBankHeader {
    pub magic: [u8; 4],
    pub sample_count: u32,
    pub sample_table_size: u32,
    pub data_size: u32,
    pub version: u32,
    pub flags: u32,
}

impl FsbBankHeader {
    pub fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>, at: u64) -> Result<Self> {
        if cursor.check(at, BANK_HEADER_SIZE).is_err() {
            return Err(FormatError::Truncated {
                what: "FSB bank header",
                needed: BANK_HEADER_SIZE,
                available: cursor.len().saturating_sub(at),
            }
            .into());
        }
        cursor.seek(at)?;
        Ok(Self {
            magic: cursor.read_array::<4>()?,
            sample_count: cursor.read_u32_le()?,
            sample_table_size: cursor.read_u32_le()?,
            data_size: cursor.read_u32_le()?,
            version: cursor.read_u32_le()?,
            flags: cursor.read_u32_le()?,
        })
    }

    /// Accepts both the ASCII and the raw-byte version digit.
    pub fn is_fsb4(&self) -> bool {
        &self.magic[..3] == b"FSB" && matches!(self.magic[3], b'4' | 4)
    }

    pub fn is_fsb5(&self) -> bool {
        &self.magic[..3] == b"FSB" && matches!(self.magic[3], b'5' | 5)
    }

    pub fn has_explicit_offsets(&self) -> bool {
        self.flags & FLAG_EXPLICIT_OFFSETS != 0
    }
}

/// One sample of a bank. Holds offsets only, never bytes, so it stays valid
/// after the source is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub index: usize,
    pub name: String,
    /// Offset of the payload from the start of the bank's data region.
    pub data_offset: u32,
    /// Slot size in bytes.
    pub data_size: u32,
    /// Offset of this sample's header entry from the bank start.
    pub header_offset: u32,
    pub header_size: u16,
    pub sample_count: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub mode: Fsb4Mode,
    pub frequency: i32,
    pub channels: u16,
    pub explicit_offset: bool,
    pub size_confident: bool,
}

impl Sample {
    pub fn duration(&self) -> f64 {
        if self.frequency > 0 {
            f64::from(self.sample_count) / f64::from(self.frequency)
        } else {
            0.0
        }
    }

    pub fn data_end(&self) -> u64 {
        u64::from(self.data_offset) + u64::from(self.data_size)
    }
}

/// Something the parser noticed but tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Inconsistency {
    /// The 24/48 header decision could not be corroborated.
    AmbiguousHeaderSize { chosen: u64 },
    /// A sample's slot ends past the declared data region.
    SampleExceedsData { index: usize, end: u64, data_size: u32 },
    /// The table ended (source exhausted) before every declared entry was read.
    TableTruncated { parsed: usize, declared: u32 },
    /// An entry declared a size too small to step over.
    BadEntrySize { index: usize, entry_size: u16 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousHeaderSize { chosen } => {
                write!(f, "main header size uncorroborated, assumed {chosen}")
            }
            Self::SampleExceedsData { index, end, data_size } => {
                write!(f, "sample {index} ends at {end}, past declared data size {data_size}")
            }
            Self::TableTruncated { parsed, declared } => {
                write!(f, "sample table truncated after {parsed} of {declared} entries")
            }
            Self::BadEntrySize { index, entry_size } => {
                write!(f, "sample {index} declares entry size {entry_size}")
            }
        }
    }
}

/// A parsed FSB4 bank: header, layout decision and sample snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsbBank {
    /// Absolute offset of the bank magic in its source.
    pub start: u64,
    pub header: FsbBankHeader,
    pub main_header_size: Detected<u64>,
    pub samples: Vec<Sample>,
    pub issues: Vec<Inconsistency>,
}

impl FsbBank {
    /// Parses the bank at `start`. Structural failures (bad magic, sample
    /// count out of bounds, unreadable header) are errors; a truncated
    /// sample table is not, and yields the entries read so far.
    pub fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>, start: u64, max_samples: u32) -> Result<Self> {
        let header = FsbBankHeader::read(cursor, start)?;
        if !header.is_fsb4() {
            if header.is_fsb5() {
                return Err(FormatError::Unsupported("FSB5").into());
            }
            return Err(FormatError::BadMagic { what: "FSB4", found: header.magic }.into());
        }
        if header.sample_count == 0 || header.sample_count > max_samples {
            return Err(FormatError::SampleCount { count: header.sample_count, max: max_samples }.into());
        }

        let main_header_size = detect_main_header_size(
            cursor.u16_le_at(start + BANK_HEADER_SIZE).ok(),
            cursor.u16_le_at(start + EXTENDED_HEADER_SIZE).ok(),
            header.sample_table_size,
        );

        let mut bank = FsbBank { start, header, main_header_size, samples: Vec::new(), issues: Vec::new() };
        if !main_header_size.confident {
            bank.issues.push(Inconsistency::AmbiguousHeaderSize { chosen: main_header_size.value });
        }
        bank.walk_table(cursor);
        Ok(bank)
    }

    fn walk_table<R: Read + Seek>(&mut self, cursor: &mut ByteCursor<R>) {
        let explicit = self.header.has_explicit_offsets();
        let mut entry_rel = self.main_header_size.value;
        let mut running: u64 = 0;

        for index in 0..self.header.sample_count as usize {
            let raw = match RawEntry::read(cursor, self.start + entry_rel, explicit) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("sample table of bank 0x{:X} stops at entry {}: {}", self.start, index, e);
                    self.issues.push(Inconsistency::TableTruncated {
                        parsed: index,
                        declared: self.header.sample_count,
                    });
                    break;
                }
            };

            let (offset, size, size_confident, explicit_offset) = match raw.data_offset {
                Some(offset) => (u64::from(offset), raw.compressed, true, true),
                None => {
                    let size = choose_data_size(raw.compressed, raw.uncompressed);
                    (running, size.value, size.confident, false)
                }
            };

            let end = offset + u64::from(size);
            if end > u64::from(self.header.data_size) {
                warn!(
                    "bank 0x{:X}: sample {} ({}) ends at {} but data size is {}",
                    self.start, index, raw.name, end, self.header.data_size
                );
                self.issues.push(Inconsistency::SampleExceedsData {
                    index,
                    end,
                    data_size: self.header.data_size,
                });
            }

            // Already flagged as an overrun: the offset is past any u32 data size.
            let Ok(data_offset) = u32::try_from(offset) else {
                debug!("bank 0x{:X}: sample {} offset {} does not fit a descriptor", self.start, index, offset);
                break;
            };

            let sample = Sample {
                index,
                name: raw.name,
                data_offset,
                data_size: size,
                header_offset: entry_rel as u32,
                header_size: raw.entry_size,
                sample_count: raw.sample_count,
                compressed_size: raw.compressed,
                uncompressed_size: raw.uncompressed,
                loop_start: raw.loop_start,
                loop_end: raw.loop_end,
                mode: Fsb4Mode(raw.mode),
                frequency: raw.frequency,
                channels: raw.channels,
                explicit_offset,
                size_confident,
            };
            debug!(
                "  [Sample {}] {} | Format: {} | Channels: {} | Freq: {}Hz | Offset: 0x{:X} | Size: {} bytes",
                index,
                sample.name,
                sample.mode.format_name(),
                sample.channels,
                sample.frequency,
                self.data_region_start() + u64::from(sample.data_offset),
                sample.data_size
            );
            self.samples.push(sample);

            running = offset + align(u64::from(size), DATA_ALIGN);

            if raw.entry_size == 0 {
                self.issues.push(Inconsistency::BadEntrySize { index, entry_size: raw.entry_size });
                break;
            }
            entry_rel += u64::from(raw.entry_size);
        }
    }

    /// Absolute offset of the first byte after the sample table.
    pub fn data_region_start(&self) -> u64 {
        self.start + self.main_header_size.value + u64::from(self.header.sample_table_size)
    }

    /// Bank length implied by its own header fields.
    pub fn declared_size(&self) -> u64 {
        self.main_header_size.value + u64::from(self.header.sample_table_size) + u64::from(self.header.data_size)
    }

    /// Absolute byte range of a sample's slot.
    pub fn sample_range(&self, sample: &Sample) -> ByteRange {
        let start = self.data_region_start() + u64::from(sample.data_offset);
        ByteRange::new(start, start + u64::from(sample.data_size))
    }

    /// Like [`sample_range`](Self::sample_range), but refuses a slot that
    /// runs past the bank's declared end.
    pub fn bounded_sample_range(&self, sample: &Sample) -> std::result::Result<ByteRange, BoundsError> {
        let slot = self.sample_range(sample);
        let bank_end = self.start + self.declared_size();
        if slot.end > bank_end {
            return Err(BoundsError { offset: slot.start, len: slot.len(), source_len: bank_end });
        }
        Ok(slot)
    }

    /// Absolute offset of a sample's header entry.
    pub fn sample_header_start(&self, sample: &Sample) -> u64 {
        self.start + u64::from(sample.header_offset)
    }

    pub fn find(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn is_consistent(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i, Inconsistency::SampleExceedsData { .. } | Inconsistency::TableTruncated { .. }))
    }

    /// Size the slot would have if the size fields held these values.
    pub fn slot_size_for(&self, compressed: u32, uncompressed: u32) -> u32 {
        if self.header.has_explicit_offsets() {
            compressed
        } else {
            choose_data_size(compressed, uncompressed).value
        }
    }
}

struct RawEntry {
    entry_size: u16,
    name: String,
    sample_count: u32,
    compressed: u32,
    uncompressed: u32,
    loop_start: u32,
    loop_end: u32,
    mode: u32,
    frequency: i32,
    channels: u16,
    data_offset: Option<u32>,
}

impl RawEntry {
    fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>, at: u64, explicit: bool) -> Result<Self> {
        let entry_size = cursor.u16_le_at(at + entry::SIZE)?;
        let mut name_bytes = [0u8; SAMPLE_NAME_LEN];
        cursor.read_exact_at(at + entry::NAME, &mut name_bytes)?;
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(SAMPLE_NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        let data_offset = if explicit && u64::from(entry_size) >= entry::DATA_OFFSET + 4 {
            Some(cursor.u32_le_at(at + entry::DATA_OFFSET)?)
        } else {
            None
        };

        Ok(Self {
            entry_size,
            name,
            sample_count: cursor.u32_le_at(at + entry::SAMPLE_COUNT)?,
            compressed: cursor.u32_le_at(at + entry::COMPRESSED_SIZE)?,
            uncompressed: cursor.u32_le_at(at + entry::UNCOMPRESSED_SIZE)?,
            loop_start: cursor.u32_le_at(at + entry::LOOP_START)?,
            loop_end: cursor.u32_le_at(at + entry::LOOP_END)?,
            mode: cursor.u32_le_at(at + entry::MODE)?,
            frequency: cursor.i32_le_at(at + entry::FREQUENCY)?,
            channels: cursor.u16_le_at(at + entry::CHANNELS)?,
            data_offset,
        })
    }
}

/// Parses the bank at `bank_start`, or returns `None` when it is unusable.
/// The cause is logged, never returned.
pub fn parse_bank<R: Read + Seek>(cursor: &mut ByteCursor<R>, bank_start: u64, max_samples: u32) -> Option<FsbBank> {
    match FsbBank::read(cursor, bank_start, max_samples) {
        Ok(bank) => Some(bank),
        Err(Error::Format(FormatError::Unsupported(kind))) => {
            warn!("{} detected at 0x{:X}; parsing is not implemented", kind, bank_start);
            None
        }
        Err(e) => {
            warn!("no samples parsed at 0x{:X}: {}", bank_start, e);
            None
        }
    }
}

/// Sample descriptors of the bank at `bank_start`; empty when it is unusable.
pub fn parse<R: Read + Seek>(cursor: &mut ByteCursor<R>, bank_start: u64) -> Vec<Sample> {
    parse_bank(cursor, bank_start, MAX_SAMPLES).map(|b| b.samples).unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::test_support::{BankBuilder, SampleSpec};
    use super::*;

    fn payload(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn larger_size_field_wins_and_overrun_is_flagged() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"FSB4");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&1024u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let mut entry = vec![0u8; 40];
        entry[0..2].copy_from_slice(&40u16.to_le_bytes());
        entry[2..7].copy_from_slice(b"hit01");
        entry[36..40].copy_from_slice(&1024u32.to_le_bytes());
        bytes.extend_from_slice(&entry);
        // The uncompressed field sits at entry + 40, the first data byte.
        let mut data = vec![0u8; 1024];
        data[0..4].copy_from_slice(&2048u32.to_le_bytes());
        bytes.extend_from_slice(&data);

        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        assert_eq!(bank.main_header_size.value, 24);
        assert_eq!(bank.samples.len(), 1);
        let s = &bank.samples[0];
        assert_eq!(s.name, "hit01");
        assert_eq!(s.data_offset, 0);
        assert_eq!(s.data_size, 2048);
        assert!(!s.size_confident);
        assert!(!bank.is_consistent());
        assert!(bank.issues.contains(&Inconsistency::SampleExceedsData { index: 0, end: 2048, data_size: 1024 }));
    }

    #[test]
    fn offset_past_u32_stops_the_walk() {
        let mut bytes = BankBuilder::new()
            .sample(SampleSpec::new("huge", payload(16, 1)))
            .sample(SampleSpec::new("next", payload(16, 2)))
            .build();
        let compressed = (BANK_HEADER_SIZE + entry::COMPRESSED_SIZE) as usize;
        bytes[compressed..compressed + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        assert_eq!(bank.samples.len(), 1);
        assert_eq!(bank.samples[0].data_size, u32::MAX);
        assert!(bank.issues.contains(&Inconsistency::SampleExceedsData { index: 1, end: (1u64 << 32) + 16, data_size: 64 }));
    }

    #[test]
    fn accumulates_aligned_offsets() {
        let bytes = BankBuilder::new()
            .sample(SampleSpec::new("a", payload(100, 1)))
            .sample(SampleSpec::new("b", payload(64, 2)).sizes(10, 64))
            .sample(SampleSpec::new("c", payload(33, 3)))
            .build();
        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();

        let offsets: Vec<u32> = bank.samples.iter().map(|s| s.data_offset).collect();
        assert_eq!(offsets, vec![0, 128, 192]);
        assert_eq!(bank.samples[1].data_size, 64);
        assert!(bank.is_consistent());

        let total: u64 = bank.samples.iter().map(|s| align(u64::from(s.data_size), DATA_ALIGN)).sum();
        assert!(total <= u64::from(bank.header.data_size));
    }

    #[test]
    fn extended_header_layout() {
        let bytes = BankBuilder::new().extended().sample(SampleSpec::new("snd", payload(50, 9))).build();
        let mut cursor = ByteCursor::from_bytes(bytes.clone());
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        assert_eq!(bank.main_header_size, Detected { value: 48, confident: true });
        assert_eq!(bank.data_region_start(), 48 + 80);
        assert_eq!(bank.declared_size(), bytes.len() as u64);
        let range = bank.sample_range(&bank.samples[0]);
        assert_eq!(&bytes[range.start as usize..range.end as usize], &payload(50, 9)[..]);
    }

    #[test]
    fn explicit_offsets_reset_accumulation() {
        let bytes = BankBuilder::new()
            .explicit_offsets()
            .sample(SampleSpec::new("late", payload(40, 1)).at(128))
            .sample(SampleSpec::new("early", payload(20, 2)).at(0))
            .build();
        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        assert_eq!(bank.samples[0].data_offset, 128);
        assert_eq!(bank.samples[1].data_offset, 0);
        assert!(bank.samples.iter().all(|s| s.explicit_offset));
    }

    #[test]
    fn header_size_heuristic() {
        assert_eq!(detect_main_header_size(Some(80), None, 160).value, 24);
        // Too big to fit the table, so it cannot be an entry size.
        assert_eq!(detect_main_header_size(Some(80), Some(80), 40).value, 48);
        assert_eq!(detect_main_header_size(Some(8), Some(80), 160), Detected { value: 48, confident: true });
        assert_eq!(detect_main_header_size(Some(600), Some(7), 4096), Detected { value: 48, confident: false });
        assert_eq!(detect_main_header_size(None, None, 100).value, 48);
    }

    #[test]
    fn size_choice_confidence() {
        assert_eq!(choose_data_size(100, 100), Detected { value: 100, confident: true });
        assert_eq!(choose_data_size(100, 0), Detected { value: 100, confident: true });
        assert_eq!(choose_data_size(100, 300), Detected { value: 300, confident: false });
    }

    #[test]
    fn rejects_bad_banks() {
        let mut cursor = ByteCursor::from_bytes(b"FSB5\x01\0\0\0".repeat(4));
        assert!(matches!(
            FsbBank::read(&mut cursor, 0, MAX_SAMPLES),
            Err(Error::Format(FormatError::Unsupported("FSB5")))
        ));
        assert!(parse(&mut cursor, 0).is_empty());

        let mut zero = BankBuilder::new().build();
        zero[4..8].copy_from_slice(&0u32.to_le_bytes());
        assert!(parse(&mut ByteCursor::from_bytes(zero), 0).is_empty());

        let mut huge = BankBuilder::new().sample(SampleSpec::new("x", vec![1; 4])).build();
        huge[4..8].copy_from_slice(&5000u32.to_le_bytes());
        assert!(matches!(
            FsbBank::read(&mut ByteCursor::from_bytes(huge), 0, MAX_SAMPLES),
            Err(Error::Format(FormatError::SampleCount { count: 5000, .. }))
        ));

        assert!(parse(&mut ByteCursor::from_bytes(b"FSB4".to_vec()), 0).is_empty());
    }

    #[test]
    fn truncated_table_keeps_parsed_entries() {
        let mut bytes = BankBuilder::new()
            .sample(SampleSpec::new("one", payload(8, 1)))
            .sample(SampleSpec::new("two", payload(8, 2)))
            .build();
        // Cut in the middle of the second entry.
        bytes.truncate(24 + 80 + 40);
        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        assert_eq!(bank.samples.len(), 1);
        assert_eq!(bank.samples[0].name, "one");
        assert!(bank.issues.contains(&Inconsistency::TableTruncated { parsed: 1, declared: 2 }));
    }

    #[test]
    fn codec_from_mode_bits() {
        assert_eq!(Fsb4Mode(0x2000).format_name(), "MPEG");
        assert_eq!(Fsb4Mode(0x0010 | 0x2000).codec(), Codec::Pcm16);
        assert_eq!(Fsb4Mode(0).format_name(), "UNKNOWN");
        assert_eq!(Codec::Vorbis.extension(), "ogg");
    }
}
