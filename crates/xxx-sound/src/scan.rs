//! Signature scanning for banks embedded in an opaque region.
//!
//! The scan is a single forward pass. Once a bank is located its declared
//! extent becomes a watermark and nothing before it is looked at again, so
//! "FSB" bytes inside sample names or payloads are never mistaken for banks.

use serde::Serialize;
use std::io::{Read, Seek};
use tracing::{debug, info, warn};

use crate::config::ToolConfig;
use crate::cursor::{ByteCursor, ByteRange, ScanWindow};
use crate::error::Result;
use crate::formats::xxx::{self, ContainerLayout};
use crate::fsb::{FsbBank, Sample};

const SIGNATURE: &[u8; 3] = b"FSB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BankVersion {
    Fsb4,
    /// Recognised but not parsed; carried as an opaque chunk.
    Fsb5,
}

impl BankVersion {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'4' | 4 => Some(Self::Fsb4),
            b'5' | 5 => Some(Self::Fsb5),
            _ => None,
        }
    }
}

/// A located bank. Offsets are absolute within the scanned source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankRecord {
    /// Position in scan order, used for sidecar naming.
    pub index: usize,
    pub start: u64,
    pub version: BankVersion,
    pub declared_size: u64,
    /// Bytes physically present from `start` to the end of the region.
    pub available: u64,
    pub bank: Option<FsbBank>,
}

impl BankRecord {
    /// A streaming bank: its header promises more bytes than the source has.
    pub fn is_truncated(&self) -> bool {
        self.available < self.declared_size
    }

    /// Real bytes that belong to the bank.
    pub fn present(&self) -> u64 {
        self.available.min(self.declared_size)
    }

    /// Zero bytes needed to bring the bank to its declared size.
    pub fn padding(&self) -> u64 {
        self.declared_size.saturating_sub(self.available)
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.start + self.present())
    }

    pub fn samples(&self) -> &[Sample] {
        self.bank.as_ref().map(|b| b.samples.as_slice()).unwrap_or(&[])
    }
}

/// A signature that was matched but could not be used as a bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanDiagnostic {
    pub offset: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub banks: Vec<BankRecord>,
    pub skipped: Vec<ScanDiagnostic>,
}

impl ScanReport {
    /// `(bank start, samples)` for every located bank, in scan order.
    pub fn sample_sets(&self) -> Vec<(u64, &[Sample])> {
        self.banks.iter().map(|b| (b.start, b.samples())).collect()
    }

    pub fn parsed(&self) -> impl Iterator<Item = (&BankRecord, &FsbBank)> {
        self.banks.iter().filter_map(|r| r.bank.as_ref().map(|b| (r, b)))
    }
}

/// Scans `[region.start, region.end)` for banks.
pub fn scan_region<R: Read + Seek>(cursor: &mut ByteCursor<R>, region: ByteRange, cfg: &ToolConfig) -> Result<ScanReport> {
    let end = region.end.min(cursor.len());
    let mut window = ScanWindow::new(cfg.chunk_size());
    let mut report = ScanReport::default();
    let mut pos = region.start;

    while pos + 4 <= end {
        let version = match window.bytes(cursor, pos, 4)? {
            Some(sig) if &sig[..3] == SIGNATURE => BankVersion::from_byte(sig[3]),
            Some(_) => None,
            None => break,
        };
        let Some(version) = version else {
            pos += 1;
            continue;
        };

        let available = end - pos;
        let (declared_size, bank) = match version {
            BankVersion::Fsb4 => match FsbBank::read(cursor, pos, cfg.max_samples) {
                Ok(bank) => (bank.declared_size(), Some(bank)),
                Err(e) => {
                    debug!("skipping signature at 0x{:X}: {}", pos, e);
                    report.skipped.push(ScanDiagnostic { offset: pos, reason: e.to_string() });
                    pos += SIGNATURE.len() as u64 + 1;
                    continue;
                }
            },
            BankVersion::Fsb5 => {
                warn!("FSB5 bank at 0x{:X} is not parsed; keeping {} raw bytes", pos, cfg.fsb5_fallback_size);
                (cfg.fsb5_fallback_size, None)
            }
        };

        let record = BankRecord {
            index: report.banks.len(),
            start: pos,
            version,
            declared_size,
            available,
            bank,
        };
        info!(
            "Found {:?} bank {} at 0x{:X} ({} bytes declared, {} samples)",
            version,
            record.index,
            pos,
            declared_size,
            record.samples().len()
        );
        if record.is_truncated() {
            warn!(
                "Bank {} at 0x{:X} is truncated (streaming bank): {} of {} bytes present",
                record.index, pos, available, declared_size
            );
        }

        pos = pos.saturating_add(declared_size.max(4)).min(end);
        report.banks.push(record);
    }

    Ok(report)
}

/// Scans an entire source, e.g. a bare bank file or a `data.bin` blob.
pub fn scan<R: Read + Seek>(cursor: &mut ByteCursor<R>, cfg: &ToolConfig) -> Result<ScanReport> {
    let whole = ByteRange::new(0, cursor.len());
    scan_region(cursor, whole, cfg)
}

/// Splits a container and scans its data region.
pub fn scan_container<R: Read + Seek>(cursor: &mut ByteCursor<R>, cfg: &ToolConfig) -> Result<(ContainerLayout, ScanReport)> {
    let layout = xxx::split(cursor, cfg.magic_policy)?;
    let report = scan_region(cursor, layout.data, cfg)?;
    Ok((layout, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsb::test_support::{BankBuilder, SampleSpec};

    fn bank(names: &[&str], seed: u8) -> Vec<u8> {
        names
            .iter()
            .enumerate()
            .fold(BankBuilder::new(), |b, (i, n)| {
                b.sample(SampleSpec::new(n, vec![seed.wrapping_add(i as u8); 40 + i * 8]))
            })
            .build()
    }

    fn noise(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                // Keep clear of 'F' so noise cannot form a signature.
                match (x >> 16) as u8 {
                    b'F' => 0,
                    b => b,
                }
            })
            .collect()
    }

    #[test]
    fn finds_three_banks_between_noise() {
        let mut blob = noise(37, 1);
        let mut starts = Vec::new();
        for (i, names) in [&["a", "b"][..], &["c"][..], &["d", "e", "f"][..]].iter().enumerate() {
            starts.push(blob.len() as u64);
            blob.extend(bank(names, i as u8));
            blob.extend(noise(53 + i, 7 + i as u32));
        }
        let mut cursor = ByteCursor::from_bytes(blob);
        let report = scan(&mut cursor, &ToolConfig::default()).unwrap();

        assert_eq!(report.banks.len(), 3);
        let found: Vec<u64> = report.banks.iter().map(|b| b.start).collect();
        assert_eq!(found, starts);
        let counts: Vec<usize> = report.sample_sets().iter().map(|(_, s)| s.len()).collect();
        assert_eq!(counts, vec![2, 1, 3]);
        assert!(report.banks.iter().all(|b| !b.is_truncated()));
    }

    #[test]
    fn unrecognised_version_is_not_a_bank() {
        let mut blob = noise(20, 3);
        blob.extend_from_slice(b"FSBX");
        blob.extend_from_slice(b"FSB\x03");
        blob.extend(noise(20, 4));
        blob.extend_from_slice(b"FSB");
        let mut cursor = ByteCursor::from_bytes(blob);
        let report = scan(&mut cursor, &ToolConfig::default()).unwrap();
        assert!(report.banks.is_empty());
    }

    #[test]
    fn signature_inside_a_bank_is_not_rematched() {
        let bytes = BankBuilder::new().sample(SampleSpec::new("FSB4_inner", b"FSB4FSB4FSB4".to_vec())).build();
        let mut cursor = ByteCursor::from_bytes(bytes);
        let report = scan(&mut cursor, &ToolConfig::default()).unwrap();
        assert_eq!(report.banks.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn truncated_bank_is_streaming() {
        let mut bytes = bank(&["long"], 5);
        let full = bytes.len() as u64;
        bytes.truncate(bytes.len() - 20);
        let mut cursor = ByteCursor::from_bytes(bytes);
        let report = scan(&mut cursor, &ToolConfig::default()).unwrap();
        let rec = &report.banks[0];
        assert!(rec.is_truncated());
        assert_eq!(rec.declared_size, full);
        assert_eq!(rec.padding(), 20);
        assert_eq!(rec.range().len(), full - 20);
    }

    #[test]
    fn garbage_match_is_skipped_and_scan_continues() {
        let mut blob = b"FSB4\0\0\0\0junkjunkjunkjunkjunk".to_vec();
        let start = blob.len() as u64;
        blob.extend(bank(&["ok"], 1));
        let mut cursor = ByteCursor::from_bytes(blob);
        let report = scan(&mut cursor, &ToolConfig::default()).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].offset, 0);
        assert_eq!(report.banks.len(), 1);
        assert_eq!(report.banks[0].start, start);
        assert_eq!(report.banks[0].index, 0);
    }

    #[test]
    fn fsb5_is_an_opaque_chunk() {
        let mut blob = b"FSB5".to_vec();
        blob.extend(vec![0u8; 100]);
        let cfg = ToolConfig { fsb5_fallback_size: 64, ..Default::default() };
        let mut cursor = ByteCursor::from_bytes(blob);
        let report = scan(&mut cursor, &cfg).unwrap();
        assert_eq!(report.banks.len(), 1);
        assert_eq!(report.banks[0].version, BankVersion::Fsb5);
        assert_eq!(report.banks[0].declared_size, 64);
        assert!(report.banks[0].bank.is_none());
    }

    #[test]
    fn container_scan_only_looks_at_data() {
        let inner = bank(&["x"], 1);
        let header_size = 64u32;
        let mut blob = vec![0u8; header_size as usize];
        blob[0..4].copy_from_slice(&xxx::XXX_TAG.to_be_bytes());
        blob[8..12].copy_from_slice(&header_size.to_be_bytes());
        // A bank inside the header region must be ignored.
        blob[16..20].copy_from_slice(b"FSB4");
        blob.extend(&inner);
        let mut cursor = ByteCursor::from_bytes(blob);
        let (layout, report) = scan_container(&mut cursor, &ToolConfig::default()).unwrap();
        assert_eq!(layout.data.start, 64);
        assert_eq!(report.banks.len(), 1);
        assert_eq!(report.banks[0].start, 64);
    }
}
