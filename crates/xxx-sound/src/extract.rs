//! Streaming extraction of containers, banks and samples to sidecar files.
//!
//! Output layout for a container `foo.xxx`:
//!
//! ```text
//! foo_extracted/
//!     header.bin
//!     data.bin
//!     audio_0.fsb
//!     audio_0_samples/<sample>.bin
//!     manifest.json
//! ```

use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::batch::ItemFailure;
use crate::config::ToolConfig;
use crate::cursor::{write_zeros, ByteCursor, ByteRange};
use crate::error::{Error, Result};
use crate::formats::xxx::ContainerLayout;
use crate::fsb::{FsbBank, Sample};
use crate::scan::{self, BankRecord, BankVersion, ScanDiagnostic};

/// Streams one sample's slot into `sink`. Bytes missing from the end of the
/// source are written as zeros; a slot past the bank's declared end is
/// refused.
pub fn extract_sample<R: Read + Seek, W: Write>(
    cursor: &mut ByteCursor<R>,
    bank: &FsbBank,
    sample: &Sample,
    sink: &mut W,
    chunk: usize,
) -> Result<u64> {
    let slot = bank.bounded_sample_range(sample)?;

    let present = slot.end.min(cursor.len()).saturating_sub(slot.start);
    if present > 0 {
        cursor.copy_range(slot.start, present, sink, chunk)?;
    }
    write_zeros(sink, slot.len() - present, chunk)?;
    Ok(slot.len())
}

/// Streams a located bank into `sink`, zero-padding a truncated bank up to
/// its declared size.
pub fn extract_bank<R: Read + Seek, W: Write>(
    cursor: &mut ByteCursor<R>,
    record: &BankRecord,
    sink: &mut W,
    chunk: usize,
) -> Result<u64> {
    cursor.copy_range(record.start, record.present(), sink, chunk)?;
    write_zeros(sink, record.padding(), chunk)?;
    Ok(record.present() + record.padding())
}

/// File-system safe version of a sample name.
pub fn sanitize_name(name: &str, index: usize) -> String {
    let clean: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
        .collect();
    let clean = clean.trim_matches(|c| c == '.' || c == ' ');
    if clean.is_empty() {
        format!("sample_{index}")
    } else {
        clean.to_string()
    }
}

fn unique_name(used: &mut HashSet<String>, base: String) -> String {
    let mut candidate = base.clone();
    let mut n = 1;
    while !used.insert(candidate.to_ascii_lowercase()) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    candidate
}

fn create<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

fn stem_of(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "output".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSample {
    pub index: usize,
    pub name: String,
    /// Sidecar file, relative to the extraction folder. `None` when the
    /// sample could not be written.
    pub file: Option<String>,
    pub format: String,
    pub channels: u16,
    pub frequency: i32,
    /// Absolute offset of the slot in the source.
    pub offset: u64,
    pub size: u32,
    pub size_confident: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestBank {
    pub index: usize,
    pub version: BankVersion,
    pub start: u64,
    pub declared_size: u64,
    pub available: u64,
    pub truncated: bool,
    pub file: String,
    pub issues: Vec<String>,
    pub samples: Vec<ManifestSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractManifest {
    pub source: PathBuf,
    pub container: Option<ContainerLayout>,
    pub banks: Vec<ManifestBank>,
    pub skipped: Vec<ScanDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub dir: PathBuf,
    pub manifest: ExtractManifest,
    pub failures: Vec<ItemFailure>,
}

impl ExtractReport {
    pub fn sample_count(&self) -> usize {
        self.manifest.banks.iter().flat_map(|b| &b.samples).filter(|s| s.file.is_some()).count()
    }
}

fn write_samples<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    bank: &FsbBank,
    dir: &Path,
    rel_dir: &str,
    chunk: usize,
    failures: &mut Vec<ItemFailure>,
) -> Result<Vec<ManifestSample>> {
    fs::create_dir_all(dir)?;
    let mut used = HashSet::new();
    let mut entries = Vec::with_capacity(bank.samples.len());

    for sample in &bank.samples {
        let file_name = format!("{}.bin", unique_name(&mut used, sanitize_name(&sample.name, sample.index)));
        let out_path = dir.join(&file_name);

        let written = {
            let mut sink = create(&out_path)?;
            extract_sample(cursor, bank, sample, &mut sink, chunk).and_then(|n| {
                sink.flush()?;
                Ok(n)
            })
        };
        let file = match written {
            Ok(n) => {
                debug!("  {} -> {} ({} bytes)", sample.name, out_path.display(), n);
                Some(format!("{rel_dir}/{file_name}"))
            }
            Err(e) => {
                warn!("Skipping sample {} of bank 0x{:X}: {}", sample.name, bank.start, e);
                let _ = fs::remove_file(&out_path);
                failures.push(ItemFailure::new(&sample.name, e));
                None
            }
        };

        entries.push(ManifestSample {
            index: sample.index,
            name: sample.name.clone(),
            file,
            format: sample.mode.format_name().to_string(),
            channels: sample.channels,
            frequency: sample.frequency,
            offset: bank.sample_range(sample).start,
            size: sample.data_size,
            size_confident: sample.size_confident,
        });
    }
    Ok(entries)
}

fn write_manifest(dir: &Path, manifest: &ExtractManifest) -> Result<()> {
    let mut sink = create(dir.join("manifest.json"))?;
    serde_json::to_writer_pretty(&mut sink, manifest).map_err(Error::Manifest)?;
    sink.flush()?;
    Ok(())
}

/// Splits a container, writes every located bank and every parsed sample.
pub fn extract_container<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_dir: Q, cfg: &ToolConfig) -> Result<ExtractReport> {
    let path = path.as_ref();
    let chunk = cfg.chunk_size();
    let mut cursor = ByteCursor::open(path)?;
    let (layout, report) = scan::scan_container(&mut cursor, cfg)?;

    let dir = out_dir.as_ref().join(format!("{}_extracted", stem_of(path)));
    fs::create_dir_all(&dir)?;

    let mut header = create(dir.join("header.bin"))?;
    cursor.copy_range(layout.header.start, layout.header.len(), &mut header, chunk)?;
    header.flush()?;
    let mut data = create(dir.join("data.bin"))?;
    cursor.copy_range(layout.data.start, layout.data.len(), &mut data, chunk)?;
    data.flush()?;
    info!("Extracted header and data to {}", dir.display());

    let mut failures = Vec::new();
    let mut banks = Vec::with_capacity(report.banks.len());
    for record in &report.banks {
        let file = format!("audio_{}.fsb", record.index);
        let mut sink = create(dir.join(&file))?;
        extract_bank(&mut cursor, record, &mut sink, chunk)?;
        sink.flush()?;

        let samples = match &record.bank {
            Some(bank) => {
                let rel = format!("audio_{}_samples", record.index);
                write_samples(&mut cursor, bank, &dir.join(&rel), &rel, chunk, &mut failures)?
            }
            None => Vec::new(),
        };
        info!("Extracted bank {} ({} samples) to {}", record.index, samples.len(), file);

        banks.push(ManifestBank {
            index: record.index,
            version: record.version,
            start: record.start,
            declared_size: record.declared_size,
            available: record.available,
            truncated: record.is_truncated(),
            file,
            issues: record.bank.iter().flat_map(|b| &b.issues).map(|i| i.to_string()).collect(),
            samples,
        });
    }

    let manifest = ExtractManifest {
        source: path.to_path_buf(),
        container: Some(layout),
        banks,
        skipped: report.skipped,
    };
    if cfg.write_manifest {
        write_manifest(&dir, &manifest)?;
    }
    info!("Extracted {} banks from {}", manifest.banks.len(), path.display());
    Ok(ExtractReport { dir, manifest, failures })
}

/// Extracts every sample of a bare bank file into `<stem>_samples/`.
pub fn extract_fsb<P: AsRef<Path>, Q: AsRef<Path>>(path: P, out_dir: Q, cfg: &ToolConfig) -> Result<ExtractReport> {
    let path = path.as_ref();
    let mut cursor = ByteCursor::open(path)?;
    let bank = FsbBank::read(&mut cursor, 0, cfg.max_samples)?;

    let rel = format!("{}_samples", stem_of(path));
    let dir = out_dir.as_ref().join(&rel);
    let mut failures = Vec::new();
    let samples = write_samples(&mut cursor, &bank, &dir, ".", cfg.chunk_size(), &mut failures)?;

    let record = ManifestBank {
        index: 0,
        version: BankVersion::Fsb4,
        start: 0,
        declared_size: bank.declared_size(),
        available: cursor.len(),
        truncated: cursor.len() < bank.declared_size(),
        file: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        issues: bank.issues.iter().map(|i| i.to_string()).collect(),
        samples,
    };
    let manifest = ExtractManifest { source: path.to_path_buf(), container: None, banks: vec![record], skipped: Vec::new() };
    if cfg.write_manifest {
        write_manifest(&dir, &manifest)?;
    }
    info!("Extracted {} samples to {}", bank.samples.len(), dir.display());
    Ok(ExtractReport { dir, manifest, failures })
}

/// Containers directly inside `dir`, sorted by name.
pub fn container_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("xxx")))
        .collect();
    files.sort();
    Ok(files)
}

/// Extracts every container in `dir`. One bad file does not stop the rest.
pub fn extract_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    dir: P,
    out_dir: Q,
    cfg: &ToolConfig,
) -> Result<Vec<(PathBuf, Result<ExtractReport>)>> {
    let files = container_files(dir)?;
    let results = files
        .into_iter()
        .map(|file| {
            let result = extract_container(&file, out_dir.as_ref(), cfg);
            if let Err(e) = &result {
                warn!("Failed to extract {}: {}", file.display(), e);
            }
            (file, result)
        })
        .collect();
    Ok(results)
}

/// Absolute slot range of every sample, for listings.
pub fn sample_ranges(bank: &FsbBank) -> Vec<(&Sample, ByteRange)> {
    bank.samples.iter().map(|s| (s, bank.sample_range(s))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsb::test_support::{BankBuilder, SampleSpec};
    use crate::fsb::MAX_SAMPLES;
    use pretty_assertions::assert_eq;

    #[test]
    fn sample_bytes_and_zero_fill() {
        let bytes = BankBuilder::new()
            .sample(SampleSpec::new("a", vec![1; 40]))
            .sample(SampleSpec::new("b", vec![2; 40]))
            .build();
        let mut cursor = ByteCursor::from_bytes(bytes.clone());
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        let mut out = Vec::new();
        assert_eq!(extract_sample(&mut cursor, &bank, &bank.samples[1], &mut out, 64).unwrap(), 40);
        assert_eq!(out, vec![2; 40]);

        let mut cut = bytes;
        cut.truncate(bank.sample_range(&bank.samples[1]).end as usize - 10);
        let mut cursor = ByteCursor::from_bytes(cut);
        let mut out = Vec::new();
        extract_sample(&mut cursor, &bank, &bank.samples[1], &mut out, 64).unwrap();
        assert_eq!(&out[..30], &[2u8; 30][..]);
        assert_eq!(&out[30..], &[0u8; 10][..]);
    }

    #[test]
    fn slot_past_declared_bank_is_refused() {
        let bytes = BankBuilder { data_size: Some(32), ..BankBuilder::new() }
            .sample(SampleSpec::new("a", vec![1; 32]))
            .sample(SampleSpec::new("b", vec![2; 32]))
            .build();
        let mut cursor = ByteCursor::from_bytes(bytes);
        let bank = FsbBank::read(&mut cursor, 0, MAX_SAMPLES).unwrap();
        let mut out = Vec::new();
        assert!(extract_sample(&mut cursor, &bank, &bank.samples[1], &mut out, 64).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn manifest_failures_are_not_config_errors() {
        let json = serde_json::from_str::<u8>("x").unwrap_err();
        let err = Error::Manifest(json);
        assert!(err.to_string().starts_with("Manifest serialization failed"));
    }

    #[test]
    fn names_are_sanitized_and_unique() {
        assert_eq!(sanitize_name("hit/01:a", 0), "hit_01_a");
        assert_eq!(sanitize_name("", 4), "sample_4");
        assert_eq!(sanitize_name("..", 2), "sample_2");
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "x".into()), "x");
        assert_eq!(unique_name(&mut used, "X".into()), "X_1");
    }
}
