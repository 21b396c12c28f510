//! File-level patch operations on containers.
//!
//! Each operation scans the container once, then applies writes against that
//! snapshot. Multi-item operations never stop at the first failure; they
//! collect per-item diagnostics into a [`BatchReport`].

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ToolConfig;
use crate::cursor::ByteCursor;
use crate::error::{PatchError, Result};
use crate::fsb::FsbBank;
use crate::patch::{self, PatchOutcome, SampleRef};
use crate::scan::{self, ScanReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(item: &str, reason: impl fmt::Display) -> Self {
        Self { item: item.to_string(), reason: reason.to_string() }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub applied: Vec<PatchOutcome>,
    pub skipped: Vec<ItemFailure>,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn skip(&mut self, item: &str, reason: impl fmt::Display) {
        self.skipped.push(ItemFailure::new(item, reason));
    }

    pub fn fail(&mut self, item: &str, reason: impl fmt::Display) {
        let failure = ItemFailure::new(item, reason);
        warn!("{}", failure);
        self.failed.push(failure);
    }

    pub fn absorb(&mut self, other: BatchReport) {
        self.applied.extend(other.applied);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("{} patched, {} skipped, {} failed", self.applied.len(), self.skipped.len(), self.failed.len())
    }
}

/// A sample resolved against a scan: which parsed bank, and which entry.
#[derive(Debug, Clone, Copy)]
struct Target<'a> {
    bank: &'a FsbBank,
    sample: usize,
}

fn by_name<'a>(report: &'a ScanReport, name: &str) -> Option<Target<'a>> {
    report.parsed().find_map(|(_, bank)| {
        bank.samples.iter().position(|s| s.name == name).map(|sample| Target { bank, sample })
    })
}

fn by_index(report: &ScanReport, bank_index: usize, sample_index: usize) -> std::result::Result<Target<'_>, PatchError> {
    let record = report
        .banks
        .get(bank_index)
        .ok_or(PatchError::BankNotFound { index: bank_index, count: report.banks.len() })?;
    let bank = record.bank.as_ref().ok_or(PatchError::UnparsedBank(record.start))?;
    if sample_index >= bank.samples.len() {
        return Err(PatchError::SampleNotFound(format!("{bank_index}_{sample_index}")));
    }
    Ok(Target { bank, sample: sample_index })
}

/// Patches the first sample called `name` in any bank of the container.
pub fn patch_container_sample<P: AsRef<Path>>(path: P, name: &str, payload: &[u8], cfg: &ToolConfig) -> Result<PatchOutcome> {
    let mut cursor = ByteCursor::open_rw(path)?;
    let (_, report) = scan::scan_container(&mut cursor, cfg)?;
    let target = by_name(&report, name).ok_or_else(|| PatchError::SampleNotFound(name.to_string()))?;
    Ok(patch::patch_sample(&mut cursor, target.bank, SampleRef::Index(target.sample), payload, cfg)?)
}

/// Patches sample `sample_index` of the `bank_index`th located bank.
pub fn patch_container_sample_by_index<P: AsRef<Path>>(
    path: P,
    bank_index: usize,
    sample_index: usize,
    payload: &[u8],
    cfg: &ToolConfig,
) -> Result<PatchOutcome> {
    let mut cursor = ByteCursor::open_rw(path)?;
    let (_, report) = scan::scan_container(&mut cursor, cfg)?;
    let target = by_index(&report, bank_index, sample_index)?;
    Ok(patch::patch_sample(&mut cursor, target.bank, SampleRef::Index(target.sample), payload, cfg)?)
}

/// Name candidates for a replacement file: the name without a trailing
/// `.bin`, then everything before the first dot (`boom.wav.bin` -> `boom`).
fn name_candidates(file_name: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(2);
    let trimmed = file_name.strip_suffix(".bin").unwrap_or(file_name);
    out.push(trimmed);
    if let Some((head, _)) = file_name.split_once('.') {
        if head != trimmed && !head.is_empty() {
            out.push(head);
        }
    }
    out
}

/// `<bank>_<sample>` or `audio_<bank>_<sample>`.
fn positional(stem: &str) -> Option<(usize, usize)> {
    let stem = stem.strip_prefix("audio_").unwrap_or(stem);
    let (bank, sample) = stem.split_once('_')?;
    Some((bank.parse().ok()?, sample.parse().ok()?))
}

fn resolve<'a>(report: &'a ScanReport, file_name: &str) -> std::result::Result<Target<'a>, PatchError> {
    let candidates = name_candidates(file_name);
    if let Some(target) = candidates.iter().find_map(|c| by_name(report, c)) {
        return Ok(target);
    }
    match candidates.iter().find_map(|c| positional(c)) {
        Some((bank, sample)) => by_index(report, bank, sample),
        None => Err(PatchError::SampleNotFound(file_name.to_string())),
    }
}

fn replacement_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Patches every file in `folder` into the container, matched by sample
/// name or by position.
pub fn patch_all<P: AsRef<Path>, Q: AsRef<Path>>(path: P, folder: Q, cfg: &ToolConfig) -> Result<BatchReport> {
    let mut cursor = ByteCursor::open_rw(path.as_ref())?;
    let (_, scan_report) = scan::scan_container(&mut cursor, cfg)?;
    let mut report = BatchReport::default();

    for file in replacement_files(folder.as_ref())? {
        let file_name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let target = match resolve(&scan_report, &file_name) {
            Ok(t) => t,
            Err(PatchError::SampleNotFound(_)) => {
                report.skip(&file_name, "no matching sample");
                continue;
            }
            Err(e) => {
                report.fail(&file_name, e);
                continue;
            }
        };
        let payload = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.fail(&file_name, e);
                continue;
            }
        };
        match patch::patch_sample(&mut cursor, target.bank, SampleRef::Index(target.sample), &payload, cfg) {
            Ok(outcome) => report.applied.push(outcome),
            Err(e) => report.fail(&file_name, e),
        }
    }

    info!("{}: {}", path.as_ref().display(), report.summary());
    Ok(report)
}

/// Copies metadata and payloads from the first bank of `donor_path` into
/// the container's banks (all of them, or only `bank_index`).
pub fn patch_container_from_donor<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    donor_path: Q,
    bank_index: Option<usize>,
    cfg: &ToolConfig,
) -> Result<BatchReport> {
    let mut donor = ByteCursor::open(donor_path.as_ref())?;
    let donor_scan = scan::scan(&mut donor, cfg)?;
    let (_, donor_bank) = donor_scan
        .parsed()
        .next()
        .ok_or_else(|| PatchError::SampleNotFound(format!("no FSB4 bank in {}", donor_path.as_ref().display())))?;

    let mut cursor = ByteCursor::open_rw(path.as_ref())?;
    let (_, scan_report) = scan::scan_container(&mut cursor, cfg)?;
    if let Some(index) = bank_index {
        if !scan_report.parsed().any(|(r, _)| r.index == index) {
            return Err(PatchError::BankNotFound { index, count: scan_report.banks.len() }.into());
        }
    }

    let mut report = BatchReport::default();
    for (record, bank) in scan_report.parsed() {
        if bank_index.is_some_and(|i| i != record.index) {
            continue;
        }
        report.absorb(patch::patch_from_donor(&mut cursor, bank, &mut donor, donor_bank, cfg));
    }
    Ok(report)
}

/// Overwrites the `bank_index`th located bank with the bank file at
/// `replacement`.
pub fn replace_container_bank<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    bank_index: usize,
    replacement: Q,
    cfg: &ToolConfig,
) -> Result<PatchOutcome> {
    let mut cursor = ByteCursor::open_rw(path)?;
    let (_, report) = scan::scan_container(&mut cursor, cfg)?;
    let record = report
        .banks
        .get(bank_index)
        .ok_or(PatchError::BankNotFound { index: bank_index, count: report.banks.len() })?;
    let mut source = ByteCursor::open(replacement)?;
    Ok(patch::replace_bank(&mut cursor, record, &mut source, cfg)?)
}
