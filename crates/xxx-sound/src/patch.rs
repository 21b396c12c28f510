//! In-place payload replacement.
//!
//! Slots never move. Every operation validates sizes and ranges against a
//! parsed snapshot before the first byte is written, so a refused patch
//! leaves the target untouched.

use serde::Serialize;
use std::io::{Read, Seek, Write};
use tracing::{debug, info, warn};

use crate::batch::BatchReport;
use crate::config::ToolConfig;
use crate::cursor::{ByteCursor, ByteRange};
use crate::error::PatchError;
use crate::fsb::{entry, FsbBank, Sample};
use crate::scan::BankRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRef<'a> {
    Name(&'a str),
    Index(usize),
}

impl SampleRef<'_> {
    pub fn resolve<'b>(&self, bank: &'b FsbBank) -> Result<&'b Sample, PatchError> {
        match *self {
            SampleRef::Name(name) => bank.find(name).ok_or_else(|| PatchError::SampleNotFound(name.to_string())),
            SampleRef::Index(i) => bank
                .samples
                .get(i)
                .ok_or_else(|| PatchError::SampleNotFound(format!("#{i}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub name: String,
    /// Absolute offset the payload was written to.
    pub offset: u64,
    pub written: u64,
    pub padded: u64,
    pub advisory: Option<String>,
}

fn short_payload_advisory(name: &str, payload: u64, slot: u64, cfg: &ToolConfig) -> Option<String> {
    cfg.is_short_payload(payload, slot).then(|| {
        let msg = format!(
            "{name}: {payload} bytes into a {slot} byte slot; frequency and channel metadata were not updated and playback may be corrupt"
        );
        warn!("{}", msg);
        msg
    })
}

/// Overwrites one sample's slot with `payload` and zero-fills the rest.
pub fn patch_sample<R: Read + Write + Seek>(
    cursor: &mut ByteCursor<R>,
    bank: &FsbBank,
    target: SampleRef<'_>,
    payload: &[u8],
    cfg: &ToolConfig,
) -> Result<PatchOutcome, PatchError> {
    let sample = target.resolve(bank)?;
    let slot = bank.bounded_sample_range(sample)?;
    let len = payload.len() as u64;

    if len > slot.len() {
        return Err(PatchError::TooLarge { name: sample.name.clone(), payload: len, slot: slot.len() });
    }
    cursor.check(slot.start, slot.len())?;

    let advisory = short_payload_advisory(&sample.name, len, slot.len(), cfg);

    cursor.write_all_at(slot.start, payload)?;
    cursor.write_zeros_at(slot.start + len, slot.len() - len, cfg.chunk_size())?;
    cursor.flush()?;

    info!("Patched {} at 0x{:X} ({} bytes, {} padding)", sample.name, slot.start, len, slot.len() - len);
    Ok(PatchOutcome {
        name: sample.name.clone(),
        offset: slot.start,
        written: len,
        padded: slot.len() - len,
        advisory,
    })
}

enum FieldValue {
    U16(u16),
    U32(u32),
    I32(i32),
}

impl FieldValue {
    fn width(&self) -> u64 {
        match self {
            FieldValue::U16(_) => 2,
            FieldValue::U32(_) | FieldValue::I32(_) => 4,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::U16(v) => v.to_le_bytes().to_vec(),
            FieldValue::U32(v) => v.to_le_bytes().to_vec(),
            FieldValue::I32(v) => v.to_le_bytes().to_vec(),
        }
    }
}

/// Metadata fields copied from a donor. Compressed size and data offset are
/// never part of this set.
fn donor_fields(target_bank: &FsbBank, target: &Sample, donor: &Sample, notes: &mut Vec<String>) -> Vec<(u64, FieldValue)> {
    let mut fields = vec![(entry::SAMPLE_COUNT, FieldValue::U32(donor.sample_count))];

    // The uncompressed size can decide the slot size, and slots must not move.
    if target_bank.slot_size_for(target.compressed_size, donor.uncompressed_size) == target.data_size {
        fields.push((entry::UNCOMPRESSED_SIZE, FieldValue::U32(donor.uncompressed_size)));
    } else {
        notes.push(format!(
            "{}: kept uncompressed size {} (donor's {} would resize the slot)",
            target.name, target.uncompressed_size, donor.uncompressed_size
        ));
    }

    fields.extend([
        (entry::LOOP_START, FieldValue::U32(donor.loop_start)),
        (entry::LOOP_END, FieldValue::U32(donor.loop_end)),
        (entry::MODE, FieldValue::U32(donor.mode.0)),
        (entry::FREQUENCY, FieldValue::I32(donor.frequency)),
        (entry::CHANNELS, FieldValue::U16(donor.channels)),
    ]);

    fields.retain(|(offset, value)| {
        let inside = offset + value.width() <= u64::from(target.header_size);
        if !inside {
            debug!("{}: entry of {} bytes has no room for field at {}", target.name, target.header_size, offset);
        }
        inside
    });
    fields
}

fn patch_one_from_donor<T, D>(
    target: &mut ByteCursor<T>,
    target_bank: &FsbBank,
    t: &Sample,
    donor: &mut ByteCursor<D>,
    donor_bank: &FsbBank,
    d: &Sample,
    cfg: &ToolConfig,
) -> Result<PatchOutcome, PatchError>
where
    T: Read + Write + Seek,
    D: Read + Seek,
{
    let slot = target_bank.bounded_sample_range(t)?;
    let copy_len = u64::from(d.data_size.min(t.data_size));
    let donor_range = ByteRange::new(
        donor_bank.sample_range(d).start,
        donor_bank.sample_range(d).start + copy_len,
    );
    let header_start = target_bank.sample_header_start(t);

    let mut notes = Vec::new();
    let fields = donor_fields(target_bank, t, d, &mut notes);

    target.check(slot.start, slot.len())?;
    target.check(header_start, u64::from(t.header_size))?;
    donor.check(donor_range.start, donor_range.len())?;

    for (offset, value) in &fields {
        target.write_all_at(header_start + offset, &value.bytes())?;
    }

    let chunk = cfg.chunk_size();
    let mut buf = vec![0u8; chunk];
    let mut done = 0u64;
    while done < copy_len {
        let n = ((copy_len - done) as usize).min(chunk);
        donor.read_exact_at(donor_range.start + done, &mut buf[..n])?;
        target.write_all_at(slot.start + done, &buf[..n])?;
        done += n as u64;
    }
    target.write_zeros_at(slot.start + copy_len, slot.len() - copy_len, chunk)?;

    if copy_len < u64::from(d.data_size) {
        notes.push(format!(
            "{}: donor payload of {} bytes cut to the {} byte slot",
            t.name, d.data_size, t.data_size
        ));
    }
    for note in &notes {
        warn!("{}", note);
    }

    Ok(PatchOutcome {
        name: t.name.clone(),
        offset: slot.start,
        written: copy_len,
        padded: slot.len() - copy_len,
        advisory: (!notes.is_empty()).then(|| notes.join("; ")),
    })
}

/// Copies metadata and payload for every sample the donor bank shares by
/// name with the target bank. Failures are per sample.
pub fn patch_from_donor<T, D>(
    target: &mut ByteCursor<T>,
    target_bank: &FsbBank,
    donor: &mut ByteCursor<D>,
    donor_bank: &FsbBank,
    cfg: &ToolConfig,
) -> BatchReport
where
    T: Read + Write + Seek,
    D: Read + Seek,
{
    let mut report = BatchReport::default();
    for t in &target_bank.samples {
        let Some(d) = donor_bank.find(&t.name) else {
            report.skip(&t.name, "not present in donor");
            continue;
        };
        match patch_one_from_donor(target, target_bank, t, donor, donor_bank, d, cfg) {
            Ok(outcome) => report.applied.push(outcome),
            Err(e) => report.fail(&t.name, e),
        }
    }
    if let Err(e) = target.flush() {
        report.fail("<flush>", PatchError::Io(e));
    }
    info!("Donor patch: {}", report.summary());
    report
}

/// Overwrites a located bank with a complete replacement image. The new image
/// must fit in the bytes the bank physically occupies.
pub fn replace_bank<T, D>(
    target: &mut ByteCursor<T>,
    record: &BankRecord,
    replacement: &mut ByteCursor<D>,
    cfg: &ToolConfig,
) -> Result<PatchOutcome, PatchError>
where
    T: Read + Write + Seek,
    D: Read + Seek,
{
    let slot = record.range();
    let len = replacement.len();
    let name = format!("audio_{}", record.index);
    if len > slot.len() {
        return Err(PatchError::TooLarge { name, payload: len, slot: slot.len() });
    }
    target.check(slot.start, slot.len())?;

    if FsbBank::read(replacement, 0, cfg.max_samples).is_err() {
        warn!("Replacement for bank {} does not parse as FSB4; writing it anyway", record.index);
    }

    let chunk = cfg.chunk_size();
    let mut buf = vec![0u8; chunk];
    let mut done = 0u64;
    while done < len {
        let n = ((len - done) as usize).min(chunk);
        replacement.read_exact_at(done, &mut buf[..n])?;
        target.write_all_at(slot.start + done, &buf[..n])?;
        done += n as u64;
    }
    target.write_zeros_at(slot.start + len, slot.len() - len, chunk)?;
    target.flush()?;

    info!("Replaced bank {} at 0x{:X} ({} of {} bytes)", record.index, slot.start, len, slot.len());
    Ok(PatchOutcome {
        name,
        offset: slot.start,
        written: len,
        padded: slot.len() - len,
        advisory: short_payload_advisory(&format!("audio_{}", record.index), len, slot.len(), cfg),
    })
}
