use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::MagicPolicy;
use crate::cursor::{ByteCursor, ByteRange};
use crate::error::{FormatError, Result};

/// Full big-endian tag of the container. Only the lead byte is load-bearing.
pub const XXX_TAG: u32 = 0x9E2A83C1;
pub const XXX_LEAD_BYTE: u8 = 0x9E;
const HEADER_SIZE_OFFSET: u64 = 8;
const PREAMBLE_SIZE: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeaderInfo {
    pub tag: [u8; 4],
    pub magic_valid: bool,
    pub exact_tag: bool,
    pub header_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerLayout {
    pub info: ContainerHeaderInfo,
    pub header: ByteRange,
    pub data: ByteRange,
}

pub fn read_header<R: Read + Seek>(cursor: &mut ByteCursor<R>, policy: MagicPolicy) -> Result<ContainerHeaderInfo> {
    if cursor.len() < PREAMBLE_SIZE {
        return Err(FormatError::Truncated {
            what: "container preamble",
            needed: PREAMBLE_SIZE,
            available: cursor.len(),
        }
        .into());
    }

    cursor.seek(0)?;
    let tag = cursor.read_array::<4>()?;
    let magic_valid = tag[0] == XXX_LEAD_BYTE;
    if !magic_valid {
        match policy {
            MagicPolicy::Strict => return Err(FormatError::BadMagic { what: "container", found: tag }.into()),
            MagicPolicy::Lenient => warn!("Invalid container magic {:02X?}, continuing", tag),
        }
    }

    let header_size = cursor.u32_be_at(HEADER_SIZE_OFFSET)?;
    if u64::from(header_size) > cursor.len() {
        return Err(FormatError::Truncated {
            what: "container header",
            needed: u64::from(header_size),
            available: cursor.len(),
        }
        .into());
    }

    Ok(ContainerHeaderInfo {
        tag,
        magic_valid,
        exact_tag: u32::from_be_bytes(tag) == XXX_TAG,
        header_size,
    })
}

/// Splits a container into its opaque header blob and the data region that
/// holds the banks.
pub fn split<R: Read + Seek>(cursor: &mut ByteCursor<R>, policy: MagicPolicy) -> Result<ContainerLayout> {
    let info = read_header(cursor, policy)?;
    let boundary = u64::from(info.header_size);
    Ok(ContainerLayout {
        info,
        header: ByteRange::new(0, boundary),
        data: ByteRange::new(boundary, cursor.len()),
    })
}

/// Concatenates a header blob and a data blob into a container.
pub fn pack<P: AsRef<Path>>(header_path: P, data_path: P, out_path: P) -> Result<u64> {
    let mut out = BufWriter::new(File::create(out_path.as_ref())?);
    let mut written = io::copy(&mut BufReader::new(File::open(header_path)?), &mut out)?;
    written += io::copy(&mut BufReader::new(File::open(data_path)?), &mut out)?;
    out.flush()?;
    info!("Packed {} ({} bytes)", out_path.as_ref().display(), written);
    Ok(written)
}

/// Raw overwrite of `asset` into `target` at `offset`. No structure checks of
/// any kind; the file grows if the asset runs past its end.
pub fn inject_raw<P: AsRef<Path>>(target: P, asset: P, offset: u64) -> Result<u64> {
    let mut out = File::options().read(true).write(true).open(target.as_ref())?;
    out.seek(SeekFrom::Start(offset))?;
    let written = io::copy(&mut BufReader::new(File::open(asset.as_ref())?), &mut out)?;
    out.flush()?;
    info!(
        "Injected {} into {} at 0x{:X} ({} bytes)",
        asset.as_ref().display(),
        target.as_ref().display(),
        offset,
        written
    );
    Ok(written)
}
