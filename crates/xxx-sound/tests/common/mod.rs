#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const ENTRY_SIZE: usize = 80;
pub const FILLER: u8 = 0x11;

pub struct TestSample {
    pub name: &'static str,
    pub payload: Vec<u8>,
    pub frequency: i32,
    pub channels: u16,
}

impl TestSample {
    pub fn new(name: &'static str, len: usize, seed: u8) -> Self {
        let payload = (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed) | 0x01).collect();
        Self { name, payload, frequency: 44100, channels: 2 }
    }

    pub fn format(mut self, frequency: i32, channels: u16) -> Self {
        self.frequency = frequency;
        self.channels = channels;
        self
    }
}

fn align32(n: usize) -> usize {
    n.div_ceil(32) * 32
}

/// A 24-byte-header FSB4 bank with accumulated, 32-byte aligned slots.
pub fn fsb4_bank(samples: &[TestSample]) -> Vec<u8> {
    let mut data = Vec::new();
    for s in samples {
        let start = data.len();
        data.extend_from_slice(&s.payload);
        data.resize(start + align32(s.payload.len()), 0);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"FSB4");
    out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    out.extend_from_slice(&((ENTRY_SIZE * samples.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x0004_0000u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for s in samples {
        let mut e = vec![0u8; ENTRY_SIZE];
        e[0..2].copy_from_slice(&(ENTRY_SIZE as u16).to_le_bytes());
        e[2..2 + s.name.len()].copy_from_slice(s.name.as_bytes());
        let len = s.payload.len() as u32;
        e[32..36].copy_from_slice(&(len / 4).to_le_bytes());
        e[36..40].copy_from_slice(&len.to_le_bytes());
        e[52..56].copy_from_slice(&0x2000u32.to_le_bytes());
        e[56..60].copy_from_slice(&s.frequency.to_le_bytes());
        e[66..68].copy_from_slice(&s.channels.to_le_bytes());
        out.extend_from_slice(&e);
    }
    out.extend_from_slice(&data);
    out
}

/// Container with a `header_size` byte header followed by `data`.
pub fn container(header_size: u32, data: &[u8]) -> Vec<u8> {
    let mut out = vec![FILLER; header_size as usize];
    out[0..4].copy_from_slice(&0x9E2A83C1u32.to_be_bytes());
    out[8..12].copy_from_slice(&header_size.to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Banks separated by filler bytes; returns the data blob and each bank's
/// offset within it.
pub fn data_region(banks: &[Vec<u8>]) -> (Vec<u8>, Vec<usize>) {
    let mut data = vec![FILLER; 16];
    let mut offsets = Vec::new();
    for bank in banks {
        offsets.push(data.len());
        data.extend_from_slice(bank);
        data.extend(std::iter::repeat(FILLER).take(24));
    }
    (data, offsets)
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
