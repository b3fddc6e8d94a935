// src/ids.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Process-local ID generation. Transaction, session, and line-item IDs are
//! ULID-style: a 48-bit millisecond timestamp followed by 80 bits of
//! randomness, rendered as a 26-character Crockford base32 string so IDs
//! sort lexicographically by creation time. Line numbers are a separate,
//! per-transaction monotonic `u32` counter.

use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A sortable, globally-unique-within-the-process-lifetime identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ulid(String);

impl Ulid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a `Ulid` from its 26-character textual form, as read back from
    /// a WAL frame during recovery. Does not validate alphabet membership —
    /// WAL frames are already CRC-verified by the time this is called.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for Ulid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Ulid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates ULID-style IDs and per-transaction line numbers. One allocator
/// is owned per terminal; it never resets for the life of the process.
pub struct IdAllocator {
    rng: rand::rngs::ThreadRng,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generates a new ULID-style ID using the current wall-clock time.
    pub fn new_ulid(&mut self) -> Ulid {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
            & 0xFFFF_FFFF_FFFF; // 48 bits

        let mut random = [0u8; 10]; // 80 bits
        self.rng.fill_bytes(&mut random);

        Ulid(encode_ulid(millis, &random))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-transaction monotonic line-number counter. Never reused, even after
/// a void — voided lines keep their original line number in the audit
/// trail.
#[derive(Debug)]
pub struct LineNumberAllocator {
    next: u32,
}

impl LineNumberAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for LineNumberAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LineNumberAllocator {

    pub fn next(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }

    /// The line number that the next `next()` call will return, without
    /// consuming it. Used by plan-validation steps that must compute a
    /// line number before the mutating `apply_*` step actually assigns it.
    pub fn peek_next(&self) -> u32 {
        self.next
    }
}

fn encode_ulid(millis: u64, random: &[u8; 10]) -> String {
    let mut bytes = [0u8; 16];
    bytes[0..6].copy_from_slice(&millis.to_be_bytes()[2..8]);
    bytes[6..16].copy_from_slice(random);
    encode_base32_crockford(&bytes)
}

/// Encodes 128 bits (16 bytes) as 26 Crockford base32 characters, matching
/// the canonical ULID textual representation (26 * 5 = 130 bits, the top 2
/// bits of the first character are always zero).
fn encode_base32_crockford(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(26);
    // Treat the 16 bytes as a 128-bit big-endian integer and peel off 5
    // bits at a time, most-significant first.
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut byte_idx = 0;
    let mut chars_emitted = 0;

    while chars_emitted < 26 {
        if bits < 5 {
            let next_byte = if byte_idx < bytes.len() {
                bytes[byte_idx]
            } else {
                0
            };
            acc = (acc << 8) | next_byte as u32;
            bits += 8;
            byte_idx += 1;
        }
        bits -= 5;
        let index = (acc >> bits) & 0x1F;
        out.push(CROCKFORD_ALPHABET[index as usize] as char);
        chars_emitted += 1;
    }

    out
}
