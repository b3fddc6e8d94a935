// src/wal/writer.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The append-only WAL writer. One `WalWriter` owns the active segment file
//! for a single terminal; every `append` call executes the durability
//! contract's steps 2-3 (encode + CRC, then write + fsync) and nothing else
//! — applying the mutation to in-memory state is the caller's job.

use crate::error::KernelResult;
use crate::wal::frame::Frame;
use crate::wal::record::{WalRecord, RT_TERMINAL_OPEN};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ACTIVE_SEGMENT_NAME: &str = "transaction.wal";
pub const SCHEMA_VERSION: u32 = 1;

pub struct WalWriter {
    file: File,
    active_path: PathBuf,
    dir: PathBuf,
    terminal_id: String,
    next_sequence: u64,
    bytes_in_active_segment: u64,
    next_rotation_index: u32,
    segment_bytes_threshold: u64,
}

impl WalWriter {
    /// Opens (creating if absent) the active segment for `terminal_id` under
    /// `dir`. `next_sequence` is the sequence the next appended frame must
    /// carry — callers pass `1` for a brand new terminal or the value
    /// recovery determined (`last_sequence + 1`) when resuming.
    pub fn open(dir: &Path, terminal_id: &str, next_sequence: u64, segment_bytes_threshold: u64) -> KernelResult<Self> {
        fs::create_dir_all(dir)?;
        let active_path = dir.join(ACTIVE_SEGMENT_NAME);
        let is_new = !active_path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&active_path)?;
        let bytes_in_active_segment = file.metadata()?.len();
        let next_rotation_index = next_rotation_index(dir)?;

        let mut writer = Self {
            file,
            active_path,
            dir: dir.to_path_buf(),
            terminal_id: terminal_id.to_string(),
            next_sequence,
            bytes_in_active_segment,
            next_rotation_index,
            segment_bytes_threshold,
        };

        if is_new {
            writer.append(WalRecord::TerminalOpen {
                terminal_id: terminal_id.to_string(),
                schema_version: SCHEMA_VERSION,
            })?;
        }

        Ok(writer)
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Encodes `record`, writes it, and fsyncs before returning — steps 2
    /// and 3 of the durability contract. Rotates the segment afterward if
    /// the configured size threshold was crossed.
    pub fn append(&mut self, record: WalRecord) -> KernelResult<u64> {
        let sequence = self.next_sequence;
        let timestamp_ns = now_ns();
        let payload = record.encode_payload();
        let frame = Frame {
            sequence,
            timestamp_ns,
            record_type: record.record_type(),
            payload,
        };
        let bytes = frame.encode();

        self.file.write_all(&bytes)?;
        self.file.sync_all()?;

        self.bytes_in_active_segment += bytes.len() as u64;
        self.next_sequence += 1;

        if self.bytes_in_active_segment >= self.segment_bytes_threshold {
            self.rotate()?;
        }

        Ok(sequence)
    }

    /// Renames the active segment to `transaction.wal.<n>` (never touched
    /// again) and starts a fresh active segment whose first record is a
    /// `TerminalOpen` carrying the continuation sequence.
    fn rotate(&mut self) -> KernelResult<()> {
        let rotated_path = self.dir.join(format!("{ACTIVE_SEGMENT_NAME}.{}", self.next_rotation_index));
        self.next_rotation_index += 1;
        fs::rename(&self.active_path, &rotated_path)?;

        self.file = OpenOptions::new().create(true).append(true).open(&self.active_path)?;
        self.bytes_in_active_segment = 0;

        self.append(WalRecord::TerminalOpen {
            terminal_id: self.terminal_id.clone(),
            schema_version: SCHEMA_VERSION,
        })?;
        Ok(())
    }
}

fn next_rotation_index(dir: &Path) -> KernelResult<u32> {
    let mut max_seen = 0u32;
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(suffix) = name.strip_prefix(&format!("{ACTIVE_SEGMENT_NAME}.")) {
                if let Ok(n) = suffix.parse::<u32>() {
                    max_seen = max_seen.max(n);
                }
            }
        }
    }
    Ok(max_seen + 1)
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::reader::read_terminal_wal;
    use tempfile::tempdir;

    #[test]
    fn opening_fresh_terminal_writes_terminal_open_first() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), "T1", 1, 1_000_000).unwrap();
        writer
            .append(WalRecord::SessionOpen {
                session_id: crate::ids::Ulid::from_string("01SESSION".into()),
                operator_id: None,
            })
            .unwrap();

        let frames = read_terminal_wal(dir.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0].1, WalRecord::TerminalOpen { .. }));
        assert!(matches!(frames[1].1, WalRecord::SessionOpen { .. }));
    }

    #[test]
    fn rotation_starts_a_new_segment_with_continuation_open() {
        let dir = tempdir().unwrap();
        // Tiny threshold forces rotation on the very first real record.
        let mut writer = WalWriter::open(dir.path(), "T1", 1, 10).unwrap();
        writer
            .append(WalRecord::SessionClose {
                session_id: crate::ids::Ulid::from_string("01SESSION".into()),
            })
            .unwrap();

        assert!(dir.path().join("transaction.wal.1").exists());
        assert!(dir.path().join("transaction.wal").exists());

        let frames = read_terminal_wal(dir.path()).unwrap();
        // TerminalOpen, SessionClose (segment 1), TerminalOpen (segment 2).
        assert_eq!(frames.len(), 3);
        let sequences: Vec<u64> = frames.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
