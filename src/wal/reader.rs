// src/wal/reader.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Reads a terminal's WAL back as a stream of `(sequence, WalRecord)` pairs,
//! verifying CRC and strict sequence monotonicity across segment
//! boundaries. Used by `recovery` at startup; the happy-path writer never
//! reads its own segment back.

use crate::error::{KernelError, KernelResult};
use crate::wal::frame::{frame_len, Frame};
use crate::wal::record::WalRecord;
use crate::wal::writer::ACTIVE_SEGMENT_NAME;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Lists a terminal directory's WAL segments in replay order: rotated
/// segments by ascending numeric suffix, then the active segment last.
pub fn segment_paths_in_order(dir: &Path) -> KernelResult<Vec<PathBuf>> {
    let mut rotated: Vec<(u32, PathBuf)> = Vec::new();
    let active_path = dir.join(ACTIVE_SEGMENT_NAME);

    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(suffix) = name.strip_prefix(&format!("{ACTIVE_SEGMENT_NAME}.")) {
                if let Ok(n) = suffix.parse::<u32>() {
                    rotated.push((n, entry.path()));
                }
            }
        }
    }
    rotated.sort_by_key(|(n, _)| *n);

    let mut paths: Vec<PathBuf> = rotated.into_iter().map(|(_, p)| p).collect();
    if active_path.exists() {
        paths.push(active_path);
    }
    Ok(paths)
}

/// Replays every segment for the terminal directory at `dir`, verifying CRC
/// and strict `sequence == previous + 1` monotonicity across segment
/// boundaries. Returns every frame's `(sequence, record)` in replay order.
/// An empty/absent WAL yields an empty `Vec` — callers initialize a fresh
/// `TerminalOpen` themselves via `WalWriter::open`.
pub fn read_terminal_wal(dir: &Path) -> KernelResult<Vec<(u64, WalRecord)>> {
    let mut out = Vec::new();
    let mut expected_sequence: Option<u64> = None;

    for path in segment_paths_in_order(dir)? {
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        let mut offset: u64 = 0;

        loop {
            let frame = match Frame::read_from(&mut reader, offset)? {
                Some(frame) => frame,
                None => break,
            };

            if let Some(expected) = expected_sequence {
                if frame.sequence != expected {
                    return Err(KernelError::WalCorrupt {
                        offset,
                        reason: format!("expected sequence {expected}, found {}", frame.sequence),
                    });
                }
            }
            expected_sequence = Some(frame.sequence + 1);

            let record = WalRecord::decode(frame.record_type, &frame.payload, offset)?;
            offset += frame_len(frame.payload.len());
            out.push((frame.sequence, record));
        }
    }

    Ok(out)
}

/// The sequence the next `WalWriter::append` call must use: one past the
/// highest sequence found in the terminal's WAL, or `1` if the WAL is empty.
pub fn next_sequence_after_replay(records: &[(u64, WalRecord)]) -> u64 {
    records.last().map(|(seq, _)| seq + 1).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Ulid;
    use crate::wal::writer::WalWriter;
    use tempfile::tempdir;

    #[test]
    fn empty_directory_replays_to_nothing() {
        let dir = tempdir().unwrap();
        let records = read_terminal_wal(dir.path()).unwrap();
        assert!(records.is_empty());
        assert_eq!(next_sequence_after_replay(&records), 1);
    }

    #[test]
    fn replay_detects_gap_in_sequence() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), "T1", 1, 1_000_000).unwrap();
        writer
            .append(WalRecord::SessionClose {
                session_id: Ulid::from_string("01SESSION".into()),
            })
            .unwrap();

        // Corrupt the file by skipping a sequence number directly, bypassing
        // the writer's own monotonic counter.
        let bad_frame = Frame {
            sequence: 10,
            timestamp_ns: 1,
            record_type: WalRecord::TxComplete { tx_id: Ulid::from_string("01TX".into()) }.record_type(),
            payload: WalRecord::TxComplete { tx_id: Ulid::from_string("01TX".into()) }.encode_payload(),
        };
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(dir.path().join("transaction.wal")).unwrap();
        file.write_all(&bad_frame.encode()).unwrap();

        let err = read_terminal_wal(dir.path()).unwrap_err();
        assert!(matches!(err, KernelError::WalCorrupt { .. }));
    }

    #[test]
    fn torn_trailing_frame_does_not_block_recovery_of_committed_prefix() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), "T1", 1, 1_000_000).unwrap();
        writer
            .append(WalRecord::SessionClose {
                session_id: Ulid::from_string("01SESSION".into()),
            })
            .unwrap();

        // Simulate a crash mid-`write_all` on the next frame: only part of
        // its bytes ever reached disk.
        let torn = Frame {
            sequence: 2,
            timestamp_ns: 2,
            record_type: WalRecord::TxComplete { tx_id: Ulid::from_string("01TX".into()) }.record_type(),
            payload: WalRecord::TxComplete { tx_id: Ulid::from_string("01TX".into()) }.encode_payload(),
        };
        let torn_bytes = torn.encode();
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(dir.path().join("transaction.wal")).unwrap();
        file.write_all(&torn_bytes[..torn_bytes.len() - 4]).unwrap();

        let records = read_terminal_wal(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 1);
        assert_eq!(next_sequence_after_replay(&records), 2);
    }
}
