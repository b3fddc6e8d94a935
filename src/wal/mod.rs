// src/wal/mod.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The write-ahead log: one append-only file per terminal, the sole source
//! of durability and tamper evidence for every mutation the kernel accepts.
//! See `frame` for the on-disk envelope, `record` for payload encoding, and
//! `writer`/`reader` for the append and replay paths.

mod frame;
mod reader;
mod record;
mod writer;

pub use frame::{frame_len, Frame, MAGIC, VERSION};
pub use reader::{next_sequence_after_replay, read_terminal_wal, segment_paths_in_order};
pub use record::WalRecord;
pub use writer::{WalWriter, ACTIVE_SEGMENT_NAME, SCHEMA_VERSION};
