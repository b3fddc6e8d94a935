// src/terminal_registry.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The shared, advisory registry of active terminals: a single JSON file
//! listing `{terminal_id, pid, started_at_ns}` for every terminal currently
//! locked by some process. Authoritative ownership is always the
//! per-terminal lock file (`terminal_lock`) — this registry exists so
//! tooling can discover which terminals are in use without scanning every
//! terminal directory's lock file individually.

use crate::error::KernelResult;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub terminal_id: String,
    pub pid: u32,
    pub started_at_ns: u64,
}

pub struct TerminalRegistry {
    path: PathBuf,
}

impl TerminalRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Inserts or replaces this terminal's entry under a short-lived
    /// advisory lock held only for the read-modify-write.
    pub fn register(&self, terminal_id: &str, pid: u32, started_at_ns: u64) -> KernelResult<()> {
        self.with_locked_file(|entries| {
            entries.retain(|e| e.terminal_id != terminal_id);
            entries.push(RegistryEntry {
                terminal_id: terminal_id.to_string(),
                pid,
                started_at_ns,
            });
        })
    }

    /// Removes this terminal's entry, e.g. on graceful lock release.
    pub fn unregister(&self, terminal_id: &str) -> KernelResult<()> {
        self.with_locked_file(|entries| {
            entries.retain(|e| e.terminal_id != terminal_id);
        })
    }

    pub fn list(&self) -> KernelResult<Vec<RegistryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    fn with_locked_file(&self, mutate: impl FnOnce(&mut Vec<RegistryEntry>)) -> KernelResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&self.path)?;
        file.lock_exclusive()?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut entries: Vec<RegistryEntry> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&contents).unwrap_or_default()
        };

        mutate(&mut entries);

        let serialized = serde_json::to_string_pretty(&entries)
            .map_err(|e| crate::error::KernelError::Internal { context: e.to_string() })?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;

        FileExt::unlock(&file)?;
        Ok(())
    }
}
