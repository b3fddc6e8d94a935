// src/config.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The only configuration the core consumes: where terminal data lives on
//! disk, and when a WAL segment rotates. Everything else — ports, workers,
//! timeouts — belongs to the HTTP reference deployment, not the kernel.

use std::path::PathBuf;

const DATA_DIR_VAR: &str = "POS_KERNEL_DATA_DIR";
const WAL_SEGMENT_BYTES_VAR: &str = "POS_KERNEL_WAL_SEGMENT_BYTES";

/// Default WAL segment size before rotation: 64 MiB.
pub const DEFAULT_WAL_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub data_dir: PathBuf,
    pub wal_segment_bytes: u64,
}

impl KernelConfig {
    /// Reads configuration from the environment, falling back to an
    /// OS-appropriate default data directory and `DEFAULT_WAL_SEGMENT_BYTES`.
    pub fn from_env() -> Self {
        let data_dir = std::env::var(DATA_DIR_VAR).map(PathBuf::from).unwrap_or_else(|_| default_data_dir());
        let wal_segment_bytes = std::env::var(WAL_SEGMENT_BYTES_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WAL_SEGMENT_BYTES);

        Self { data_dir, wal_segment_bytes }
    }

    pub fn terminal_dir(&self, terminal_id: &str) -> PathBuf {
        self.data_dir.join("terminals").join(terminal_id)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("shared").join("coordination").join("active_terminals.json")
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".poskernel");
    }
    if let Some(local_app_data) = std::env::var_os("LOCALAPPDATA") {
        return PathBuf::from(local_app_data).join("poskernel");
    }
    PathBuf::from(".poskernel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_dir_is_nested_under_terminals() {
        let config = KernelConfig {
            data_dir: PathBuf::from("/tmp/pk-test"),
            wal_segment_bytes: DEFAULT_WAL_SEGMENT_BYTES,
        };
        assert_eq!(config.terminal_dir("T1"), PathBuf::from("/tmp/pk-test/terminals/T1"));
    }

    #[test]
    fn registry_path_matches_documented_layout() {
        let config = KernelConfig {
            data_dir: PathBuf::from("/tmp/pk-test"),
            wal_segment_bytes: DEFAULT_WAL_SEGMENT_BYTES,
        };
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/tmp/pk-test/shared/coordination/active_terminals.json")
        );
    }
}
