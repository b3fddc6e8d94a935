// src/terminal_lock.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! Exclusive per-terminal ownership via an OS advisory file lock, with
//! stale-lock reclamation when the recorded owner process is gone.
//!
//! Staleness is detected by comparing the owning process's recorded start
//! time against its current start time read from `/proc/<pid>/stat` on
//! Linux. On other platforms the only signal available is whether the PID
//! still exists at all — a PID reused by an unrelated process after a crash
//! cannot be distinguished from the original owner there. This is a
//! documented platform limitation, not a silently dropped check.

use crate::error::{KernelError, KernelResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = "terminal.lock";

pub struct TerminalLock {
    file: File,
    lock_path: PathBuf,
}

impl TerminalLock {
    /// Acquires the exclusive lock for the terminal directory `dir`,
    /// reclaiming a stale lock left behind by a crashed process if
    /// necessary. Fails with `TerminalBusy` if a live process holds it.
    pub fn acquire(dir: &Path) -> KernelResult<Self> {
        fs::create_dir_all(dir)?;
        let lock_path = dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&lock_path)?;

        if file.try_lock_exclusive().is_ok() {
            write_owner_record(&mut file)?;
            return Ok(Self { file, lock_path });
        }

        let recorded = read_owner_record(&mut file)?;
        let stale = match recorded {
            None => true,
            Some((pid, started_at_ns)) => is_stale(pid, started_at_ns),
        };

        if !stale {
            return Err(KernelError::TerminalBusy);
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.try_lock_exclusive().map_err(|_| KernelError::TerminalBusy)?;
        write_owner_record(&mut file)?;
        Ok(Self { file, lock_path })
    }

    /// Releases the lock and deletes the lock file — the clean shutdown
    /// path. On an abnormal exit the OS releases the lock anyway and the
    /// next startup's staleness check reclaims it.
    pub fn release(self) -> KernelResult<()> {
        fs2::FileExt::unlock(&self.file)?;
        let _ = fs::remove_file(&self.lock_path);
        Ok(())
    }
}

fn write_owner_record(file: &mut File) -> KernelResult<()> {
    let pid = std::process::id();
    let started_at_ns = process_start_time_ns(pid).unwrap_or(0);
    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    write!(file, "{pid}\n{started_at_ns}\n")?;
    file.sync_all()?;
    Ok(())
}

fn read_owner_record(file: &mut File) -> KernelResult<Option<(u32, u64)>> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let mut lines = contents.lines();
    let pid = match lines.next().and_then(|l| l.parse::<u32>().ok()) {
        Some(pid) => pid,
        None => return Ok(None),
    };
    let started_at_ns = lines.next().and_then(|l| l.parse::<u64>().ok()).unwrap_or(0);
    Ok(Some((pid, started_at_ns)))
}

fn is_stale(pid: u32, recorded_started_at_ns: u64) -> bool {
    match process_start_time_ns(pid) {
        None => true,
        Some(current_started_at_ns) => current_started_at_ns != recorded_started_at_ns,
    }
}

/// A process's start time in nanoseconds since boot, or `None` if the
/// platform can't determine it (in which case the lock owner is treated as
/// alive unless the PID itself is gone — see `process_exists`).
#[cfg(target_os = "linux")]
fn process_start_time_ns(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Field 22 (starttime, in clock ticks since boot) follows a
    // parenthesized comm field that may itself contain spaces/parens, so
    // split after the last ')'.
    let after_comm = stat.rsplit_once(')')?.1;
    let starttime_ticks: u64 = after_comm.split_whitespace().nth(19)?.parse().ok()?;
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_sec <= 0 {
        return None;
    }
    Some(starttime_ticks * (1_000_000_000 / ticks_per_sec as u64))
}

#[cfg(not(target_os = "linux"))]
fn process_start_time_ns(pid: u32) -> Option<u64> {
    if process_exists(pid) {
        Some(0)
    } else {
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn process_exists(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_directory_acquires_cleanly() {
        let dir = tempdir().unwrap();
        let lock = TerminalLock::acquire(dir.path()).unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn record_from_nonexistent_pid_is_stale() {
        // PID 0 is never a valid user process id on Linux; using it as a
        // recorded owner must read as stale.
        assert!(is_stale(0, 123));
    }

    #[test]
    fn own_pid_with_matching_start_time_is_not_stale() {
        let pid = std::process::id();
        if let Some(started_at_ns) = process_start_time_ns(pid) {
            assert!(!is_stale(pid, started_at_ns));
        }
    }
}
