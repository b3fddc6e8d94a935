// src/session.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! A session groups transactions under one operator on one terminal.
//! Closing a session with any owned transaction still `Building` is
//! rejected — that transaction's totals could still change.

use crate::ids::Ulid;

pub struct Session {
    pub session_id: Ulid,
    pub terminal_id: String,
    pub operator_id: Option<String>,
    pub opened_at_ns: u64,
}

impl Session {
    pub fn new(session_id: Ulid, terminal_id: impl Into<String>, operator_id: Option<String>, opened_at_ns: u64) -> Self {
        Self {
            session_id,
            terminal_id: terminal_id.into(),
            operator_id,
            opened_at_ns,
        }
    }
}
