/*
 * Copyright 2025 Paul Moore Parks and contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! POS Kernel: a transaction kernel for point-of-sale terminals.
//!
//! The kernel owns one append-only, tamper-evident write-ahead log per
//! terminal and serializes every mutation against it before applying it to
//! in-memory state, so a terminal recovers its exact committed state across
//! a crash or restart. [`Kernel`] is the only entry point — it is
//! constructed once per process and handed down to callers (in this crate,
//! the `pos-kernel-service` binary's HTTP handlers); it is never a
//! process-wide singleton.
//!
//! Module map:
//! - [`money`] — currency-aware integer arithmetic in minor units.
//! - [`ids`] — ULID generation and line-number allocation.
//! - [`product`], [`line_item`], [`tender`] — transaction line-item data.
//! - [`line_item_graph`] — the parent/child line hierarchy and void cascade.
//! - [`transaction`] — transaction state machine (lines, tenders, totals).
//! - [`session`] — operator sessions grouping transactions on a terminal.
//! - [`wal`] — the on-disk frame format, writer, and replay reader.
//! - [`terminal_lock`] — cross-process exclusive terminal ownership.
//! - [`terminal_registry`] — the shared, advisory active-terminals listing.
//! - [`terminal_store`] — in-memory per-terminal session/transaction state.
//! - [`recovery`] — WAL replay into a fresh store at startup.
//! - [`snapshot`] — read-only transaction views returned to callers.
//! - [`config`] — the kernel's environment-driven configuration.
//! - [`kernel`] — [`Kernel`], the request surface tying all of the above together.
//! - [`error`] — the shared error taxonomy.

pub mod config;
pub mod error;
pub mod ids;
pub mod kernel;
pub mod line_item;
pub mod line_item_graph;
pub mod money;
pub mod product;
pub mod recovery;
pub mod session;
pub mod snapshot;
pub mod tender;
pub mod terminal_lock;
pub mod terminal_registry;
pub mod terminal_store;
pub mod transaction;
pub mod wal;

pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use ids::Ulid;
pub use kernel::Kernel;
pub use line_item::{ItemType, LineItem};
pub use money::Money;
pub use product::ProductRef;
pub use snapshot::{LineSnapshot, TenderSnapshot, TxSnapshot};
pub use tender::{Tender, TenderKind};
pub use transaction::TxState;
