//! Token Registry and Quota Management Module
//!
//! This module owns every token binding and its per-window quota.
//!
//! # Features
//!
//! - Lock-free per-token quota counters (no global lock on the request path)
//! - Reservation permits so concurrent requests cannot overspend a quota
//! - Serialized registration with rollback on persistence failure
//! - Fixed-window quota replenishment
//! - Coalesced store writes that merge bindings added by other processes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Token Registry                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  token ─▶ { Account, Quota(remaining, reserved) }            │
//! │  email ─▶ token                                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Token Store (JSON file / in-memory)           │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dashboard;
pub mod manager;
pub mod quota;
pub mod replenish;
pub mod store;
pub mod writer;

pub use config::QuotaConfig;
pub use dashboard::RegistrySummary;
pub use manager::{mask_email, normalize_email, token_hint, Account, QuotaPermit, TokenRegistry};
pub use quota::{Quota, QuotaState};
pub use replenish::spawn_replenisher;
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenRecord, TokenStore};
pub use writer::spawn_store_writer;
