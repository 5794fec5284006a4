//! Token Registry
//!
//! Authoritative mapping from token to account and quota. Each binding owns
//! its own lock-free [`Quota`], so traffic on different tokens never
//! contends. Registration is serialized by an async mutex and is durable
//! before it returns.
//!
//! Quota changes only mark the registry dirty; a single writer task (see
//! [`spawn_store_writer`](super::writer::spawn_store_writer)) coalesces them
//! into one store write. Every write first merges records other processes
//! added to the store, so a token issued by `codeforge register` survives a
//! running server's next write.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};

use super::dashboard::RegistrySummary;
use super::quota::Quota;
use super::store::{StoreError, TokenRecord, TokenStore};
use crate::error::GatewayError;
use crate::metrics;

/// Account owning a token
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Normalized email address
    pub email: String,

    /// Registration timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
struct TokenEntry {
    account: Account,
    quota: Quota,
}

/// One unit of quota reserved for an admitted request
///
/// Pass it to [`TokenRegistry::commit`] once the backend has been called.
/// Dropping it uncommitted returns the unit, so an abandoned request is
/// never charged.
#[derive(Debug)]
pub struct QuotaPermit {
    token: String,
    entry: Option<Arc<TokenEntry>>,
}

impl QuotaPermit {
    /// Permit for a request that is not metered
    pub fn unmetered(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            entry: None,
        }
    }

    /// Token this permit was issued for
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_metered(&self) -> bool {
        self.entry.is_some()
    }
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            debug!(token = %token_hint(&self.token), "Releasing unused quota reservation");
            entry.quota.release();
        }
    }
}

/// Token registry
pub struct TokenRegistry {
    /// Token -> binding
    tokens: DashMap<String, Arc<TokenEntry>>,

    /// Normalized email -> token
    emails: DashMap<String, String>,

    /// Persistence backend
    store: Arc<dyn TokenStore>,

    /// Quota granted at registration
    default_limit: u32,

    /// Serializes registrations
    register_lock: Mutex<()>,

    /// Serializes store reads-and-writes
    persist_lock: Mutex<()>,

    /// Set when in-memory quota differs from the store
    dirty: AtomicBool,

    /// Wakes the store writer
    changed: Notify,
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("tokens", &self.tokens.len())
            .field("default_limit", &self.default_limit)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl TokenRegistry {
    /// Load the registry from `store`
    pub async fn load(store: Arc<dyn TokenStore>, default_limit: u32) -> Result<Self, StoreError> {
        let records = store.load().await?;
        let registry = Self {
            tokens: DashMap::new(),
            emails: DashMap::new(),
            store,
            default_limit,
            register_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            changed: Notify::new(),
        };

        for record in records {
            let token = token_hint(&record.token);
            let email = mask_email(&normalize_email(&record.email));
            if !registry.insert_record(record) {
                warn!(token = %token_hint(&token), email = %email, "Skipping duplicate binding in token store");
            }
        }

        metrics::REGISTERED_TOKENS.set(registry.tokens.len() as i64);
        info!(tokens = registry.tokens.len(), "Token registry loaded");
        Ok(registry)
    }

    /// Insert a stored binding unless its token or email is already bound
    fn insert_record(&self, record: TokenRecord) -> bool {
        let email = normalize_email(&record.email);
        if self.tokens.contains_key(&record.token) || self.emails.contains_key(&email) {
            return false;
        }

        let entry = TokenEntry {
            account: Account {
                email: email.clone(),
                created_at: record.created_at,
            },
            quota: Quota::with_remaining(record.limit, record.remaining.min(record.limit)),
        };
        self.emails.insert(email, record.token.clone());
        self.tokens.insert(record.token, Arc::new(entry));
        true
    }

    fn entry(&self, token: &str) -> Option<Arc<TokenEntry>> {
        self.tokens.get(token).map(|e| e.value().clone())
    }

    /// Look up the account bound to `token`
    pub fn validate_token(&self, token: &str) -> Result<Account, GatewayError> {
        self.entry(token)
            .map(|entry| entry.account.clone())
            .ok_or_else(|| GatewayError::TokenNotFound {
                token: token.to_string(),
            })
    }

    /// Whether `token` has quota left; false for unknown tokens
    pub fn check_quota(&self, token: &str) -> bool {
        self.entry(token)
            .map(|entry| entry.quota.has_remaining())
            .unwrap_or(false)
    }

    /// Remaining quota for `token`
    pub fn remaining(&self, token: &str) -> Option<u32> {
        self.entry(token).map(|entry| entry.quota.remaining())
    }

    /// Reserve one unit of quota for an admitted request
    pub fn reserve(&self, token: &str) -> Result<QuotaPermit, GatewayError> {
        let entry = self.entry(token).ok_or_else(|| GatewayError::TokenNotFound {
            token: token.to_string(),
        })?;

        if !entry.quota.try_reserve() {
            return Err(GatewayError::QuotaExceeded {
                token: token.to_string(),
            });
        }

        Ok(QuotaPermit {
            token: token.to_string(),
            entry: Some(entry),
        })
    }

    /// Spend a reserved unit
    pub fn commit(&self, mut permit: QuotaPermit) {
        let Some(entry) = permit.entry.take() else {
            return;
        };
        entry.quota.commit();
        self.mark_dirty();
    }

    /// Decrement `token`'s quota by one, never below zero
    pub fn consume_one(&self, token: &str) {
        let Some(entry) = self.entry(token) else {
            debug!(token = %token_hint(token), "consume_one on unknown token ignored");
            return;
        };

        if entry.quota.consume_one() {
            self.mark_dirty();
        }
    }

    /// Register `email` and mint a token with a full quota
    ///
    /// Returns once the new binding is in the store.
    pub async fn register(&self, email: &str) -> Result<String, GatewayError> {
        let email = normalize_email(email);
        let _register = self.register_lock.lock().await;
        let persist = self.persist_lock.lock().await;

        // Another process may have registered this email since we loaded
        if let Err(e) = self.merge_from_store(&persist).await {
            warn!(error = %e, "Could not read token store before registration");
        }

        if self.emails.contains_key(&email) {
            metrics::REGISTRATIONS_TOTAL
                .with_label_values(&["conflict"])
                .inc();
            return Err(GatewayError::EmailAlreadyUsed { email });
        }

        // 122 random bits; never reused
        let token = uuid::Uuid::new_v4().simple().to_string();
        let entry = TokenEntry {
            account: Account {
                email: email.clone(),
                created_at: chrono::Utc::now(),
            },
            quota: Quota::new(self.default_limit),
        };

        self.tokens.insert(token.clone(), Arc::new(entry));
        self.emails.insert(email.clone(), token.clone());

        if let Err(e) = self.write_locked(&persist).await {
            // Undo while the write lock is still held
            self.tokens.remove(&token);
            self.emails.remove(&email);
            drop(persist);
            warn!(error = %e, "Registration rolled back, token store write failed");
            metrics::REGISTRATIONS_TOTAL
                .with_label_values(&["failed"])
                .inc();
            return Err(GatewayError::Persistence {
                reason: e.to_string(),
            });
        }
        drop(persist);

        metrics::REGISTRATIONS_TOTAL
            .with_label_values(&["registered"])
            .inc();
        metrics::REGISTERED_TOKENS.set(self.tokens.len() as i64);
        info!(token = %token_hint(&token), "Registered new token");
        debug!(email = %mask_email(&email), token = %token_hint(&token), "Registered account");
        Ok(token)
    }

    /// Restore every token's quota to its limit
    pub fn replenish_all(&self) -> usize {
        let mut count = 0;
        for entry in self.tokens.iter() {
            entry.value().quota.replenish();
            count += 1;
        }
        self.mark_dirty();
        metrics::QUOTA_REPLENISH_TOTAL.inc();
        count
    }

    /// Current bindings in a stable order
    pub fn records(&self) -> Vec<TokenRecord> {
        let mut records: Vec<TokenRecord> = self
            .tokens
            .iter()
            .map(|e| {
                let state = e.value().quota.state();
                TokenRecord {
                    token: e.key().clone(),
                    email: e.value().account.email.clone(),
                    remaining: state.remaining,
                    limit: e.value().quota.limit(),
                    created_at: e.value().account.created_at,
                }
            })
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.token.cmp(&b.token))
        });
        records
    }

    /// Aggregate usage figures
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for entry in self.tokens.iter() {
            summary.record(entry.value().quota.limit(), entry.value().quota.state());
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether quota changes are waiting to be written
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.changed.notify_one();
    }

    /// Wait until a quota change is pending
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Merge new bindings from the store, then write pending quota changes
    ///
    /// Returns the number of bindings picked up from the store.
    pub async fn sync_store(&self) -> Result<usize, StoreError> {
        let persist = self.persist_lock.lock().await;
        let adopted = self.merge_from_store(&persist).await?;

        if self.dirty.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.write_locked(&persist).await {
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(adopted)
    }

    /// Adopt bindings present in the store but not in memory
    async fn merge_from_store(&self, _persist: &MutexGuard<'_, ()>) -> Result<usize, StoreError> {
        let mut adopted = 0;
        for record in self.store.load().await? {
            let token = record.token.clone();
            if self.insert_record(record) {
                info!(token = %token_hint(&token), "Picked up token registered elsewhere");
                adopted += 1;
            }
        }
        if adopted > 0 {
            metrics::REGISTERED_TOKENS.set(self.tokens.len() as i64);
        }
        Ok(adopted)
    }

    /// Write the full registry; the caller holds the write lock
    async fn write_locked(&self, _persist: &MutexGuard<'_, ()>) -> Result<(), StoreError> {
        let records = self.records();
        self.store.save(&records).await
    }
}

/// Lower-case, trimmed email used as the account key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Short, non-secret prefix of a token for logs
pub fn token_hint(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}…", prefix)
}

/// Email with the local part hidden, for logs
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}
