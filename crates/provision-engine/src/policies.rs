//! Policy table and resolver
//!
//! The policy table is the one shared mutable document in the system.
//! Every mutation is a read-modify-write of the whole table inside a
//! compare-and-swap retry loop, and every write compacts the table first.
//! Binding counters on individual policies use the same discipline.

use std::collections::HashSet;
use std::sync::Arc;

use provision_model::{POLICY_TABLE_UUID, Persist, Policy, PolicyTable};
use tracing::{debug, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::data::Data;
use crate::error::EngineError;

/// CAS attempts before a conflict is surfaced
pub const DEFAULT_CAS_ATTEMPTS: u32 = 8;

/// Policies in `ordered` that are enabled, have their tags satisfied and
/// have room for another node, in precedence order
pub fn candidates<'a>(
    ordered: &'a [Policy],
    tags: &'a [String],
) -> impl Iterator<Item = &'a Policy> + 'a {
    ordered
        .iter()
        .filter(move |p| p.enabled && p.tags_satisfied_by(tags) && p.has_capacity())
}

/// First of [`candidates`]
pub fn resolve<'a>(ordered: &'a [Policy], tags: &'a [String]) -> Option<&'a Policy> {
    candidates(ordered, tags).next()
}

#[derive(Debug, Clone)]
pub struct Policies {
    data: Arc<Data>,
    attempts: u32,
    backoff_min_ms: u64,
    backoff_max_ms: u64,
}

impl Policies {
    pub fn new(data: Arc<Data>) -> Self {
        Self {
            data,
            attempts: DEFAULT_CAS_ATTEMPTS,
            backoff_min_ms: 5,
            backoff_max_ms: 200,
        }
    }

    /// Overrides the retry budget
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, min_ms: u64, max_ms: u64) -> Self {
        self.attempts = attempts.max(1);
        self.backoff_min_ms = min_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    /// Current table, compacted against existing policies (not written)
    pub async fn table(&self) -> Result<PolicyTable, EngineError> {
        let mut table = self.stored_table().await?;
        table.compact(&self.existing_uuids().await?);
        Ok(table)
    }

    /// Policies in table order
    pub async fn ordered(&self) -> Result<Vec<Policy>, EngineError> {
        let policies = self.data.fetch_all::<Policy>().await?;
        let table = self.stored_table().await?;
        let mut seen = HashSet::new();
        Ok(table
            .p_table
            .iter()
            .filter(|uuid| seen.insert(uuid.as_str()))
            .filter_map(|uuid| policies.iter().find(|p| &p.uuid == uuid).cloned())
            .collect())
    }

    pub async fn add(&self, uuid: &str) -> Result<PolicyTable, EngineError> {
        let owned = uuid.to_string();
        Ok(self.update_table(|t| Ok(t.add_item(&owned))).await?.0)
    }

    pub async fn remove(&self, uuid: &str) -> Result<PolicyTable, EngineError> {
        let owned = uuid.to_string();
        Ok(self.update_table(|t| Ok(t.remove_item(&owned))).await?.0)
    }

    pub async fn move_higher(&self, uuid: &str) -> Result<bool, EngineError> {
        let owned = uuid.to_string();
        Ok(self.update_table(|t| Ok(t.move_higher(&owned))).await?.1)
    }

    pub async fn move_lower(&self, uuid: &str) -> Result<bool, EngineError> {
        let owned = uuid.to_string();
        Ok(self.update_table(|t| Ok(t.move_lower(&owned))).await?.1)
    }

    pub async fn move_to_index(&self, uuid: &str, index: i64) -> Result<bool, EngineError> {
        let owned = uuid.to_string();
        Ok(self
            .update_table(|t| Ok(t.move_to_index(&owned, index)?))
            .await?
            .1)
    }

    /// Compacts and writes the table without other changes
    pub async fn compact(&self) -> Result<PolicyTable, EngineError> {
        Ok(self.update_table(|_| Ok(())).await?.0)
    }

    /// Read-modify-write of the table with compare-and-swap retries.
    ///
    /// `mutate` runs against a freshly read, compacted table on every
    /// attempt. Compaction runs again after it.
    pub async fn update_table<R, F>(&self, mut mutate: F) -> Result<(PolicyTable, R), EngineError>
    where
        F: FnMut(&mut PolicyTable) -> Result<R, EngineError>,
    {
        let mut backoff = FibonacciBackoff::new(self.backoff_min_ms, self.backoff_max_ms);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let existing = self.existing_uuids().await?;
            let mut table = self.stored_table().await?;
            table.compact(&existing);
            let result = mutate(&mut table)?;
            table.compact(&existing);
            match self.data.persist(&mut table).await {
                Ok(()) => return Ok((table, result)),
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    let delay = backoff.next_backoff();
                    debug!(
                        "Policy table conflict (attempt {}/{}), retrying in {:?}",
                        attempt, self.attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!("Policy table update gave up after {} attempts", attempt);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Increments a policy's bound count if it is still eligible.
    ///
    /// Returns the updated policy, whose `bound_count` is the new node's
    /// counter, or `None` when the policy is gone, disabled or full.
    pub async fn claim(&self, uuid: &str) -> Result<Option<Policy>, EngineError> {
        let mut backoff = FibonacciBackoff::new(self.backoff_min_ms, self.backoff_max_ms);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut policy) = self.data.fetch::<Policy>(uuid).await? else {
                return Ok(None);
            };
            if !policy.enabled || !policy.has_capacity() {
                debug!("Policy {} no longer eligible", policy.label);
                return Ok(None);
            }
            policy.bound_count += 1;
            match self.data.persist(&mut policy).await {
                Ok(()) => {
                    info!(
                        "Policy {} claimed slot {} (maximum {})",
                        policy.label, policy.bound_count, policy.maximum
                    );
                    return Ok(Some(policy));
                }
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    tokio::time::sleep(backoff.next_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Gives back a slot taken by [`Policies::claim`] that was never used.
    pub async fn release(&self, uuid: &str) -> Result<(), EngineError> {
        let mut backoff = FibonacciBackoff::new(self.backoff_min_ms, self.backoff_max_ms);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut policy) = self.data.fetch::<Policy>(uuid).await? else {
                return Ok(());
            };
            if policy.bound_count == 0 {
                return Ok(());
            }
            policy.bound_count -= 1;
            match self.data.persist(&mut policy).await {
                Ok(()) => {
                    debug!("Policy {} released slot {}", policy.label, policy.bound_count + 1);
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    tokio::time::sleep(backoff.next_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stored_table(&self) -> Result<PolicyTable, EngineError> {
        Ok(self
            .data
            .fetch::<PolicyTable>(POLICY_TABLE_UUID)
            .await?
            .unwrap_or_default())
    }

    async fn existing_uuids(&self) -> Result<HashSet<String>, EngineError> {
        Ok(self
            .data
            .fetch_all::<Policy>()
            .await?
            .into_iter()
            .map(|p| p.uuid().to_string())
            .collect())
    }
}
