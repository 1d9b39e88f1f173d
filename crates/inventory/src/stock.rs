//! Stock ledger: per (product, branch) quantities, mutated only through
//! `StockLedger::adjust`, which writes the paired audit entry in the same step.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use storeledger_core::{
    BranchId, Clock, DomainError, DomainResult, KeyValueStore, ProductId, ReferenceId, UserId,
};

use crate::audit::{InventoryAuditLog, InventoryLogEntry, MovementType, NewLogEntry};

/// What happens when an adjustment would take stock below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversellPolicy {
    /// Clamp at zero; the sale goes through and the log records the effective change.
    #[default]
    Clamp,
    /// Refuse the adjustment with `InsufficientStock`.
    Reject,
}

impl OversellPolicy {
    /// Stock level after applying `delta` to `before`.
    pub fn resolve(self, key: StockKey, before: i64, delta: i64) -> DomainResult<i64> {
        let raw = before.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!(
                "stock of product {} at branch {} would overflow ({before} {delta:+})",
                key.product_id, key.branch_id
            ))
        })?;
        if raw >= 0 {
            return Ok(raw);
        }
        match self {
            OversellPolicy::Clamp => Ok(0),
            OversellPolicy::Reject => Err(DomainError::InsufficientStock {
                product: key.product_id.to_string(),
                branch: key.branch_id.to_string(),
                available: before,
                requested: -delta,
            }),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub branch_id: BranchId,
}

impl StockKey {
    pub fn new(product_id: ProductId, branch_id: BranchId) -> Self {
        Self {
            product_id,
            branch_id,
        }
    }
}

/// Current quantity of one product at one branch. Never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// A requested stock change together with its audit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reference_id: ReferenceId,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

impl StockMovement {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.branch_id)
    }
}

/// Before/after pair of one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub stock_before: i64,
    pub stock_after: i64,
}

pub struct StockLedger {
    stock: Arc<dyn KeyValueStore<StockKey, StockEntry>>,
    audit: InventoryAuditLog,
    clock: Arc<dyn Clock>,
    policy: OversellPolicy,
    // Serializes read-modify-write + log append so per-key log order matches adjustment order.
    write: Mutex<()>,
}

impl StockLedger {
    pub fn new(
        stock: Arc<dyn KeyValueStore<StockKey, StockEntry>>,
        audit: InventoryAuditLog,
        clock: Arc<dyn Clock>,
        policy: OversellPolicy,
    ) -> Self {
        Self {
            stock,
            audit,
            clock,
            policy,
            write: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> OversellPolicy {
        self.policy
    }

    pub fn audit_log(&self) -> &InventoryAuditLog {
        &self.audit
    }

    /// Quantity on hand; 0 when the pair was never adjusted.
    pub fn get_quantity(&self, product_id: ProductId, branch_id: BranchId) -> DomainResult<i64> {
        self.quantity_of(&StockKey::new(product_id, branch_id))
    }

    /// Every branch's entry for one product.
    pub fn levels_for_product(&self, product_id: ProductId) -> DomainResult<Vec<StockEntry>> {
        let mut levels: Vec<_> = self
            .stock
            .list()?
            .into_iter()
            .filter(|e| e.product_id == product_id)
            .collect();
        levels.sort_by_key(|e| e.branch_id);
        Ok(levels)
    }

    /// What `adjust` would do right now, without writing anything.
    pub fn preview(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
        delta: i64,
    ) -> DomainResult<Adjustment> {
        let key = StockKey::new(product_id, branch_id);
        let stock_before = self.quantity_of(&key)?;
        let stock_after = self.policy.resolve(key, stock_before, delta)?;
        Ok(Adjustment {
            stock_before,
            stock_after,
        })
    }

    /// Check a whole transaction's demand against the oversell policy.
    ///
    /// Under `Reject` the net delta per key is checked first, then every step in
    /// order, so the adjustments that follow cannot be refused half-way through
    /// the transaction. Under both policies a level outside the `i64` range fails.
    pub fn ensure_available(&self, deltas: &[(StockKey, i64)]) -> DomainResult<()> {
        let mut net: BTreeMap<StockKey, i64> = BTreeMap::new();
        for (key, delta) in deltas {
            let total = net.entry(*key).or_insert(0);
            *total = total.checked_add(*delta).ok_or_else(|| {
                DomainError::validation(format!(
                    "net stock change of product {} overflows",
                    key.product_id
                ))
            })?;
        }

        let mut levels: BTreeMap<StockKey, i64> = BTreeMap::new();
        for (key, delta) in &net {
            let before = self.quantity_of(key)?;
            if self.policy == OversellPolicy::Reject {
                self.policy.resolve(*key, before, *delta)?;
            }
            levels.insert(*key, before);
        }

        for (key, delta) in deltas {
            if let Some(level) = levels.get_mut(key) {
                *level = self.policy.resolve(*key, *level, *delta)?;
            }
        }
        Ok(())
    }

    /// Apply one movement and append its audit entry as a single step.
    ///
    /// If the audit append fails, the stock entry is restored and the error returned.
    pub fn adjust(&self, movement: StockMovement) -> DomainResult<InventoryLogEntry> {
        if movement.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let _guard = self
            .write
            .lock()
            .map_err(|_| DomainError::storage("stock ledger lock poisoned"))?;

        let key = movement.key();
        let previous = self.stock.get(&key)?;
        let stock_before = previous.as_ref().map(|e| e.quantity).unwrap_or(0);
        let stock_after = self.policy.resolve(key, stock_before, movement.delta)?;
        let now = self.clock.now();

        self.stock.upsert(
            key,
            StockEntry {
                product_id: key.product_id,
                branch_id: key.branch_id,
                quantity: stock_after,
                updated_at: now,
            },
        )?;

        let logged = self.audit.append(NewLogEntry {
            id: None,
            timestamp: Some(now),
            product_id: key.product_id,
            branch_id: key.branch_id,
            movement_type: movement.movement_type,
            requested_change: movement.delta,
            stock_before,
            stock_after,
            reference_id: movement.reference_id,
            actor_id: movement.actor_id,
            notes: movement.notes,
        });

        match logged {
            Ok(entry) => {
                if entry.was_clamped() {
                    warn!(
                        product_id = %key.product_id,
                        branch_id = %key.branch_id,
                        requested = entry.requested_change,
                        applied = entry.quantity_change,
                        "oversell clamped at zero"
                    );
                }
                debug!(
                    product_id = %key.product_id,
                    branch_id = %key.branch_id,
                    movement = %entry.movement_type,
                    stock_before,
                    stock_after,
                    "stock adjusted"
                );
                Ok(entry)
            }
            Err(err) => {
                let restored = previous.unwrap_or(StockEntry {
                    product_id: key.product_id,
                    branch_id: key.branch_id,
                    quantity: 0,
                    updated_at: now,
                });
                self.stock.upsert(key, restored)?;
                Err(err)
            }
        }
    }

    fn quantity_of(&self, key: &StockKey) -> DomainResult<i64> {
        Ok(self.stock.get(key)?.map(|e| e.quantity).unwrap_or(0))
    }
}

impl core::fmt::Debug for StockLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
