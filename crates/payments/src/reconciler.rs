//! Payment reconciliation: applies payments and derives payment state from
//! the sum of payments recorded for each target.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use storeledger_core::{
    AppendLog, Clock, DomainError, DomainResult, KeyValueStore, LayawayId, Money, PaymentId,
    SaleId,
};
use storeledger_sales::{Layaway, PaymentMethod, PaymentStatus, Sale};

use crate::payment::{PaymentTarget, SalePayment};

/// Result of applying one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payment: SalePayment,
    pub total_paid: Money,
    /// Total minus everything paid; zero or negative once settled.
    pub balance: Money,
    /// Sale status after the payment, for sale targets.
    pub sale_status: Option<PaymentStatus>,
}

pub struct PaymentReconciler {
    payments: Arc<dyn AppendLog<SalePayment>>,
    sales: Arc<dyn KeyValueStore<SaleId, Sale>>,
    layaways: Arc<dyn KeyValueStore<LayawayId, Layaway>>,
    clock: Arc<dyn Clock>,
    gate: Mutex<()>,
}

impl PaymentReconciler {
    pub fn new(
        payments: Arc<dyn AppendLog<SalePayment>>,
        sales: Arc<dyn KeyValueStore<SaleId, Sale>>,
        layaways: Arc<dyn KeyValueStore<LayawayId, Layaway>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            payments,
            sales,
            layaways,
            clock,
            gate: Mutex::new(()),
        }
    }

    /// Record a payment against a sale or layaway.
    ///
    /// A pending sale becomes `Paid` once payments cover its total. Layaways
    /// only track the balance and reject payments beyond it; completion is a
    /// separate, explicit step.
    pub fn add_payment(
        &self,
        target: PaymentTarget,
        amount: Money,
        method: PaymentMethod,
        notes: Option<String>,
    ) -> DomainResult<PaymentReceipt> {
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let _guard = self
            .gate
            .lock()
            .map_err(|_| DomainError::storage("payment reconciler lock poisoned"))?;

        let already_paid = self.sum_for(target)?;
        let total = match target {
            PaymentTarget::Sale(id) => {
                let sale = self
                    .sales
                    .get(&id)?
                    .ok_or_else(|| DomainError::not_found("sale", id))?;
                if sale.is_return {
                    return Err(DomainError::validation("cannot pay a return record"));
                }
                if sale.payment_status == PaymentStatus::Voided {
                    return Err(DomainError::validation("cannot pay a voided sale"));
                }
                sale.total_amount
            }
            PaymentTarget::Layaway(id) => {
                let layaway = self
                    .layaways
                    .get(&id)?
                    .ok_or_else(|| DomainError::not_found("layaway", id))?;
                layaway.ensure_active()?;
                let balance = layaway.balance(already_paid);
                if amount > balance {
                    return Err(DomainError::validation(format!(
                        "payment of {amount} exceeds layaway balance {balance}"
                    )));
                }
                layaway.total_amount
            }
        };

        let total_paid = already_paid.checked_add(amount)?;
        let payment = SalePayment {
            id: PaymentId::new(),
            target,
            payment_date: self.clock.now(),
            amount_paid: amount,
            payment_method: method,
            notes,
        };
        self.payments.append(payment.clone())?;

        let sale_status = match target {
            PaymentTarget::Sale(id) => {
                let updated = self
                    .sales
                    .modify(&id, &mut |sale: &mut Sale| {
                        if sale.settle(total_paid) {
                            info!(sale_id = %sale.id, "sale settled");
                        }
                    })?
                    .ok_or_else(|| DomainError::not_found("sale", id))?;
                Some(updated.payment_status)
            }
            PaymentTarget::Layaway(_) => None,
        };

        debug!(%target, amount = %amount, total_paid = %total_paid, "payment recorded");

        Ok(PaymentReceipt {
            payment,
            total_paid,
            balance: total - total_paid,
            sale_status,
        })
    }

    /// Σ payments recorded for `target`.
    pub fn total_paid(&self, target: PaymentTarget) -> DomainResult<Money> {
        self.sum_for(target)
    }

    /// Layaway total minus payments.
    pub fn layaway_balance(&self, layaway_id: LayawayId) -> DomainResult<Money> {
        let layaway = self
            .layaways
            .get(&layaway_id)?
            .ok_or_else(|| DomainError::not_found("layaway", layaway_id))?;
        Ok(layaway.balance(self.sum_for(PaymentTarget::Layaway(layaway_id))?))
    }

    pub fn payments_for(&self, target: PaymentTarget) -> DomainResult<Vec<SalePayment>> {
        self.payments.filter(&|p: &SalePayment| p.target == target)
    }

    fn sum_for(&self, target: PaymentTarget) -> DomainResult<Money> {
        Money::checked_sum(self.payments_for(target)?.iter().map(|p| p.amount_paid))
    }
}

impl core::fmt::Debug for PaymentReconciler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaymentReconciler").finish_non_exhaustive()
    }
}
