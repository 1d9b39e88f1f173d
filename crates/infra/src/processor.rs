//! Transaction processing pipeline for stock-affecting business events.
//!
//! Every command follows the same shape:
//!
//! ```text
//! Command
//!   ↓
//! 1. Take the write gate (one transaction at a time)
//!   ↓
//! 2. Validate everything: actor, products, quantities, amounts, bounds, branch
//!   ↓
//! 3. Adjust stock per non-service line (each adjustment appends its audit entry)
//!   ↓
//! 4. Persist the transaction record (sale / layaway / supplier order)
//!   ↓
//! 5. Publish a notification (failures are logged, the commit stands)
//! ```
//!
//! Nothing is written until step 2 passed, so a rejected command leaves stock,
//! log and records untouched.
//!
//! Lock order is always processor gate → reconciler gate → ledger lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};
use uuid::Uuid;

use storeledger_core::{
    BranchId, Clock, DomainError, DomainResult, KeyValueStore, LayawayId, Money, ProductId,
    ReferenceId, SaleId, SessionContext, SupplierOrderId, UserId,
};
use storeledger_events::{EventBus, EventEnvelope, LedgerNotification};
use storeledger_inventory::{
    InventoryAuditLog, InventoryLogEntry, MovementType, Product, ProductCatalog, StockKey,
    StockLedger, StockMovement,
};
use storeledger_payments::{PaymentReceipt, PaymentReconciler, PaymentTarget};
use storeledger_purchasing::{SupplierOrder, SupplierOrderItem, SupplierOrderStatus};
use storeledger_sales::{
    CartLine, Layaway, LayawayDraft, PaymentMethod, ReturnContext, Sale, SaleDraft, plan_return,
    validate_cart,
};

use crate::commands::{
    CreateSupplierOrder, ProcessReturn, RecordLayaway, StockTransfer, TransferStock,
};
use crate::config::LedgerConfig;
use crate::stores::LedgerStores;

pub type NotificationEnvelope = EventEnvelope<LedgerNotification>;

/// Orchestrates sales, returns, layaways, supplier receptions and manual stock
/// movements against the stock ledger, the payment reconciler and the record
/// stores.
///
/// `B` is the bus notifications are published on; tests use
/// `InMemoryEventBus` and subscribe to it directly.
pub struct TransactionProcessor<B> {
    catalog: ProductCatalog,
    ledger: Arc<StockLedger>,
    reconciler: Arc<PaymentReconciler>,
    sales: Arc<dyn KeyValueStore<SaleId, Sale>>,
    layaways: Arc<dyn KeyValueStore<LayawayId, Layaway>>,
    supplier_orders: Arc<dyn KeyValueStore<SupplierOrderId, SupplierOrder>>,
    session: Arc<dyn SessionContext>,
    clock: Arc<dyn Clock>,
    bus: B,
    config: LedgerConfig,
    sequence: AtomicU64,
    gate: Mutex<()>,
}

impl<B> TransactionProcessor<B> {
    pub fn new(
        stores: LedgerStores,
        session: Arc<dyn SessionContext>,
        clock: Arc<dyn Clock>,
        bus: B,
        config: LedgerConfig,
    ) -> Self {
        let audit = InventoryAuditLog::new(stores.inventory_log, clock.clone());
        let ledger = StockLedger::new(stores.stock, audit, clock.clone(), config.oversell_policy);
        let reconciler = PaymentReconciler::new(
            stores.payments,
            stores.sales.clone(),
            stores.layaways.clone(),
            clock.clone(),
        );

        Self {
            catalog: ProductCatalog::new(stores.products),
            ledger: Arc::new(ledger),
            reconciler: Arc::new(reconciler),
            sales: stores.sales,
            layaways: stores.layaways,
            supplier_orders: stores.supplier_orders,
            session,
            clock,
            bus,
            config,
            sequence: AtomicU64::new(0),
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Read access to stock levels. Writes go through the processor.
    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn audit_log(&self) -> &InventoryAuditLog {
        self.ledger.audit_log()
    }

    pub fn reconciler(&self) -> &PaymentReconciler {
        &self.reconciler
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn find_sale(&self, id: SaleId) -> DomainResult<Sale> {
        self.sales
            .get(&id)?
            .ok_or_else(|| DomainError::not_found("sale", id))
    }

    pub fn find_layaway(&self, id: LayawayId) -> DomainResult<Layaway> {
        self.layaways
            .get(&id)?
            .ok_or_else(|| DomainError::not_found("layaway", id))
    }

    pub fn find_supplier_order(&self, id: SupplierOrderId) -> DomainResult<SupplierOrder> {
        self.supplier_orders
            .get(&id)?
            .ok_or_else(|| DomainError::not_found("supplier order", id))
    }

    /// Return records taken against `sale_id`, oldest first.
    pub fn returns_of(&self, sale_id: SaleId) -> DomainResult<Vec<Sale>> {
        let mut returns: Vec<_> = self
            .sales
            .list()?
            .into_iter()
            .filter(|s| s.is_return && s.original_sale_id == Some(sale_id))
            .collect();
        returns.sort_by_key(|s| s.date);
        Ok(returns)
    }

    fn lock(&self) -> DomainResult<MutexGuard<'_, ()>> {
        self.gate
            .lock()
            .map_err(|_| DomainError::storage("transaction processor lock poisoned"))
    }

    /// Validate a cart and take each line's service flag from the catalog.
    fn resolve_lines(&self, mut lines: Vec<CartLine>) -> DomainResult<Vec<CartLine>> {
        validate_cart(&lines)?;
        for line in &mut lines {
            line.is_service = self.catalog.require(line.product_id)?.is_service;
        }
        Ok(lines)
    }

    fn stocked_product(&self, product_id: ProductId) -> DomainResult<Product> {
        let product = self.catalog.require(product_id)?;
        if product.is_service {
            return Err(DomainError::validation(format!(
                "product {} is a service and carries no stock",
                product.sku
            )));
        }
        Ok(product)
    }

    fn apply_movements(
        &self,
        deltas: &[(StockKey, i64)],
        movement_type: MovementType,
        reference_id: ReferenceId,
        actor_id: UserId,
        notes: Option<&str>,
    ) -> DomainResult<Vec<InventoryLogEntry>> {
        deltas
            .iter()
            .map(|(key, delta)| {
                self.ledger.adjust(StockMovement {
                    product_id: key.product_id,
                    branch_id: key.branch_id,
                    delta: *delta,
                    movement_type,
                    reference_id,
                    actor_id,
                    notes: notes.map(str::to_string),
                })
            })
            .collect()
    }
}

/// Signed stock deltas for the non-service lines of a cart.
fn line_deltas(lines: &[CartLine], branch_id: BranchId, sign: i64) -> Vec<(StockKey, i64)> {
    lines
        .iter()
        .filter(|l| l.affects_stock())
        .map(|l| (StockKey::new(l.product_id, branch_id), sign * l.quantity))
        .collect()
}

impl<B> TransactionProcessor<B>
where
    B: EventBus<NotificationEnvelope>,
{
    /// Record a point-of-sale sale and take its goods out of stock.
    ///
    /// Returns the completed sale.
    pub fn record_sale(&self, draft: SaleDraft) -> DomainResult<Sale> {
        let _gate = self.lock()?;
        let actor = self.session.require_actor()?;

        let lines = self.resolve_lines(draft.lines)?;
        let sale = Sale::complete(
            SaleId::new(),
            self.clock.now(),
            SaleDraft { lines, ..draft },
        )?;
        let deltas = line_deltas(&sale.lines, sale.branch_id, -1);
        self.ledger.ensure_available(&deltas)?;

        self.apply_movements(
            &deltas,
            MovementType::SaleAtPos,
            sale.id.into(),
            actor,
            None,
        )?;
        self.sales.upsert(sale.id, sale.clone())?;

        info!(
            sale_id = %sale.id,
            branch_id = %sale.branch_id,
            total = %sale.total_amount,
            status = ?sale.payment_status,
            lines = sale.lines.len(),
            "sale recorded"
        );
        self.publish(LedgerNotification::sale_completed(
            sale.id,
            sale.total_amount,
            sale.date,
        ));
        Ok(sale)
    }

    /// Take a return against an earlier sale.
    ///
    /// Creates the return record, restocks lines flagged `return_to_stock`, and
    /// moves the original to `PartiallyReturned` or `FullyReturned`.
    pub fn process_return(&self, cmd: ProcessReturn) -> DomainResult<Sale> {
        let _gate = self.lock()?;
        let actor = self.session.require_actor()?;

        let original = self.find_sale(cmd.original_sale_id)?;
        let prior = self.returns_of(original.id)?;
        let plan = plan_return(&original, &prior, &cmd.lines)?;

        let record = Sale::return_record(
            SaleId::new(),
            self.clock.now(),
            &original,
            &plan,
            ReturnContext {
                branch_id: cmd.branch_id,
                caja_id: cmd.caja_id,
                employee_id: cmd.employee_id,
                reason: cmd.reason,
            },
        );
        let deltas: Vec<_> = plan
            .restock
            .iter()
            .map(|(product_id, quantity)| (StockKey::new(*product_id, cmd.branch_id), *quantity))
            .collect();
        self.ledger.ensure_available(&deltas)?;

        self.apply_movements(
            &deltas,
            MovementType::Return,
            record.id.into(),
            actor,
            record.notes.as_deref(),
        )?;
        self.sales.upsert(record.id, record.clone())?;

        let next = plan.resulting_status;
        let mut transitioned = Ok(());
        self.sales.modify(&original.id, &mut |sale: &mut Sale| {
            transitioned = sale.transition(next);
        })?;
        transitioned?;

        info!(
            return_id = %record.id,
            original_sale_id = %original.id,
            refund = %plan.refund,
            original_status = ?next,
            restocked = deltas.len(),
            "return processed"
        );
        self.publish(LedgerNotification::return_processed(
            record.id,
            original.id,
            plan.refund,
            record.date,
        ));
        Ok(record)
    }

    /// Open a layaway, reserve its goods and book the initial payment.
    pub fn record_layaway(&self, cmd: RecordLayaway) -> DomainResult<Layaway> {
        let _gate = self.lock()?;
        let actor = self.session.require_actor()?;

        let lines = self.resolve_lines(cmd.lines)?;
        let layaway = Layaway::open(
            LayawayId::new(),
            self.clock.now(),
            LayawayDraft {
                lines,
                client_id: cmd.client_id,
                branch_id: cmd.branch_id,
                employee_id: cmd.employee_id,
            },
        )?;
        if cmd.initial_payment.is_negative() {
            return Err(DomainError::validation("initial payment cannot be negative"));
        }
        if cmd.initial_payment > layaway.total_amount {
            return Err(DomainError::validation(format!(
                "initial payment {} exceeds layaway total {}",
                cmd.initial_payment, layaway.total_amount
            )));
        }
        let deltas = line_deltas(&layaway.lines, layaway.branch_id, -1);
        self.ledger.ensure_available(&deltas)?;

        self.apply_movements(
            &deltas,
            self.config.layaway_tag.movement_type(),
            layaway.id.into(),
            actor,
            None,
        )?;
        self.layaways.upsert(layaway.id, layaway.clone())?;

        if cmd.initial_payment.is_positive() {
            self.reconciler.add_payment(
                PaymentTarget::Layaway(layaway.id),
                cmd.initial_payment,
                cmd.payment_method,
                Some("initial payment".to_string()),
            )?;
        }

        info!(
            layaway_id = %layaway.id,
            client_id = %layaway.client_id,
            total = %layaway.total_amount,
            initial_payment = %cmd.initial_payment,
            "layaway recorded"
        );
        self.publish(LedgerNotification::layaway_created(
            layaway.id,
            layaway.total_amount,
            layaway.date,
        ));
        Ok(layaway)
    }

    /// `Active → Completed`, once payments cover the total.
    pub fn complete_layaway(&self, id: LayawayId) -> DomainResult<Layaway> {
        let _gate = self.lock()?;

        let mut layaway = self.find_layaway(id)?;
        let balance = self.reconciler.layaway_balance(id)?;
        if balance.is_positive() {
            return Err(DomainError::validation(format!(
                "layaway {id} still owes {balance}"
            )));
        }
        layaway.complete()?;
        self.layaways.upsert(id, layaway.clone())?;

        info!(layaway_id = %id, "layaway completed");
        Ok(layaway)
    }

    /// `Active → Cancelled`. Reserved stock is not put back.
    pub fn cancel_layaway(&self, id: LayawayId) -> DomainResult<Layaway> {
        let _gate = self.lock()?;

        let mut layaway = self.find_layaway(id)?;
        layaway.cancel()?;
        self.layaways.upsert(id, layaway.clone())?;

        info!(layaway_id = %id, "layaway cancelled");
        Ok(layaway)
    }

    /// Record a payment against a sale or layaway.
    pub fn add_payment(
        &self,
        target: PaymentTarget,
        amount: Money,
        method: PaymentMethod,
        notes: Option<String>,
    ) -> DomainResult<PaymentReceipt> {
        let _gate = self.lock()?;
        self.reconciler.add_payment(target, amount, method, notes)
    }

    /// Draft a supplier order; service flags come from the catalog.
    pub fn create_supplier_order(&self, cmd: CreateSupplierOrder) -> DomainResult<SupplierOrder> {
        let _gate = self.lock()?;

        let items = cmd
            .items
            .into_iter()
            .map(|item| -> DomainResult<SupplierOrderItem> {
                let product = self.catalog.require(item.product_id)?;
                Ok(SupplierOrderItem {
                    product_id: item.product_id,
                    quantity_ordered: item.quantity_ordered,
                    unit_cost: item.unit_cost,
                    is_service: product.is_service,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        let order = SupplierOrder::create(
            SupplierOrderId::new(),
            cmd.supplier_id,
            self.clock.now(),
            items,
        )?;
        self.supplier_orders.upsert(order.id, order.clone())?;

        info!(
            order_id = %order.id,
            supplier_id = %order.supplier_id,
            total_cost = %order.total_cost,
            "supplier order created"
        );
        Ok(order)
    }

    /// Move a supplier order along its lifecycle.
    ///
    /// Entering `FullyReceived` stocks every non-service item at
    /// `target_branch`, falling back to the session's active branch.
    pub fn advance_supplier_order(
        &self,
        id: SupplierOrderId,
        next: SupplierOrderStatus,
        target_branch: Option<BranchId>,
    ) -> DomainResult<SupplierOrder> {
        let _gate = self.lock()?;

        let order = self.find_supplier_order(id)?;
        if next == SupplierOrderStatus::FullyReceived {
            return self.receive(order, target_branch);
        }

        let mut order = order;
        let previous = order.status;
        order.transition(next)?;
        self.supplier_orders.upsert(id, order.clone())?;

        info!(order_id = %id, from = ?previous, to = ?next, "supplier order advanced");
        Ok(order)
    }

    /// Receive a supplier order in full.
    pub fn receive_supplier_order(
        &self,
        id: SupplierOrderId,
        target_branch: Option<BranchId>,
    ) -> DomainResult<SupplierOrder> {
        self.advance_supplier_order(id, SupplierOrderStatus::FullyReceived, target_branch)
    }

    fn receive(
        &self,
        mut order: SupplierOrder,
        target_branch: Option<BranchId>,
    ) -> DomainResult<SupplierOrder> {
        let actor = self.session.require_actor()?;
        let branch_id = target_branch
            .or_else(|| self.session.active_branch())
            .ok_or_else(|| {
                DomainError::configuration(format!(
                    "no branch to receive supplier order {} into",
                    order.id
                ))
            })?;

        let now = self.clock.now();
        order.mark_received(branch_id, now)?;
        let deltas: Vec<_> = order
            .stocked_items()
            .map(|item| (StockKey::new(item.product_id, branch_id), item.quantity_ordered))
            .collect();
        self.ledger.ensure_available(&deltas)?;

        self.apply_movements(
            &deltas,
            MovementType::SupplierReception,
            order.id.into(),
            actor,
            None,
        )?;
        self.supplier_orders.upsert(order.id, order.clone())?;

        info!(
            order_id = %order.id,
            branch_id = %branch_id,
            items = deltas.len(),
            "supplier order received"
        );
        self.publish(LedgerNotification::supplier_order_received(
            order.id,
            deltas.len(),
            now,
        ));
        Ok(order)
    }

    /// Pay (part of) a supplier order.
    pub fn pay_supplier_order(
        &self,
        id: SupplierOrderId,
        amount: Money,
    ) -> DomainResult<SupplierOrder> {
        let _gate = self.lock()?;

        let mut order = self.find_supplier_order(id)?;
        let status = order.record_payment(amount)?;
        self.supplier_orders.upsert(id, order.clone())?;

        info!(order_id = %id, amount = %amount, payment_status = ?status, "supplier order paid");
        Ok(order)
    }

    /// Correct a stock level by hand (stock counts, breakage, ...).
    pub fn adjust_stock_manually(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
        delta: i64,
        notes: Option<String>,
    ) -> DomainResult<InventoryLogEntry> {
        let _gate = self.lock()?;
        let actor = self.session.require_actor()?;

        self.stocked_product(product_id)?;
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let key = StockKey::new(product_id, branch_id);
        self.ledger.ensure_available(&[(key, delta)])?;

        let entry = self.ledger.adjust(StockMovement {
            product_id,
            branch_id,
            delta,
            movement_type: MovementType::ManualAdjustment,
            reference_id: ReferenceId::new(),
            actor_id: actor,
            notes,
        })?;

        info!(
            product_id = %product_id,
            branch_id = %branch_id,
            stock_before = entry.stock_before,
            stock_after = entry.stock_after,
            "stock adjusted manually"
        );
        Ok(entry)
    }

    /// Move stock between branches. The source must hold the full quantity.
    pub fn transfer_stock(&self, cmd: TransferStock) -> DomainResult<StockTransfer> {
        let _gate = self.lock()?;
        let actor = self.session.require_actor()?;

        self.stocked_product(cmd.product_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        if cmd.from_branch == cmd.to_branch {
            return Err(DomainError::validation(
                "cannot transfer stock to the same branch",
            ));
        }
        let available = self.ledger.get_quantity(cmd.product_id, cmd.from_branch)?;
        if available < cmd.quantity {
            return Err(DomainError::InsufficientStock {
                product: cmd.product_id.to_string(),
                branch: cmd.from_branch.to_string(),
                available,
                requested: cmd.quantity,
            });
        }

        self.ledger.ensure_available(&[
            (StockKey::new(cmd.product_id, cmd.from_branch), -cmd.quantity),
            (StockKey::new(cmd.product_id, cmd.to_branch), cmd.quantity),
        ])?;

        let reference_id = ReferenceId::new();
        let outbound = self.ledger.adjust(StockMovement {
            product_id: cmd.product_id,
            branch_id: cmd.from_branch,
            delta: -cmd.quantity,
            movement_type: MovementType::TransferOut,
            reference_id,
            actor_id: actor,
            notes: cmd.notes.clone(),
        })?;
        let inbound = self.ledger.adjust(StockMovement {
            product_id: cmd.product_id,
            branch_id: cmd.to_branch,
            delta: cmd.quantity,
            movement_type: MovementType::TransferIn,
            reference_id,
            actor_id: actor,
            notes: cmd.notes,
        })?;

        info!(
            product_id = %cmd.product_id,
            from = %cmd.from_branch,
            to = %cmd.to_branch,
            quantity = cmd.quantity,
            %reference_id,
            "stock transferred"
        );
        Ok(StockTransfer {
            reference_id,
            outbound,
            inbound,
        })
    }

    fn publish(&self, notification: LedgerNotification) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let correlation_id = notification.correlation_id;
        let kind = notification.kind;
        let envelope = EventEnvelope::new(Uuid::now_v7(), correlation_id, sequence, notification);

        if let Err(err) = self.bus.publish(envelope) {
            warn!(
                error = ?err,
                kind = ?kind,
                %correlation_id,
                "failed to publish ledger notification"
            );
        }
    }
}

impl<B> core::fmt::Debug for TransactionProcessor<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
