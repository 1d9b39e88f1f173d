//! Integration tests for the full transaction pipeline.
//!
//! Tests: Command → TransactionProcessor → StockLedger + audit log → records → EventBus
//!
//! Verifies:
//! - Stock, audit log and records stay consistent for every business event
//! - Rejected commands leave no partial writes
//! - Payment status and layaway balances derive from recorded payments

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;

    use chrono::{Duration, Utc};

    use storeledger_core::{
        BranchId, CajaId, ClientId, DomainError, FixedClock, Money, ProductId, ReferenceId, SaleId,
        StaticSession, SupplierId, UserId,
    };
    use storeledger_events::{
        EventBus, InMemoryEventBus, LedgerNotification, NotificationKind, Subscription,
    };
    use storeledger_inventory::{MovementType, OversellPolicy, Product, StockMovement};
    use storeledger_payments::PaymentTarget;
    use storeledger_purchasing::{SupplierOrder, SupplierOrderStatus, SupplierPaymentStatus};
    use storeledger_sales::{
        CartLine, Discount, LayawayStatus, PaymentMethod, PaymentStatus, ReturnLine, SaleDraft,
    };

    use crate::commands::{
        CreateSupplierOrder, OrderItemRequest, ProcessReturn, RecordLayaway, TransferStock,
    };
    use crate::config::{LayawayTag, LedgerConfig};
    use crate::processor::{NotificationEnvelope, TransactionProcessor};
    use crate::stores::LedgerStores;

    type Bus = Arc<InMemoryEventBus<NotificationEnvelope>>;

    struct Harness {
        processor: TransactionProcessor<Bus>,
        notifications: Subscription<NotificationEnvelope>,
        session: Arc<StaticSession>,
        branch: BranchId,
        actor: UserId,
    }

    fn setup() -> Harness {
        setup_with(LedgerConfig::default())
    }

    fn setup_with(config: LedgerConfig) -> Harness {
        let actor = UserId::new();
        let session = Arc::new(StaticSession::signed_in(actor));
        let clock = Arc::new(FixedClock::ticking(Utc::now(), Duration::seconds(1)));
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        // Subscribe before anything is published.
        let notifications = bus.subscribe();

        let processor =
            TransactionProcessor::new(LedgerStores::in_memory(), session.clone(), clock, bus, config);

        Harness {
            processor,
            notifications,
            session,
            branch: BranchId::new(),
            actor,
        }
    }

    impl Harness {
        /// Register a product and put `quantity` of it on the shelf at the harness branch.
        fn stocked(&self, sku: &str, quantity: i64) -> ProductId {
            let product = Product::goods(sku, format!("{sku} item"));
            let id = product.id;
            self.processor.catalog().register(product).unwrap();
            if quantity > 0 {
                self.processor
                    .adjust_stock_manually(id, self.branch, quantity, Some("opening count".into()))
                    .unwrap();
            }
            id
        }

        fn service(&self, sku: &str) -> ProductId {
            let product = Product::service(sku, format!("{sku} service"));
            let id = product.id;
            self.processor.catalog().register(product).unwrap();
            id
        }

        fn quantity(&self, product_id: ProductId) -> i64 {
            self.processor
                .ledger()
                .get_quantity(product_id, self.branch)
                .unwrap()
        }

        fn draft(&self, lines: Vec<CartLine>, payment_method: PaymentMethod) -> SaleDraft {
            SaleDraft {
                lines,
                branch_id: self.branch,
                caja_id: CajaId::new(),
                employee_id: self.actor,
                client_id: Some(ClientId::new()),
                payment_method,
            }
        }

        fn return_of(&self, sale_id: SaleId, lines: Vec<ReturnLine>) -> ProcessReturn {
            ProcessReturn {
                original_sale_id: sale_id,
                lines,
                employee_id: self.actor,
                caja_id: CajaId::new(),
                branch_id: self.branch,
                reason: Some("customer changed mind".into()),
            }
        }

        fn layaway(&self, lines: Vec<CartLine>, initial_cents: i64) -> RecordLayaway {
            RecordLayaway {
                lines,
                client_id: ClientId::new(),
                branch_id: self.branch,
                employee_id: self.actor,
                initial_payment: Money::from_cents(initial_cents),
                payment_method: PaymentMethod::Cash,
            }
        }

        fn published(&self) -> Vec<LedgerNotification> {
            self.notifications
                .drain()
                .into_iter()
                .map(|e| e.into_payload())
                .collect()
        }
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn untouched_stock_reads_zero() {
        let h = setup();
        assert_eq!(h.quantity(ProductId::new()), 0);
        assert!(h.processor.audit_log().is_empty().unwrap());
    }

    #[test]
    fn sale_decrements_stock_with_one_log_entry() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 10);

        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(shirt, 3, cents(2_000))], PaymentMethod::Cash))
            .unwrap();

        assert_eq!(h.quantity(shirt), 7);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.total_amount, cents(6_000));

        let entries = h.processor.audit_log().query_by_reference(sale.id.into()).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.movement_type, MovementType::SaleAtPos);
        assert_eq!(entry.quantity_change, -3);
        assert_eq!((entry.stock_before, entry.stock_after), (10, 7));
        assert_eq!(entry.actor_id, h.actor);

        assert_eq!(h.processor.find_sale(sale.id).unwrap(), sale);
    }

    #[test]
    fn service_lines_never_touch_stock() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 5);
        let tailoring = h.service("TAILOR");

        // The catalog decides what is a service, whatever the cart says.
        let sale = h
            .processor
            .record_sale(h.draft(
                vec![
                    CartLine::new(shirt, 1, cents(2_000)),
                    CartLine::new(tailoring, 1, cents(500)),
                ],
                PaymentMethod::Card,
            ))
            .unwrap();

        assert_eq!(h.quantity(shirt), 4);
        assert_eq!(h.quantity(tailoring), 0);
        assert_eq!(
            h.processor.audit_log().query_by_reference(sale.id.into()).unwrap().len(),
            1
        );
        assert!(sale.lines[1].is_service);
    }

    #[test]
    fn discounted_sale_total_uses_net_unit_price() {
        let h = setup();
        let shoes = h.stocked("SHOES", 5);

        let sale = h
            .processor
            .record_sale(h.draft(
                vec![CartLine::new(shoes, 2, cents(10_000)).with_discount(Discount::Percentage(25))],
                PaymentMethod::Cash,
            ))
            .unwrap();

        assert_eq!(sale.total_amount, cents(15_000));
    }

    #[test]
    fn sale_publishes_notification() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 2);

        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(shirt, 1, cents(100))], PaymentMethod::Cash))
            .unwrap();

        let envelope = h.notifications.try_recv().unwrap();
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.correlation_id(), ReferenceId::from(sale.id));
        assert_eq!(envelope.payload().kind, NotificationKind::SaleCompleted);
        assert_eq!(envelope.payload().link, format!("/sales/{}", sale.id));

        let json = serde_json::to_value(envelope.payload()).unwrap();
        assert_eq!(json["kind"], "sale_completed");
    }

    #[test]
    fn oversell_is_clamped_by_default() {
        let h = setup();
        let mug = h.stocked("MUG", 2);

        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(mug, 5, cents(800))], PaymentMethod::Cash))
            .unwrap();

        assert_eq!(h.quantity(mug), 0);
        let entry = &h.processor.audit_log().query_by_reference(sale.id.into()).unwrap()[0];
        assert_eq!(entry.quantity_change, -2);
        assert_eq!(entry.requested_change, -5);
        assert!(entry.was_clamped());
    }

    #[test]
    fn reject_policy_refuses_whole_transaction() {
        let h = setup_with(LedgerConfig {
            oversell_policy: OversellPolicy::Reject,
            ..LedgerConfig::default()
        });
        let mug = h.stocked("MUG", 5);
        let cup = h.stocked("CUP", 1);
        let log_len = h.processor.audit_log().len().unwrap();

        let err = h
            .processor
            .record_sale(h.draft(
                vec![CartLine::new(mug, 2, cents(800)), CartLine::new(cup, 2, cents(300))],
                PaymentMethod::Cash,
            ))
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock { available: 1, requested: 2, .. }));
        assert_eq!(h.quantity(mug), 5);
        assert_eq!(h.quantity(cup), 1);
        assert_eq!(h.processor.audit_log().len().unwrap(), log_len);
        assert!(h.published().is_empty());
    }

    #[test]
    fn unknown_product_fails_before_any_write() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 5);
        let log_len = h.processor.audit_log().len().unwrap();

        let err = h
            .processor
            .record_sale(h.draft(
                vec![CartLine::new(shirt, 1, cents(100)), CartLine::new(ProductId::new(), 1, cents(100))],
                PaymentMethod::Cash,
            ))
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { entity: "product", .. }));
        assert_eq!(h.quantity(shirt), 5);
        assert_eq!(h.processor.audit_log().len().unwrap(), log_len);
    }

    #[test]
    fn stock_operations_require_an_actor() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 5);
        h.session.set_actor(None);

        let err = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(shirt, 1, cents(100))], PaymentMethod::Cash))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized));

        let err = h
            .processor
            .adjust_stock_manually(shirt, h.branch, 1, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized));
        assert_eq!(h.quantity(shirt), 5);
    }

    #[test]
    fn store_credit_sale_is_settled_by_exact_payment() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 5);
        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(shirt, 1, cents(5_000))], PaymentMethod::StoreCredit))
            .unwrap();
        assert_eq!(sale.payment_status, PaymentStatus::PendingPayment);

        let receipt = h
            .processor
            .add_payment(PaymentTarget::Sale(sale.id), cents(5_000), PaymentMethod::Cash, None)
            .unwrap();

        assert_eq!(receipt.sale_status, Some(PaymentStatus::Paid));
        assert_eq!(h.processor.find_sale(sale.id).unwrap().payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn partial_payment_leaves_sale_unchanged() {
        let h = setup();
        let shirt = h.stocked("SHIRT", 5);
        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(shirt, 2, cents(5_000))], PaymentMethod::StoreCredit))
            .unwrap();

        h.processor
            .add_payment(PaymentTarget::Sale(sale.id), cents(5_000), PaymentMethod::Cash, None)
            .unwrap();

        assert_eq!(
            h.processor.find_sale(sale.id).unwrap().payment_status,
            PaymentStatus::PendingPayment
        );
        assert_eq!(
            h.processor.reconciler().total_paid(PaymentTarget::Sale(sale.id)).unwrap(),
            cents(5_000)
        );
    }

    #[test]
    fn returning_every_line_fully_returns_the_sale() {
        let h = setup();
        let a = h.stocked("A", 10);
        let b = h.stocked("B", 10);
        let sale = h
            .processor
            .record_sale(h.draft(
                vec![CartLine::new(a, 2, cents(1_000)), CartLine::new(b, 1, cents(3_000))],
                PaymentMethod::Cash,
            ))
            .unwrap();

        let record = h
            .processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(a, 2), ReturnLine::new(b, 1)]))
            .unwrap();

        assert!(record.is_return);
        assert_eq!(record.original_sale_id, Some(sale.id));
        assert_eq!(record.total_amount, cents(-5_000));
        assert_eq!(record.payment_method, PaymentMethod::Return);
        assert_eq!(
            h.processor.find_sale(sale.id).unwrap().payment_status,
            PaymentStatus::FullyReturned
        );
        assert_eq!((h.quantity(a), h.quantity(b)), (10, 10));

        let entries = h.processor.audit_log().query_by_reference(record.id.into()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.movement_type == MovementType::Return));
    }

    #[test]
    fn returns_accumulate_from_partial_to_full() {
        let h = setup();
        let a = h.stocked("A", 10);
        let b = h.stocked("B", 10);
        let sale = h
            .processor
            .record_sale(h.draft(
                vec![CartLine::new(a, 2, cents(1_000)), CartLine::new(b, 1, cents(3_000))],
                PaymentMethod::Cash,
            ))
            .unwrap();

        h.processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(a, 2)]))
            .unwrap();
        assert_eq!(
            h.processor.find_sale(sale.id).unwrap().payment_status,
            PaymentStatus::PartiallyReturned
        );

        h.processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(b, 1)]))
            .unwrap();
        assert_eq!(
            h.processor.find_sale(sale.id).unwrap().payment_status,
            PaymentStatus::FullyReturned
        );
        assert_eq!(h.processor.returns_of(sale.id).unwrap().len(), 2);

        let err = h
            .processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(a, 1)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn split_lines_of_one_product_refund_what_was_paid() {
        let h = setup();
        let a = h.stocked("A", 10);
        let sale = h
            .processor
            .record_sale(h.draft(
                vec![
                    CartLine::new(a, 1, cents(1_000)),
                    CartLine::new(a, 1, cents(1_000)).with_discount(Discount::Percentage(50)),
                ],
                PaymentMethod::Cash,
            ))
            .unwrap();
        assert_eq!(sale.total_amount, cents(1_500));

        let record = h
            .processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(a, 2)]))
            .unwrap();

        assert_eq!(record.total_amount, cents(-1_500));
        assert_eq!(h.quantity(a), 10);
        assert_eq!(
            h.processor.find_sale(sale.id).unwrap().payment_status,
            PaymentStatus::FullyReturned
        );
    }

    #[test]
    fn return_bounds_and_restock_flag_are_enforced() {
        let h = setup();
        let a = h.stocked("A", 10);
        let sale = h
            .processor
            .record_sale(h.draft(vec![CartLine::new(a, 3, cents(1_000))], PaymentMethod::Cash))
            .unwrap();
        assert_eq!(h.quantity(a), 7);

        let record = h
            .processor
            .process_return(h.return_of(
                sale.id,
                vec![ReturnLine::new(a, 1).without_restock().with_refund(cents(250))],
            ))
            .unwrap();
        assert_eq!(record.total_amount, cents(-250));
        assert_eq!(h.quantity(a), 7);

        let err = h
            .processor
            .process_return(h.return_of(sale.id, vec![ReturnLine::new(a, 3)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = h
            .processor
            .process_return(h.return_of(record.id, vec![ReturnLine::new(a, 1)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(h.quantity(a), 7);
    }

    #[test]
    fn layaway_balance_follows_payments_and_stays_active() {
        let h = setup();
        let bike = h.stocked("BIKE", 3);

        let layaway = h
            .processor
            .record_layaway(h.layaway(vec![CartLine::new(bike, 1, cents(20_000))], 5_000))
            .unwrap();
        assert_eq!(layaway.total_amount, cents(20_000));
        assert_eq!(h.quantity(bike), 2);

        let entries = h.processor.audit_log().query_by_reference(layaway.id.into()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].movement_type, MovementType::SaleAtPos);

        let target = PaymentTarget::Layaway(layaway.id);
        h.processor
            .add_payment(target, cents(3_000), PaymentMethod::Cash, None)
            .unwrap();
        assert_eq!(h.processor.reconciler().layaway_balance(layaway.id).unwrap(), cents(12_000));

        let err = h
            .processor
            .add_payment(target, cents(12_001), PaymentMethod::Cash, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        h.processor
            .add_payment(target, cents(12_000), PaymentMethod::Card, None)
            .unwrap();
        assert_eq!(h.processor.reconciler().layaway_balance(layaway.id).unwrap(), Money::ZERO);
        assert_eq!(h.processor.find_layaway(layaway.id).unwrap().status, LayawayStatus::Active);

        let completed = h.processor.complete_layaway(layaway.id).unwrap();
        assert_eq!(completed.status, LayawayStatus::Completed);
    }

    #[test]
    fn layaway_with_balance_cannot_complete_but_can_cancel() {
        let h = setup();
        let bike = h.stocked("BIKE", 3);
        let layaway = h
            .processor
            .record_layaway(h.layaway(vec![CartLine::new(bike, 1, cents(20_000))], 0))
            .unwrap();
        assert!(h.processor.reconciler().payments_for(PaymentTarget::Layaway(layaway.id)).unwrap().is_empty());

        let err = h.processor.complete_layaway(layaway.id).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let cancelled = h.processor.cancel_layaway(layaway.id).unwrap();
        assert_eq!(cancelled.status, LayawayStatus::Cancelled);
        assert_eq!(h.quantity(bike), 2);
        assert!(h.processor.cancel_layaway(layaway.id).is_err());
    }

    #[test]
    fn layaway_initial_payment_is_validated_before_writes() {
        let h = setup();
        let bike = h.stocked("BIKE", 3);

        for initial in [-1, 20_001] {
            let err = h
                .processor
                .record_layaway(h.layaway(vec![CartLine::new(bike, 1, cents(20_000))], initial))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
        assert_eq!(h.quantity(bike), 3);
    }

    #[test]
    fn dedicated_layaway_tag_is_logged() {
        let h = setup_with(LedgerConfig {
            layaway_tag: LayawayTag::Dedicated,
            ..LedgerConfig::default()
        });
        let bike = h.stocked("BIKE", 3);

        let layaway = h
            .processor
            .record_layaway(h.layaway(vec![CartLine::new(bike, 1, cents(20_000))], 1_000))
            .unwrap();

        let entries = h.processor.audit_log().query_by_reference(layaway.id.into()).unwrap();
        assert_eq!(entries[0].movement_type, MovementType::Layaway);
        assert_eq!(h.published().last().map(|n| n.kind), Some(NotificationKind::LayawayCreated));
    }

    fn two_item_order(h: &Harness, a: ProductId, b: ProductId) -> SupplierOrder {
        h.processor
            .create_supplier_order(CreateSupplierOrder {
                supplier_id: SupplierId::new(),
                items: vec![
                    OrderItemRequest {
                        product_id: a,
                        quantity_ordered: 12,
                        unit_cost: cents(500),
                    },
                    OrderItemRequest {
                        product_id: b,
                        quantity_ordered: 4,
                        unit_cost: cents(2_500),
                    },
                ],
            })
            .unwrap()
    }

    #[test]
    fn supplier_reception_stocks_every_item_under_one_reference() {
        let h = setup();
        let a = h.stocked("A", 1);
        let b = h.stocked("B", 0);
        let order = two_item_order(&h, a, b);
        assert_eq!(order.total_cost, cents(16_000));

        h.processor
            .advance_supplier_order(order.id, SupplierOrderStatus::Ordered, None)
            .unwrap();
        let received = h.processor.receive_supplier_order(order.id, Some(h.branch)).unwrap();

        assert_eq!(received.status, SupplierOrderStatus::FullyReceived);
        assert_eq!(received.received_branch, Some(h.branch));
        assert_eq!((h.quantity(a), h.quantity(b)), (13, 4));

        let entries = h.processor.audit_log().query_by_reference(order.id.into()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.movement_type == MovementType::SupplierReception));

        assert_eq!(
            h.published().last().map(|n| n.kind),
            Some(NotificationKind::SupplierOrderReceived)
        );

        let err = h.processor.receive_supplier_order(order.id, Some(h.branch)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(h.quantity(a), 13);
    }

    #[test]
    fn reception_without_branch_is_a_configuration_error() {
        let h = setup();
        let a = h.stocked("A", 0);
        let b = h.stocked("B", 0);
        let order = two_item_order(&h, a, b);
        h.processor
            .advance_supplier_order(order.id, SupplierOrderStatus::Ordered, None)
            .unwrap();

        let err = h.processor.receive_supplier_order(order.id, None).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
        assert_eq!(
            h.processor.find_supplier_order(order.id).unwrap().status,
            SupplierOrderStatus::Ordered
        );
        assert_eq!(h.quantity(a), 0);

        // Falls back to the session's active branch.
        h.session.set_active_branch(Some(h.branch));
        h.processor.receive_supplier_order(order.id, None).unwrap();
        assert_eq!(h.quantity(a), 12);
    }

    #[test]
    fn supplier_items_take_service_flag_from_catalog() {
        let h = setup();
        let a = h.stocked("A", 0);
        let install = h.service("INSTALL");
        let order = two_item_order(&h, a, install);
        assert!(order.items[1].is_service);

        h.processor
            .advance_supplier_order(order.id, SupplierOrderStatus::Ordered, None)
            .unwrap();
        h.processor.receive_supplier_order(order.id, Some(h.branch)).unwrap();

        assert_eq!(h.quantity(install), 0);
        assert_eq!(
            h.processor.audit_log().query_by_reference(order.id.into()).unwrap().len(),
            1
        );
    }

    #[test]
    fn supplier_payments_derive_status() {
        let h = setup();
        let a = h.stocked("A", 0);
        let b = h.stocked("B", 0);
        let order = two_item_order(&h, a, b);

        let paid = h.processor.pay_supplier_order(order.id, cents(6_000)).unwrap();
        assert_eq!(paid.payment_status, SupplierPaymentStatus::PartiallyPaid);

        let paid = h.processor.pay_supplier_order(order.id, cents(10_000)).unwrap();
        assert_eq!(paid.payment_status, SupplierPaymentStatus::FullyPaid);
        assert!(h.processor.pay_supplier_order(order.id, cents(1)).is_err());
    }

    #[test]
    fn transfer_moves_stock_under_one_reference() {
        let h = setup();
        let a = h.stocked("A", 5);
        let other = BranchId::new();

        let transfer = h
            .processor
            .transfer_stock(TransferStock {
                product_id: a,
                from_branch: h.branch,
                to_branch: other,
                quantity: 3,
                notes: None,
            })
            .unwrap();

        assert_eq!(h.quantity(a), 2);
        assert_eq!(h.processor.ledger().get_quantity(a, other).unwrap(), 3);
        assert_eq!(transfer.outbound.movement_type, MovementType::TransferOut);
        assert_eq!(transfer.inbound.movement_type, MovementType::TransferIn);
        assert_eq!(
            h.processor.audit_log().query_by_reference(transfer.reference_id).unwrap().len(),
            2
        );

        let err = h
            .processor
            .transfer_stock(TransferStock {
                product_id: a,
                from_branch: h.branch,
                to_branch: other,
                quantity: 3,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { available: 2, .. }));
    }

    #[test]
    fn audit_trail_chains_for_every_key() {
        let h = setup();
        let a = h.stocked("A", 4);
        let b = h.stocked("B", 2);

        for _ in 0..3 {
            h.processor
                .record_sale(h.draft(
                    vec![CartLine::new(a, 2, cents(100)), CartLine::new(b, 1, cents(100))],
                    PaymentMethod::Cash,
                ))
                .unwrap();
        }
        h.processor.adjust_stock_manually(a, h.branch, 7, None).unwrap();

        for product in [a, b] {
            let trace = h.processor.audit_log().query_by_stock(product, h.branch).unwrap();
            let mut previous = 0;
            for entry in &trace {
                assert_eq!(entry.stock_before, previous);
                assert_eq!(entry.stock_after, entry.stock_before + entry.quantity_change);
                assert!(entry.stock_after >= 0);
                previous = entry.stock_after;
            }
            assert_eq!(previous, h.quantity(product));
        }
        assert_eq!((h.quantity(a), h.quantity(b)), (7, 0));
    }

    #[test]
    fn overflowing_supplier_order_is_rejected_and_processor_stays_usable() {
        let h = setup();
        let a = h.stocked("A", 0);

        let err = h
            .processor
            .create_supplier_order(CreateSupplierOrder {
                supplier_id: SupplierId::new(),
                items: vec![OrderItemRequest {
                    product_id: a,
                    quantity_ordered: i64::MAX,
                    unit_cost: cents(2),
                }],
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let entry = h.processor.adjust_stock_manually(a, h.branch, 5, None).unwrap();
        assert_eq!(entry.stock_after, 5);
    }

    #[test]
    fn stock_overflow_is_rejected_before_any_write() {
        let h = setup();
        let a = h.stocked("A", i64::MAX);
        let logged = h.processor.audit_log().len().unwrap();

        let err = h.processor.adjust_stock_manually(a, h.branch, 1, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let order = h
            .processor
            .create_supplier_order(CreateSupplierOrder {
                supplier_id: SupplierId::new(),
                items: vec![OrderItemRequest {
                    product_id: a,
                    quantity_ordered: 1,
                    unit_cost: cents(100),
                }],
            })
            .unwrap();
        h.processor
            .advance_supplier_order(order.id, SupplierOrderStatus::Ordered, None)
            .unwrap();
        let err = h.processor.receive_supplier_order(order.id, Some(h.branch)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(
            h.processor.find_supplier_order(order.id).unwrap().status,
            SupplierOrderStatus::Ordered
        );

        assert_eq!(h.quantity(a), i64::MAX);
        assert_eq!(h.processor.audit_log().len().unwrap(), logged);

        h.processor
            .record_sale(h.draft(vec![CartLine::new(a, 1, cents(100))], PaymentMethod::Cash))
            .unwrap();
        assert_eq!(h.quantity(a), i64::MAX - 1);
    }

    #[test]
    fn concurrent_transactions_keep_every_chain_gap_free() {
        let h = setup();
        let a = h.stocked("A", 100);
        let b = h.stocked("B", 100);
        let layaway = h
            .processor
            .record_layaway(h.layaway(vec![CartLine::new(b, 1, cents(10_000))], 0))
            .unwrap();
        let Harness {
            processor, branch, ..
        } = h;
        let processor = Arc::new(processor);

        let workers: Vec<_> = (0..6)
            .map(|worker| {
                let processor = Arc::clone(&processor);
                std::thread::spawn(move || {
                    for step in 0..20 {
                        match (worker + step) % 3 {
                            0 => {
                                processor
                                    .record_sale(SaleDraft {
                                        lines: vec![
                                            CartLine::new(a, 2, cents(100)),
                                            CartLine::new(b, 1, cents(100)),
                                        ],
                                        branch_id: branch,
                                        caja_id: CajaId::new(),
                                        employee_id: UserId::new(),
                                        client_id: None,
                                        payment_method: PaymentMethod::Cash,
                                    })
                                    .unwrap();
                            }
                            1 => {
                                processor
                                    .ledger()
                                    .adjust(StockMovement {
                                        product_id: a,
                                        branch_id: branch,
                                        delta: 3,
                                        movement_type: MovementType::ManualAdjustment,
                                        reference_id: ReferenceId::new(),
                                        actor_id: UserId::new(),
                                        notes: None,
                                    })
                                    .unwrap();
                            }
                            _ => {
                                // overpayments are refused, the rest go through
                                let _ = processor.add_payment(
                                    PaymentTarget::Layaway(layaway.id),
                                    cents(700),
                                    PaymentMethod::Cash,
                                    None,
                                );
                            }
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        for product in [a, b] {
            let trace = processor.audit_log().query_by_stock(product, branch).unwrap();
            let mut previous = 0;
            for entry in &trace {
                assert_eq!(entry.stock_before, previous);
                assert_eq!(entry.stock_after, entry.stock_before + entry.quantity_change);
                previous = entry.stock_after;
            }
            assert_eq!(previous, processor.ledger().get_quantity(product, branch).unwrap());
        }

        // 40 sales of 2×A and 40 top-ups of 3 against an opening 100
        let a_trace = processor.audit_log().query_by_stock(a, branch).unwrap();
        assert_eq!(a_trace.len(), 81);
        assert_eq!(processor.ledger().get_quantity(a, branch).unwrap(), 100 - 80 + 120);

        let paid = processor
            .reconciler()
            .total_paid(PaymentTarget::Layaway(layaway.id))
            .unwrap();
        assert_eq!(paid, cents(9_800));
        assert!(paid <= layaway.total_amount);
    }

    /// Bus whose publish always fails.
    struct ClosedBus;

    impl EventBus<NotificationEnvelope> for ClosedBus {
        type Error = &'static str;

        fn publish(&self, _message: NotificationEnvelope) -> Result<(), Self::Error> {
            Err("bus closed")
        }

        fn subscribe(&self) -> Subscription<NotificationEnvelope> {
            Subscription::new(mpsc::channel().1)
        }
    }

    #[test]
    fn publish_failure_does_not_undo_the_commit() {
        let actor = UserId::new();
        let processor = TransactionProcessor::new(
            LedgerStores::in_memory(),
            Arc::new(StaticSession::signed_in(actor)),
            Arc::new(FixedClock::new(Utc::now())),
            ClosedBus,
            LedgerConfig::default(),
        );
        let branch = BranchId::new();
        let product = Product::goods("A", "A item");
        let a = product.id;
        processor.catalog().register(product).unwrap();
        processor.adjust_stock_manually(a, branch, 5, None).unwrap();

        let sale = processor
            .record_sale(SaleDraft {
                lines: vec![CartLine::new(a, 1, cents(100))],
                branch_id: branch,
                caja_id: CajaId::new(),
                employee_id: actor,
                client_id: None,
                payment_method: PaymentMethod::Cash,
            })
            .unwrap();

        assert_eq!(processor.ledger().get_quantity(a, branch).unwrap(), 4);
        assert!(processor.find_sale(sale.id).is_ok());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 32,
                ..ProptestConfig::default()
            })]

            /// Property: after any mix of sales and manual restocks, stock equals the
            /// clamped fold of the requested deltas and matches the last log entry.
            #[test]
            fn stock_is_clamped_fold_of_transactions(
                ops in prop::collection::vec((any::<bool>(), 1i64..6), 1..25)
            ) {
                let h = setup();
                let a = h.stocked("A", 0);
                let mut expected = 0i64;

                for (is_sale, quantity) in ops {
                    if is_sale {
                        h.processor
                            .record_sale(h.draft(
                                vec![CartLine::new(a, quantity, cents(100))],
                                PaymentMethod::Cash,
                            ))
                            .unwrap();
                        expected = (expected - quantity).max(0);
                    } else {
                        h.processor
                            .adjust_stock_manually(a, h.branch, quantity, None)
                            .unwrap();
                        expected += quantity;
                    }
                    prop_assert_eq!(h.quantity(a), expected);
                }

                let trace = h.processor.audit_log().query_by_stock(a, h.branch).unwrap();
                prop_assert_eq!(trace.last().map(|e| e.stock_after), Some(expected));
            }
        }
    }
}
