//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → Projections → ReadModel, then a rebuild from the log.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;

    use stockbook_auth::UserId;
    use stockbook_catalog::ProductId;
    use stockbook_events::{EventEnvelope, InMemoryEventBus};
    use stockbook_inventory::{
        AddItems, AdjustmentId, CompleteMovement, CreateMovement, LedgerCommand, MovementCommand,
        MovementId, MovementStatus, MovementType, NewItem, PostMovement, SetStockLevel,
        StockLedger, StockLedgerId, StockMovement, WarehouseId,
    };
    use stockbook_parties::PartyId;

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{rebuild, MovementFilter, Projections};
    use crate::streams;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    struct Harness {
        store: Arc<InMemoryEventStore>,
        dispatcher: Dispatcher,
        projections: Projections,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryEventStore::new());
            let dispatcher = CommandDispatcher::new(store.clone(), Arc::new(InMemoryEventBus::new()));
            Self {
                store,
                dispatcher,
                projections: Projections::in_memory(),
            }
        }

        fn movement(&self, id: MovementId, cmd: MovementCommand) -> Result<(), DispatchError> {
            let committed = self.dispatcher.dispatch(id.aggregate_id(), streams::MOVEMENT, cmd, |a| {
                StockMovement::empty(MovementId::new(a))
            })?;
            self.projections.apply_committed(&committed).unwrap();
            Ok(())
        }

        fn ledger(&self, cmd: LedgerCommand) -> Result<(), DispatchError> {
            let id = StockLedgerId::main();
            let committed = self.dispatcher.dispatch(id.aggregate_id(), streams::STOCK_LEDGER, cmd, |a| {
                StockLedger::empty(StockLedgerId::new(a))
            })?;
            self.projections.apply_committed(&committed).unwrap();
            Ok(())
        }

        fn book(&self, movement_type: MovementType, from: Option<WarehouseId>, to: Option<WarehouseId>, lines: &[(ProductId, u64)]) -> Result<MovementId, DispatchError> {
            let id = MovementId::generate();
            let now = Utc::now();
            let reference = self
                .projections
                .movements
                .next_reference(movement_type, now.date_naive())
                .unwrap();
            self.movement(
                id,
                MovementCommand::Create(CreateMovement {
                    movement_id: id,
                    reference: reference.clone(),
                    movement_type,
                    from_warehouse: from,
                    to_warehouse: to,
                    supplier_id: (movement_type == MovementType::In).then(PartyId::generate),
                    customer_id: (movement_type == MovementType::Out).then(PartyId::generate),
                    created_by: UserId::generate(),
                    notes: None,
                    moved_at: None,
                    occurred_at: now,
                }),
            )?;
            self.movement(
                id,
                MovementCommand::AddItems(AddItems {
                    movement_id: id,
                    items: lines
                        .iter()
                        .map(|(p, q)| NewItem {
                            product_id: *p,
                            quantity_in_base_unit: *q,
                            entered_quantity: Decimal::from(*q),
                            entered_unit: "unit".to_string(),
                            unit_price: None,
                        })
                        .collect(),
                    occurred_at: now,
                }),
            )?;

            let movement = self
                .dispatcher
                .load(id.aggregate_id(), |a| StockMovement::empty(MovementId::new(a)))?;
            self.ledger(LedgerCommand::PostMovement(PostMovement {
                movement_id: id,
                reference,
                lines: movement.posting_lines()?,
                occurred_at: now,
            }))?;
            self.movement(
                id,
                MovementCommand::Complete(CompleteMovement {
                    movement_id: id,
                    occurred_at: now,
                }),
            )?;
            Ok(id)
        }
    }

    #[test]
    fn completed_movements_drive_stock_levels() {
        let h = Harness::new();
        let p = ProductId::generate();
        let main = WarehouseId::generate();
        let shop = WarehouseId::generate();

        h.book(MovementType::In, None, Some(main), &[(p, 10), (p, 5)]).unwrap();
        h.book(MovementType::Transfer, Some(main), Some(shop), &[(p, 6)]).unwrap();
        h.book(MovementType::Out, Some(shop), None, &[(p, 2)]).unwrap();

        assert_eq!(h.projections.stock.quantity(p, main), 9);
        assert_eq!(h.projections.stock.quantity(p, shop), 4);

        let completed = h.projections.movements.list(MovementFilter {
            status: Some(MovementStatus::Completed),
            ..MovementFilter::default()
        });
        assert_eq!(completed.len(), 3);
    }

    #[test]
    fn overdrawn_out_posts_nothing() {
        let h = Harness::new();
        let p = ProductId::generate();
        let main = WarehouseId::generate();
        h.book(MovementType::In, None, Some(main), &[(p, 3)]).unwrap();
        let before = h.store.len();

        let err = h.book(MovementType::Out, Some(main), None, &[(p, 2), (p, 2)]).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(h.projections.stock.quantity(p, main), 3);

        // Only the draft's own events were appended; the ledger is untouched.
        let ledger = h.store.load_stream(StockLedgerId::main().aggregate_id()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(h.store.len(), before + 2);
    }

    #[test]
    fn rebuild_reproduces_read_models() {
        let h = Harness::new();
        let p = ProductId::generate();
        let main = WarehouseId::generate();
        h.book(MovementType::In, None, Some(main), &[(p, 8)]).unwrap();
        h.ledger(LedgerCommand::SetStockLevel(SetStockLevel {
            adjustment_id: AdjustmentId::generate(),
            product_id: p,
            warehouse_id: main,
            counted: 5,
            reason: Some("inventory count".to_string()),
            occurred_at: Utc::now(),
        }))
        .unwrap();

        let levels = h.projections.stock.list();
        let history = h.projections.stock.history(p, main);
        let movements = h.projections.movements.list(MovementFilter::default());

        let fresh = Projections::in_memory();
        let report = rebuild(h.store.as_ref(), &fresh).unwrap();
        assert_eq!(report.events, h.store.len() as u64);

        assert_eq!(fresh.stock.list(), levels);
        assert_eq!(fresh.stock.history(p, main), history);
        assert_eq!(fresh.movements.list(MovementFilter::default()), movements);

        // Rebuilding in place is equally deterministic.
        rebuild(h.store.as_ref(), &h.projections).unwrap();
        assert_eq!(h.projections.stock.list(), levels);
    }

    #[test]
    fn racing_ledger_appends_conflict_instead_of_losing_deltas() {
        let h = Harness::new();
        let pairs: Vec<_> = (0..8).map(|_| (ProductId::generate(), WarehouseId::generate())).collect();
        let ledger = StockLedgerId::main();

        std::thread::scope(|scope| {
            for &(product, warehouse) in &pairs {
                let dispatcher = &h.dispatcher;
                scope.spawn(move || {
                    for counted in 1..=25 {
                        loop {
                            let cmd = LedgerCommand::SetStockLevel(SetStockLevel {
                                adjustment_id: AdjustmentId::generate(),
                                product_id: product,
                                warehouse_id: warehouse,
                                counted,
                                reason: None,
                                occurred_at: Utc::now(),
                            });
                            match dispatcher.dispatch(ledger.aggregate_id(), streams::STOCK_LEDGER, cmd, |a| {
                                StockLedger::empty(StockLedgerId::new(a))
                            }) {
                                Ok(_) => break,
                                // A lost race is a conflict, never a silent overwrite.
                                Err(e) => assert!(e.is_retryable(), "unexpected ledger error: {e}"),
                            }
                        }
                    }
                });
            }
        });

        let stream = h.store.load_stream(ledger.aggregate_id()).unwrap();
        assert_eq!(stream.len(), 8 * 25);
        assert!(stream.iter().enumerate().all(|(i, e)| e.sequence_number == i as u64 + 1));

        let fresh = Projections::in_memory();
        rebuild(h.store.as_ref(), &fresh).unwrap();
        for (product, warehouse) in pairs {
            assert_eq!(fresh.stock.quantity(product, warehouse), 25);
            assert_eq!(fresh.stock.history(product, warehouse).len(), 25);
        }
    }
}
