//! Current stock per (product, warehouse) and the ledger history behind it.
//!
//! Levels are the running fold of ledger deltas; every history line records
//! the balance it produced.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_catalog::ProductId;
use stockbook_events::EventEnvelope;
use stockbook_inventory::{AdjustmentId, LedgerEvent, MovementId, StockKey, StockLedgerId, WarehouseId};

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// What booked a ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerSource {
    Movement { movement_id: MovementId, reference: String },
    Reversal { movement_id: MovementId },
    Adjustment { adjustment_id: AdjustmentId, reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerLine {
    pub source: LedgerSource,
    pub line_no: Option<u32>,
    pub delta: i64,
    pub balance_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StockLevelsProjection<
    L = InMemoryReadStore<StockKey, StockLevel>,
    H = InMemoryReadStore<StockKey, Vec<LedgerLine>>,
> {
    levels: L,
    history: H,
    cursors: StreamCursors,
}

impl<L, H> StockLevelsProjection<L, H>
where
    L: ReadStore<StockKey, StockLevel>,
    H: ReadStore<StockKey, Vec<LedgerLine>>,
{
    pub fn new(levels: L, history: H) -> Self {
        Self {
            levels,
            history,
            cursors: StreamCursors::new("inventory.stock_levels"),
        }
    }

    pub fn get(&self, product_id: ProductId, warehouse_id: WarehouseId) -> Option<StockLevel> {
        self.levels.get(&(product_id, warehouse_id))
    }

    /// Current quantity; zero for a pair never touched.
    pub fn quantity(&self, product_id: ProductId, warehouse_id: WarehouseId) -> i64 {
        self.get(product_id, warehouse_id).map(|l| l.quantity).unwrap_or(0)
    }

    pub fn list(&self) -> Vec<StockLevel> {
        let mut all = self.levels.list();
        all.sort_by_key(|l| (l.product_id, l.warehouse_id));
        all
    }

    pub fn total_for_product(&self, product_id: ProductId) -> i64 {
        self.levels
            .list()
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    pub fn product_holds_stock(&self, product_id: ProductId) -> bool {
        self.levels
            .list()
            .iter()
            .any(|l| l.product_id == product_id && l.quantity != 0)
    }

    /// Ledger lines for one pair, oldest first.
    pub fn history(&self, product_id: ProductId, warehouse_id: WarehouseId) -> Vec<LedgerLine> {
        self.history.get(&(product_id, warehouse_id)).unwrap_or_default()
    }

    fn book(&self, key: StockKey, source: LedgerSource, line_no: Option<u32>, delta: i64, at: DateTime<Utc>) {
        let mut level = self.levels.get(&key).unwrap_or(StockLevel {
            product_id: key.0,
            warehouse_id: key.1,
            quantity: 0,
            updated_at: at,
        });
        level.quantity = level.quantity.saturating_add(delta);
        level.updated_at = at;

        let mut lines = self.history.get(&key).unwrap_or_default();
        lines.push(LedgerLine {
            source,
            line_no,
            delta,
            balance_after: level.quantity,
            occurred_at: at,
        });

        self.history.upsert(key, lines);
        self.levels.upsert(key, level);
    }
}

impl<L, H> Projection for StockLevelsProjection<L, H>
where
    L: ReadStore<StockKey, StockLevel>,
    H: ReadStore<StockKey, Vec<LedgerLine>>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::STOCK_LEDGER || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        ensure_stream(envelope, StockLedgerId::main().aggregate_id())?;

        match decode::<LedgerEvent>(envelope)? {
            LedgerEvent::StockPosted(e) => {
                for entry in &e.entries {
                    self.book(
                        entry.key(),
                        LedgerSource::Movement {
                            movement_id: e.movement_id,
                            reference: e.reference.clone(),
                        },
                        Some(entry.line_no),
                        entry.delta,
                        e.occurred_at,
                    );
                }
            }
            LedgerEvent::StockReversed(e) => {
                for entry in &e.entries {
                    self.book(
                        entry.key(),
                        LedgerSource::Reversal {
                            movement_id: e.movement_id,
                        },
                        Some(entry.line_no),
                        -entry.delta,
                        e.occurred_at,
                    );
                }
            }
            LedgerEvent::StockAdjusted(e) => {
                self.book(
                    (e.product_id, e.warehouse_id),
                    LedgerSource::Adjustment {
                        adjustment_id: e.adjustment_id,
                        reason: e.reason,
                    },
                    None,
                    e.delta,
                    e.occurred_at,
                );
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear(&self) {
        self.levels.clear();
        self.history.clear();
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::envelope;
    use stockbook_inventory::{LedgerEntry, StockAdjusted, StockPosted, StockReversed};

    fn projection() -> StockLevelsProjection {
        StockLevelsProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new())
    }

    fn entry(line_no: u32, p: ProductId, w: WarehouseId, delta: i64) -> LedgerEntry {
        LedgerEntry {
            line_no,
            product_id: p,
            warehouse_id: w,
            delta,
        }
    }

    #[test]
    fn posting_reversal_and_adjustment_fold_into_levels() {
        let proj = projection();
        let ledger = StockLedgerId::main().aggregate_id();
        let p = ProductId::generate();
        let a = WarehouseId::generate();
        let b = WarehouseId::generate();
        let m = MovementId::generate();

        proj.apply_envelope(&envelope(
            ledger,
            streams::STOCK_LEDGER,
            1,
            &LedgerEvent::StockPosted(StockPosted {
                movement_id: m,
                reference: "IN-20240101-0001".to_string(),
                entries: vec![entry(1, p, a, 10), entry(2, p, a, 5)],
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        assert_eq!(proj.quantity(p, a), 15);

        let t = MovementId::generate();
        let transfer = vec![entry(1, p, a, -4), entry(1, p, b, 4)];
        proj.apply_envelope(&envelope(
            ledger,
            streams::STOCK_LEDGER,
            2,
            &LedgerEvent::StockPosted(StockPosted {
                movement_id: t,
                reference: "TRF-20240101-0001".to_string(),
                entries: transfer.clone(),
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        proj.apply_envelope(&envelope(
            ledger,
            streams::STOCK_LEDGER,
            3,
            &LedgerEvent::StockReversed(StockReversed {
                movement_id: t,
                entries: transfer,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        assert_eq!(proj.quantity(p, a), 15);
        assert_eq!(proj.quantity(p, b), 0);

        proj.apply_envelope(&envelope(
            ledger,
            streams::STOCK_LEDGER,
            4,
            &LedgerEvent::StockAdjusted(StockAdjusted {
                adjustment_id: AdjustmentId::generate(),
                product_id: p,
                warehouse_id: a,
                delta: -3,
                new_level: 12,
                reason: Some("count".to_string()),
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        assert_eq!(proj.quantity(p, a), 12);
        assert_eq!(proj.total_for_product(p), 12);
        let history = proj.history(p, a);
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().map(|l| l.balance_after), Some(12));
        let folded: i64 = history.iter().map(|l| l.delta).sum();
        assert_eq!(folded, proj.quantity(p, a));
    }

    #[test]
    fn only_the_main_ledger_is_accepted() {
        let proj = projection();
        let err = proj
            .apply_envelope(&envelope(
                stockbook_core::AggregateId::new(),
                streams::STOCK_LEDGER,
                1,
                &LedgerEvent::StockPosted(StockPosted {
                    movement_id: MovementId::generate(),
                    reference: "IN-1".to_string(),
                    entries: vec![],
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::StreamMismatch(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: the level is the running sum of its history lines.
            #[test]
            fn level_equals_fold_of_history(deltas in prop::collection::vec(-40i64..40i64, 1..40)) {
                let proj = projection();
                let ledger = StockLedgerId::main().aggregate_id();
                let p = ProductId::generate();
                let w = WarehouseId::generate();

                for (seq, delta) in deltas.iter().enumerate() {
                    let event = LedgerEvent::StockPosted(StockPosted {
                        movement_id: MovementId::generate(),
                        reference: format!("IN-{seq}"),
                        entries: vec![entry(1, p, w, *delta)],
                        occurred_at: Utc::now(),
                    });
                    proj.apply_envelope(&envelope(ledger, streams::STOCK_LEDGER, seq as u64 + 1, &event)).unwrap();
                }

                let history = proj.history(p, w);
                prop_assert_eq!(history.len(), deltas.len());
                prop_assert_eq!(proj.quantity(p, w), deltas.iter().sum::<i64>());
                let mut running = 0i64;
                for line in &history {
                    running += line.delta;
                    prop_assert_eq!(line.balance_after, running);
                }
            }
        }
    }
}
