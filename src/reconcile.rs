//! Order reconciliation against a payment-intent snapshot
//!
//! Takes an external intent object and deterministically produces the
//! order status/placement transition and the matching ledger write, inside
//! one atomic store application. Placement is terminal: once an order has
//! `placed_at` set, reconciliation is a strict no-op.

use crate::commerce::{Order, TransactionType};
use crate::error::PaymentResult;
use crate::ledger::LedgerUpsert;
use crate::status::StatusMapping;
use crate::store::{CommerceStore, OrderPatch};
use crate::types::PaymentIntent;
use chrono::Utc;
use uuid::Uuid;

/// Reconciles one order against one intent snapshot
#[derive(Debug)]
pub struct Reconciler<'a, S: ?Sized> {
    store: &'a S,
    mapping: &'a StatusMapping,
    driver: &'a str,
    placed_status: &'a str,
    failed_status: &'a str,
}

impl<'a, S: CommerceStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, mapping: &'a StatusMapping) -> Self {
        Self {
            store,
            mapping,
            driver: "stripe",
            placed_status: "paid",
            failed_status: "failed",
        }
    }

    /// Override the placed/failed order status labels
    pub fn with_labels(mut self, placed: &'a str, failed: &'a str) -> Self {
        self.placed_status = placed;
        self.failed_status = failed;
        self
    }

    /// Record ledger rows under a different driver name
    pub fn with_driver(mut self, driver: &'a str) -> Self {
        self.driver = driver;
        self
    }

    /// Reconcile the order against the intent snapshot
    pub async fn reconcile(&self, order: Order, intent: &PaymentIntent) -> PaymentResult<Order> {
        self.reconcile_with_parent(order, intent, None).await
    }

    /// Reconcile, linking a newly created capture row to a prior
    /// transaction
    pub async fn reconcile_with_parent(
        &self,
        order: Order,
        intent: &PaymentIntent,
        parent: Option<Uuid>,
    ) -> PaymentResult<Order> {
        if order.is_placed() {
            // Terminal. A duplicate webhook or retried authorize must not
            // touch the order, and must not re-record a stale intent
            // snapshot against a finished order either.
            tracing::debug!(order = %order.id, intent = %intent.id, "order already placed, skipping");
            return Ok(order);
        }

        let mapped = self.mapping.resolve(&intent.status);

        let Some(charge) = intent.charges.authoritative() else {
            // Nothing to record yet (e.g. the intent still requires a
            // payment method); only the order status moves.
            let (order, _) = self
                .store
                .apply_reconciliation(
                    OrderPatch {
                        order_id: order.id,
                        status: mapped.status,
                        placed_at: None,
                    },
                    None,
                )
                .await?;
            return Ok(order);
        };

        let successful = charge.is_successful();
        let place = mapped.should_place && successful;

        let status = if !successful {
            self.failed_status.to_string()
        } else if place && !self.mapping.contains(intent.status.as_str()) {
            self.placed_status.to_string()
        } else {
            mapped.status
        };

        let mut upsert =
            LedgerUpsert::from_charge(order.id, &intent.id, charge, self.driver, Utc::now());
        match parent {
            Some(id) => upsert = upsert.with_parent(id),
            None if upsert.kind == TransactionType::Capture => {
                // A capture arriving under a new reference chains to the
                // order's earlier authorization row.
                let rows = self.store.transactions_for_order(order.id).await?;
                if let Some(row) = rows
                    .iter()
                    .find(|t| t.kind == TransactionType::Intent && t.reference != intent.id)
                {
                    upsert = upsert.with_parent(row.id);
                }
            }
            None => {}
        }

        let (order, _) = self
            .store
            .apply_reconciliation(
                OrderPatch {
                    order_id: order.id,
                    status,
                    // Provider-side charge creation time, so audit trails
                    // keep the provider's event ordering.
                    placed_at: place.then(|| charge.created),
                },
                Some(upsert),
            )
            .await?;

        Ok(order)
    }
}
