//! Persistence seam for orders, carts, and the transaction ledger
//!
//! The commerce platform owns the actual rows; this trait exposes exactly
//! the reads and writes the payment flow needs. [`CommerceStore::apply_reconciliation`]
//! is the atomic unit: the order patch and the ledger upsert must both
//! commit or both roll back.

use crate::commerce::{Cart, Order, Transaction, TransactionType};
use crate::ledger::LedgerUpsert;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The commerce domain forbids another draft order for this cart
    #[error("cart already has an order in progress")]
    OrderConflict,

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("cart not found: {0}")]
    CartNotFound(Uuid),

    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A reconciliation's effect on the order row
#[derive(Debug, Clone)]
pub struct OrderPatch {
    pub order_id: Uuid,
    pub status: String,
    /// `Some` places the order; `None` leaves `placed_at` untouched
    pub placed_at: Option<DateTime<Utc>>,
}

/// Backing store for the commerce entities this driver touches
#[async_trait]
pub trait CommerceStore: Send + Sync {
    async fn load_order(&self, id: Uuid) -> Result<Order, StoreError>;

    async fn load_cart(&self, id: Uuid) -> Result<Cart, StoreError>;

    /// The cart whose metadata references the given intent id, if any
    async fn find_cart_by_intent(&self, intent_id: &str) -> Result<Option<Cart>, StoreError>;

    /// Merge one key into the cart's metadata without clobbering
    /// unrelated keys
    async fn merge_cart_meta(
        &self,
        cart_id: Uuid,
        key: &str,
        value: Value,
    ) -> Result<Cart, StoreError>;

    /// The cart's existing draft order, or a newly created one with the
    /// given initial status. Fails with [`StoreError::OrderConflict`] when
    /// the commerce domain disallows another draft order.
    async fn order_for_cart(&self, cart: &Cart, initial_status: &str)
    -> Result<Order, StoreError>;

    async fn load_transaction(&self, id: Uuid) -> Result<Transaction, StoreError>;

    /// The non-refund ledger row for (order, reference), if one exists.
    /// Refund rows share the original payment reference and are excluded.
    async fn find_by_reference(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn transactions_for_order(&self, order_id: Uuid)
    -> Result<Vec<Transaction>, StoreError>;

    /// Apply an order patch and an optional ledger upsert as one atomic
    /// unit. `placed_at` is only ever written when currently null.
    async fn apply_reconciliation(
        &self,
        patch: OrderPatch,
        upsert: Option<LedgerUpsert>,
    ) -> Result<(Order, Option<Transaction>), StoreError>;

    /// Append a ledger row unconditionally (refund rows)
    async fn append_transaction(&self, upsert: LedgerUpsert) -> Result<Transaction, StoreError>;
}

/// In-process store, used by the test-suite and by embedders that bring
/// no database of their own
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    carts: HashMap<Uuid, Cart>,
    transactions: Vec<Transaction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_cart(&self, cart: Cart) {
        self.lock().carts.insert(cart.id, cart);
    }

    pub fn seed_order(&self, order: Order) {
        self.lock().orders.insert(order.id, order);
    }

    pub fn seed_transaction(&self, transaction: Transaction) {
        self.lock().transactions.push(transaction);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only happens after a panic in another test thread
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn load_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn load_cart(&self, id: Uuid) -> Result<Cart, StoreError> {
        self.lock()
            .carts
            .get(&id)
            .cloned()
            .ok_or(StoreError::CartNotFound(id))
    }

    async fn find_cart_by_intent(&self, intent_id: &str) -> Result<Option<Cart>, StoreError> {
        Ok(self
            .lock()
            .carts
            .values()
            .find(|c| c.payment_intent_id() == Some(intent_id))
            .cloned())
    }

    async fn merge_cart_meta(
        &self,
        cart_id: Uuid,
        key: &str,
        value: Value,
    ) -> Result<Cart, StoreError> {
        let mut inner = self.lock();
        let cart = inner
            .carts
            .get_mut(&cart_id)
            .ok_or(StoreError::CartNotFound(cart_id))?;
        cart.meta.insert(key.to_string(), value);
        Ok(cart.clone())
    }

    async fn order_for_cart(
        &self,
        cart: &Cart,
        initial_status: &str,
    ) -> Result<Order, StoreError> {
        let mut inner = self.lock();
        let existing = inner
            .carts
            .get(&cart.id)
            .ok_or(StoreError::CartNotFound(cart.id))?
            .order_id;

        if let Some(order_id) = existing {
            return inner
                .orders
                .get(&order_id)
                .cloned()
                .ok_or(StoreError::OrderNotFound(order_id));
        }

        let order = Order::new(initial_status);
        inner.orders.insert(order.id, order.clone());
        if let Some(cart) = inner.carts.get_mut(&cart.id) {
            cart.order_id = Some(order.id);
        }
        Ok(order)
    }

    async fn load_transaction(&self, id: Uuid) -> Result<Transaction, StoreError> {
        self.lock()
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::TransactionNotFound(id))
    }

    async fn find_by_reference(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .find(|t| {
                t.order_id == order_id
                    && t.reference == reference
                    && t.kind != TransactionType::Refund
            })
            .cloned())
    }

    async fn transactions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn apply_reconciliation(
        &self,
        patch: OrderPatch,
        upsert: Option<LedgerUpsert>,
    ) -> Result<(Order, Option<Transaction>), StoreError> {
        let mut inner = self.lock();

        let order = inner
            .orders
            .get_mut(&patch.order_id)
            .ok_or(StoreError::OrderNotFound(patch.order_id))?;
        order.status = patch.status;
        if order.placed_at.is_none() {
            order.placed_at = patch.placed_at;
        }
        let order = order.clone();

        let transaction = match upsert {
            None => None,
            Some(upsert) => {
                let existing = inner.transactions.iter_mut().find(|t| {
                    t.order_id == upsert.order_id
                        && t.reference == upsert.reference
                        && t.kind != TransactionType::Refund
                });
                let row = match existing {
                    Some(row) => {
                        upsert.apply_to(row);
                        row.clone()
                    }
                    None => {
                        let row = upsert.into_transaction(Uuid::new_v4());
                        inner.transactions.push(row.clone());
                        row
                    }
                };
                Some(row)
            }
        };

        Ok((order, transaction))
    }

    async fn append_transaction(&self, upsert: LedgerUpsert) -> Result<Transaction, StoreError> {
        let row = upsert.into_transaction(Uuid::new_v4());
        self.lock().transactions.push(row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Charge, ChargeStatus};
    use serde_json::json;

    fn charge(amount: i64) -> Charge {
        Charge {
            id: "ch_1".to_string(),
            status: ChargeStatus::Succeeded,
            captured: true,
            refunded: false,
            amount,
            amount_captured: amount,
            amount_refunded: 0,
            failure_code: None,
            failure_message: None,
            payment_method_details: None,
            payment_intent: Some("pi_1".to_string()),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_meta_merge_preserves_unrelated_keys() {
        let store = MemoryStore::new();
        let mut cart = Cart::new(1999, "GBP");
        cart.meta.insert("gift_note".to_string(), json!("happy birthday"));
        store.seed_cart(cart.clone());

        let cart = store
            .merge_cart_meta(cart.id, "payment_intent", json!("pi_1"))
            .await
            .unwrap();

        assert_eq!(cart.payment_intent_id(), Some("pi_1"));
        assert_eq!(cart.meta.get("gift_note"), Some(&json!("happy birthday")));
    }

    #[tokio::test]
    async fn test_order_for_cart_reuses_draft_order() {
        let store = MemoryStore::new();
        let cart = Cart::new(1999, "GBP");
        store.seed_cart(cart.clone());

        let first = store.order_for_cart(&cart, "pending-payment").await.unwrap();
        let cart = store.load_cart(cart.id).await.unwrap();
        let second = store.order_for_cart(&cart, "pending-payment").await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_upsert_updates_rather_than_duplicates() {
        let store = MemoryStore::new();
        let order = Order::new("pending-payment");
        store.seed_order(order.clone());

        let patch = |status: &str| OrderPatch {
            order_id: order.id,
            status: status.to_string(),
            placed_at: None,
        };

        let upsert =
            LedgerUpsert::from_charge(order.id, "pi_1", &charge(1999), "stripe", Utc::now());
        store
            .apply_reconciliation(patch("processing"), Some(upsert))
            .await
            .unwrap();

        let upsert =
            LedgerUpsert::from_charge(order.id, "pi_1", &charge(2500), "stripe", Utc::now());
        store
            .apply_reconciliation(patch("paid"), Some(upsert))
            .await
            .unwrap();

        let rows = store.transactions_for_order(order.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 2500);
    }

    #[tokio::test]
    async fn test_placed_at_is_write_once() {
        let store = MemoryStore::new();
        let order = Order::new("pending-payment");
        store.seed_order(order.clone());

        let first = Utc::now();
        store
            .apply_reconciliation(
                OrderPatch {
                    order_id: order.id,
                    status: "paid".to_string(),
                    placed_at: Some(first),
                },
                None,
            )
            .await
            .unwrap();

        let (updated, _) = store
            .apply_reconciliation(
                OrderPatch {
                    order_id: order.id,
                    status: "paid".to_string(),
                    placed_at: Some(Utc::now()),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.placed_at, Some(first));
    }

    #[tokio::test]
    async fn test_refund_rows_excluded_from_reference_lookup() {
        let store = MemoryStore::new();
        let order = Order::new("paid");
        store.seed_order(order.clone());

        let capture =
            LedgerUpsert::from_charge(order.id, "pi_1", &charge(1999), "stripe", Utc::now())
                .into_transaction(Uuid::new_v4());
        store.seed_transaction(capture.clone());

        let refund = crate::types::Refund {
            id: "re_1".to_string(),
            amount: 500,
            status: "succeeded".to_string(),
            payment_intent: Some("pi_1".to_string()),
            charge: None,
            created: Utc::now(),
        };
        store
            .append_transaction(LedgerUpsert::from_refund(&refund, &capture, None))
            .await
            .unwrap();

        let found = store.find_by_reference(order.id, "pi_1").await.unwrap();
        assert_eq!(found.unwrap().id, capture.id);
        assert_eq!(store.transactions_for_order(order.id).await.unwrap().len(), 2);
    }
}
