//! Derivation of transaction-ledger rows from provider objects
//!
//! A [`LedgerUpsert`] is a pure description of a write against the ledger.
//! The store applies it idempotently: at most one non-refund row exists per
//! (order, reference) pair, so replaying the same intent snapshot updates
//! the existing row instead of duplicating it. Refund rows share the
//! original payment reference by design and are always appended.

use crate::commerce::{Transaction, TransactionType};
use crate::types::{Charge, Refund};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

/// A pending write against the transaction ledger
#[derive(Debug, Clone)]
pub struct LedgerUpsert {
    pub order_id: Uuid,
    /// Provider reference; idempotency key together with `order_id`
    pub reference: String,
    pub parent_transaction_id: Option<Uuid>,
    pub success: bool,
    pub kind: TransactionType,
    pub driver: String,
    pub amount: i64,
    pub status: String,
    pub notes: Option<String>,
    pub card_type: Option<String>,
    pub last_four: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub meta: Value,
}

impl LedgerUpsert {
    /// Derive a ledger write from a charge.
    ///
    /// Type precedence: refund if anything was refunded, else capture if the
    /// charge is captured, else intent (authorization under a manual-capture
    /// policy). A charge without card details produces null card fields, not
    /// an error.
    pub fn from_charge(
        order_id: Uuid,
        reference: impl Into<String>,
        charge: &Charge,
        driver: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let kind = if charge.amount_refunded > 0 {
            TransactionType::Refund
        } else if charge.captured {
            TransactionType::Capture
        } else {
            TransactionType::Intent
        };

        let card = charge.card();
        let checks = card.and_then(|c| c.checks.as_ref());

        Self {
            order_id,
            reference: reference.into(),
            parent_transaction_id: None,
            success: charge.is_successful(),
            kind,
            driver: driver.into(),
            amount: charge.amount,
            status: charge.status.as_str().to_string(),
            notes: charge.failure_message.clone(),
            card_type: card.and_then(|c| c.brand.clone()),
            last_four: card.and_then(|c| c.last4.clone()),
            captured_at: (charge.amount_captured > 0).then_some(recorded_at),
            meta: json!({
                "address_line1_check": checks.and_then(|c| c.address_line1_check.clone()),
                "address_postal_code_check": checks.and_then(|c| c.address_postal_code_check.clone()),
                "cvc_check": checks.and_then(|c| c.cvc_check.clone()),
            }),
        }
    }

    /// Build a refund row from a provider refund, carrying the original
    /// row's card metadata forward (refunds do not re-supply card details).
    pub fn from_refund(refund: &Refund, original: &Transaction, notes: Option<String>) -> Self {
        Self {
            order_id: original.order_id,
            reference: refund
                .payment_intent
                .clone()
                .unwrap_or_else(|| original.reference.clone()),
            parent_transaction_id: Some(original.id),
            success: !refund.is_failed(),
            kind: TransactionType::Refund,
            driver: original.driver.clone(),
            amount: refund.amount,
            status: refund.status.clone(),
            notes,
            card_type: original.card_type.clone(),
            last_four: original.last_four.clone(),
            captured_at: None,
            meta: Value::Null,
        }
    }

    /// Link this row to a prior transaction
    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent_transaction_id = Some(parent);
        self
    }

    /// Materialize a new ledger row
    pub fn into_transaction(self, id: Uuid) -> Transaction {
        Transaction {
            id,
            order_id: self.order_id,
            parent_transaction_id: self.parent_transaction_id,
            success: self.success,
            kind: self.kind,
            driver: self.driver,
            amount: self.amount,
            reference: self.reference,
            status: self.status,
            notes: self.notes,
            card_type: self.card_type,
            last_four: self.last_four,
            captured_at: self.captured_at,
            meta: self.meta,
        }
    }

    /// Update an existing row in place, preserving its identity and any
    /// established parent linkage
    pub fn apply_to(&self, row: &mut Transaction) {
        row.success = self.success;
        row.kind = self.kind;
        row.amount = self.amount;
        row.status = self.status.clone();
        row.notes = self.notes.clone();
        row.card_type = self.card_type.clone();
        row.last_four = self.last_four.clone();
        row.captured_at = self.captured_at;
        row.meta = self.meta.clone();
        if row.parent_transaction_id.is_none() && self.parent_transaction_id != Some(row.id) {
            row.parent_transaction_id = self.parent_transaction_id;
        }
    }
}
