//! Mapping of provider intent statuses onto internal order statuses

use crate::types::IntentStatus;
use std::collections::HashMap;

/// Operator-configurable status mapping with raw passthrough for
/// anything unmapped
#[derive(Debug, Clone, Default)]
pub struct StatusMapping {
    table: HashMap<String, String>,
}

/// Result of resolving a provider status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedStatus {
    /// Internal order status to apply
    pub status: String,
    /// Whether this status may place the order
    pub should_place: bool,
}

impl StatusMapping {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    /// Whether the operator configured an override for this provider status
    pub fn contains(&self, provider_status: &str) -> bool {
        self.table.contains_key(provider_status)
    }

    /// Resolve a provider status. Unmapped statuses pass through unchanged;
    /// only terminal success allows placement.
    pub fn resolve(&self, status: &IntentStatus) -> MappedStatus {
        let raw = status.as_str();
        MappedStatus {
            status: self
                .table
                .get(raw)
                .cloned()
                .unwrap_or_else(|| raw.to_string()),
            should_place: status.is_terminal_success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> StatusMapping {
        StatusMapping::new(HashMap::from([
            ("succeeded".to_string(), "paid".to_string()),
            ("processing".to_string(), "awaiting-payment".to_string()),
        ]))
    }

    #[test]
    fn test_configured_statuses_resolve_to_mapped_value() {
        let mapping = mapping();
        assert_eq!(
            mapping.resolve(&IntentStatus::Succeeded).status,
            "paid"
        );
        assert_eq!(
            mapping.resolve(&IntentStatus::Processing).status,
            "awaiting-payment"
        );
    }

    #[test]
    fn test_unmapped_status_passes_through() {
        let mapping = mapping();
        assert_eq!(
            mapping.resolve(&IntentStatus::RequiresCapture).status,
            "requires_capture"
        );
        assert_eq!(
            mapping
                .resolve(&IntentStatus::Other("requires_source".to_string()))
                .status,
            "requires_source"
        );
    }

    #[test]
    fn test_only_succeeded_places() {
        let mapping = mapping();
        assert!(mapping.resolve(&IntentStatus::Succeeded).should_place);

        for status in [
            IntentStatus::RequiresPaymentMethod,
            IntentStatus::RequiresCapture,
            IntentStatus::Processing,
            IntentStatus::Canceled,
            IntentStatus::Other("weird".to_string()),
        ] {
            assert!(!mapping.resolve(&status).should_place, "{status:?}");
        }
    }
}
