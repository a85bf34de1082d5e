//! Balance summaries over a holder's unconsumed payment records.
//!
//! Every holder has an `available` balance (records free for selection)
//! and a `reserved` balance (records soft-locked by in-flight exchanges).

use serde::{Deserialize, Serialize};

/// Balance of one (holder, issued currency) pair, in minor units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Unreserved, selectable.
    pub available: u64,
    /// Soft-locked by a protocol run on this node.
    pub reserved: u64,
}

impl BalanceEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert_eq!(
            BalanceEntry::new(),
            BalanceEntry {
                available: 0,
                reserved: 0,
            }
        );
    }

    #[test]
    fn serializes_both_sides() {
        let entry = BalanceEntry {
            available: 200,
            reserved: 1000,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"available":200,"reserved":1000}"#);
    }
}
