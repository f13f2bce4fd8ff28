//! Small utility functions shared across the engine.

use chrono::Utc;
use rand::Rng;

use crate::db_types::OrderId;

/// Generates a fresh order id: a date prefix for operator ergonomics plus 64 random bits for uniqueness.
pub fn generate_order_id() -> OrderId {
    let nonce: u64 = rand::thread_rng().gen();
    OrderId(format!("ord-{}-{nonce:016x}", Utc::now().format("%Y%m%d")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_ids_are_unique() {
        let a = generate_order_id();
        let b = generate_order_id();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ord-"));
    }
}
