//! Wire types for the payment rails.
//!
//! These are the shapes the external rails deliver to us (webhook batches, initiation responses). The engine never
//! trusts them directly: webhook items are classified into a ternary [`SettlementOutcome`] and applied through the
//! ledger's compare-and-set, and an ambiguous code is never treated as settled.
use chrono::{DateTime, Utc};
use mps_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::OrderId;

//--------------------------------------  SettlementOutcome    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Funds were captured in full.
    Settled,
    /// The rail definitively declined the payment.
    Declined,
    /// The result code is not in either table, or the reported amount disagrees with the ledger. The item is left
    /// pending and will be re-evaluated on the next delivery or poll.
    Ambiguous,
}

//--------------------------------------     WebhookBatch      -------------------------------------------------------
/// A batch of settlement notifications as delivered by a rail. `push_id` is the dedup key: a batch is processed at
/// most once, and replays are acknowledged without effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBatch<T> {
    pub webhook_id: String,
    pub push_id: String,
    pub push_time: DateTime<Utc>,
    pub items: Vec<T>,
}

//--------------------------------------   CreditWebhookItem   -------------------------------------------------------
/// A single settlement notification from the credit rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditWebhookItem {
    pub order_id: OrderId,
    /// The rail-side reference issued by `initiate_credit`
    pub request_id: String,
    pub result_code: String,
    /// Transaction type code. "10" is a capture; other codes cover authorisations, voids and refunds.
    pub tx_type: String,
    pub card_status: String,
    pub amount: Money,
}

impl CreditWebhookItem {
    /// Classifies the rail's result codes. Captures with result code `0000` settle; decline codes occupy the
    /// `2001..=2999` block. Anything else is ambiguous and must be re-polled, never guessed at.
    pub fn outcome(&self) -> SettlementOutcome {
        match (self.result_code.as_str(), self.tx_type.as_str()) {
            ("0000", "10") => SettlementOutcome::Settled,
            (code, _) if is_decline_code(code) => SettlementOutcome::Declined,
            _ => SettlementOutcome::Ambiguous,
        }
    }

    pub fn status_code(&self) -> String {
        format!("{}/{}", self.result_code, self.card_status)
    }
}

fn is_decline_code(code: &str) -> bool {
    matches!(code.parse::<u32>(), Ok(n) if (2001..=2999).contains(&n))
}

//--------------------------------------    BankWebhookItem    -------------------------------------------------------
/// A single settlement notification from the bank virtual-account rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankWebhookItem {
    pub order_id: OrderId,
    pub receipt_date: DateTime<Utc>,
    pub amount: Money,
    /// "Y" once the depositor has paid in full, "N" when the account was closed unpaid
    pub paid_flag: String,
}

impl BankWebhookItem {
    /// Bank settlements only count when the paid flag is set *and* the deposited amount matches the ledger exactly.
    /// A mismatched deposit is ambiguous: the money is somewhere, and an operator must decide what to do with it.
    pub fn outcome(&self, expected: Money) -> SettlementOutcome {
        match self.paid_flag.as_str() {
            "Y" if self.amount == expected => SettlementOutcome::Settled,
            "Y" => SettlementOutcome::Ambiguous,
            "N" => SettlementOutcome::Declined,
            _ => SettlementOutcome::Ambiguous,
        }
    }

    pub fn status_code(&self) -> String {
        format!("bank/{}", self.paid_flag)
    }
}

//--------------------------------------  Initiation responses -------------------------------------------------------
/// Returned by the credit rail when a tokenized-card capture is initiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditInitResponse {
    pub request_id: String,
    pub redirect_url: Option<String>,
}

/// Returned by the bank rail when a virtual account is issued for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInitResponse {
    pub institution_code: String,
    pub customer_number: String,
    pub confirm_number: String,
}
