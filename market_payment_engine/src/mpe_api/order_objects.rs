use std::fmt::Display;

use mps_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{BillingInfo, OrderId, OwnedProduct, PaymentHistory, PendingPayment, Rail},
    rail_types::{BankInitResponse, CreditInitResponse},
};

//-------------------------------------- PaymentInstrument -----------------------------------------------------------
/// How the buyer wants to pay. Carries the rail-specific piece of information the initiation call needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentInstrument {
    /// Tokenized card capture. The token comes from the rail's client-side tokenizer and is short-lived.
    Credit { card_token: String },
    /// Virtual bank account. The payer name is printed on the account the rail issues.
    Bank { payer_name: String },
}

impl PaymentInstrument {
    pub fn rail(&self) -> Rail {
        match self {
            PaymentInstrument::Credit { .. } => Rail::Credit,
            PaymentInstrument::Bank { .. } => Rail::Bank,
        }
    }
}

//-------------------------------------- CheckoutRequest -------------------------------------------------------------
/// A new order attempt as submitted by the storefront. `expected_price` is the total the client displayed; checkout
/// verifies it against the catalogue and refuses the order on a mismatch rather than charging a client-supplied
/// figure.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Usually `None`; a fresh id is generated. Tests and replicated environments may pin one.
    pub order_id: Option<OrderId>,
    pub user_id: i64,
    pub product_id: i64,
    pub amount: i64,
    pub expected_price: Money,
    pub email: String,
    pub billing_info: BillingInfo,
    pub affiliate_ref: Option<String>,
    pub instrument: PaymentInstrument,
}

//-------------------------------------- RailReceipt -----------------------------------------------------------------
/// What the rail handed back at initiation time. The embedded reference is what later webhook items and status
/// queries correlate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RailReceipt {
    Credit(CreditInitResponse),
    Bank(BankInitResponse),
}

impl RailReceipt {
    pub fn rail_ref(&self) -> &str {
        match self {
            RailReceipt::Credit(r) => &r.request_id,
            RailReceipt::Bank(r) => &r.confirm_number,
        }
    }
}

/// The result of a successful checkout: the durable ledger row plus the rail's initiation response.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub payment: PendingPayment,
    pub rail: RailReceipt,
}

//-------------------------------------- BatchSummary ----------------------------------------------------------------
/// Per-batch reconciliation tally. A replayed push returns `replay = true` with every counter at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub settled: usize,
    pub declined: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub ambiguous: usize,
    pub replay: bool,
}

impl BatchSummary {
    pub fn replay() -> Self {
        Self { replay: true, ..Self::default() }
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.replay {
            return write!(f, "replayed push, no effect");
        }
        write!(
            f,
            "{} settled, {} declined, {} duplicates, {} unknown, {} ambiguous",
            self.settled, self.declined, self.duplicates, self.unknown, self.ambiguous
        )
    }
}

//-------------------------------------- OrderStatusResult -----------------------------------------------------------
/// Everything a status poll can say about an order, assembled from the ledger (authoritative), the unit records and
/// the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResult {
    pub payment: PendingPayment,
    pub units: Vec<OwnedProduct>,
    pub history: Option<PaymentHistory>,
}
