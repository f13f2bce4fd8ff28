//! The database and collaborator traits for the payment engine.
//!
//! [`PaymentGatewayDatabase`] is the storage backend contract (the pending payment ledger, reservations, fulfilment
//! records, the webhook dedup set and the archive). [`PaymentRail`] and [`ChainIssuer`] are the two external
//! collaborators: the payment provider and the asset-chain service. The engine APIs are generic over all three so
//! that tests can substitute in-process fakes.
mod chain_issuer;
mod data_objects;
mod payment_gateway_database;
mod payment_rail;

pub use chain_issuer::{ChainIssuer, ChainIssuerError, ChainReceipt, OnChainAsset};
pub use data_objects::{InsertHistoryResult, TransitionResult};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
pub use payment_rail::{BankInitRequest, CreditInitRequest, PaymentRail, RailError};
