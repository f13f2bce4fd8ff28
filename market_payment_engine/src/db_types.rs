use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use mps_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------     PaymentStatus     -------------------------------------------------------
/// The status of a pending payment ledger row. `Pending` is the only non-terminal state. Terminal states never
/// revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The checkout has been initiated and we are waiting on the rail to report settlement.
    Pending,
    /// The rail reported that funds were captured in full.
    Success,
    /// The rail reported a decline, or the rail call itself failed at checkout time.
    Failed,
    /// The order was cancelled, either by the expiry sweep or by a support action.
    Canceled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Success => write!(f, "Success"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Canceled => write!(f, "Canceled"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------         Rail          -------------------------------------------------------
/// The payment rail that an order attempt was initiated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Rail {
    Credit,
    Bank,
}

impl Display for Rail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rail::Credit => write!(f, "Credit"),
            Rail::Bank => write!(f, "Bank"),
        }
    }
}

impl FromStr for Rail {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Credit" => Ok(Self::Credit),
            "Bank" => Ok(Self::Bank),
            s => Err(ConversionError(format!("Invalid rail: {s}"))),
        }
    }
}

impl From<String> for Rail {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid rail: {value}. But this conversion cannot fail. Defaulting to Credit");
            Rail::Credit
        })
    }
}

//--------------------------------------     BillingInfo       -------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

//--------------------------------------    PendingPayment     -------------------------------------------------------
/// The single source of truth for an order between "checkout initiated" and "settlement known". Exactly one row
/// exists per order id, and rows are never deleted; Failed and Canceled rows are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingPayment {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: i64,
    pub product_group_id: i64,
    pub product_id: i64,
    /// The number of units purchased in this attempt
    pub amount: i64,
    /// The total charged price. Always the authoritative unit price × amount
    pub price: Money,
    pub rail: Rail,
    /// Token ids held for this order at checkout time. Empty for physical products.
    pub reserved_token_ids: Json<Vec<i64>>,
    pub email: String,
    pub billing_info: Json<BillingInfo>,
    pub status: PaymentStatus,
    /// Audit note recorded by the transition that resolved this row
    pub status_reason: Option<String>,
    pub affiliate_ref: Option<String>,
    /// Absolute deadline after which the expiry sweep may cancel this attempt
    pub term_window: DateTime<Utc>,
    /// A rail-side reference for this attempt: the request id (credit) or the confirm number (bank)
    pub rail_ref: Option<String>,
    /// Set once the reservation behind this row has been returned to the pool. Guards the release against repeats.
    pub reservation_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewPendingPayment   -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPendingPayment {
    pub order_id: OrderId,
    pub user_id: i64,
    pub product_group_id: i64,
    pub product_id: i64,
    pub amount: i64,
    pub price: Money,
    pub rail: Rail,
    pub reserved_token_ids: Vec<i64>,
    pub email: String,
    pub billing_info: BillingInfo,
    pub affiliate_ref: Option<String>,
    pub term_window: DateTime<Utc>,
}

impl NewPendingPayment {
    pub fn new(order_id: OrderId, user_id: i64, product: &Product, amount: i64, rail: Rail) -> Self {
        Self {
            order_id,
            user_id,
            product_group_id: product.product_group_id,
            product_id: product.id,
            amount,
            price: product.unit_price * amount,
            rail,
            reserved_token_ids: Vec::new(),
            email: String::new(),
            billing_info: BillingInfo::default(),
            affiliate_ref: None,
            term_window: Utc::now(),
        }
    }

    pub fn with_contact(mut self, email: &str, billing_info: BillingInfo) -> Self {
        self.email = email.to_string();
        self.billing_info = billing_info;
        self
    }

    pub fn with_term_window(mut self, deadline: DateTime<Utc>) -> Self {
        self.term_window = deadline;
        self
    }

    pub fn with_affiliate_ref(mut self, affiliate_ref: &str) -> Self {
        self.affiliate_ref = Some(affiliate_ref.to_string());
        self
    }
}

//--------------------------------------       Product         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ProductKind {
    /// Fulfilled by shipping a physical unit. The lifecycle ends at `Purchased`.
    Physical,
    /// Fulfilled by minting and later transferring an on-chain certificate.
    Asset,
}

impl Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductKind::Physical => write!(f, "Physical"),
            ProductKind::Asset => write!(f, "Asset"),
        }
    }
}

impl FromStr for ProductKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Physical" => Ok(Self::Physical),
            "Asset" => Ok(Self::Asset),
            s => Err(ConversionError(format!("Invalid product kind: {s}"))),
        }
    }
}

impl From<String> for ProductKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid product kind: {value}. But this conversion cannot fail. Defaulting to Physical");
            ProductKind::Physical
        })
    }
}

/// Catalogue entry holding the authoritative unit price and the remaining stock counter. Stock is decremented at
/// reservation time, not at settlement, so the counter is the contended shared resource across checkouts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub product_group_id: i64,
    pub town_id: i64,
    pub name: String,
    pub kind: ProductKind,
    pub unit_price: Money,
    pub stock: i64,
    pub chain_id: Option<i64>,
    pub contract_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_asset_backed(&self) -> bool {
        self.kind == ProductKind::Asset
    }
}

//--------------------------------------  OwnedProductStatus   -------------------------------------------------------
/// Lifecycle of a fulfilled unit. Units only move forward; `Canceled` is reachable from `PendingPayment` or
/// `Purchased`, never from `NftMinted` or `NftTransferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OwnedProductStatus {
    PendingPayment,
    Purchased,
    NftMinted,
    NftTransferred,
    Canceled,
}

impl Display for OwnedProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnedProductStatus::PendingPayment => write!(f, "PendingPayment"),
            OwnedProductStatus::Purchased => write!(f, "Purchased"),
            OwnedProductStatus::NftMinted => write!(f, "NftMinted"),
            OwnedProductStatus::NftTransferred => write!(f, "NftTransferred"),
            OwnedProductStatus::Canceled => write!(f, "Canceled"),
        }
    }
}

impl FromStr for OwnedProductStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PendingPayment" => Ok(Self::PendingPayment),
            "Purchased" => Ok(Self::Purchased),
            "NftMinted" => Ok(Self::NftMinted),
            "NftTransferred" => Ok(Self::NftTransferred),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid owned product status: {s}"))),
        }
    }
}

impl From<String> for OwnedProductStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid owned product status: {value}. But this conversion cannot fail. Defaulting to Canceled");
            OwnedProductStatus::Canceled
        })
    }
}

//--------------------------------------     OwnedProduct      -------------------------------------------------------
/// A single purchased unit. Created at checkout time in `PendingPayment` status with its reserved token id (asset
/// products), and advanced by the reconciler and the issuance orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OwnedProduct {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: i64,
    pub user_id: i64,
    pub token_id: Option<i64>,
    pub status: OwnedProductStatus,
    /// Number of failed mint submissions. Non-zero with status `Purchased` marks an order awaiting manual
    /// intervention.
    pub mint_attempts: i64,
    pub issuance_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OwnedProduct {
    pub fn needs_intervention(&self) -> bool {
        self.status == OwnedProductStatus::Purchased && self.mint_attempts > 0
    }
}

//--------------------------------------    PaymentHistory     -------------------------------------------------------
/// Append-only archive of resolved payment attempts. Written exactly once per order id, after the ledger CAS has
/// succeeded. Not authoritative for in-flight state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentHistory {
    pub id: i64,
    pub order_id: OrderId,
    pub is_dummy: bool,
    pub user_id: i64,
    pub product_id: i64,
    pub town_id: i64,
    pub amount: i64,
    pub price: Money,
    pub term_window: DateTime<Utc>,
    pub rail: Rail,
    pub status_code: String,
    pub raw_result: Json<serde_json::Value>,
    pub email: String,
    pub billing_info: Json<BillingInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentHistory {
    pub order_id: OrderId,
    pub is_dummy: bool,
    pub user_id: i64,
    pub product_id: i64,
    pub town_id: i64,
    pub amount: i64,
    pub price: Money,
    pub term_window: DateTime<Utc>,
    pub rail: Rail,
    pub status_code: String,
    pub raw_result: serde_json::Value,
    pub email: String,
    pub billing_info: BillingInfo,
}

impl NewPaymentHistory {
    /// Builds an archive record from the resolved ledger row. `town_id` comes from the product, since the ledger row
    /// does not carry it.
    pub fn from_resolved(payment: &PendingPayment, town_id: i64, status_code: &str, raw: serde_json::Value) -> Self {
        Self {
            order_id: payment.order_id.clone(),
            is_dummy: false,
            user_id: payment.user_id,
            product_id: payment.product_id,
            town_id,
            amount: payment.amount,
            price: payment.price,
            term_window: payment.term_window,
            rail: payment.rail,
            status_code: status_code.to_string(),
            raw_result: raw,
            email: payment.email.clone(),
            billing_info: payment.billing_info.0.clone(),
        }
    }
}

//--------------------------------------        Asset          -------------------------------------------------------
/// Local record of an on-chain asset. `owner` is a back-reference populated only after a confirmed chain
/// transaction; the engine never owns blockchain state, it only requests and observes it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: i64,
    pub chain_id: i64,
    pub contract_address: String,
    pub token_id: i64,
    pub owner: Option<String>,
    pub attributes: Json<serde_json::Value>,
    pub mint_tx_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub chain_id: i64,
    pub contract_address: String,
    pub token_id: i64,
    pub attributes: serde_json::Value,
    pub mint_tx_hash: String,
}

//--------------------------------------    MerchantConfig     -------------------------------------------------------
/// Per-town rail credentials. Read-only reference data as far as this subsystem is concerned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MerchantConfig {
    pub town_id: i64,
    pub merchant_cc_id: String,
    pub merchant_secret_key: String,
    pub token_api_key: String,
}

//---------------------------------- ReconciliationException ---------------------------------------------------------
/// A webhook item that could not be applied (unknown order id, unparseable payload, ambiguous result code). Held in
/// an operator queue for manual follow-up rather than failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReconciliationException {
    pub id: i64,
    pub rail: Rail,
    pub push_id: String,
    pub order_id: Option<OrderId>,
    pub reason: String,
    pub payload: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
