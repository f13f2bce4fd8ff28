use std::fmt::Display;

use market_payment_engine::{
    db_types::{BillingInfo, OrderId},
    order_objects::{CheckoutRequest, PaymentInstrument},
};
use mps_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// A storefront checkout against the credit-card rail. `expected_price` is the total the client displayed and is
/// verified against the catalogue before anything is reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCheckoutPayload {
    pub user_id: i64,
    pub product_id: i64,
    pub amount: i64,
    pub expected_price: Money,
    pub email: String,
    pub billing_info: BillingInfo,
    #[serde(default)]
    pub affiliate_ref: Option<String>,
    pub card_token: String,
}

impl From<CreditCheckoutPayload> for CheckoutRequest {
    fn from(p: CreditCheckoutPayload) -> Self {
        CheckoutRequest {
            order_id: None,
            user_id: p.user_id,
            product_id: p.product_id,
            amount: p.amount,
            expected_price: p.expected_price,
            email: p.email,
            billing_info: p.billing_info,
            affiliate_ref: p.affiliate_ref,
            instrument: PaymentInstrument::Credit { card_token: p.card_token },
        }
    }
}

/// A storefront checkout against the virtual-account rail. The depositor name is what the bank matches incoming
/// transfers on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankCheckoutPayload {
    pub user_id: i64,
    pub product_id: i64,
    pub amount: i64,
    pub expected_price: Money,
    pub email: String,
    pub billing_info: BillingInfo,
    #[serde(default)]
    pub affiliate_ref: Option<String>,
    pub payer_name: String,
}

impl From<BankCheckoutPayload> for CheckoutRequest {
    fn from(p: BankCheckoutPayload) -> Self {
        CheckoutRequest {
            order_id: None,
            user_id: p.user_id,
            product_id: p.product_id,
            amount: p.amount,
            expected_price: p.expected_price,
            email: p.email,
            billing_info: p.billing_info,
            affiliate_ref: p.affiliate_ref,
            instrument: PaymentInstrument::Bank { payer_name: p.payer_name },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderParams {
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintOrderParams {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOrderParams {
    pub order_id: OrderId,
    pub wallet_address: String,
}
