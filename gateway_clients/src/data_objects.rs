//! Wire formats for the providers' REST APIs.
use serde::{Deserialize, Serialize};

//-------------------------------------- payment rail ----------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditInitBody {
    pub order_id: String,
    pub amount: i64,
    pub currency: &'static str,
    pub card_token: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditInitWire {
    pub request_id: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInitBody {
    pub order_id: String,
    pub amount: i64,
    pub currency: &'static str,
    pub payer_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInitWire {
    pub institution_code: String,
    pub customer_number: String,
    pub confirm_number: String,
}

//-------------------------------------- chain service ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBody {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthWire {
    pub access_token: String,
    /// Seconds of validity from issue time
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintBody {
    pub contract_address: String,
    pub token_id: i64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub contract_address: String,
    pub token_id: i64,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptWire {
    pub tx_hash: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetWire {
    pub token_id: i64,
    pub owner: String,
    pub tx_hash: String,
}
