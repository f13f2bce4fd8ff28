//----------------------------------------------   Rail webhooks  ----------------------------------------------------
//
// The rails push settlement batches here. Responses follow the rails' redelivery contract: a 2xx acknowledges the
// push after durable processing, a 400 rejects a batch that does not parse, a 401 rejects a bad signature, and a
// 5xx asks the rail to deliver the same push again later.

use actix_web::{web, HttpRequest, HttpResponse};
use log::*;
use market_payment_engine::{
    rail_types::{BankWebhookItem, CreditWebhookItem, WebhookBatch},
    traits::PaymentGatewayDatabase,
    ReconcilerApi,
};

use crate::{config::WebhookAuthConfig, data_objects::JsonResponse, errors::ServerError, helpers::calculate_hmac, route};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

route!(credit_webhook => Post "/webhook/credit" impl PaymentGatewayDatabase);
pub async fn credit_webhook<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    auth: web::Data<WebhookAuthConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("🪝️ Received credit webhook request: {}", req.uri());
    check_signature(&req, &body, &auth)?;
    let batch = serde_json::from_slice::<WebhookBatch<CreditWebhookItem>>(&body).map_err(|e| {
        warn!("🪝️ Could not parse credit webhook body. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let summary = api.process_credit_batch(&batch).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(summary)))
}

route!(bank_webhook => Post "/webhook/bank" impl PaymentGatewayDatabase);
pub async fn bank_webhook<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconcilerApi<B>>,
    auth: web::Data<WebhookAuthConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("🪝️ Received bank webhook request: {}", req.uri());
    check_signature(&req, &body, &auth)?;
    let batch = serde_json::from_slice::<WebhookBatch<BankWebhookItem>>(&body).map_err(|e| {
        warn!("🪝️ Could not parse bank webhook body. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let summary = api.process_bank_batch(&batch).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(summary)))
}

fn check_signature(req: &HttpRequest, body: &[u8], auth: &WebhookAuthConfig) -> Result<(), ServerError> {
    if !auth.enabled {
        trace!("🪝️ Webhook signature checks are disabled. Allowing request.");
        return Ok(());
    }
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).ok_or_else(|| {
        warn!("🪝️ No signature found in webhook request. Denying access.");
        ServerError::InvalidSignature
    })?;
    let expected = calculate_hmac(auth.secret.reveal(), body);
    if signature == expected.as_str() {
        trace!("🪝️ Webhook signature check ✅️");
        Ok(())
    } else {
        warn!("🪝️ Invalid signature found in webhook request. Denying access.");
        Err(ServerError::InvalidSignature)
    }
}
