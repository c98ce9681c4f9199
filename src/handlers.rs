//! HTTP endpoints of the token gateway.
//!
//! Token operations live under `/api/token`; `/health` and `/` sit at the root. Handlers
//! are thin: they hand the request to [`TokenService`] and turn its result into JSON, with
//! failures rendered by [`TokenError`](crate::error::TokenError)'s `IntoResponse`.

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::chain::EvmChain;
use crate::error::TokenError;
use crate::ledger::Ledger;
use crate::pipeline::TokenService;
use crate::types::{ApproveRequest, TransferFromRequest};

pub fn routes<L>() -> Router<Arc<TokenService<L>>>
where
    L: Ledger + 'static,
{
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health::<L>))
        .nest("/api", token_routes::<L>())
}

fn token_routes<L>() -> Router<Arc<TokenService<L>>>
where
    L: Ledger + 'static,
{
    Router::new()
        .route("/token/info", get(get_token_info::<L>))
        .route("/token/balance/{address}", get(get_balance::<L>))
        .route("/token/transfer-from", post(post_transfer_from::<L>))
        .route("/token/approve", post(post_approve::<L>))
}

/// JSON body extractor whose rejections answer with the token error body instead of
/// axum's plain-text 415/422.
#[derive(Debug)]
pub struct TokenJson<T>(pub T);

impl<S, T> FromRequest<S> for TokenJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = TokenError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            tracing::warn!(%rejection, "request body rejected");
            TokenError::from(rejection)
        })?;
        Ok(Self(value))
    }
}

/// `GET /`: greeting.
#[instrument(skip_all)]
pub async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `GET /health`: liveness plus the chain and signer this process is bound to.
///
/// Does not touch the ledger.
#[instrument(skip_all)]
pub async fn get_health<L: Ledger>(
    State(service): State<Arc<TokenService<L>>>,
    Extension(chain): Extension<EvmChain>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "chain": chain,
        "signer": service.ledger().signer().to_string(),
    }))
}

/// `GET /api/token/info`: name, symbol, decimals and formatted total supply.
#[instrument(skip_all)]
pub async fn get_token_info<L: Ledger>(
    State(service): State<Arc<TokenService<L>>>,
) -> impl IntoResponse {
    match service.token_info().await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// `GET /api/token/balance/{address}`: formatted balance of `address`.
#[instrument(skip_all)]
pub async fn get_balance<L: Ledger>(
    State(service): State<Arc<TokenService<L>>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    match service.balance(&address).await {
        Ok(balance) => (StatusCode::OK, Json(balance)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// `POST /api/token/transfer-from`: move tokens using the allowance granted to the signer.
///
/// A transaction that was mined but reverted still answers 200 with `success: false`.
#[instrument(skip_all)]
pub async fn post_transfer_from<L: Ledger>(
    State(service): State<Arc<TokenService<L>>>,
    TokenJson(body): TokenJson<TransferFromRequest>,
) -> impl IntoResponse {
    match service.transfer_from(&body).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
                "transferFrom failed"
            );
            error.into_response()
        }
    }
}

/// `POST /api/token/approve`: grant `spender` an allowance over the signer's tokens.
#[instrument(skip_all)]
pub async fn post_approve<L: Ledger>(
    State(service): State<Arc<TokenService<L>>>,
    TokenJson(body): TokenJson<ApproveRequest>,
) -> impl IntoResponse {
    match service.approve(&body).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
                "approve failed"
            );
            error.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fake::{FakeLedger, LedgerCall};
    use crate::pipeline::PipelineSettings;
    use crate::types::{ErrorResponse, TokenInfoResponse, TransactionOutcome};
    use alloy::primitives::{Address, U256, address};
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::Value;
    use tower::ServiceExt;

    const SIGNER: Address = address!("0x5165000000000000000000000000000000000001");
    const FROM: Address = address!("0x1111111111111111111111111111111111111111");
    const TO: Address = address!("0x2222222222222222222222222222222222222222");

    fn app(ledger: FakeLedger) -> (Router, Arc<TokenService<FakeLedger>>) {
        let service = Arc::new(TokenService::new(
            Arc::new(ledger),
            PipelineSettings::default(),
        ));
        let router = routes::<FakeLedger>()
            .with_state(Arc::clone(&service))
            .layer(Extension(EvmChain::new(31337)));
        (router, service)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app(FakeLedger::new(SIGNER));
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["chain"], "eip155:31337");
        assert_eq!(body["signer"], SIGNER.to_string());
    }

    #[tokio::test]
    async fn test_token_info() {
        let supply = U256::from(1_000_000u64) * U256::from(10).pow(U256::from(18));
        let (router, _) = app(FakeLedger::new(SIGNER).with_total_supply(supply));
        let response = router
            .oneshot(Request::get("/api/token/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info: TokenInfoResponse = body_json(response).await;
        assert_eq!(info.total_supply, "1000000");
        assert_eq!(info.decimals, 18);
    }

    #[tokio::test]
    async fn test_balance_invalid_address() {
        let (router, service) = app(FakeLedger::new(SIGNER));
        let response = router
            .oneshot(
                Request::get("/api/token/balance/0xnothex")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(response).await;
        assert!(body.error);
        assert_eq!(body.error_code, "INVALID_ADDRESS");
        assert!(service.ledger().calls().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_from_success() {
        let tokens = |n: u64| U256::from(n) * U256::from(10).pow(U256::from(18));
        let ledger = FakeLedger::new(SIGNER)
            .with_balance(FROM, tokens(1000))
            .with_allowance(FROM, SIGNER, tokens(500));
        let (router, _) = app(ledger);

        let response = router
            .oneshot(post_json(
                "/api/token/transfer-from",
                serde_json::json!({ "from": FROM, "to": TO, "amount": "100" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));
        assert_eq!(body["blockNumber"], "101");
    }

    #[tokio::test]
    async fn test_transfer_from_insufficient_allowance() {
        let tokens = |n: u64| U256::from(n) * U256::from(10).pow(U256::from(18));
        let ledger = FakeLedger::new(SIGNER)
            .with_balance(FROM, tokens(1000))
            .with_allowance(FROM, SIGNER, tokens(50));
        let (router, service) = app(ledger);

        let response = router
            .oneshot(post_json(
                "/api/token/transfer-from",
                serde_json::json!({ "from": FROM, "to": TO, "amount": "100" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorResponse = body_json(response).await;
        assert_eq!(body.error_code, "INSUFFICIENT_ALLOWANCE");
        assert_eq!(service.ledger().simulate_calls(), 0);
    }

    #[tokio::test]
    async fn test_reverted_transfer_is_ok_with_success_false() {
        let ledger = FakeLedger::new(SIGNER)
            .with_balance(FROM, U256::from(10))
            .with_allowance(FROM, SIGNER, U256::MAX)
            .with_decimals(0)
            .reverting_on_confirm();
        let (router, _) = app(ledger);

        let response = router
            .oneshot(post_json(
                "/api/token/transfer-from",
                serde_json::json!({ "from": FROM, "to": TO, "amount": "5" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let outcome: TransactionOutcome = body_json(response).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_approve_malformed_amount() {
        let (router, service) = app(FakeLedger::new(SIGNER));

        let response = router
            .oneshot(post_json(
                "/api/token/approve",
                serde_json::json!({ "spender": TO, "amount": "ten" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(response).await;
        assert_eq!(body.error_code, "TRANSACTION_FAILED");
        assert!(service.ledger().calls().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_from_numeric_amount_is_rejected_as_json() {
        let (router, service) = app(FakeLedger::new(SIGNER));

        let response = router
            .oneshot(post_json(
                "/api/token/transfer-from",
                serde_json::json!({ "from": FROM, "to": TO, "amount": 100 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body: ErrorResponse = body_json(response).await;
        assert!(body.error);
        assert_eq!(body.error_code, "TRANSACTION_FAILED");
        assert!(body.message.contains("amount"));
        assert!(service.ledger().calls().is_empty());
    }

    #[tokio::test]
    async fn test_body_rejections_use_error_body() {
        let (router, service) = app(FakeLedger::new(SIGNER));

        let missing_field = post_json(
            "/api/token/approve",
            serde_json::json!({ "amount": "1" }),
        );
        let not_json = post_json("/api/token/transfer-from", Value::Null)
            .map(|_| Body::from("{not json"));
        let no_content_type = Request::post("/api/token/approve")
            .body(Body::from(
                serde_json::json!({ "spender": TO, "amount": "1" }).to_string(),
            ))
            .unwrap();

        for request in [missing_field, not_json, no_content_type] {
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body: ErrorResponse = body_json(response).await;
            assert!(body.error);
            assert_eq!(body.error_code, "TRANSACTION_FAILED");
        }
        assert!(service.ledger().calls().is_empty());
    }

    #[tokio::test]
    async fn test_approve_success() {
        let (router, service) = app(FakeLedger::new(SIGNER).with_decimals(6));

        let response = router
            .oneshot(post_json(
                "/api/token/approve",
                serde_json::json!({ "spender": TO, "amount": "12.25" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            service.ledger().allowance_of(SIGNER, TO),
            U256::from(12_250_000u64)
        );
        assert_eq!(
            service
                .ledger()
                .count_calls(|c| matches!(c, LedgerCall::Submit(_))),
            1
        );
    }
}
