//! HTTP client for the nilauth authorization server.
//!
//! [`NilauthClient`] mints root tokens, manages subscription payments,
//! and queries revocations over the server's JSON API. Every request
//! carries a single deadline (10 seconds unless overridden); when it
//! expires the in-flight request is cancelled and the call fails with
//! [`NilauthClientError::Unreachable`]. Retries are never automatic, the
//! caller decides.

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::instrument;
use url::Url;

use nuc_rs::types::envelope::{NucEnvelope, NucParseError};
use nuc_rs::types::timestamp::UnixTimestamp;
use nuc_rs::types::token::ProofHash;

use crate::payer::TxHash;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Validity requested for minted root tokens.
const MINTED_TOKEN_TTL_SECS: u64 = 60;

/// Machine-readable error codes returned by nilauth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The subscription cannot be renewed yet.
    CannotRenewYet,
    /// A submitted hash does not match the server's computation.
    HashMismatch,
    /// The payment does not cover the subscription cost.
    InsufficientPayment,
    /// Internal server error.
    Internal,
    /// The public key is malformed.
    InvalidPublicKey,
    /// The request payload could not be decoded.
    MalformedPayload,
    /// The payment transaction could not be decoded.
    MalformedTransaction,
    /// The account has no active subscription.
    NotSubscribed,
    /// The payment transaction was already consumed.
    PaymentAlreadyProcessed,
    /// The payment transaction could not be found on chain.
    TransactionLookup,
    /// The payment transaction is not committed yet.
    TransactionNotCommitted,
    /// The public key is not known to the server.
    UnknownPublicKey,
    /// A code this client version does not know.
    #[serde(other)]
    Unknown,
}

/// Errors that can occur while talking to nilauth.
#[derive(Debug, thiserror::Error)]
pub enum NilauthClientError {
    /// An endpoint URL could not be constructed from the base URL.
    #[error("failed to construct endpoint URL")]
    UrlParse(#[source] url::ParseError),
    /// The server could not be reached before the deadline.
    #[error("nilauth is unreachable: {cause}")]
    Unreachable {
        /// What went wrong, `timed-out` when the deadline expired.
        cause: String,
    },
    /// The server answered with a structured error.
    #[error("server error {status} {code:?}: {message}")]
    Server {
        /// The machine-readable error code.
        code: ErrorCode,
        /// The human-readable message.
        message: String,
        /// The HTTP status.
        status: u16,
    },
    /// The response body is not JSON.
    #[error("response content type is not JSON")]
    InvalidContentType,
    /// The response body failed to decode.
    #[error("malformed response body")]
    MalformedResponse(#[source] reqwest::Error),
    /// A request payload failed to encode.
    #[error("failed to encode request payload")]
    Encode(#[from] serde_json::Error),
    /// The server returned a token that does not parse.
    #[error("server returned a malformed token")]
    MalformedToken(#[source] NucParseError),
}

/// The server's `/about` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct About {
    /// When the server started, RFC 3339.
    pub started: String,
    /// The server's hex-encoded public key, the root issuer of minted
    /// tokens.
    pub public_key: String,
    /// Build identification.
    pub build: BuildInfo,
}

/// Build metadata reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    /// The git commit the server was built from.
    pub commit: String,
    /// The build timestamp.
    pub timestamp: String,
}

/// The subscription state of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// Whether the account holds an active subscription.
    pub subscribed: bool,
    /// Server-defined detail, present for active subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One revoked token, as reported by the lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedToken {
    /// The hash of the revoked token.
    pub token_hash: ProofHash,
    /// When it was revoked.
    pub revoked_at: UnixTimestamp,
}

#[derive(Serialize)]
struct CreateTokenRequest {
    public_key: String,
    signature: String,
    payload: String,
}

#[derive(Deserialize)]
struct CreateTokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct SubscriptionCostResponse {
    cost_unils: u64,
}

#[derive(Serialize)]
struct ValidatePaymentRequest {
    tx_hash: TxHash,
    payload: String,
    public_key: String,
}

#[derive(Serialize)]
struct LookupRevocationsRequest {
    hashes: Vec<ProofHash>,
}

#[derive(Deserialize)]
struct LookupRevocationsResponse {
    revoked: Vec<RevokedToken>,
}

#[derive(Deserialize)]
struct ServerErrorResponse {
    message: String,
    error_code: ErrorCode,
}

/// A client for one nilauth server.
///
/// Cheap to clone; clones share the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use nuc_client::client::NilauthClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = NilauthClient::new("https://nilauth.example/".parse()?);
/// let about = client.about().await?;
/// println!("root issuer key: {}", about.public_key);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NilauthClient {
    base_url: Url,
    client: Client,
    timeout: Duration,
}

impl NilauthClient {
    /// Creates a client for the given base URL with the default timeout.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Returns a clone with a different per-request deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    /// The base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches server identification, including the root issuer key.
    #[instrument(skip_all, err)]
    pub async fn about(&self) -> Result<About, NilauthClientError> {
        let url = self.endpoint("about")?;
        let response = self.send(self.client.get(url)).await?;
        read_json(response).await
    }

    /// Checks server liveness.
    #[instrument(skip_all, err)]
    pub async fn health(&self) -> Result<(), NilauthClientError> {
        let url = self.endpoint("health")?;
        let response = self.send(self.client.get(url)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            read_error(response).await
        }
    }

    /// Mints a root token for the given key.
    ///
    /// The request is self-signed: the payload carries a fresh nonce, the
    /// key requesting the token, and a short expiry, and is signed with
    /// ES256K over its exact JSON bytes.
    #[instrument(skip_all, err)]
    pub async fn request_token(&self, key: &SigningKey) -> Result<NucEnvelope, NilauthClientError> {
        let public_key = compressed_public_key(key);
        let nonce: [u8; 16] = rand::rng().random();
        let expires_at = UnixTimestamp::now() + MINTED_TOKEN_TTL_SECS;
        let payload = serde_json::to_vec(&json!({
            "nonce": hex::encode(nonce),
            "target_public_key": hex::encode(public_key),
            "expires_at": expires_at.as_secs(),
        }))?;
        let signature: Signature = key.sign(&payload);
        let request = CreateTokenRequest {
            public_key: hex::encode(public_key),
            signature: hex::encode(signature.to_bytes()),
            payload: hex::encode(payload),
        };

        let url = self.endpoint("api/v1/nucs/create")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        let response: CreateTokenResponse = read_json(response).await?;
        response
            .token
            .parse()
            .map_err(NilauthClientError::MalformedToken)
    }

    /// Fetches the subscription cost in unils.
    #[instrument(skip_all, err)]
    pub async fn subscription_cost(&self) -> Result<u64, NilauthClientError> {
        let url = self.endpoint("api/v1/payments/cost")?;
        let response = self.send(self.client.get(url)).await?;
        let response: SubscriptionCostResponse = read_json(response).await?;
        Ok(response.cost_unils)
    }

    /// Reports a subscription payment for validation.
    ///
    /// `payload` is the exact resource the payment transaction committed
    /// to; the server recomputes its hash and cross-checks the chain.
    #[instrument(skip_all, err, fields(tx_hash = %tx_hash))]
    pub async fn validate_payment(
        &self,
        tx_hash: &TxHash,
        payload: &[u8],
        public_key: &[u8; 33],
    ) -> Result<(), NilauthClientError> {
        let request = ValidatePaymentRequest {
            tx_hash: *tx_hash,
            payload: hex::encode(payload),
            public_key: hex::encode(public_key),
        };
        let url = self.endpoint("api/v1/payments/validate")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            read_error(response).await
        }
    }

    /// Fetches the subscription state of the calling account.
    #[instrument(skip_all, err)]
    pub async fn subscription_status(&self) -> Result<SubscriptionStatus, NilauthClientError> {
        let url = self.endpoint("api/v1/subscriptions/status")?;
        let response = self.send(self.client.get(url)).await?;
        read_json(response).await
    }

    /// Revokes a token.
    ///
    /// `invocation` must be a `/nuc/revoke` invocation addressed to the
    /// server, carrying the hash of the token to revoke; its serialized
    /// form travels as the bearer credential.
    #[instrument(skip_all, err)]
    pub async fn revoke_token(&self, invocation: &NucEnvelope) -> Result<(), NilauthClientError> {
        let url = self.endpoint("api/v1/revocations/revoke")?;
        let response = self
            .send(self.client.post(url).bearer_auth(invocation.serialize()))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            read_error(response).await
        }
    }

    /// Looks up which of the given token hashes have been revoked.
    #[instrument(skip_all, err, fields(hashes = hashes.len()))]
    pub async fn lookup_revocations(
        &self,
        hashes: &[ProofHash],
    ) -> Result<Vec<RevokedToken>, NilauthClientError> {
        let request = LookupRevocationsRequest {
            hashes: hashes.to_vec(),
        };
        let url = self.endpoint("api/v1/revocations/lookup")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        let response: LookupRevocationsResponse = read_json(response).await?;
        Ok(response.revoked)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NilauthClientError> {
        self.base_url
            .join(path)
            .map_err(NilauthClientError::UrlParse)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, NilauthClientError> {
        request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)
    }
}

fn compressed_public_key(key: &SigningKey) -> [u8; 33] {
    let point = key.verifying_key().to_encoded_point(true);
    point
        .as_bytes()
        .try_into()
        .expect("compressed secp256k1 point must be 33 bytes")
}

fn transport_error(error: reqwest::Error) -> NilauthClientError {
    let cause = if error.is_timeout() {
        "timed-out".into()
    } else {
        error.to_string()
    };
    NilauthClientError::Unreachable { cause }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

async fn read_json<R: DeserializeOwned>(response: Response) -> Result<R, NilauthClientError> {
    if !response.status().is_success() {
        return read_error(response).await;
    }
    if !is_json(&response) {
        return Err(NilauthClientError::InvalidContentType);
    }
    response
        .json()
        .await
        .map_err(NilauthClientError::MalformedResponse)
}

async fn read_error<R>(response: Response) -> Result<R, NilauthClientError> {
    let status = response.status().as_u16();
    if !is_json(&response) {
        return Err(NilauthClientError::InvalidContentType);
    }
    let error: ServerErrorResponse = response
        .json()
        .await
        .map_err(NilauthClientError::MalformedResponse)?;
    Err(NilauthClientError::Server {
        code: error.error_code,
        message: error.message,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::VerifyingKey;

    #[test]
    fn test_error_codes_decode_from_screaming_snake_case() {
        let code: ErrorCode = serde_json::from_str("\"NOT_SUBSCRIBED\"").unwrap();
        assert_eq!(code, ErrorCode::NotSubscribed);
        let code: ErrorCode = serde_json::from_str("\"TRANSACTION_NOT_COMMITTED\"").unwrap();
        assert_eq!(code, ErrorCode::TransactionNotCommitted);
        // forward compatibility
        let code: ErrorCode = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(code, ErrorCode::Unknown);
    }

    #[test]
    fn test_server_error_shape() {
        let error: ServerErrorResponse = serde_json::from_value(serde_json::json!({
            "message": "payment not found",
            "error_code": "TRANSACTION_LOOKUP",
        }))
        .unwrap();
        assert_eq!(error.error_code, ErrorCode::TransactionLookup);
        assert_eq!(error.message, "payment not found");
    }

    #[test]
    fn test_about_shape() {
        let about: About = serde_json::from_value(serde_json::json!({
            "started": "2024-06-01T00:00:00Z",
            "public_key": "02aa",
            "build": {"commit": "deadbeef", "timestamp": "2024-05-31T12:00:00Z"},
        }))
        .unwrap();
        assert_eq!(about.build.commit, "deadbeef");
    }

    #[test]
    fn test_endpoint_joins_relative_paths() {
        let client = NilauthClient::new("https://nilauth.example/".parse().unwrap());
        let url = client.endpoint("api/v1/nucs/create").unwrap();
        assert_eq!(url.as_str(), "https://nilauth.example/api/v1/nucs/create");
    }

    #[test]
    fn test_minted_token_request_is_self_signed() {
        let key = SigningKey::from_slice(&[0x33; 32]).unwrap();
        let payload = serde_json::to_vec(&json!({
            "nonce": "00112233445566778899aabbccddeeff",
            "target_public_key": hex::encode(compressed_public_key(&key)),
            "expires_at": 1_700_000_000u64,
        }))
        .unwrap();
        let signature: Signature = key.sign(&payload);

        let verifying_key = VerifyingKey::from_sec1_bytes(&compressed_public_key(&key)).unwrap();
        verifying_key.verify(&payload, &signature).unwrap();
    }

    #[test]
    fn test_revocation_lookup_shapes() {
        let request = LookupRevocationsRequest {
            hashes: vec![ProofHash([0xab; 32])],
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["hashes"][0], serde_json::json!("ab".repeat(32)));

        let response: LookupRevocationsResponse = serde_json::from_value(serde_json::json!({
            "revoked": [{"token_hash": "ab".repeat(32), "revoked_at": 1700000000}],
        }))
        .unwrap();
        assert_eq!(response.revoked[0].token_hash, ProofHash([0xab; 32]));
        assert_eq!(
            response.revoked[0].revoked_at,
            UnixTimestamp::from_secs(1700000000)
        );
    }
}
