use crate::circuit_breaker::{create_auth_circuit_breaker, AuthCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::SessionIdentity;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for the hosted identity provider.
///
/// Resolves a bearer ID token to the authenticated identity behind it.
/// The core never mutates accounts; this is a read-only lookup.
#[derive(Clone)]
pub struct AuthService {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: AuthCircuitBreaker,
}

#[derive(Debug, Deserialize)]
struct AccountLookupResponse {
    #[serde(default)]
    users: Vec<AccountLookupUser>,
}

#[derive(Debug, Deserialize)]
struct AccountLookupUser {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

impl AuthService {
    /// Creates a new `AuthService`.
    ///
    /// # Arguments
    ///
    /// * `config` - Application configuration carrying the provider base URL and API key.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create auth client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.auth_base_url.clone(),
            api_key: config.auth_api_key.clone(),
            breaker: create_auth_circuit_breaker(),
        })
    }

    /// Resolves an ID token to the identity it belongs to.
    ///
    /// Returns `Ok(None)` when the token is invalid or expired (an
    /// anonymous session, not a server fault). Provider outages surface
    /// as `ExternalApiError` and feed the circuit breaker.
    pub async fn verify_token(&self, id_token: &str) -> Result<Option<SessionIdentity>, AppError> {
        use failsafe::futures::CircuitBreaker as _;

        // Build URL with proper parameter encoding; the key lives in the
        // query string per the provider's lookup contract.
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/accounts:lookup", self.base_url),
            &[("key", self.api_key.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build lookup URL: {}", e)))?;

        // Redact the key from logs to prevent credential exposure
        tracing::debug!(
            "Identity lookup: {}/v1/accounts:lookup?key=[REDACTED]",
            self.base_url
        );

        // Transport failures and 5xx responses count as breaker failures;
        // a rejected token is a normal outcome and must not trip it.
        let lookup_attempt = async {
            let response = self
                .client
                .post(url)
                .json(&json!({ "idToken": id_token }))
                .send()
                .await
                .map_err(|e| format!("Identity provider request failed: {}", e))?;

            let status = response.status();
            if status.is_server_error() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                tracing::error!("Identity provider returned error {}: {}", status, error_text);
                return Err(format!(
                    "Identity provider returned status {}: {}",
                    status, error_text
                ));
            }
            Ok(response)
        };

        let response = self.breaker.call(lookup_attempt).await.map_err(|e| match e {
            failsafe::Error::Inner(msg) => AppError::ExternalApiError(msg),
            failsafe::Error::Rejected => AppError::ExternalApiError(
                "Identity provider circuit open, failing fast".to_string(),
            ),
        })?;

        let status = response.status();
        if status.is_client_error() {
            tracing::warn!("Identity provider rejected token ({})", status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Identity provider returned unexpected status {}",
                status
            )));
        }

        let lookup: AccountLookupResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse identity response: {}", e))
        })?;

        Ok(lookup.users.into_iter().next().map(|user| SessionIdentity {
            user_id: user.local_id,
            display_name: user.display_name.filter(|name| !name.is_empty()),
        }))
    }
}
