//! Client for the hosted auth provider's REST API

use serde::Deserialize;

use crate::config::AuthConfig;
use crate::error::AppError;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(alias = "msg", alias = "error_description", alias = "error")]
    message: Option<String>,
}

/// Auth provider client
#[derive(Clone)]
pub struct AuthProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl AuthProvider {
    pub fn new(http: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            http,
            base_url: config.provider_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Resolve a bearer token to the user it was issued for
    ///
    /// # Errors
    /// - `Unauthorized` if the provider rejects the token or names no user
    /// - `Upstream` for any other provider failure
    pub async fn get_user(&self, token: &str) -> Result<AuthUser, AppError> {
        let response = self
            .http
            .get(self.endpoint("user"))
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            tracing::warn!(%status, "Auth provider user lookup failed");
            return Err(AppError::Upstream(format!(
                "auth provider returned status {status}"
            )));
        }

        let body: UserResponse = response.json().await?;
        let id = body
            .id
            .filter(|id| !id.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            id,
            email: body.email,
        })
    }

    /// Delete a user with the service-role key
    ///
    /// # Errors
    /// `Upstream` carrying the provider's message when the call is refused
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("admin/users/{user_id}")))
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ProviderError>()
            .await
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("auth provider returned status {status}"));
        tracing::warn!(%status, user_id, %message, "Auth provider refused user deletion");

        Err(AppError::Upstream(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let mut config = crate::config::tests::valid_config().auth;
        config.provider_url = "https://project.supabase.co/".to_string();
        let provider = AuthProvider::new(reqwest::Client::new(), &config);

        assert_eq!(
            provider.endpoint("admin/users/abc"),
            "https://project.supabase.co/auth/v1/admin/users/abc"
        );
    }

    #[test]
    fn provider_error_reads_any_message_field() {
        for body in [
            r#"{"msg":"User not found"}"#,
            r#"{"message":"User not found"}"#,
            r#"{"error_description":"User not found"}"#,
        ] {
            let parsed: ProviderError = serde_json::from_str(body).unwrap();
            assert_eq!(parsed.message.as_deref(), Some("User not found"));
        }
    }
}
