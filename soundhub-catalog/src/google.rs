use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use thiserror::Error;

/// Verifies identity tokens issued by a third party
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the email address the token was issued for
    async fn verify(&self, token: &str) -> Result<String, IdentityError>;
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity token is invalid")]
    InvalidToken,
    #[error("Identity provider could not be reached: {0}")]
    Unavailable(String),
}

/// Verifies Google ID tokens through the tokeninfo endpoint
pub struct GoogleIdentity {
    client: reqwest::Client,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    /// Sent as the string "true" or "false"
    email_verified: Option<String>,
}

impl GoogleIdentity {
    const TOKENINFO_URL: &'static str = "https://oauth2.googleapis.com/tokeninfo";

    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
        }
    }
}

/// Checks that a token was issued to us and carries an email Google has verified
fn email_from_token_info(info: TokenInfo, client_id: &str) -> Result<String, IdentityError> {
    if info.aud != client_id {
        return Err(IdentityError::InvalidToken);
    }

    if info.email_verified.as_deref() != Some("true") {
        return Err(IdentityError::InvalidToken);
    }

    info.email.ok_or(IdentityError::InvalidToken)
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn verify(&self, token: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .get(Self::TOKENINFO_URL)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if response.status().is_client_error() {
            return Err(IdentityError::InvalidToken);
        }

        if !response.status().is_success() {
            warn!("Google tokeninfo responded with {}", response.status());
            return Err(IdentityError::Unavailable(response.status().to_string()));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        email_from_token_info(info, &self.client_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokens_for_other_clients_are_rejected() {
        let info: TokenInfo = serde_json::from_str(
            r#"{"aud": "someone-else", "email": "bob@example.com", "exp": "1"}"#,
        )
        .unwrap();

        assert!(matches!(
            email_from_token_info(info, "soundhub"),
            Err(IdentityError::InvalidToken)
        ));
    }

    #[test]
    fn unverified_emails_are_rejected() {
        for verified in [r#""false""#, "null"] {
            let info: TokenInfo = serde_json::from_str(&format!(
                r#"{{"aud": "soundhub", "email": "victim@example.com", "email_verified": {}}}"#,
                verified
            ))
            .unwrap();

            assert!(matches!(
                email_from_token_info(info, "soundhub"),
                Err(IdentityError::InvalidToken)
            ));
        }

        let missing: TokenInfo =
            serde_json::from_str(r#"{"aud": "soundhub", "email": "victim@example.com"}"#)
                .unwrap();
        assert!(email_from_token_info(missing, "soundhub").is_err());
    }

    #[test]
    fn email_comes_from_the_token() {
        let info: TokenInfo = serde_json::from_str(
            r#"{"aud": "soundhub", "email": "bob@example.com", "email_verified": "true"}"#,
        )
        .unwrap();

        assert_eq!(
            email_from_token_info(info, "soundhub").unwrap(),
            "bob@example.com"
        );
    }

    #[test]
    fn tokens_without_email_are_rejected() {
        let info: TokenInfo =
            serde_json::from_str(r#"{"aud": "soundhub", "email_verified": "true"}"#).unwrap();

        assert!(email_from_token_info(info, "soundhub").is_err());
    }
}
