use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::env_nonempty;
use crate::error::{InvoiceError, Result};

pub const EMAIL_VAR: &str = "OPENAI_EMAIL";
pub const PASSWORD_VAR: &str = "OPENAI_PASSWORD";

const SECRET_NAME_VAR: &str = "AWS_SECRET_NAME";
const REGION_VAR: &str = "AWS_REGION";
const DEFAULT_SECRET_NAME: &str = "catholically/openai";
const DEFAULT_REGION: &str = "eu-south-1";

/// Portal login identity. Matches the JSON shape stored in Secrets Manager.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &redact(&self.email))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Redacted form of the login identity, safe for diagnostics.
pub fn redact(email: &str) -> String {
    let prefix: String = email.chars().take(3).collect();
    format!("{prefix}***")
}

/// Resolve credentials: environment variables first, then AWS Secrets
/// Manager. When the env pair is populated the secret store is never
/// consulted. Secret store errors fall through to the final
/// configuration error rather than aborting on their own.
pub async fn resolve() -> Result<Credentials> {
    if let Some(creds) = from_env_pair(EMAIL_VAR, PASSWORD_VAR) {
        info!(
            target = "invoice",
            email = %redact(&creds.email),
            "using credentials from environment variables"
        );
        return Ok(creds);
    }

    let secret_name =
        env_nonempty(SECRET_NAME_VAR).unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string());
    let region = env_nonempty(REGION_VAR).unwrap_or_else(|| DEFAULT_REGION.to_string());

    match from_secrets_manager(&secret_name, &region).await {
        Ok(creds) => {
            info!(
                target = "invoice",
                secret = %secret_name,
                email = %redact(&creds.email),
                "using credentials from AWS Secrets Manager"
            );
            Ok(creds)
        }
        Err(err) => {
            warn!(target = "invoice", error = %format!("{err:#}"), "AWS Secrets Manager error");
            Err(InvoiceError::Config(format!(
                "no credentials found: set {EMAIL_VAR} and {PASSWORD_VAR}, \
                 or store a JSON secret named {secret_name} in AWS Secrets Manager"
            )))
        }
    }
}

fn from_env_pair(email_var: &str, password_var: &str) -> Option<Credentials> {
    let email = env_nonempty(email_var)?;
    let password = env_nonempty(password_var)?;
    Some(Credentials { email, password })
}

async fn from_secrets_manager(secret_name: &str, region: &str) -> anyhow::Result<Credentials> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let client = aws_sdk_secretsmanager::Client::new(&config);

    let output = client
        .get_secret_value()
        .secret_id(secret_name)
        .send()
        .await
        .with_context(|| format!("failed to read secret {secret_name}"))?;
    let payload = output
        .secret_string()
        .with_context(|| format!("secret {secret_name} has no string payload"))?;

    serde_json::from_str(payload)
        .with_context(|| format!("secret {secret_name} is not a valid credentials document"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pair_requires_both_values() {
        unsafe { std::env::set_var("INVOICE_TEST_EMAIL_ONLY", "billing@example.com") };
        assert!(from_env_pair("INVOICE_TEST_EMAIL_ONLY", "INVOICE_TEST_PASSWORD_MISSING").is_none());
    }

    #[test]
    fn env_pair_rejects_blank_values() {
        unsafe {
            std::env::set_var("INVOICE_TEST_EMAIL_BLANK", "billing@example.com");
            std::env::set_var("INVOICE_TEST_PASSWORD_BLANK", "   ");
        }
        assert!(from_env_pair("INVOICE_TEST_EMAIL_BLANK", "INVOICE_TEST_PASSWORD_BLANK").is_none());
    }

    #[test]
    fn env_pair_short_circuits_resolution() {
        unsafe {
            std::env::set_var("INVOICE_TEST_EMAIL_OK", "billing@example.com");
            std::env::set_var("INVOICE_TEST_PASSWORD_OK", "hunter2");
        }
        let creds = from_env_pair("INVOICE_TEST_EMAIL_OK", "INVOICE_TEST_PASSWORD_OK").unwrap();
        assert_eq!(creds.email, "billing@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn secret_payload_deserializes() {
        let creds: Credentials =
            serde_json::from_str(r#"{"email":"billing@example.com","password":"hunter2"}"#)
                .unwrap();
        assert_eq!(creds.email, "billing@example.com");
    }

    #[test]
    fn debug_never_exposes_secret() {
        let creds = Credentials {
            email: "billing@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bil***"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("billing@example.com"));
    }

    #[test]
    fn redact_handles_short_identities() {
        assert_eq!(redact("ab"), "ab***");
        assert_eq!(redact("billing@example.com"), "bil***");
    }
}
