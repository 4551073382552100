//! Cloudflare IP access rules, used to block banned addresses at the edge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;

use domains::{DomainError, EdgeFirewall, Result};

const ACCESS_RULES_URL: &str = "https://api.cloudflare.com/client/v4/user/firewall/access_rules/rules";

#[derive(Debug, Serialize)]
struct AccessRule<'a> {
    mode: &'static str,
    configuration: RuleTarget<'a>,
    notes: &'a str,
}

#[derive(Debug, Serialize)]
struct RuleTarget<'a> {
    target: &'static str,
    value: &'a str,
}

pub struct CloudflareFirewall {
    client: Client,
    email: String,
    api_key: SecretString,
}

impl CloudflareFirewall {
    pub fn new(email: impl Into<String>, api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(DomainError::internal)?;
        Ok(Self { client, email: email.into(), api_key })
    }
}

#[async_trait]
impl EdgeFirewall for CloudflareFirewall {
    async fn block_ip(&self, ip: &str, note: &str) -> Result<()> {
        let rule = AccessRule {
            mode: "block",
            configuration: RuleTarget { target: "ip", value: ip },
            notes: note,
        };

        let response = self
            .client
            .post(ACCESS_RULES_URL)
            .header("X-Auth-Email", &self.email)
            .header("X-Auth-Key", self.api_key.expose_secret())
            .json(&rule)
            .send()
            .await
            .map_err(DomainError::internal)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::internal(format!("cloudflare returned {status}: {body}")));
        }
        info!(ip, "address blocked at edge");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_body_matches_the_access_rules_api() {
        let rule = AccessRule {
            mode: "block",
            configuration: RuleTarget { target: "ip", value: "203.0.113.9" },
            notes: "spam",
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mode": "block",
                "configuration": { "target": "ip", "value": "203.0.113.9" },
                "notes": "spam"
            })
        );
    }
}
