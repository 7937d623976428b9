//! Raw HTTP calls to the Telegram Bot API.
//!
//! Wraps reqwest for `getMe`, `getUpdates` and `sendMessage`. All methods
//! return typed responses.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::common::error::TelegramError;

use super::types::{ApiResponse, SentMessage, Update, User};

/// Extra time on top of the long-poll timeout before the HTTP request is
/// abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Low-level Telegram Bot API client.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client for the given bot token.
    pub fn new(bot_token: &str, timeout: Duration) -> Result<Self, TelegramError> {
        Self::with_base_url(bot_token, "https://api.telegram.org", timeout)
    }

    /// Create a new API client with a custom base URL (for testing).
    pub fn with_base_url(
        bot_token: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), bot_token),
        })
    }

    /// Identify the bot. Doubles as a credential check and liveness probe.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        let resp = self
            .client
            .post(format!("{}/getMe", self.base_url))
            .send()
            .await?;
        into_result(resp.json().await?, "getMe")
    }

    /// Long-poll for new updates.
    ///
    /// `offset` should be set to `last_update_id + 1` to acknowledge
    /// previously received updates.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
        limit: u8,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "limit": limit,
            "allowed_updates": ["message"],
        });

        if let Some(off) = offset {
            body["offset"] = json!(off);
        }

        let resp = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .timeout(Duration::from_secs(timeout_secs) + POLL_GRACE)
            .json(&body)
            .send()
            .await?;

        into_result(resp.json().await?, "getUpdates")
    }

    /// Send a text message to a chat.
    ///
    /// Returns the sent message's ID on success.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<i64, TelegramError> {
        let mut body = json!({
            "chat_id": chat_id_value(chat_id),
            "text": text,
            "disable_web_page_preview": true,
        });

        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }

        debug!("sendMessage to chat_id={chat_id}");

        let resp = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await?;

        let sent: SentMessage = into_result(resp.json().await?, "sendMessage")?;
        Ok(sent.message_id)
    }
}

/// Numeric chat ids go out as numbers, `@channel` names as strings.
fn chat_id_value(chat_id: &str) -> Value {
    match chat_id.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) => json!(chat_id),
    }
}

fn into_result<T: DeserializeOwned>(
    api_resp: ApiResponse<T>,
    method: &str,
) -> Result<T, TelegramError> {
    if !api_resp.ok {
        let description = api_resp.description.unwrap_or_default();
        warn!("{method} failed: {description}");
        return Err(TelegramError::Api {
            code: api_resp.error_code,
            description,
            retry_after: api_resp.parameters.and_then(|p| p.retry_after),
        });
    }

    api_resp.result.ok_or_else(|| TelegramError::Api {
        code: None,
        description: format!("{method} returned no result"),
        retry_after: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ids_keep_their_json_type() {
        assert_eq!(chat_id_value("-100555"), json!(-100555));
        assert_eq!(chat_id_value("@news"), json!("@news"));
    }

    #[test]
    fn error_response_carries_code_and_wait() {
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(
            r#"{"ok": false, "error_code": 429, "description": "Too Many Requests", "parameters": {"retry_after": 3}}"#,
        )
        .unwrap();
        match into_result(resp, "getUpdates") {
            Err(TelegramError::Api {
                code, retry_after, ..
            }) => {
                assert_eq!(code, Some(429));
                assert_eq!(retry_after, Some(3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn ok_response_yields_result() {
        let resp: ApiResponse<SentMessage> =
            serde_json::from_str(r#"{"ok": true, "result": {"message_id": 9}}"#).unwrap();
        assert_eq!(into_result(resp, "sendMessage").unwrap().message_id, 9);
    }
}
