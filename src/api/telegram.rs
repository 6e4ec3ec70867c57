use crate::models::TradeSignal;
use crate::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Chat bot notifier for run summaries and buy/sell signals
///
/// Without a bot token and chat id the notifier is disabled: sends are
/// logged and skipped.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    credentials: Option<(SecretString, String)>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct ReplyMarkup {
    inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TradeSignal {
    /// Human readable line, e.g. `BUY --> AAPL at 189.5`
    pub fn message(&self) -> String {
        format!("{} --> {} at {}", self.action, self.ticker, self.price)
    }

    /// Callback payload carried by the inline button
    pub fn callback_data(&self) -> String {
        format!("{}_{}_{}", self.action, self.ticker, self.price)
    }
}

impl TelegramNotifier {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString, chat_id: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: Some((bot_token, chat_id)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            base_url: TELEGRAM_API_BASE.to_string(),
            credentials: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send a plain text message. Returns `Ok(false)` when disabled.
    pub async fn send_message(&self, text: &str) -> Result<bool> {
        self.send(text, None).await
    }

    /// Send a signal with a single inline button named after the action
    pub async fn send_signal(&self, signal: &TradeSignal) -> Result<bool> {
        let markup = ReplyMarkup {
            inline_keyboard: vec![vec![InlineButton {
                text: signal.action.to_string(),
                callback_data: signal.callback_data(),
            }]],
        };
        self.send(&signal.message(), Some(markup)).await
    }

    /// Fire-and-forget text message; failures are logged
    pub async fn notify(&self, text: &str) {
        if let Err(e) = self.send_message(text).await {
            tracing::warn!("Telegram notification failed: {}", e);
        }
    }

    /// Fire-and-forget signal; failures are logged
    pub async fn notify_signal(&self, signal: &TradeSignal) {
        if let Err(e) = self.send_signal(signal).await {
            tracing::warn!(ticker = %signal.ticker, "Telegram signal failed: {}", e);
        }
    }

    async fn send(&self, text: &str, reply_markup: Option<ReplyMarkup>) -> Result<bool> {
        let Some((token, chat_id)) = &self.credentials else {
            tracing::info!("Telegram credentials not available, skipping message");
            return Ok(false);
        };

        let url = format!("{}/bot{}/sendMessage", self.base_url, token.expose_secret());
        let request = SendMessageRequest {
            chat_id: chat_id.as_str(),
            text,
            reply_markup,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body: TelegramResponse = response.json().await?;

        if !status.is_success() || !body.ok {
            return Err(format!(
                "Telegram API error ({}): {}",
                status,
                body.description.unwrap_or_default()
            )
            .into());
        }

        Ok(true)
    }
}
