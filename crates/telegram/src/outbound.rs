use std::{future::Future, time::Duration};

use {
    teloxide::{RequestError, prelude::*},
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Relayed text longer than this many characters is cut.
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 2000;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Connection failures are retried this many times, backing off from
/// `TELEGRAM_NETWORK_RETRY_BASE` up to `TELEGRAM_NETWORK_RETRY_MAX`.
const TELEGRAM_NETWORK_MAX_RETRIES: usize = 5;
const TELEGRAM_NETWORK_RETRY_BASE: Duration = Duration::from_secs(1);
const TELEGRAM_NETWORK_RETRY_MAX: Duration = Duration::from_secs(30);

/// Queue in front of the only task that calls `sendMessage` for the group.
#[derive(Clone)]
pub struct TelegramSender {
    tx: mpsc::Sender<String>,
}

impl TelegramSender {
    /// Start the sender task for `chat_id`.
    pub fn spawn(
        bot: Bot,
        chat_id: ChatId,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(sender_loop(bot, chat_id, rx, cancel));
        (Self { tx }, task)
    }

    /// Queue `text` for delivery.
    pub async fn send(&self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .await
            .map_err(|_| Error::message("telegram sender has stopped"))
    }
}

async fn sender_loop(
    bot: Bot,
    chat_id: ChatId,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(text) => text,
                None => break,
            },
        };
        let delivered = tokio::select! {
            () = cancel.cancelled() => break,
            delivered = deliver(&bot, chat_id, &text) => delivered,
        };
        if let Err(e) = delivered {
            warn!(chat_id = chat_id.0, error = %e, "telegram send failed, message dropped");
        }
    }
    debug!("telegram sender stopped");
}

/// Send one message, waiting out rate limits and connection failures.
pub(crate) async fn deliver(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    let Some(text) = prepare_text(text) else {
        debug!("empty telegram message ignored");
        return Ok(());
    };
    run_telegram_request_with_retry(chat_id, "send message", || {
        let req = bot.send_message(chat_id, text.clone());
        async move { req.await }
    })
    .await?;
    Ok(())
}

/// Trim and cap `text`; `None` when nothing is left to send.
fn prepare_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= TELEGRAM_MAX_MESSAGE_CHARS {
        return Some(text.to_string());
    }
    let mut capped: String = text.chars().take(TELEGRAM_MAX_MESSAGE_CHARS - 1).collect();
    capped.push('…');
    Some(capped)
}

async fn run_telegram_request_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut retries = 0usize;
    let mut network_retries = 0usize;
    let mut network_delay = TELEGRAM_NETWORK_RETRY_BASE;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) if is_connection_error(&err) => {
                if network_retries >= TELEGRAM_NETWORK_MAX_RETRIES {
                    return Err(err);
                }
                network_retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries = network_retries,
                    max_retries = TELEGRAM_NETWORK_MAX_RETRIES,
                    delay_ms = network_delay.as_millis() as u64,
                    error = %err,
                    "telegram request failed, retrying"
                );
                tokio::time::sleep(network_delay).await;
                network_delay = network_delay
                    .saturating_mul(2)
                    .min(TELEGRAM_NETWORK_RETRY_MAX);
            },
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn is_connection_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Network(_) | RequestError::Io(_))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}
