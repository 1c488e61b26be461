use std::time::Duration;

use {
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, Update, UpdateKind},
    },
    tgirc_common::NormalizedMessage,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{error::Result, normalize::normalize};

/// Long-poll and retry timings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Server-side wait for `getUpdates`.
    pub long_poll: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            long_poll: Duration::from_secs(30),
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(60),
        }
    }
}

/// Messages from one `getUpdates` call and the cursor that acknowledges them.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    /// Messages from the configured group, in update order.
    pub messages: Vec<NormalizedMessage>,
    /// `max(update_id) + 1`, or the polled cursor when the batch was empty.
    pub next_cursor: i64,
}

/// Reads the configured group through `getUpdates`.
pub struct TelegramPoller {
    bot: Bot,
    chat_id: ChatId,
    settings: PollerSettings,
}

impl TelegramPoller {
    pub fn new(bot: Bot, chat_id: ChatId, settings: PollerSettings) -> Self {
        Self {
            bot,
            chat_id,
            settings,
        }
    }

    /// One `getUpdates` call starting at `cursor`.
    pub async fn poll(&self, cursor: i64) -> Result<PollBatch> {
        let offset = i32::try_from(cursor).unwrap_or(i32::MAX);
        let wait = u32::try_from(self.settings.long_poll.as_secs()).unwrap_or(u32::MAX);
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(wait)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await?;
        debug!(count = updates.len(), cursor, "got telegram updates");
        Ok(self.collect(cursor, updates))
    }

    /// Poll until a batch arrives, backing off on failures. Returns `None`
    /// once `cancel` fires.
    pub async fn next_batch(&self, cursor: i64, cancel: &CancellationToken) -> Option<PollBatch> {
        let mut delay = self.settings.retry_base;
        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return None,
                result = self.poll(cursor) => result,
            };
            match result {
                Ok(batch) => return Some(batch),
                Err(e) => {
                    let conflict = matches!(
                        &e,
                        crate::Error::Telegram(RequestError::Api(
                            ApiError::TerminatedByOtherGetUpdates
                        ))
                    );
                    if conflict {
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            "another getUpdates consumer is running with this token"
                        );
                    } else {
                        warn!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "telegram getUpdates failed"
                        );
                    }
                },
            }
            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {},
            }
            delay = delay.saturating_mul(2).min(self.settings.retry_max);
        }
    }

    fn collect(&self, cursor: i64, updates: Vec<Update>) -> PollBatch {
        let mut batch = PollBatch {
            messages: Vec::new(),
            next_cursor: cursor,
        };

        for update in updates {
            let update_id = update.id.0;
            batch.next_cursor = batch.next_cursor.max(i64::from(update.id.as_offset()));

            match update.kind {
                UpdateKind::Message(msg) => {
                    debug!(
                        update_id,
                        chat_id = msg.chat.id.0,
                        chat_title = msg.chat.title().unwrap_or_default(),
                        "received telegram message"
                    );
                    if msg.chat.id != self.chat_id {
                        continue;
                    }
                    match normalize(&msg) {
                        Some(normalized) => batch.messages.push(normalized),
                        None => debug!(update_id, "skipping message without a sender"),
                    }
                },
                UpdateKind::Error(raw) => {
                    warn!(update_id, raw = %raw, "skipping undecodable telegram update");
                },
                other => {
                    debug!(update_id, "ignoring non-message update: {other:?}");
                },
            }
        }

        if !batch.messages.is_empty() {
            info!(
                count = batch.messages.len(),
                next_cursor = batch.next_cursor,
                "telegram batch ready"
            );
        }
        batch
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::mock_api::MockApi,
        serde_json::{Value, json},
        std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    const GROUP: ChatId = ChatId(-1001);

    fn message_update(update_id: u32, chat_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1_700_000_000,
                "chat": { "id": chat_id, "type": "group", "title": "some group" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "text": text
            }
        })
    }

    fn updates(values: Vec<Value>) -> Vec<Update> {
        values
            .into_iter()
            .map(|v| serde_json::from_str(&v.to_string()).expect("deserialize update"))
            .collect()
    }

    fn poller(bot: Bot) -> TelegramPoller {
        TelegramPoller::new(bot, GROUP, PollerSettings {
            long_poll: Duration::from_secs(0),
            retry_base: Duration::from_millis(10),
            retry_max: Duration::from_millis(40),
        })
    }

    fn offline_poller() -> TelegramPoller {
        poller(Bot::new("test-token"))
    }

    #[test]
    fn filters_to_group_and_advances_past_every_update() {
        let batch = offline_poller().collect(
            100,
            updates(vec![
                message_update(100, -1001, "one"),
                message_update(101, -2002, "elsewhere"),
                message_update(102, -1001, "two"),
            ]),
        );
        let texts: Vec<&str> = batch.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(batch.next_cursor, 103);
    }

    #[test]
    fn empty_batch_keeps_cursor() {
        let batch = offline_poller().collect(57, Vec::new());
        assert!(batch.messages.is_empty());
        assert_eq!(batch.next_cursor, 57);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let batch = offline_poller().collect(500, updates(vec![message_update(10, -1001, "old")]));
        assert_eq!(batch.next_cursor, 500);
    }

    #[test]
    fn non_message_updates_still_advance_cursor() {
        let edited = json!({
            "update_id": 200,
            "edited_message": {
                "message_id": 5,
                "date": 1_700_000_000,
                "edit_date": 1_700_000_100,
                "chat": { "id": -1001, "type": "group", "title": "some group" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "text": "edited"
            }
        });
        let batch = offline_poller().collect(0, updates(vec![edited]));
        assert!(batch.messages.is_empty());
        assert_eq!(batch.next_cursor, 201);
    }

    #[tokio::test]
    async fn poll_sends_cursor_and_parses_updates() {
        let api = MockApi::spawn(|method, _| match method {
            "GetUpdates" => json!({
                "ok": true,
                "result": [message_update(7, -1001, "hi from tg")]
            }),
            _ => json!({ "ok": true, "result": true }),
        })
        .await;

        let batch = poller(api.bot()).poll(7).await.unwrap();
        assert_eq!(batch.next_cursor, 8);
        assert_eq!(batch.messages[0].text(), "hi from tg");

        let calls = api.calls("GetUpdates");
        assert_eq!(calls[0]["offset"], 7);
        assert_eq!(calls[0]["allowed_updates"], json!(["message"]));
    }

    #[tokio::test]
    async fn next_batch_retries_failed_polls() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let api = MockApi::spawn(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                json!({ "ok": false, "error_code": 502, "description": "Bad Gateway" })
            } else {
                json!({ "ok": true, "result": [message_update(1, -1001, "finally")] })
            }
        })
        .await;

        let cancel = CancellationToken::new();
        let batch = tokio::time::timeout(
            Duration::from_secs(5),
            poller(api.bot()).next_batch(0, &cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(batch.messages[0].text(), "finally");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn next_batch_stops_on_cancel() {
        let api = MockApi::spawn(|_, _| {
            json!({ "ok": false, "error_code": 502, "description": "Bad Gateway" })
        })
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(poller(api.bot()).next_batch(0, &cancel).await.is_none());
    }
}
