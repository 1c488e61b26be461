use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    teloxide::{ApiError, RequestError, prelude::*},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    poller::PollerSettings,
};

/// HTTP client timeout. Must exceed the long-poll wait so the client does not
/// abort a `getUpdates` call before Telegram answers.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

/// The relay bot as reported by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: Option<String>,
}

/// Build a bot whose HTTP client outlives long-poll requests.
pub fn build_bot(token: &Secret<String>) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::external("build telegram http client", e))?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// Verify the token and clear any webhook so long polling works.
///
/// A rejected token is reported as [`Error::InvalidToken`].
pub async fn connect(bot: &Bot) -> Result<BotIdentity> {
    let me = bot.get_me().await.map_err(|e| match e {
        RequestError::Api(ApiError::InvalidToken) => Error::InvalidToken,
        other => Error::from(other),
    })?;

    bot.delete_webhook().send().await?;

    let identity = BotIdentity {
        id: me.id.0,
        username: me.username.clone(),
    };
    info!(
        bot_id = identity.id,
        username = ?identity.username,
        "telegram bot connected (webhook cleared)"
    );
    Ok(identity)
}

/// [`connect`], retrying everything except a rejected token with the
/// poller's backoff. Returns `Ok(None)` once `cancel` fires.
pub async fn connect_with_retry(
    bot: &Bot,
    settings: &PollerSettings,
    cancel: &CancellationToken,
) -> Result<Option<BotIdentity>> {
    let mut delay = settings.retry_base;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => return Ok(None),
            result = connect(bot) => result,
        };
        match result {
            Ok(identity) => return Ok(Some(identity)),
            Err(Error::InvalidToken) => return Err(Error::InvalidToken),
            Err(e) => warn!(
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "telegram getMe failed, retrying"
            ),
        }
        tokio::select! {
            () = cancel.cancelled() => return Ok(None),
            () = tokio::time::sleep(delay) => {},
        }
        delay = delay.saturating_mul(2).min(settings.retry_max);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::mock_api::MockApi,
        serde_json::json,
        std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    fn me() -> serde_json::Value {
        json!({
            "ok": true,
            "result": {
                "id": 777,
                "is_bot": true,
                "first_name": "Relay",
                "username": "relay_bot",
                "can_join_groups": true,
                "can_read_all_group_messages": true,
                "supports_inline_queries": false,
                "can_connect_to_business": false,
                "has_main_web_app": false
            }
        })
    }

    #[tokio::test]
    async fn connect_reports_identity_and_clears_webhook() {
        let api = MockApi::spawn(|method, _| match method {
            "GetMe" => me(),
            _ => json!({ "ok": true, "result": true }),
        })
        .await;

        let identity = connect(&api.bot()).await.unwrap();
        assert_eq!(identity, BotIdentity {
            id: 777,
            username: Some("relay_bot".into()),
        });
        assert_eq!(api.calls("DeleteWebhook").len(), 1);
    }

    fn fast_retry() -> PollerSettings {
        PollerSettings {
            long_poll: Duration::from_secs(0),
            retry_base: Duration::from_millis(10),
            retry_max: Duration::from_millis(40),
        }
    }

    #[tokio::test]
    async fn connect_retries_until_telegram_answers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let api = MockApi::spawn(move |method, _| match method {
            "GetMe" if seen.fetch_add(1, Ordering::SeqCst) < 2 => {
                json!({ "ok": false, "error_code": 502, "description": "Bad Gateway" })
            },
            "GetMe" => me(),
            _ => json!({ "ok": true, "result": true }),
        })
        .await;

        let identity = tokio::time::timeout(
            Duration::from_secs(5),
            connect_with_retry(&api.bot(), &fast_retry(), &CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert_eq!(identity.id, 777);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unreachable_api_is_retried_until_cancelled() {
        // Bound then dropped, so nothing listens on the port.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let url = reqwest::Url::parse(&format!("http://{addr}/")).unwrap();
        let bot = Bot::new("test-token").set_api_url(url);

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            connect_with_retry(&bot, &fast_retry(), &cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Ok(None)), "{result:?}");
    }

    #[tokio::test]
    async fn retry_gives_up_on_rejected_token() {
        let api = MockApi::spawn(|_, _| {
            json!({ "ok": false, "error_code": 401, "description": "Unauthorized" })
        })
        .await;

        let result = connect_with_retry(&api.bot(), &fast_retry(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::InvalidToken)), "{result:?}");
        assert_eq!(api.calls("GetMe").len(), 1);
    }

    #[tokio::test]
    async fn rejected_token_is_invalid_token() {
        let api = MockApi::spawn(|_, _| {
            json!({ "ok": false, "error_code": 401, "description": "Unauthorized" })
        })
        .await;

        let err = connect(&api.bot()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken), "{err}");
        assert!(api.calls("DeleteWebhook").is_empty());
    }
}
