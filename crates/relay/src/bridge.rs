//! Task wiring.
//!
//! ```text
//! getUpdates ─► TelegramPoller ─► Router ─► MediaRelay ─► IrcHandle ─► IRC
//!                    │
//!                    └─► OffsetStore (after each batch)
//!
//! IRC ─► irc client task ─► Router ─► TelegramSender ─► sendMessage
//! ```
//!
//! The Telegram → IRC loop runs on the caller's task and owns the offset
//! store. IRC → Telegram runs in its own task. Cancelling the token stops
//! both loops, sends QUIT, and returns from [`Bridge::run`].

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    tgirc_common::NormalizedMessage,
    tgirc_config::{OffsetStore, RelayConfig, ServeMedia, ValidatedConfig},
    tgirc_irc::{IrcHandle, IrcSettings},
    tgirc_media::{HostingMode, MediaRelay, MediaStore, Uploader},
    tgirc_telegram::{
        Bot, ChatId, PollerSettings, TelegramFileSource, TelegramPoller, TelegramSender,
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    router::{IrcSend, RelayIdentity, RoutePolicy, Router},
};

/// Buffered messages per direction.
const QUEUE_CAPACITY: usize = 256;

const CHECKPOINT_RETRY_BASE: Duration = Duration::from_secs(1);
const CHECKPOINT_RETRY_MAX: Duration = Duration::from_secs(60);

/// IRC client settings for `config`, with default protocol timings.
#[must_use]
pub fn irc_settings(config: &RelayConfig) -> IrcSettings {
    let mut settings = IrcSettings::new(
        &config.ircserver,
        config.ircport,
        &config.ircnick,
        &config.ircchannel,
    );
    settings.tls = config.ircssl;
    settings.password = config.ircpass.clone();
    settings
}

fn route_policy(config: &RelayConfig) -> RoutePolicy {
    RoutePolicy {
        i2t: config.i2t,
        t2i: config.t2i,
        show_nick: config.shownick,
        max_lines: config.ircmaxlines,
        rehost_media: config.servemedia.is_enabled(),
    }
}

fn media_relay(config: &RelayConfig, bot: &Bot) -> Option<MediaRelay> {
    if !config.servemedia.is_enabled() {
        return None;
    }
    let http = reqwest::Client::new();
    let mode = match config.servemedia {
        ServeMedia::Off => return None,
        ServeMedia::SelfHosted => HostingMode::SelfHosted {
            base_url: config.serveurl.clone(),
        },
        ServeMedia::VimCn => HostingMode::Upload(Uploader::vim_cn(http.clone())),
    };
    Some(MediaRelay::new(
        mode,
        MediaStore::new(&config.cachepath),
        Arc::new(TelegramFileSource::new(bot.clone(), http)),
    ))
}

/// A configured relay, ready to run.
pub struct Bridge {
    validated: ValidatedConfig,
    config_path: PathBuf,
    bot: Bot,
    poller: PollerSettings,
    irc: IrcSettings,
}

impl Bridge {
    /// `config_path` is the file `validated` was loaded from; the update
    /// cursor is checkpointed back into it.
    pub fn new(validated: ValidatedConfig, config_path: impl Into<PathBuf>, bot: Bot) -> Self {
        let irc = irc_settings(&validated.config);
        Self {
            validated,
            config_path: config_path.into(),
            bot,
            poller: PollerSettings::default(),
            irc,
        }
    }

    #[must_use]
    pub fn with_poller_settings(mut self, poller: PollerSettings) -> Self {
        self.poller = poller;
        self
    }

    #[must_use]
    pub fn with_irc_settings(mut self, irc: IrcSettings) -> Self {
        self.irc = irc;
        self
    }

    /// Verify the bot token, then relay until `cancel` fires.
    ///
    /// Only a rejected token is returned as an error. Network trouble on
    /// either side, including while verifying the token, is retried.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            validated,
            config_path,
            bot,
            poller,
            irc,
        } = self;
        let ValidatedConfig {
            config, ban_filter, ..
        } = validated;

        let Some(me) = tgirc_telegram::connect_with_retry(&bot, &poller, &cancel).await? else {
            info!("cancelled before telegram answered");
            return Ok(());
        };
        if config.botid != 0 && config.botid != me.id {
            warn!(
                configured = config.botid,
                actual = me.id,
                "`botid` does not match the bot token, using the token's id"
            );
        }

        let router = Arc::new(Router::new(
            RelayIdentity {
                telegram_bot_id: me.id,
                irc_bot_id: config.ircbotid,
                irc_nick: config.ircnick.clone(),
            },
            route_policy(&config),
            ban_filter,
        ));
        let chat_id = ChatId(config.group_chat_id());
        let media = media_relay(&config, &bot);
        let mut offsets = OffsetStore::open(config_path, config.offset);

        info!(
            group = chat_id.0,
            server = %config.ircserver,
            channel = %config.ircchannel,
            servemedia = ?config.servemedia,
            offset = offsets.current(),
            "relay starting"
        );

        let (telegram, telegram_task) =
            TelegramSender::spawn(bot.clone(), chat_id, QUEUE_CAPACITY, cancel.clone());
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (irc, irc_task) = tgirc_irc::spawn(irc, inbound_tx, cancel.clone());
        let i2t_task = tokio::spawn(irc_to_telegram(
            Arc::clone(&router),
            inbound_rx,
            telegram,
            cancel.clone(),
        ));

        let poller = TelegramPoller::new(bot, chat_id, poller);
        telegram_to_irc(&router, &poller, media.as_ref(), &irc, &mut offsets, &cancel).await;

        // No-op on shutdown; stops the other tasks if the IRC client died.
        cancel.cancel();
        join_all([
            ("irc to telegram", i2t_task),
            ("telegram sender", telegram_task),
            ("irc client", irc_task),
        ])
        .await;
        info!(offset = offsets.current(), "relay stopped");
        Ok(())
    }
}

async fn join_all<const N: usize>(tasks: [(&'static str, JoinHandle<()>); N]) {
    for (name, task) in tasks {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "relay task ended abnormally");
        }
    }
}

async fn irc_to_telegram(
    router: Arc<Router>,
    mut inbound: mpsc::Receiver<NormalizedMessage>,
    telegram: TelegramSender,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => break,
            next = inbound.recv() => match next {
                Some(msg) => msg,
                None => break,
            },
        };
        let Some(send) = router.route_irc(&msg) else {
            continue;
        };
        if telegram.send(send.text).await.is_err() {
            warn!("telegram sender stopped, irc relay exiting");
            break;
        }
    }
    debug!("irc to telegram relay stopped");
}

async fn telegram_to_irc(
    router: &Router,
    poller: &TelegramPoller,
    media: Option<&MediaRelay>,
    irc: &IrcHandle,
    offsets: &mut OffsetStore,
    cancel: &CancellationToken,
) {
    let mut cursor = offsets.current();
    while let Some(batch) = poller.next_batch(cursor, cancel).await {
        for msg in &batch.messages {
            let Some(send) = prepare_for_irc(router, media, msg).await else {
                continue;
            };
            let sent = tokio::select! {
                // Unacknowledged; the batch is fetched again on restart.
                () = cancel.cancelled() => return,
                sent = irc.send(send.lines) => sent,
            };
            if let Err(e) = sent {
                warn!(error = %e, "irc client stopped, telegram relay exiting");
                return;
            }
        }

        cursor = batch.next_cursor;
        if !checkpoint(offsets, cursor, cancel).await {
            return;
        }
    }
    debug!("telegram to irc relay stopped");
}

/// Route one Telegram message and re-host its media when asked to.
async fn prepare_for_irc(
    router: &Router,
    media: Option<&MediaRelay>,
    msg: &NormalizedMessage,
) -> Option<IrcSend> {
    let draft = router.route_telegram(msg)?;
    let url = match (draft.media(), media) {
        (Some(file), Some(relay)) => relay.rehost(file).await,
        _ => None,
    };
    draft.finish(url.as_deref())
}

/// Persist `cursor`, retrying with backoff until it succeeds. Returns
/// `false` if cancelled first.
async fn checkpoint(offsets: &mut OffsetStore, cursor: i64, cancel: &CancellationToken) -> bool {
    let mut delay = CHECKPOINT_RETRY_BASE;
    loop {
        match offsets.checkpoint(cursor) {
            Ok(_) => return true,
            Err(e) => warn!(
                cursor,
                path = %offsets.path().display(),
                error = %e,
                delay_ms = delay.as_millis() as u64,
                "failed to persist telegram offset"
            ),
        }
        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(delay) => {},
        }
        delay = delay.saturating_mul(2).min(CHECKPOINT_RETRY_MAX);
    }
}
