use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {
    secrecy::ExposeSecret,
    tgirc_common::NormalizedMessage,
    tokio::{
        io::{
            AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
        },
        net::TcpStream,
        sync::{
            mpsc::{self, error::TrySendError},
            watch,
        },
        task::JoinHandle,
        time::{Instant, sleep, sleep_until, timeout, timeout_at},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

use crate::{
    config::IrcSettings,
    error::{Error, Result},
    lines,
    proto::{Command, IrcEvent, RawLine, irc_eq},
    state::ConnectionState,
    tls,
};

const QUIT_MESSAGE: &str = "relay shutting down";

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type BoxedTransport = Box<dyn Transport>;

/// Handle to the background connection task.
#[derive(Clone)]
pub struct IrcHandle {
    outbound: mpsc::Sender<Vec<String>>,
    state: watch::Receiver<ConnectionState>,
}

impl IrcHandle {
    /// Queue one logical message for the channel.
    ///
    /// The lines are written back-to-back once the client is in the channel;
    /// messages queued while disconnected wait for the next successful join.
    pub async fn send(&self, lines: Vec<String>) -> Result<()> {
        self.outbound
            .send(lines)
            .await
            .map_err(|_| Error::TaskStopped)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Start the connection task. Channel messages are delivered on `inbound`
/// until `cancel` fires, at which point the task sends QUIT and exits.
pub fn spawn(
    settings: IrcSettings,
    inbound: mpsc::Sender<NormalizedMessage>,
    cancel: CancellationToken,
) -> (IrcHandle, JoinHandle<()>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.queue_capacity.max(1));
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let task = ConnectionTask {
        settings,
        inbound,
        outbound: outbound_rx,
        state: state_tx,
        cancel,
    };
    let join = tokio::spawn(task.run());
    (
        IrcHandle {
            outbound: outbound_tx,
            state: state_rx,
        },
        join,
    )
}

/// Capped exponential reconnect delay.
#[derive(Debug)]
struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Buffered line reader plus writer over one transport.
struct Wire {
    reader: BufReader<ReadHalf<BoxedTransport>>,
    writer: WriteHalf<BoxedTransport>,
    buf: Vec<u8>,
}

impl Wire {
    fn new(stream: BoxedTransport) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            buf: Vec::with_capacity(512),
        }
    }

    /// Next non-empty line without its terminator, `None` at EOF.
    ///
    /// Cancel safe: a partial line stays in `buf` for the next call.
    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 && self.buf.is_empty() {
                return Ok(None);
            }
            if n == 0 || self.buf.ends_with(b"\n") {
                let line = String::from_utf8_lossy(&self.buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                self.buf.clear();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }
        }
    }

    async fn send(&mut self, command: &Command<'_>) -> Result<()> {
        if !matches!(command, Command::Pass(_)) {
            trace!(line = %command, "irc >>");
        }
        let line = format!("{command}\r\n");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

struct ConnectionTask {
    settings: IrcSettings,
    inbound: mpsc::Sender<NormalizedMessage>,
    outbound: mpsc::Receiver<Vec<String>>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut backoff = Backoff::new(self.settings.reconnect_base, self.settings.reconnect_max);

        loop {
            self.set_state(ConnectionState::Connecting);
            info!(
                server = %self.settings.server,
                port = self.settings.port,
                tls = self.settings.tls,
                "connecting to irc"
            );

            match self.session(&mut backoff).await {
                Ok(()) => {
                    info!("irc connection shut down");
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "irc connection lost");
                },
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting to irc after delay");
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = sleep(delay) => {},
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "irc state");
        }
    }

    /// One connection from TCP connect to close. `Ok(())` means shutdown was
    /// requested; every error leads to a reconnect.
    async fn session(&mut self, backoff: &mut Backoff) -> Result<()> {
        let connect = timeout(self.settings.connect_timeout, open_transport(&self.settings));
        let stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            res = connect => res.map_err(|_| Error::timeout("connect", self.settings.connect_timeout))??,
        };
        let mut wire = Wire::new(stream);

        let Some(nick) = self.register(&mut wire).await? else {
            return Ok(());
        };
        info!(nick = %nick, "registered with irc server");

        if !self.join_channel(&mut wire, &nick).await? {
            return Ok(());
        }
        self.set_state(ConnectionState::Connected);
        backoff.reset();
        info!(channel = %self.settings.channel, nick = %nick, "joined irc channel");

        self.serve(&mut wire, &nick).await
    }

    /// Send PASS/NICK/USER and wait for `001`. Returns the nick the server
    /// registered us under, or `None` when cancelled.
    async fn register(&self, wire: &mut Wire) -> Result<Option<String>> {
        self.set_state(ConnectionState::Registering);
        let mut nick = self.settings.nick.clone();

        if let Some(password) = &self.settings.password {
            wire.send(&Command::Pass(password.expose_secret())).await?;
        }
        wire.send(&Command::Nick(&nick)).await?;
        wire.send(&Command::User {
            user: &self.settings.nick,
            realname: &self.settings.realname,
        })
        .await?;

        let deadline = Instant::now() + self.settings.handshake_timeout;
        loop {
            let Some(event) = self.handshake_event(wire, deadline, "registration").await? else {
                return Ok(None);
            };
            match event {
                IrcEvent::Welcome { nick: assigned } => {
                    if !assigned.is_empty() {
                        nick = assigned;
                    }
                    return Ok(Some(nick));
                },
                IrcEvent::NickInUse => {
                    nick.push('_');
                    info!(nick = %nick, "nick in use, retrying");
                    wire.send(&Command::Nick(&nick)).await?;
                },
                other => fail_handshake(other)?,
            }
        }
    }

    /// Send JOIN and wait for our own JOIN echo or the end of NAMES.
    /// Returns `false` when cancelled.
    async fn join_channel(&self, wire: &mut Wire, nick: &str) -> Result<bool> {
        self.set_state(ConnectionState::JoiningChannel);
        let channel = self.settings.channel.as_str();
        wire.send(&Command::Join(channel)).await?;

        let deadline = Instant::now() + self.settings.handshake_timeout;
        loop {
            let Some(event) = self.handshake_event(wire, deadline, "join").await? else {
                return Ok(false);
            };
            match event {
                IrcEvent::Join { nick: who, channel: joined }
                    if irc_eq(&who, nick) && irc_eq(&joined, channel) =>
                {
                    return Ok(true);
                },
                IrcEvent::EndOfNames { channel: joined } if irc_eq(&joined, channel) => {
                    return Ok(true);
                },
                other => fail_handshake(other)?,
            }
        }
    }

    /// Next event during registration or join. PINGs are answered here.
    async fn handshake_event(
        &self,
        wire: &mut Wire,
        deadline: Instant,
        phase: &'static str,
    ) -> Result<Option<IrcEvent>> {
        loop {
            let read = tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = wire.send(&Command::Quit(QUIT_MESSAGE)).await;
                    return Ok(None);
                },
                read = timeout_at(deadline, wire.read_line()) => {
                    read.map_err(|_| Error::timeout(phase, self.settings.handshake_timeout))??
                },
            };
            let Some(line) = read else {
                return Err(Error::Closed);
            };
            let Some(event) = decode(&line) else {
                continue;
            };
            if let IrcEvent::Ping { token } = &event {
                wire.send(&Command::Pong(token)).await?;
                continue;
            }
            return Ok(Some(event));
        }
    }

    /// Steady state: relay channel traffic, drain the outbound queue, and
    /// keep the link alive.
    async fn serve(&mut self, wire: &mut Wire, nick: &str) -> Result<()> {
        let budget = lines::privmsg_budget(nick, &self.settings.channel);
        let interval = self.settings.keepalive_interval;
        let grace = self.settings.keepalive_timeout;
        let mut last_seen = Instant::now();
        let mut ping_sent: Option<Instant> = None;

        loop {
            let deadline = match ping_sent {
                Some(at) => at + grace,
                None => last_seen + interval,
            };

            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = wire.send(&Command::Quit(QUIT_MESSAGE)).await;
                    return Ok(());
                },
                read = wire.read_line() => {
                    let Some(line) = read? else {
                        return Err(Error::Closed);
                    };
                    last_seen = Instant::now();
                    ping_sent = None;
                    if let Some(event) = decode(&line) {
                        self.handle_event(wire, nick, event).await?;
                    }
                },
                Some(message) = self.outbound.recv() => {
                    self.write_message(wire, budget, message).await?;
                },
                () = sleep_until(deadline) => {
                    if ping_sent.is_some() {
                        return Err(Error::KeepaliveTimeout(grace));
                    }
                    wire.send(&Command::Ping(&self.settings.server)).await?;
                    ping_sent = Some(Instant::now());
                },
            }
        }
    }

    async fn handle_event(&self, wire: &mut Wire, own_nick: &str, event: IrcEvent) -> Result<()> {
        let channel = self.settings.channel.as_str();
        match event {
            IrcEvent::Ping { token } => wire.send(&Command::Pong(&token)).await?,
            IrcEvent::Privmsg {
                nick,
                target,
                text,
                action,
            } => {
                if !irc_eq(&target, channel) {
                    debug!(from = %nick, target = %target, "ignoring message outside the channel");
                    return Ok(());
                }
                let message = NormalizedMessage::irc(nick, text)
                    .action(action)
                    .timestamp(unix_now())
                    .build();
                // Never wait on the consumer; PINGs must keep being answered.
                match self.inbound.try_send(message) {
                    Ok(()) => {},
                    Err(TrySendError::Full(dropped)) => warn!(
                        from = %dropped.sender_name(),
                        "irc inbound queue full, message dropped"
                    ),
                    Err(TrySendError::Closed(_)) => debug!("irc inbound receiver dropped"),
                }
            },
            IrcEvent::Kick {
                channel: from,
                nick: kicked,
                reason,
            } if irc_eq(&from, channel) && irc_eq(&kicked, own_nick) => {
                return Err(Error::Kicked {
                    channel: from,
                    reason,
                });
            },
            IrcEvent::ServerError { reason } => return Err(Error::ServerError { reason }),
            IrcEvent::Rejected { code, reason } => {
                warn!(code, reason = %reason, "irc server refused a request");
            },
            _ => {},
        }
        Ok(())
    }

    /// Write every line of one logical message before anything else.
    async fn write_message(&self, wire: &mut Wire, budget: usize, message: Vec<String>) -> Result<()> {
        let channel = self.settings.channel.as_str();
        let payloads = lines::fit_lines(&message, budget);
        for (i, text) in payloads.iter().enumerate() {
            if i > 0 && !self.settings.line_delay.is_zero() {
                sleep(self.settings.line_delay).await;
            }
            wire.send(&Command::Privmsg {
                target: channel,
                text,
            })
            .await?;
        }
        debug!(lines = payloads.len(), "relayed message to irc");
        Ok(())
    }
}

async fn open_transport(settings: &IrcSettings) -> Result<BoxedTransport> {
    let tcp = TcpStream::connect((settings.server.as_str(), settings.port)).await?;
    tcp.set_nodelay(true)?;
    if settings.tls {
        let stream = tls::wrap(tcp, &settings.server).await?;
        Ok(Box::new(stream))
    } else {
        Ok(Box::new(tcp))
    }
}

fn decode(line: &str) -> Option<IrcEvent> {
    debug!(line, "irc <<");
    match RawLine::parse(line) {
        Ok(raw) => Some(IrcEvent::from_line(&raw)),
        Err(e) => {
            warn!(error = %e, line, "ignoring malformed irc line");
            None
        },
    }
}

/// Turn terminal handshake replies into errors; ignore the rest.
fn fail_handshake(event: IrcEvent) -> Result<()> {
    match event {
        IrcEvent::Rejected { code, reason } => Err(Error::Rejected { code, reason }),
        IrcEvent::ServerError { reason } => Err(Error::ServerError { reason }),
        _ => Ok(()),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
