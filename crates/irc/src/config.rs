use std::time::Duration;

use secrecy::Secret;

/// Connection parameters and protocol timings for the IRC client.
#[derive(Clone)]
pub struct IrcSettings {
    pub server: String,
    pub port: u16,
    pub tls: bool,
    pub password: Option<Secret<String>>,
    /// Preferred nick; `_` is appended while the server reports it taken.
    pub nick: String,
    pub realname: String,
    pub channel: String,
    pub connect_timeout: Duration,
    /// Limit for registration and for joining the channel.
    pub handshake_timeout: Duration,
    /// Idle time after which we send our own PING.
    pub keepalive_interval: Duration,
    /// How long to wait for any traffic after that PING.
    pub keepalive_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Pause between consecutive lines written to the socket.
    pub line_delay: Duration,
    /// Logical outbound messages buffered while disconnected.
    pub queue_capacity: usize,
}

impl IrcSettings {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        nick: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let nick = nick.into();
        Self {
            server: server.into(),
            port,
            tls: false,
            password: None,
            realname: nick.clone(),
            nick,
            channel: channel.into(),
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(90),
            keepalive_timeout: Duration::from_secs(60),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(300),
            line_delay: Duration::from_millis(500),
            queue_capacity: 256,
        }
    }
}

impl std::fmt::Debug for IrcSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("nick", &self.nick)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
