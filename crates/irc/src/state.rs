use std::fmt;

/// Lifecycle of the IRC connection, published over a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, `NICK`/`USER` sent, waiting for `001`.
    Registering,
    /// Registered, waiting for our own `JOIN` echo.
    JoiningChannel,
    /// In the channel; outbound messages are flowing.
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Registering => "registering",
            Self::JoiningChannel => "joining",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
