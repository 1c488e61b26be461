use thiserror::Error;

/// Startup failures. Once running, the bridge only stops on cancellation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] tgirc_telegram::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
