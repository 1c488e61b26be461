use {
    async_trait::async_trait,
    teloxide::prelude::*,
    tgirc_common::MediaReference,
    tgirc_media::{FetchedFile, FileSource},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Downloads Telegram files through `getFile` and the Bot API file endpoint.
#[derive(Clone)]
pub struct TelegramFileSource {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramFileSource {
    /// `http` fetches the file bytes; `bot` only resolves file paths.
    pub fn new(bot: Bot, http: reqwest::Client) -> Self {
        Self { bot, http }
    }

    async fn download(&self, file_id: &str) -> Result<FetchedFile> {
        let file = self.bot.get_file(file_id.to_string()).await?;

        // https://api.telegram.org/file/bot<token>/<file_path>
        let mut url = self.bot.api_url();
        url.set_path(&format!("file/bot{}/{}", self.bot.token(), file.path));

        let response = self.http.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(Error::message(format!(
                "failed to download file: HTTP {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?.to_vec();
        debug!(file_id, path = %file.path, size = bytes.len(), "telegram file downloaded");

        Ok(FetchedFile {
            bytes,
            remote_path: file.path,
        })
    }
}

#[async_trait]
impl FileSource for TelegramFileSource {
    async fn fetch(&self, media: &MediaReference) -> tgirc_media::Result<FetchedFile> {
        Ok(self.download(&media.file_id).await?)
    }
}
