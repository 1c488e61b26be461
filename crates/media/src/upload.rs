use {
    reqwest::multipart::{Form, Part},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Public upload endpoint used by the `vim-cn` hosting mode.
pub const VIM_CN_UPLOAD_URL: &str = "https://img.vim-cn.com/";

/// Uploads files to a paste-style image host that answers with the URL.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
}

impl Uploader {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Uploader for img.vim-cn.com.
    pub fn vim_cn(client: reqwest::Client) -> Self {
        Self::new(client, VIM_CN_UPLOAD_URL)
    }

    /// Upload `bytes` as form field `name` and return the hosted URL.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("name", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let url = body.trim();

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::invalid_input(format!(
                "upload host returned no URL: {}",
                url.chars().take(80).collect::<String>()
            )));
        }
        debug!(endpoint = %self.endpoint, url, "media uploaded");
        Ok(url.to_string())
    }
}
