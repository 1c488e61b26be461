use std::sync::Arc;

use {
    async_trait::async_trait,
    tgirc_common::MediaReference,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    store::{MediaStore, extension_for},
    upload::Uploader,
};

/// A downloaded platform file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    /// Path reported by the platform (used for the extension).
    pub remote_path: String,
}

/// Resolves a [`MediaReference`] to file bytes via the platform's file API.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, media: &MediaReference) -> Result<FetchedFile>;
}

/// Where re-hosted files are published.
#[derive(Debug, Clone)]
pub enum HostingMode {
    /// Served by the operator under `base_url` from the cache directory.
    SelfHosted { base_url: String },
    /// Uploaded to a third-party host.
    Upload(Uploader),
}

/// Fetches media, caches it, and returns a public URL.
pub struct MediaRelay {
    mode: HostingMode,
    store: MediaStore,
    source: Arc<dyn FileSource>,
}

impl MediaRelay {
    pub fn new(mode: HostingMode, store: MediaStore, source: Arc<dyn FileSource>) -> Self {
        Self {
            mode,
            store,
            source,
        }
    }

    /// Re-host `media`, logging and swallowing any failure.
    pub async fn rehost(&self, media: &MediaReference) -> Option<String> {
        match self.try_rehost(media).await {
            Ok(url) => {
                info!(kind = media.kind.label(), url = %url, "media re-hosted");
                Some(url)
            },
            Err(e) => {
                warn!(
                    kind = media.kind.label(),
                    file_id = %media.file_id,
                    error = %e,
                    "media re-hosting failed, forwarding text only"
                );
                None
            },
        }
    }

    /// Re-host `media`, returning the error to the caller.
    pub async fn try_rehost(&self, media: &MediaReference) -> Result<String> {
        if !media.is_downloadable() {
            return Err(Error::invalid_input(format!(
                "{} has no downloadable file",
                media.kind.label()
            )));
        }

        let fetched = self.source.fetch(media).await?;
        let ext = extension_for(&fetched.remote_path, media.kind.fallback_extension());
        let stored = self.store.put(&fetched.bytes, &ext).await?;
        debug!(
            file = %stored.file_name,
            reused = stored.reused,
            "media stored"
        );

        match &self.mode {
            HostingMode::SelfHosted { base_url } => Ok(join_url(base_url, &stored.file_name)),
            HostingMode::Upload(uploader) => {
                uploader.upload(&stored.file_name, fetched.bytes).await
            },
        }
    }
}

/// Join a public prefix and a file name with exactly one `/`.
#[must_use]
pub fn join_url(base: &str, file_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file_name)
}
