//! Media re-hosting: fetch a platform file, keep a content-addressed copy in
//! the cache directory, and produce a URL IRC readers can open.
//!
//! The cache only ever grows; retention is left to the operator.

pub mod error;
pub mod relay;
pub mod store;
pub mod upload;

pub use {
    error::{Error, Result},
    relay::{FetchedFile, FileSource, HostingMode, MediaRelay},
    store::{MediaStore, StoredFile},
    upload::{Uploader, VIM_CN_UPLOAD_URL},
};
