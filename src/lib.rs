//! Translate Sanity documents field by field through DeepL and keep each
//! family's `translation.metadata` record in sync.

pub mod config;
pub mod deepl;
pub mod document;
pub mod engine;
pub mod error;
pub mod field;
pub mod path;
pub mod rate_limit;
pub mod registry;
pub mod sanity;
pub mod security;
pub mod server;
pub mod translation;
pub mod tree;

pub use error::{Result, TranslateError};
