//! Family history data layer.
//!
//! Timeline events and family tree persons are JSON documents in a
//! [`db::DocumentStore`]; media files go to an [`storage::ObjectStore`].
//! Components share one [`context::AppContext`] carrying the error channel
//! and the upload progress registry.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod progress;
pub mod storage;
pub mod timeline;
pub mod tree;

pub use context::AppContext;
pub use error::{DataError, Result};
