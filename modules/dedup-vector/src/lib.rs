pub mod client;
pub mod error;
pub mod url_cache;

pub use client::VectorClient;
pub use error::{Result, VectorError};
pub use url_cache::{UrlResolutionStats, UrlResolver};
