//! Fetch pipeline: runs adapters with bounded concurrency, applies post-fetch
//! filters, merges and stores the result

pub mod adapter;
pub mod error;
pub mod filter;
pub mod pipeline;

#[cfg(test)]
pub mod tests;

pub use adapter::{Adapter, into_fragments};
pub use error::FetchError;
pub use filter::FetchFilter;
pub use pipeline::{FetchOptions, FetchOutcome, FetchPipeline};
