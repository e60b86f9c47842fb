//! HTTP access for archive downloads.

mod client;

pub use client::{HttpClient, HttpClientConfig, HttpError};
