//! Metadata sources

pub mod iptv_api;

pub use iptv_api::IptvApiClient;
