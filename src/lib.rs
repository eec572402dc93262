//! Paymentwall integration kit.
//!
//! Builds signed widget URLs, prepares Brick API requests and validates
//! inbound pingbacks. Network access is confined to the optional
//! [`http_transport`] module.

pub mod brick;
pub mod concepts;
pub mod config;
pub mod errors;
pub mod pingback;
pub mod product;
pub mod signature;
pub mod types;
pub mod widget;

#[cfg(feature = "api-client")]
pub mod http_transport;
