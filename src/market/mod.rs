//! Market data collaborator.
//!
//! Resolves caller symbols through the instrument engine, queries a
//! [`client::MarketDataProvider`] by numeric id, and labels the response
//! back to the symbols the caller asked with. Real quote transports live
//! behind the provider trait; this crate ships only test implementations.

pub mod client;

pub use client::{
    LtpResult, MarketDataClient, MarketDataProvider, OhlcData, OhlcQuote, OhlcResult,
};
