//! Client code for satchel.
//!
//! This crate provides the request/response model the agent works with and
//! the HTTP fetch pipeline behind the [`Network`] trait.

pub mod fetch;

pub use fetch::{
    FetchClient, FetchConfig, Network, Request, RequestMode, Response, ResponseSource, UrlError, canonicalize,
};

/// HTTP vocabulary shared with the worker, re-exported from reqwest.
pub use reqwest::{Method, StatusCode, Url, header};
