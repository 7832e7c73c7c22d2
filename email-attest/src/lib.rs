#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! email-attest

pub mod artifact;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod issuer;
pub mod logging;
pub mod mailer;
pub mod resolver;
pub mod settings;
pub mod setups;
pub mod verifier;

#[cfg(test)]
mod test_utils;
