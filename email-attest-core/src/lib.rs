#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! email-attest-core

pub mod callback;
pub mod common;
pub mod email;
pub mod wallet_uri;
