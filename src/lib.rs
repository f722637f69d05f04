//! Asset Ledger
//!
//! Keeps a persistent inventory of the files worth tracking under a set of
//! root directories, together with an append-only journal of what happened
//! to them. A one-shot bulk scan seeds the inventory; a live watcher keeps
//! it current afterwards.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod monitors;
pub mod observability;
pub mod storage;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
