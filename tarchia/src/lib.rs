/*!
Commit engine for the Tarchia table catalog.

Composes the [`storage`], [`catalog`], [`manifest_codec`], [`history`] and
[`envelope`] modules into the transaction lifecycle described by
[`commit::Engine`]: `start` → `stage`/`truncate` → `commit`, with schema
evolution as an adjacent, non-commit-producing operation. [`events`] fans
successful commits out to subscriber webhooks, off the commit path.
*/

pub mod catalog;
pub mod commit;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod history;
pub mod manifest_codec;
pub mod paths;
pub mod storage;

pub use error::{Error, Result};
