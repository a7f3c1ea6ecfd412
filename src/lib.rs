//! # Flog
//!
//! A file-backed blogging backend.
//!
//! Flog treats a directory of Markdown files as the source of truth for a
//! blog. A reconciliation pass (`flog sync`) diffs the directory against a
//! SQLite index and applies the creates, updates, and deletes in a single
//! transaction; the HTTP server (`flog serve`) exposes the index over a
//! JSON API with comments, categories, moderation, and site metadata.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Markdown   │──▶│  Reconciler  │──▶│  SQLite   │
//! │  directory  │   │  scan+diff   │   │  index    │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   CLI    │       │   HTTP   │
//!                  │  (flog)  │       │  (JSON)  │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! flog init                     # create database and content directory
//! flog sync                     # reconcile Markdown files into the index
//! flog serve                    # start the HTTP API
//! flog stats                    # inspect the index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`front_matter`] | Front matter extraction |
//! | [`fingerprint`] | Content hashing |
//! | [`scanner`] | Content directory scanning |
//! | [`sync`] | Reconciliation engine |
//! | [`posts`] | Post queries and admin edits |
//! | [`comments`] | Comment threads and moderation |
//! | [`platform`] | Site metadata |
//! | [`stats`] | Index statistics |
//! | [`server`] | HTTP JSON API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod comments;
pub mod config;
pub mod db;
pub mod fingerprint;
pub mod front_matter;
pub mod migrate;
pub mod models;
pub mod platform;
pub mod posts;
pub mod scanner;
pub mod server;
pub mod stats;
pub mod sync;

#[cfg(test)]
mod test_util;
