//! # Audit Log Search
//!
//! Follows an append-only audit log, stores each parsed line once in SQLite,
//! and serves filtered keyword search over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ audit_tool   │──▶│  Tailer  │──▶│  SQLite  │
//! │   .log       │   │ + Parser │   │   logs   │
//! └──────────────┘   └──────────┘   └────┬─────┘
//!                                        │
//!                      ┌─────────────────┤
//!                      ▼                 ▼
//!                 ┌──────────┐     ┌──────────┐
//!                 │   CLI    │     │   HTTP   │
//!                 │ (search) │     │/api/logs │
//!                 └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! logsearch init                              # create database
//! logsearch serve                             # tail the log + HTTP API
//! logsearch search --keyword "login and failed"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parser`] | Log line grammar |
//! | [`tail`] | Polling tailer and its dedup state |
//! | [`store`] | Append-only entry storage |
//! | [`query`] | Filter-to-SQL predicate builder |
//! | [`service`] | Request validation and search |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod query;
pub mod server;
pub mod service;
pub mod store;
pub mod tail;
