//! # Screen Context
//!
//! A local-first screenshot service: capture the screen on a schedule, skip
//! frames that look the same as something captured recently, and keep the
//! rest as JPEG files indexed in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌────────────┐
//! │ CaptureSource│──▶│      DedupGate       │──▶│ SqliteSink │
//! │ command/xcap │   │ aHash + HashStore    │   │ JPEG + row │
//! └──────────────┘   └──────────▲───────────┘   └─────┬──────┘
//!                               │                     │
//!                    ┌──────────┴──────────┐          ▼
//!                    │  CaptureScheduler   │     ┌──────────┐
//!                    │  timer / trigger    │     │  SQLite  │
//!                    └──────────▲──────────┘     └──────────┘
//!                       ┌───────┴───────┐
//!                       ▼               ▼
//!                  ┌──────────┐   ┌──────────┐
//!                  │   CLI    │   │   HTTP   │
//!                  │  (sctx)  │   │  (axum)  │
//!                  └──────────┘   └──────────┘
//! ```
//!
//! Hashing, the fingerprint store and the gate live in the
//! `screen-context-core` crate; this crate supplies the sources, SQLite
//! persistence, scheduling and the two front ends.
//!
//! ## Quick Start
//!
//! ```bash
//! sctx init                     # create database
//! sctx capture                  # one frame through the gate
//! sctx run                      # capture every 40s until Ctrl-C
//! sctx serve                    # HTTP control API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Versioned schema migrations |
//! | [`models`] | Stored screenshot rows |
//! | [`sources`] | Frame sources (external command, native screen) |
//! | [`sink`] | JPEG + SQLite persistence, retention, warm start |
//! | [`screenshots`] | List / get / delete stored screenshots |
//! | [`scheduler`] | Capture loop, start/stop/trigger, counters |
//! | [`service`] | Builds the scheduler from configuration |
//! | [`server`] | HTTP API |
//! | [`stats`] | Storage statistics |

pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod scheduler;
pub mod screenshots;
pub mod server;
pub mod service;
pub mod sink;
pub mod sources;
pub mod stats;
