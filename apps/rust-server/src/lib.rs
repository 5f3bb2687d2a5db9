// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Kakao Scheduler - Scheduled KakaoTalk Message Service
//!
//! Accepts messages with a future delivery time, keeps them in a local
//! record store, and sends each one through a messaging provider once it
//! comes due.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `app` - Wiring of store, sender and dispatcher from configuration
//! - `config` - Environment configuration
//! - `dispatcher` - Background delivery of due messages
//! - `error` - API error type and HTTP status mapping
//! - `logging` - Tracing subscriber setup
//! - `models` - Message records, statuses and API payloads
//! - `providers` - Simulated, KakaoTalk memo API and relay senders
//! - `schedule` - Form validation and schedule parsing
//! - `state` - Shared application state
//! - `storage` - Local key/value and redb record stores

pub mod api;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod schedule;
pub mod state;
pub mod storage;
