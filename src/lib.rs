//! # kbdesk
//!
//! Terminal client for a knowledge-base question answering service.
//!
//! Users ask questions against published documents, get answers with inline
//! `[S<n>]` citations, regenerate answers as new versions, and inspect the
//! cited fragments in an evidence panel that stays in sync with whichever
//! version and citation is active.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  kbd (CLI /  │──▶│    Views     │──▶│ API gateway  │──▶ REST backend
//! │    REPL)     │   │ chat/history │   │ + session    │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                    ┌──────▼───────┐
//!                    │ kbdesk-core  │  citations, evidence index,
//!                    │   (pure)     │  thread, panel
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbd login ann@example.org
//! kbd ask "Which clauses govern remote work?"
//! kbd history
//! kbd show 42 --version 1 --source 2
//! kbd rerun 42
//! kbd chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`session`] | Session context, policy table, token file |
//! | [`schema`] | Wire schemas and payload validation |
//! | [`api`] | Outbound request gateway |
//! | [`render`] | Terminal rendering |
//! | [`chat`] | Chat view and REPL |
//! | [`history`] | History list, detail, rerun, export |
//! | [`docs`] | Search and document viewer |
//! | [`account`] | Sign-in, registration, profile, password |

pub mod account;
pub mod api;
pub mod chat;
pub mod config;
pub mod docs;
pub mod history;
pub mod render;
pub mod schema;
pub mod session;
