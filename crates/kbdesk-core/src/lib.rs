//! # kbdesk core
//!
//! Pure, I/O-free logic behind the kbdesk client: the answer/evidence data
//! model, the citation tokenizer, the per-version evidence index, the
//! selection state of a question thread, and the evidence panel view model.
//!
//! This crate has no tokio, reqwest, or filesystem dependencies. Everything
//! here is driven by discrete events (a response arrived, the user clicked
//! something) and runs to completion on the caller's thread.
//!
//! ```text
//!  answer text ──▶ citation::tokenize ──▶ segments for the renderer
//!  sources     ──▶ EvidenceIndex      ──┐
//!                                       ├──▶ Thread (active version + source)
//!  ask / rerun / clicks ────────────────┘          │
//!                                                   ▼
//!                                           panel::view (cards)
//! ```

pub mod citation;
pub mod evidence;
pub mod models;
pub mod panel;
pub mod thread;
pub mod timestamp;
