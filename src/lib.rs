#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::cast_precision_loss
)]

// ── Foundation ───────────────────────────────────────────────────────────────
pub mod config;
pub mod error;

// ── AI core ──────────────────────────────────────────────────────────────────
pub mod ai;
pub mod prompts;
pub mod providers;

// ── Conversation engine ──────────────────────────────────────────────────────
pub mod conversation;
pub mod domain;
pub mod intent;

// ── Platform services ────────────────────────────────────────────────────────
pub mod assistants;
pub mod sync;

// ── Transport + wiring ───────────────────────────────────────────────────────
pub mod app;
pub mod gateway;

// ── Re-exports ───────────────────────────────────────────────────────────────
pub use config::Config;
pub use error::{EngineError, Result};
