//! Reflex automation engine.
//!
//! Turns inbound comments, keyword messages, scheduler ticks, and manual
//! invocations into side effects: direct messages, public replies, queued
//! emails, and signed webhooks. Rules fire at most once per event.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod guard;
pub mod handler;
pub mod http;
pub mod matcher;
pub mod normalizer;
pub mod schedule;
pub mod signer;
pub mod template;
pub mod ticker;
pub mod types;

pub use dispatcher::Dispatcher;
pub use engine::{Collaborators, Engine};
pub use error::{EngineError, ErrorKind};
pub use handler::{ActionHandler, ActionRegistry};
pub use http::ReqwestHttpClient;
pub use normalizer::RawTrigger;
pub use ticker::Ticker;
pub use types::{BatchSummary, ExecutionOutcome, TriggerEvent};
