//! Run protocol client for docrun.
//!
//! Provides the trigger-request plumbing, the server-sent event channel
//! adapter, and the [`RunClient`] execution contract: one capability, one
//! input, events forwarded in arrival order, resolution exactly once.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod input;
pub mod sse;

pub use channel::{ChannelSignal, EventChannel, EventSubscription};
pub use client::{ChannelSink, EventSink, NullSink, RunClient, RunOutcome};
pub use config::ClientConfig;
pub use error::ClientError;
pub use input::{AgentInput, DocumentFile, RfpSection, RfpSpec};
pub use sse::SseChannel;
