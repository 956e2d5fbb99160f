//! AG-UI stream protocol: lifecycle event types + SSE framing.
//!
//! This crate defines the wire shape of one agent stream event (message and
//! tool-call lifecycle) and the `data: <json>\n\n` frame decoder. It does not
//! depend on verdict; verdict decodes frames here and folds the events into
//! trajectory steps.

pub mod event;
pub mod sse;

pub use event::AgentEvent;
pub use sse::SseFrameDecoder;
