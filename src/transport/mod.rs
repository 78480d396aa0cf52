//! Realtime transport: event classification, dispatch, and the
//! WebSocket feed.

pub mod classifier;
pub mod client;
pub mod dispatcher;

pub use classifier::{classify, ClassifiedEvent, EventFamily};
pub use client::RealtimeEventFeed;
pub use dispatcher::EventDispatcher;
