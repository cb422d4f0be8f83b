//! gamecast-daemon: the async side of the commentary relay.
//! Collaborators, notifier, broadcast hub and its WebSocket front, the
//! match service and its ingest socket, and the listener with its
//! serialized playback queue.

pub mod cli;
pub mod client;
pub mod collab;
pub mod hub;
pub mod ingest_server;
pub mod listener;
pub mod notifier;
pub mod openai;
pub mod playback;
pub mod runtime;
pub mod service;
pub mod sink;
pub mod ws_server;
