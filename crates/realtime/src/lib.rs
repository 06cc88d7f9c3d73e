//! Realtime broker client for the patient-flow backend.
//!
//! One shared STOMP-over-WebSocket connection ([`ConnectionManager`])
//! carries any number of topic subscriptions. Consumers register
//! callbacks through the [`Realtime`] handle; the [`TopicRegistry`]
//! multiplexes them onto a single broker subscription per topic and
//! restores those subscriptions after every reconnect.

pub mod client;
pub mod config;
pub mod events;
pub mod frame;
pub mod heartbeat;
pub mod link;
pub mod manager;
pub mod message;
pub mod reconnect;
pub mod registry;
mod session;

pub use config::RealtimeConfig;
pub use events::{ConnectionEvent, ConnectionState};
pub use manager::ConnectionManager;
pub use message::RealtimeMessage;
pub use registry::{Realtime, Subscription, TopicRegistry};
