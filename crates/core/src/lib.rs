//! Shared types for the patient-flow realtime client.
//!
//! Holds the identifier aliases, the authenticated [`types::Identity`],
//! and the topic naming contract agreed with the backend broker.

pub mod error;
pub mod topics;
pub mod types;
