//! Headless realtime listener: keeps one broker connection open for a
//! configured identity, mounts the realtime hooks and logs what they do.

pub mod config;
pub mod observer;
