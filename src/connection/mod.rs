//! Connection management for the trusted link to the desktop
//!
//! This module handles:
//! - Choosing between certificate bootstrap and a secure connect
//! - Certificate exchange with fallback for older desktops
//! - Reconnection after a fixed delay, forever, until stopped
//! - Counting failed secure connects and re-bootstrapping past a threshold
//! - Inbound/outbound message dispatch

mod callbacks;
mod config;
mod events;
mod exchange;
mod manager;
mod reconnect;
mod worker;


pub use callbacks::Callbacks;
pub use config::{ConnectionConfig, DeviceIdentity};
pub use manager::ConnectionManager;
pub use worker::LinkStatus;
