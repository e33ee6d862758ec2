//! Data model shared by the tunnel packet engine crates
//!
//! This crate holds the error type, the configuration store, the layer type
//! enums, and the flow descriptors (`Triple`, `Quintuple`, `NatIndicator`)
//! consumed by the NAT layer.

mod config;
mod error;
pub mod layers;
mod nat;
mod quintuple;
mod triple;

pub use config::Config;
pub use error::*;
pub use layers::{LinkLayerType, NetworkLayerType, TransportLayerType};
pub use nat::*;
pub use quintuple::Quintuple;
pub use triple::Triple;
