//! Registry store module
//!
//! This module contains the service registry implementation split into logical components:
//! - `types`: Data structures and the `ServiceRegistry` contract
//! - `service`: The concurrent in-memory store
//! - `cleanup`: Background expiry of registrants that stopped heartbeating
//! - `error`: Registry error taxonomy

pub mod cleanup;
pub mod error;
pub mod service;
pub mod types;

// Re-export public types for easier access
pub use cleanup::ExpirySweeper;
pub use error::{RegistryError, Result};
pub use service::RegistryStore;
pub use types::{
    RegisterRequest, RegisterResponse, Registrant, RelocationPolicy, ServiceInfo,
    ServiceRegistry, ServiceSnapshot,
};
