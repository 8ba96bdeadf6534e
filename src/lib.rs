pub mod config;
pub mod services;

pub use config::Config;
pub use services::registry::{
    ExpirySweeper, RegisterRequest, RegisterResponse, Registrant, RegistryError, RegistryStore,
    RelocationPolicy, ServiceInfo, ServiceRegistry, ServiceSnapshot,
};
