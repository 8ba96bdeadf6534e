pub mod registry;

pub use registry::{RegistryStore, ServiceRegistry, ServiceSnapshot};
