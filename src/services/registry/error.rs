/// 注册表错误类型
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Registrant {registrant} is already registered under service {service}")]
    RegistrantConflict { registrant: String, service: String },
    #[error("Registrant {registrant} not found under service {service}")]
    NotFound { service: String, registrant: String },
    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

impl RegistryError {
    /// 调用方输入导致的错误，重试无意义
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidInput(_)
                | RegistryError::RegistrantConflict { .. }
                | RegistryError::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
