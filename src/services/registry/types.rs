use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

use super::error::Result;

/// 边车注册请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub service_name: String,
    pub registrant: String,
}

impl RegisterRequest {
    pub fn new(service_name: impl Into<String>, registrant: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            registrant: registrant.into(),
        }
    }
}

/// 注册确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub service_name: String,
    pub registrant: String,
    pub registration_id: Uuid,
}

// 单个注册实例
#[derive(Debug, Clone)]
pub struct Registrant {
    pub service_name: String,
    pub id: String,
    pub registration_id: Uuid,
    pub registered_at: SystemTime,
    pub last_heartbeat: Instant,
}

impl Registrant {
    pub(crate) fn new(service_name: String, id: String) -> Self {
        Self {
            service_name,
            id,
            registration_id: Uuid::new_v4(),
            registered_at: SystemTime::now(),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        Instant::now().duration_since(self.last_heartbeat) > ttl
    }
}

/// 对外展示的服务信息（服务名 + 实例列表）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_name: String,
    pub registrants: Vec<String>,
}

/// Point-in-time copy of the whole registry.
///
/// Services are ordered by name, registrants by insertion order within
/// their service.
#[derive(Debug, Clone, Default)]
pub struct ServiceSnapshot {
    services: BTreeMap<String, Vec<Registrant>>,
}

impl ServiceSnapshot {
    pub(crate) fn from_services(services: BTreeMap<String, Vec<Registrant>>) -> Self {
        Self { services }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 服务数量
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn registrant_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    pub fn get(&self, service_name: &str) -> Option<&[Registrant]> {
        self.services.get(service_name).map(Vec::as_slice)
    }

    /// 某个服务下的实例标识，按注册顺序
    pub fn registrant_ids(&self, service_name: &str) -> Vec<&str> {
        self.get(service_name)
            .map(|registrants| registrants.iter().map(|r| r.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Registrant])> {
        self.services
            .iter()
            .map(|(name, registrants)| (name.as_str(), registrants.as_slice()))
    }

    pub fn to_service_infos(&self) -> Vec<ServiceInfo> {
        self.iter()
            .map(|(name, registrants)| ServiceInfo {
                service_name: name.to_string(),
                registrants: registrants.iter().map(|r| r.id.clone()).collect(),
            })
            .collect()
    }
}

/// 重新以不同服务名注册同一实例时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationPolicy {
    #[default]
    Reject,
    Move,
}

/// The contract the HTTP edge depends on.
///
/// Implementations must be safe to share across request handlers: every
/// completed `register` is visible to any `get_services` that starts after it.
pub trait ServiceRegistry: Send + Sync {
    fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse>;

    fn get_services(&self) -> Result<ServiceSnapshot>;
}
