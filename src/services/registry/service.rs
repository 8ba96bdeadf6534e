use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use super::error::{RegistryError, Result};
use super::types::{
    RegisterRequest, RegisterResponse, Registrant, RelocationPolicy, ServiceRegistry,
    ServiceSnapshot,
};
use crate::config::Config;

/// In-memory registry store.
///
/// Lock order for every mutation: `gate` (shared) -> `owners` entry -> `services` entry.
/// Snapshots take `gate` exclusively, so they never see a half-applied mutation.
#[derive(Debug, Default)]
pub struct RegistryStore {
    // 服务名 -> 按注册顺序排列的实例
    services: DashMap<String, Vec<Registrant>>,
    // 实例标识 -> 所属服务名
    owners: DashMap<String, String>,
    gate: RwLock<()>,
    relocation: RelocationPolicy,
}

impl RegistryStore {
    pub fn new(relocation: RelocationPolicy) -> Self {
        Self {
            relocation,
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.registry.relocation)
    }

    pub fn relocation_policy(&self) -> RelocationPolicy {
        self.relocation
    }

    /// 已注册实例总数
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    // 获取单个服务的实例列表
    pub fn get_service(&self, service_name: &str) -> Option<Vec<Registrant>> {
        self.services.get(service_name).map(|bucket| bucket.clone())
    }

    // 注销实例
    pub fn deregister(&self, service_name: &str, registrant: &str) -> Result<Registrant> {
        let _guard = self.mutation_guard()?;

        match self.owners.entry(registrant.to_string()) {
            Entry::Occupied(owner) if owner.get() == service_name => {
                let removed = self
                    .remove_from_bucket(service_name, registrant)
                    .ok_or_else(|| missing_from_bucket(service_name, registrant))?;
                owner.remove();

                tracing::info!(
                    service_name = %service_name,
                    registrant = %registrant,
                    "Deregistered service instance"
                );
                Ok(removed)
            }
            _ => Err(RegistryError::NotFound {
                service: service_name.to_string(),
                registrant: registrant.to_string(),
            }),
        }
    }

    // 更新实例心跳
    pub fn heartbeat(&self, service_name: &str, registrant: &str) -> Result<()> {
        let _guard = self.mutation_guard()?;

        let not_found = || RegistryError::NotFound {
            service: service_name.to_string(),
            registrant: registrant.to_string(),
        };
        let mut bucket = self.services.get_mut(service_name).ok_or_else(not_found)?;
        let entry = bucket
            .iter_mut()
            .find(|r| r.id == registrant)
            .ok_or_else(not_found)?;
        entry.update_heartbeat();

        tracing::debug!(
            service_name = %service_name,
            registrant = %registrant,
            "Heartbeat received"
        );
        Ok(())
    }

    /// Removes every registrant whose last heartbeat is older than `ttl`.
    ///
    /// Candidates are collected without the gate and re-checked under it, so a
    /// heartbeat that lands in between keeps the registrant alive.
    pub fn expire_stale(&self, ttl: Duration) -> Result<Vec<Registrant>> {
        let candidates: Vec<(String, String)> = self
            .services
            .iter()
            .flat_map(|bucket| {
                bucket
                    .value()
                    .iter()
                    .filter(|r| r.is_expired(ttl))
                    .map(|r| (r.service_name.clone(), r.id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut expired = Vec::new();
        for (service_name, registrant) in candidates {
            let _guard = self.mutation_guard()?;

            let Entry::Occupied(owner) = self.owners.entry(registrant.clone()) else {
                continue;
            };
            if owner.get() != &service_name {
                continue;
            }

            let still_stale = self
                .services
                .get(&service_name)
                .and_then(|bucket| {
                    bucket
                        .iter()
                        .find(|r| r.id == registrant)
                        .map(|r| r.is_expired(ttl))
                })
                .unwrap_or(false);
            if !still_stale {
                continue;
            }

            if let Some(removed) = self.remove_from_bucket(&service_name, &registrant) {
                owner.remove();
                tracing::warn!(
                    service_name = %service_name,
                    registrant = %registrant,
                    ttl_secs = ttl.as_secs(),
                    "Service instance expired due to heartbeat timeout, removed from registry"
                );
                expired.push(removed);
            }
        }

        Ok(expired)
    }

    fn insert(&self, service_name: &str, registrant: &str) -> Result<Registrant> {
        let _guard = self.mutation_guard()?;

        match self.owners.entry(registrant.to_string()) {
            Entry::Occupied(mut owner) => {
                if owner.get() == service_name {
                    let mut bucket = self
                        .services
                        .get_mut(service_name)
                        .ok_or_else(|| missing_from_bucket(service_name, registrant))?;
                    let existing = bucket
                        .iter_mut()
                        .find(|r| r.id == registrant)
                        .ok_or_else(|| missing_from_bucket(service_name, registrant))?;
                    existing.update_heartbeat();

                    tracing::debug!(
                        service_name = %service_name,
                        registrant = %registrant,
                        "Service instance already registered, refreshed heartbeat"
                    );
                    return Ok(existing.clone());
                }

                let previous = owner.get().clone();
                match self.relocation {
                    RelocationPolicy::Reject => {
                        tracing::warn!(
                            service_name = %service_name,
                            registrant = %registrant,
                            registered_under = %previous,
                            "Rejected registration under a second service name"
                        );
                        Err(RegistryError::RegistrantConflict {
                            registrant: registrant.to_string(),
                            service: previous,
                        })
                    }
                    RelocationPolicy::Move => {
                        self.remove_from_bucket(&previous, registrant)
                            .ok_or_else(|| missing_from_bucket(&previous, registrant))?;
                        let entry = self.push_to_bucket(service_name, registrant);
                        owner.insert(service_name.to_string());

                        tracing::info!(
                            service_name = %service_name,
                            registrant = %registrant,
                            previous_service = %previous,
                            "Moved service instance to new service"
                        );
                        Ok(entry)
                    }
                }
            }
            Entry::Vacant(slot) => {
                let entry = self.push_to_bucket(service_name, registrant);
                slot.insert(service_name.to_string());

                tracing::info!(
                    service_name = %service_name,
                    registrant = %registrant,
                    "Registering service instance"
                );
                Ok(entry)
            }
        }
    }

    fn push_to_bucket(&self, service_name: &str, registrant: &str) -> Registrant {
        let entry = Registrant::new(service_name.to_string(), registrant.to_string());
        self.services
            .entry(service_name.to_string())
            .or_default()
            .push(entry.clone());
        entry
    }

    // 从服务中移除实例，服务为空时一并删除
    fn remove_from_bucket(&self, service_name: &str, registrant: &str) -> Option<Registrant> {
        let removed = {
            let mut bucket = self.services.get_mut(service_name)?;
            let position = bucket.iter().position(|r| r.id == registrant)?;
            bucket.remove(position)
        };
        self.services
            .remove_if(service_name, |_, bucket| bucket.is_empty());
        Some(removed)
    }

    fn mutation_guard(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.gate.read().map_err(|_| poisoned())
    }
}

impl ServiceRegistry for RegistryStore {
    fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let service_name = validate("service name", &request.service_name)?;
        let registrant = validate("registrant", &request.registrant)?;

        let entry = self.insert(service_name, registrant)?;
        Ok(RegisterResponse {
            service_name: entry.service_name,
            registrant: entry.id,
            registration_id: entry.registration_id,
        })
    }

    fn get_services(&self) -> Result<ServiceSnapshot> {
        let services: BTreeMap<String, Vec<Registrant>> = {
            let _guard = self.gate.write().map_err(|_| poisoned())?;
            self.services
                .iter()
                .map(|bucket| (bucket.key().clone(), bucket.value().clone()))
                .collect()
        };

        tracing::debug!(service_count = services.len(), "Took registry snapshot");
        Ok(ServiceSnapshot::from_services(services))
    }
}

// 去除首尾空白后存储，避免 " svcA " 与 "svcA" 成为两个服务
fn validate<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistryError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn poisoned() -> RegistryError {
    RegistryError::InternalFailure("registry lock poisoned".to_string())
}

// 索引与服务表不一致
fn missing_from_bucket(service_name: &str, registrant: &str) -> RegistryError {
    RegistryError::InternalFailure(format!(
        "index lists {registrant} under {service_name} but the service does not contain it"
    ))
}
