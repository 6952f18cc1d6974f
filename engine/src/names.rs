//! Canonical and user-chosen station names.

use crate::entity::normalize_source_name;
use crate::StationId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Known names for one station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameInfo {
    /// Name chosen by the user, if any
    pub display_name: Option<String>,
    /// Name as published by the upstream data provider
    pub original_source_name: Option<String>,
}

/// Resolves and stores station names.
#[async_trait]
pub trait NameResolutionService: Send + Sync {
    async fn get_display_name(&self, station_id: &str) -> Option<String>;

    async fn get_name_info(&self, station_id: &str) -> Option<NameInfo>;

    async fn update_display_name(&self, station_id: &str, name: &str);

    async fn set_original_source_name(&self, station_id: &str, name: &str);
}

/// Name service held in memory.
#[derive(Debug, Default)]
pub struct MemoryNameResolver {
    names: RwLock<HashMap<StationId, NameInfo>>,
}

impl MemoryNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the upstream name of a station.
    pub fn with_source_name(self, station_id: &str, name: &str) -> Self {
        self.write_entry(station_id, |info| {
            info.original_source_name = Some(name.to_string());
        });
        self
    }

    fn write_entry(&self, station_id: &str, f: impl FnOnce(&mut NameInfo)) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        f(names.entry(station_id.to_string()).or_default());
    }
}

#[async_trait]
impl NameResolutionService for MemoryNameResolver {
    async fn get_display_name(&self, station_id: &str) -> Option<String> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let info = names.get(station_id)?;
        info.display_name
            .clone()
            .or_else(|| info.original_source_name.clone())
    }

    async fn get_name_info(&self, station_id: &str) -> Option<NameInfo> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.get(station_id).cloned()
    }

    async fn update_display_name(&self, station_id: &str, name: &str) {
        self.write_entry(station_id, |info| info.display_name = Some(name.to_string()));
    }

    async fn set_original_source_name(&self, station_id: &str, name: &str) {
        // Keep the first meaningful source name.
        self.write_entry(station_id, |info| {
            if normalize_source_name(info.original_source_name.clone()).is_none() {
                info.original_source_name = normalize_source_name(Some(name.to_string()));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn display_name_falls_back_to_source_name() {
        let names = MemoryNameResolver::new().with_source_name("s1", "ROGUE RIVER AT AGNESS");
        assert_eq!(
            names.get_display_name("s1").await.as_deref(),
            Some("ROGUE RIVER AT AGNESS")
        );

        names.update_display_name("s1", "Agness").await;
        assert_eq!(names.get_display_name("s1").await.as_deref(), Some("Agness"));
        assert_eq!(names.get_display_name("unknown").await, None);
    }

    #[tokio::test]
    async fn source_name_set_once() {
        let names = MemoryNameResolver::new();
        names.set_original_source_name("s1", "null").await;
        assert_eq!(names.get_name_info("s1").await.unwrap().original_source_name, None);

        names.set_original_source_name("s1", "First").await;
        names.set_original_source_name("s1", "Second").await;
        let info = names.get_name_info("s1").await.unwrap();
        assert_eq!(info.original_source_name.as_deref(), Some("First"));
    }
}
