use serde::Serialize;
use std::collections::HashMap;

use crate::error::{ServiceError, ServiceResult};
use crate::providers::{Provider, ProviderImpl, ProviderKind};

/// Which secondary read a provider answers for status cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Balance,
    Usage,
}

impl QueryKind {
    pub fn for_provider(kind: ProviderKind) -> Option<Self> {
        match kind {
            ProviderKind::DeepSeek => Some(QueryKind::Balance),
            ProviderKind::DeepL => Some(QueryKind::Usage),
            ProviderKind::Google | ProviderKind::OpenAI => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetadata {
    pub label: &'static str,
    pub query_cacheable: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub kind: ProviderKind,
    pub provider: ProviderImpl,
    pub query: Option<QueryKind>,
    pub metadata: ServiceMetadata,
}

impl ServiceEntry {
    pub fn new(provider: ProviderImpl) -> Self {
        let kind = provider.kind();
        let query = QueryKind::for_provider(kind);
        Self {
            kind,
            provider,
            query,
            metadata: ServiceMetadata {
                label: kind.label(),
                query_cacheable: query.is_some(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, ServiceEntry>,
}

fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `id`; a later registration for the same id
    /// replaces the earlier one. Returns the normalized id.
    pub fn register(&mut self, id: &str, entry: ServiceEntry) -> ServiceResult<String> {
        let normalized = normalize_id(id);
        if normalized.is_empty() {
            return Err(ServiceError::Config(
                "Service identifier is required.".to_string(),
            ));
        }
        let kind = normalized.parse::<ProviderKind>()?;
        if kind != entry.kind {
            return Err(ServiceError::Config(format!(
                "Service identifier {} does not match provider {}.",
                normalized, entry.kind
            )));
        }
        self.entries.insert(normalized.clone(), entry);
        Ok(normalized)
    }

    pub fn get(&self, id: &str) -> Option<&ServiceEntry> {
        self.entries.get(&normalize_id(id))
    }

    pub fn resolve(&self, id: &str) -> ServiceResult<&ServiceEntry> {
        self.get(id)
            .ok_or_else(|| ServiceError::UnsupportedProvider(id.trim().to_string()))
    }

    pub fn list(&self) -> Vec<&ServiceEntry> {
        ProviderKind::ALL
            .iter()
            .filter_map(|kind| self.entries.get(kind.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
