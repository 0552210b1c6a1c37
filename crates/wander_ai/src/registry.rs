//! Provider Registry
//!
//! Single source of truth for which backends are usable right now. Read on
//! every request, written only by settings toggles and credential checks.
//! All access goes through one `RwLock`, so a bulk toggle is observed either
//! entirely or not at all.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::Capability;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Catalog entry for one interchangeable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub capability: Capability,
    pub is_available: bool,
    /// Higher is preferred.
    pub priority: i32,
}

impl Provider {
    pub fn new(id: &str, name: &str, capability: Capability, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capability,
            is_available: true,
            priority,
        }
    }
}

/// The static catalog shipped with the app. Perplexity answers with live
/// web results so it leads; Gemini doubles as a cheap classifier.
pub fn default_catalog() -> Vec<Provider> {
    vec![
        Provider::new("perplexity", "Perplexity", Capability::Both, 30),
        Provider::new("openai", "OpenAI", Capability::Chat, 20),
        Provider::new("gemini", "Google Gemini", Capability::Both, 10),
    ]
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// Registration order is the position in `table`; it breaks priority ties.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    table: RwLock<Vec<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with [`default_catalog`].
    pub fn with_catalog(catalog: Vec<Provider>) -> Self {
        let registry = Self::new();
        for provider in catalog {
            registry.register(provider);
        }
        registry
    }

    /// Add a provider. Re-registering an id replaces its descriptor but keeps
    /// its original registration slot.
    pub fn register(&self, provider: Provider) {
        let mut table = self.table.write();
        if let Some(existing) = table.iter_mut().find(|p| p.id == provider.id) {
            *existing = provider;
        } else {
            debug!(id = %provider.id, priority = provider.priority, "Provider registered");
            table.push(provider);
        }
    }

    /// Look up a descriptor by id regardless of availability.
    pub fn get(&self, id: &str) -> Option<Provider> {
        self.table.read().iter().find(|p| p.id == id).cloned()
    }

    /// Available providers eligible for `capability`, highest priority first,
    /// ties in registration order.
    pub fn list_by_capability(&self, capability: Capability) -> Vec<Provider> {
        let table = self.table.read();
        let mut eligible: Vec<Provider> = table
            .iter()
            .filter(|p| p.is_available && p.capability.serves(capability))
            .cloned()
            .collect();
        // Stable sort keeps registration order among equal priorities.
        eligible.sort_by(|a, b| b.priority.cmp(&a.priority));
        eligible
    }

    /// Preferred provider for `capability`, or `None` when nothing is usable.
    pub fn primary(&self, capability: Capability) -> Option<Provider> {
        self.list_by_capability(capability).into_iter().next()
    }

    /// Everything after the primary, in order.
    pub fn fallbacks(&self, capability: Capability) -> Vec<Provider> {
        self.list_by_capability(capability)
            .into_iter()
            .skip(1)
            .collect()
    }

    /// Toggle one provider. Unknown ids are ignored. Returns whether the id
    /// was known.
    pub fn set_availability(&self, id: &str, available: bool) -> bool {
        let mut table = self.table.write();
        match table.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.is_available = available;
                debug!(id, available, "Provider availability updated");
                true
            }
            None => {
                debug!(id, "Ignoring availability toggle for unknown provider");
                false
            }
        }
    }

    /// Apply many toggles under a single write lock.
    pub fn bulk_set_availability(&self, toggles: &BTreeMap<String, bool>) {
        let mut table = self.table.write();
        let mut applied = 0usize;
        for (id, available) in toggles {
            if let Some(p) = table.iter_mut().find(|p| &p.id == id) {
                p.is_available = *available;
                applied += 1;
            }
        }
        info!(applied, requested = toggles.len(), "Provider availability bulk update");
    }

    /// Current id → availability map, in registration order of ids.
    pub fn availability_snapshot(&self) -> BTreeMap<String, bool> {
        self.table
            .read()
            .iter()
            .map(|p| (p.id.clone(), p.is_available))
            .collect()
    }

    /// Every registered provider, available or not, in registration order.
    pub fn all(&self) -> Vec<Provider> {
        self.table.read().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
