// ! Capability registry
// !
// ! Name-keyed map of registered tools, resources or prompts. Lookups are
// ! read-mostly; handlers are cloned out so no lock is held while they run.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::error::{McpError, McpResult};

/// What happened to an existing entry on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    Replaced,
}

/// Concurrent map from capability name to entry
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: Arc<RwLock<HashMap<String, T>>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// `kind` names the entries in error messages ("tool", "resource", ...)
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `value` under `name`. An existing name is an error unless
    /// `allow_overwrite` is set.
    pub async fn insert(
        &self,
        name: impl Into<String>,
        value: T,
        allow_overwrite: bool,
    ) -> McpResult<Registration> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(McpError::validation(format!("{} name cannot be empty", self.kind)));
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&name) && !allow_overwrite {
            return Err(McpError::DuplicateRegistration(format!(
                "{} '{}' is already registered",
                self.kind, name
            )));
        }
        Ok(match entries.insert(name, value) {
            Some(_) => Registration::Replaced,
            None => Registration::Added,
        })
    }

    pub async fn remove(&self, name: &str) -> bool {
        self.entries.write().await.remove(name).is_some()
    }

    pub async fn get(&self, name: &str) -> Option<T> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// All entries ordered by name
    pub async fn values(&self) -> Vec<T> {
        let entries = self.entries.read().await;
        let mut names: Vec<&String> = entries.keys().collect();
        names.sort();
        names.into_iter().map(|name| entries[name].clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_registration_policy() {
        let registry = Registry::new("tool");
        assert_eq!(
            registry.insert("echo", 1, false).await.unwrap(),
            Registration::Added
        );

        let err = registry.insert("echo", 2, false).await.unwrap_err();
        assert!(matches!(err, McpError::DuplicateRegistration(_)));
        assert_eq!(registry.get("echo").await, Some(1));

        assert_eq!(
            registry.insert("echo", 3, true).await.unwrap(),
            Registration::Replaced
        );
        assert_eq!(registry.get("echo").await, Some(3));
    }

    #[tokio::test]
    async fn test_values_are_sorted_and_removable() {
        let registry = Registry::new("prompt");
        for name in ["b", "c", "a"] {
            registry.insert(name, name.to_uppercase(), false).await.unwrap();
        }
        assert_eq!(registry.values().await, vec!["A", "B", "C"]);

        assert!(registry.remove("b").await);
        assert!(!registry.remove("b").await);
        assert_eq!(registry.len().await, 2);
        assert!(!registry.contains("b").await);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let registry = Registry::new("resource");
        assert!(registry.insert("  ", (), false).await.is_err());
        assert!(registry.is_empty().await);
    }
}
