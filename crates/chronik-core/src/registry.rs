//! Event type registry: stable logical names, schema versions, and aliases.
//!
//! The registry is built once at startup and is immutable afterwards — the
//! builder is consumed by [`EventTypeRegistryBuilder::build`], so there is
//! no write-after-freeze path to misuse. Misconfiguration fails at build
//! time, not when an event is read.

use std::collections::HashMap;

use crate::error::EsError;

/// Immutable mapping from logical event names to their latest schema
/// version, with zero or more name aliases per type.
#[derive(Debug, Clone, Default)]
pub struct EventTypeRegistry {
    types: HashMap<String, i32>,
    aliases: HashMap<String, String>,
}

impl EventTypeRegistry {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> EventTypeRegistryBuilder {
        EventTypeRegistryBuilder::default()
    }

    /// Resolves a name (canonical or alias) to its canonical event type.
    /// The returned name borrows from the registry, not from `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((canonical, _)) = self.types.get_key_value(name) {
            return Some(canonical.as_str());
        }
        self.aliases.get(name).map(String::as_str)
    }

    /// Returns the latest registered schema version for a name or alias.
    #[must_use]
    pub fn latest_version(&self, name: &str) -> Option<i32> {
        self.resolve(name).and_then(|n| self.types.get(n)).copied()
    }

    /// Returns true if the name resolves to a registered event type.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Validates a write against the registry and returns the canonical
    /// event type name. Writes must use a registered name (or alias) and
    /// must not claim a schema version newer than the registered latest.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Validation`] on unregistered names and on
    /// schema versions past the latest.
    pub fn canonicalize(&self, event_type: &str, schema_version: i32) -> Result<String, EsError> {
        let Some(canonical) = self.resolve(event_type) else {
            return Err(EsError::Validation(format!(
                "unregistered event type '{event_type}'"
            )));
        };
        let latest = self.latest_version(canonical).unwrap_or(1);
        if schema_version > latest {
            return Err(EsError::Validation(format!(
                "event type '{canonical}' written at schema version {schema_version}, latest is {latest}"
            )));
        }
        Ok(canonical.to_owned())
    }
}

/// Builder for [`EventTypeRegistry`]. All validation happens in
/// [`build`](EventTypeRegistryBuilder::build).
#[derive(Debug, Default)]
pub struct EventTypeRegistryBuilder {
    types: Vec<(String, i32)>,
    aliases: Vec<(String, String)>,
}

impl EventTypeRegistryBuilder {
    /// Registers a logical event type at its latest schema version.
    #[must_use]
    pub fn event_type(mut self, name: impl Into<String>, latest_version: i32) -> Self {
        self.types.push((name.into(), latest_version));
        self
    }

    /// Registers an alias for a canonical event type name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), canonical.into()));
        self
    }

    /// Validates and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Validation`] on empty names, schema versions < 1,
    /// duplicate registrations, alias collisions, or aliases that point at
    /// an unregistered type.
    pub fn build(self) -> Result<EventTypeRegistry, EsError> {
        let mut types = HashMap::with_capacity(self.types.len());
        for (name, version) in self.types {
            if name.trim().is_empty() {
                return Err(EsError::Validation("event type name must not be empty".into()));
            }
            if version < 1 {
                return Err(EsError::Validation(format!(
                    "event type '{name}' has invalid schema version {version}"
                )));
            }
            if types.insert(name.clone(), version).is_some() {
                return Err(EsError::Validation(format!(
                    "event type '{name}' registered twice"
                )));
            }
        }

        let mut aliases = HashMap::with_capacity(self.aliases.len());
        for (alias, canonical) in self.aliases {
            if alias.trim().is_empty() {
                return Err(EsError::Validation("alias must not be empty".into()));
            }
            if types.contains_key(&alias) {
                return Err(EsError::Validation(format!(
                    "alias '{alias}' collides with a registered event type"
                )));
            }
            if !types.contains_key(&canonical) {
                return Err(EsError::Validation(format!(
                    "alias '{alias}' points at unregistered event type '{canonical}'"
                )));
            }
            if aliases.insert(alias.clone(), canonical).is_some() {
                return Err(EsError::Validation(format!("alias '{alias}' registered twice")));
            }
        }

        Ok(EventTypeRegistry { types, aliases })
    }
}
