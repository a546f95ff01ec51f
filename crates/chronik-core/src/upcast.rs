//! Schema upcasting: version-keyed payload migration applied on read.
//!
//! Each logical event type may carry a chain of version-tagged transforms.
//! Chains are built once per process and are immutable; duplicate or
//! out-of-range `from_version` values are rejected at construction, never
//! at apply time. Transforms are pure functions over the raw JSON payload
//! and run before typed deserialization.

use std::collections::HashMap;

use crate::error::EsError;

type TransformFn = Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>;

/// A single payload migration step, applied to events stored at
/// `from_version` (or earlier, when replaying a longer suffix).
pub struct Upcaster {
    from_version: i32,
    transform: TransformFn,
}

impl Upcaster {
    /// An arbitrary custom transform.
    pub fn custom<F>(from_version: i32, transform: F) -> Self
    where
        F: Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        Self {
            from_version,
            transform: Box::new(transform),
        }
    }

    /// Adds a field with a default value. Existing fields are left alone.
    #[must_use]
    pub fn add_field(from_version: i32, field: &str, default: serde_json::Value) -> Self {
        let field = field.to_owned();
        Self::custom(from_version, move |mut data| {
            if let Some(object) = data.as_object_mut() {
                object.entry(field.clone()).or_insert_with(|| default.clone());
            }
            data
        })
    }

    /// Removes a field if present.
    #[must_use]
    pub fn remove_field(from_version: i32, field: &str) -> Self {
        let field = field.to_owned();
        Self::custom(from_version, move |mut data| {
            if let Some(object) = data.as_object_mut() {
                object.remove(&field);
            }
            data
        })
    }

    /// Renames a field, overwriting any existing value under the new name.
    #[must_use]
    pub fn rename_field(from_version: i32, from: &str, to: &str) -> Self {
        let from = from.to_owned();
        let to = to.to_owned();
        Self::custom(from_version, move |mut data| {
            if let Some(object) = data.as_object_mut()
                && let Some(value) = object.remove(&from)
            {
                object.insert(to.clone(), value);
            }
            data
        })
    }

    /// The schema version this upcaster migrates from.
    #[must_use]
    pub fn from_version(&self) -> i32 {
        self.from_version
    }

    fn apply(&self, data: serde_json::Value) -> serde_json::Value {
        (self.transform)(data)
    }
}

impl std::fmt::Debug for Upcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upcaster")
            .field("from_version", &self.from_version)
            .finish_non_exhaustive()
    }
}

/// The `from_version`-sorted, duplicate-free set of upcasters for one
/// logical event type. Gaps in version numbering are permitted.
#[derive(Debug)]
pub struct UpcasterChain {
    upcasters: Vec<Upcaster>,
}

impl UpcasterChain {
    /// Validates and builds a chain.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::UpcasterChain`] on a `from_version < 1` or a
    /// duplicate `from_version`.
    pub fn new(mut upcasters: Vec<Upcaster>) -> Result<Self, EsError> {
        for upcaster in &upcasters {
            if upcaster.from_version < 1 {
                return Err(EsError::UpcasterChain(format!(
                    "from_version must be >= 1, got {}",
                    upcaster.from_version
                )));
            }
        }
        upcasters.sort_by_key(Upcaster::from_version);
        for pair in upcasters.windows(2) {
            if pair[0].from_version == pair[1].from_version {
                return Err(EsError::UpcasterChain(format!(
                    "duplicate from_version {}",
                    pair[0].from_version
                )));
            }
        }
        Ok(Self { upcasters })
    }

    /// The highest `from_version` in the chain, or 0 for an empty chain.
    #[must_use]
    pub fn max_from_version(&self) -> i32 {
        self.upcasters.last().map_or(0, Upcaster::from_version)
    }

    /// Applies, in ascending order, every transform whose `from_version`
    /// is at least `schema_version`. Payloads already past the chain's
    /// maximum come back unchanged.
    #[must_use]
    pub fn upcast(&self, data: serde_json::Value, schema_version: i32) -> serde_json::Value {
        self.upcasters
            .iter()
            .filter(|u| u.from_version >= schema_version)
            .fold(data, |data, upcaster| upcaster.apply(data))
    }
}

/// Immutable process-wide map from event type to its upcaster chain.
#[derive(Debug, Default)]
pub struct UpcasterRegistry {
    chains: HashMap<String, UpcasterChain>,
}

impl UpcasterRegistry {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> UpcasterRegistryBuilder {
        UpcasterRegistryBuilder::default()
    }

    /// Migrates a raw payload forward. Identity for event types with no
    /// registered chain.
    #[must_use]
    pub fn upcast(
        &self,
        event_type: &str,
        data: serde_json::Value,
        schema_version: i32,
    ) -> serde_json::Value {
        match self.chains.get(event_type) {
            Some(chain) => chain.upcast(data, schema_version),
            None => data,
        }
    }

    /// Returns the chain registered for an event type, if any.
    #[must_use]
    pub fn chain(&self, event_type: &str) -> Option<&UpcasterChain> {
        self.chains.get(event_type)
    }
}

/// Builder for [`UpcasterRegistry`]; chain validation happens in
/// [`build`](UpcasterRegistryBuilder::build), which consumes the builder.
#[derive(Default)]
pub struct UpcasterRegistryBuilder {
    chains: Vec<(String, Vec<Upcaster>)>,
}

impl UpcasterRegistryBuilder {
    /// Registers the upcaster chain for one event type.
    #[must_use]
    pub fn chain(mut self, event_type: impl Into<String>, upcasters: Vec<Upcaster>) -> Self {
        self.chains.push((event_type.into(), upcasters));
        self
    }

    /// Validates every chain and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::UpcasterChain`] if any chain is invalid or an
    /// event type is registered twice.
    pub fn build(self) -> Result<UpcasterRegistry, EsError> {
        let mut chains = HashMap::with_capacity(self.chains.len());
        for (event_type, upcasters) in self.chains {
            let chain = UpcasterChain::new(upcasters)
                .map_err(|e| EsError::UpcasterChain(format!("{event_type}: {e}")))?;
            if chains.insert(event_type.clone(), chain).is_some() {
                return Err(EsError::UpcasterChain(format!(
                    "chain for '{event_type}' registered twice"
                )));
            }
        }
        Ok(UpcasterRegistry { chains })
    }
}

impl std::fmt::Debug for UpcasterRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcasterRegistryBuilder")
            .field("chains", &self.chains.len())
            .finish()
    }
}
