//! Mutex-guarded in-memory event store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use chronik_core::clock::{Clock, SystemClock};
use chronik_core::error::EsError;
use chronik_core::event::{EventEnvelope, StoredEvent};
use chronik_core::registry::EventTypeRegistry;
use chronik_core::store::{EventPublisher, EventStore};
use chronik_core::stream::{ExpectedVersion, ReadStart, StreamId};
use chronik_core::upcast::UpcasterRegistry;

#[derive(Default)]
struct Inner {
    streams: HashMap<String, Vec<StoredEvent>>,
    log: Vec<StoredEvent>,
    next_global: i64,
}

/// In-memory event store: a map of streams plus a flat global log, guarded
/// by a single mutex. The mutex is the per-stream critical section; the
/// process-local counter is the global order.
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    registry: Option<Arc<EventTypeRegistry>>,
    upcasters: Option<Arc<UpcasterRegistry>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock: Arc::new(SystemClock),
            registry: None,
            upcasters: None,
            publisher: None,
        }
    }
}

impl InMemoryEventStore {
    /// Creates an empty store with no upcasters and no publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the clock used to stamp appended events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates appended event types against a registry, canonicalizing
    /// aliases before storage.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<EventTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Applies the given upcaster chains to payloads on read.
    #[must_use]
    pub fn with_upcasters(mut self, upcasters: Arc<UpcasterRegistry>) -> Self {
        self.upcasters = Some(upcasters);
        self
    }

    /// Attaches an in-process publisher, invoked synchronously with each
    /// newly appended event. Publisher errors are logged, not surfaced.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn upcast(&self, mut event: StoredEvent) -> StoredEvent {
        if let Some(upcasters) = &self.upcasters {
            event.data = upcasters.upcast(&event.event_type, event.data, event.schema_version);
        }
        event
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EsError> {
        self.inner
            .lock()
            .map_err(|_| EsError::Infrastructure("event store mutex poisoned".into()))
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        mut envelopes: Vec<EventEnvelope>,
        expected_version: ExpectedVersion,
    ) -> Result<i64, EsError> {
        if let Some(registry) = &self.registry {
            for envelope in &mut envelopes {
                envelope.event_type =
                    registry.canonicalize(&envelope.event_type, envelope.schema_version)?;
            }
        }

        let appended = {
            let mut inner = self.lock()?;

            let current = inner
                .streams
                .get(stream_id.as_str())
                .map(|events| events.len() as i64 - 1);

            if !expected_version.is_satisfied_by(current) {
                return Err(EsError::ConcurrencyConflict {
                    stream_id: stream_id.to_string(),
                    expected: expected_version,
                    actual: current.unwrap_or(-1),
                });
            }

            let current_version = current.unwrap_or(-1);
            if envelopes.is_empty() {
                return Ok(current_version);
            }

            let timestamp = self.clock.now();
            let mut appended = Vec::with_capacity(envelopes.len());
            for (offset, envelope) in envelopes.into_iter().enumerate() {
                let event = StoredEvent {
                    event_id: Uuid::new_v4(),
                    stream_id: stream_id.to_string(),
                    event_type: envelope.event_type,
                    position: current_version + 1 + offset as i64,
                    global_position: inner.next_global,
                    timestamp,
                    data: envelope.data,
                    metadata: envelope.metadata,
                    schema_version: envelope.schema_version,
                };
                inner.next_global += 1;
                appended.push(event);
            }

            let stream = inner.streams.entry(stream_id.to_string()).or_default();
            stream.extend(appended.iter().cloned());
            inner.log.extend(appended.iter().cloned());
            appended
        };

        let new_version = appended
            .last()
            .map_or(-1, |event| event.position);

        if let Some(publisher) = &self.publisher {
            for event in &appended {
                if let Err(e) = publisher.publish(event).await {
                    tracing::warn!(
                        stream_id = %stream_id,
                        event_type = %event.event_type,
                        error = %e,
                        "in-process publish failed"
                    );
                }
            }
        }

        Ok(new_version)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        start: ReadStart,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError> {
        let events = {
            let inner = self.lock()?;
            let stream = inner
                .streams
                .get(stream_id.as_str())
                .ok_or_else(|| EsError::StreamNotFound(stream_id.to_string()))?;

            match start {
                ReadStart::Start => stream.clone(),
                ReadStart::End => stream.last().cloned().into_iter().collect(),
                ReadStart::At(position) => {
                    let skip = usize::try_from(position.max(0)).unwrap_or(usize::MAX);
                    stream.iter().skip(skip).cloned().collect()
                }
            }
        };

        let capped = match count {
            Some(limit) => events.into_iter().take(limit).collect(),
            None => events,
        };
        Ok(capped.into_iter().map(|e| self.upcast(e)).collect())
    }

    async fn read_all(
        &self,
        after_position: i64,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError> {
        let events: Vec<StoredEvent> = {
            let inner = self.lock()?;
            let newer = inner
                .log
                .iter()
                .filter(|e| e.global_position > after_position)
                .cloned();
            match count {
                Some(limit) => newer.take(limit).collect(),
                None => newer.collect(),
            }
        };
        Ok(events.into_iter().map(|e| self.upcast(e)).collect())
    }

    async fn stream_exists(&self, stream_id: &StreamId) -> Result<bool, EsError> {
        Ok(self.lock()?.streams.contains_key(stream_id.as_str()))
    }
}
