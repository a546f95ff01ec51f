//! Event store database schema.
//!
//! The same DDL ships as `migrations/0001_event_store.sql`; these constants
//! exist for embedded setups that create tables without the migrator.

/// SQL to create the streams table.
pub const CREATE_STREAMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_streams (
    stream_id   TEXT PRIMARY KEY,
    stream_type TEXT NOT NULL,
    version     BIGINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// SQL to create the events table. The identity column assigns the
/// store-wide global position in commit order.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_events (
    event_id        UUID PRIMARY KEY,
    stream_id       TEXT NOT NULL REFERENCES es_streams (stream_id),
    event_type      TEXT NOT NULL,
    position        BIGINT NOT NULL,
    global_position BIGINT GENERATED ALWAYS AS IDENTITY (START WITH 0 MINVALUE 0),
    data            JSONB NOT NULL,
    metadata        JSONB NOT NULL,
    timestamp       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    schema_version  INT NOT NULL DEFAULT 1,
    UNIQUE (stream_id, position)
);

CREATE INDEX IF NOT EXISTS idx_es_events_stream
    ON es_events (stream_id, position);

CREATE INDEX IF NOT EXISTS idx_es_events_global_position
    ON es_events (global_position);
";

/// SQL to create the snapshots table.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_snapshots (
    stream_id  TEXT PRIMARY KEY,
    state      JSONB NOT NULL,
    version    BIGINT NOT NULL,
    state_type TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// SQL to create the checkpoints table.
pub const CREATE_CHECKPOINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_checkpoints (
    projection_name TEXT PRIMARY KEY,
    position        BIGINT NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// SQL to create the projection leases table.
pub const CREATE_PROJECTION_LEASES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_projection_leases (
    projection_name TEXT PRIMARY KEY,
    holder_id       TEXT NOT NULL,
    acquired_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    renewed_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expires_at      TIMESTAMPTZ NOT NULL
);
";
