//! SQL schema for the Alerta SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    email          TEXT PRIMARY KEY,
    password_hash  TEXT NOT NULL,   -- argon2 PHC string
    role           TEXT NOT NULL,   -- 'estudiante' | 'personal' | 'autoridad'
    full_name      TEXT NOT NULL,
    status         TEXT NOT NULL,
    created_at     TEXT NOT NULL,   -- RFC 3339 UTC, fixed-width
    updated_at     TEXT NOT NULL,
    last_login_at  TEXT
);

CREATE TABLE IF NOT EXISTS incidents (
    incident_id         TEXT PRIMARY KEY,
    kind                TEXT NOT NULL,   -- wire field 'type'
    location            TEXT NOT NULL,
    description         TEXT NOT NULL,
    urgency             TEXT NOT NULL,   -- immutable after creation
    priority            TEXT NOT NULL,
    status              TEXT NOT NULL,   -- 'pendiente' | 'en_atencion' | 'resuelto'
    reported_by         TEXT NOT NULL,
    reporter_role       TEXT NOT NULL,
    assigned_to         TEXT,
    significance_count  INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    last_note           TEXT
);

-- Audit trail is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS incident_history (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id  TEXT NOT NULL REFERENCES incidents(incident_id),
    action       TEXT NOT NULL,
    actor        TEXT NOT NULL,
    actor_role   TEXT NOT NULL,
    timestamp    TEXT NOT NULL,
    new_status   TEXT,
    priority     TEXT,
    assigned_to  TEXT,
    note         TEXT
);

-- Comments are append-only as well.
CREATE TABLE IF NOT EXISTS incident_comments (
    comment_id   TEXT PRIMARY KEY,
    incident_id  TEXT NOT NULL REFERENCES incidents(incident_id),
    text         TEXT NOT NULL,
    actor        TEXT NOT NULL,
    actor_role   TEXT NOT NULL,
    timestamp    TEXT NOT NULL
);

-- One row per (incident, voter). The UNIQUE constraint is what makes the
-- vote operation safe under concurrency: the insert itself fails for a
-- duplicate voter, so there is no check-then-write window.
CREATE TABLE IF NOT EXISTS significance_votes (
    incident_id  TEXT NOT NULL REFERENCES incidents(incident_id),
    voter        TEXT NOT NULL,
    voted_at     TEXT NOT NULL,
    UNIQUE (incident_id, voter)
);

CREATE TABLE IF NOT EXISTS connections (
    connection_id  TEXT PRIMARY KEY,
    user_email     TEXT NOT NULL,
    role           TEXT NOT NULL,
    connected_at   TEXT NOT NULL,
    last_ping_at   TEXT NOT NULL,
    expires_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS users_role_idx              ON users(role);
CREATE INDEX IF NOT EXISTS incidents_status_idx        ON incidents(status);
CREATE INDEX IF NOT EXISTS incident_history_inc_idx    ON incident_history(incident_id);
CREATE INDEX IF NOT EXISTS incident_comments_inc_idx   ON incident_comments(incident_id);
CREATE INDEX IF NOT EXISTS significance_votes_inc_idx  ON significance_votes(incident_id);
CREATE INDEX IF NOT EXISTS connections_role_idx        ON connections(role);
CREATE INDEX IF NOT EXISTS connections_user_idx        ON connections(user_email);

PRAGMA user_version = 1;
";
