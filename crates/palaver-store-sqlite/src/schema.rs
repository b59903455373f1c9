//! SQL schema for the Palaver SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per identity, keyed by the tagged UserRef encoding
-- ('local:<uuid>' or 'fed:<subject>'). Email is the unique natural key.
CREATE TABLE IF NOT EXISTS users (
    user_ref      TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    provider_id   TEXT,            -- federated subject id, NULL for local
    picture_url   TEXT,
    password_hash TEXT,            -- argon2 PHC string, NULL for federated
    last_login    TEXT NOT NULL,   -- ISO 8601 UTC
    theme         TEXT NOT NULL DEFAULT 'dark',
    language      TEXT NOT NULL DEFAULT 'en-US',
    voice         TEXT NOT NULL DEFAULT ''
);

-- Server-held login sessions. Only the sha2 digest of the cookie token
-- is stored; the token itself exists only in the client's cookie.
CREATE TABLE IF NOT EXISTS login_sessions (
    token_hash TEXT PRIMARY KEY,
    user_ref   TEXT NOT NULL REFERENCES users(user_ref),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    session_id   TEXT PRIMARY KEY,
    user_ref     TEXT NOT NULL REFERENCES users(user_ref),
    created_at   TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    title        TEXT NOT NULL
);

-- Messages are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS messages (
    message_id   TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL REFERENCES chat_sessions(session_id),
    user_ref     TEXT NOT NULL,   -- denormalised owner for auth checks
    role         TEXT NOT NULL,   -- 'user' | 'model'
    content      TEXT NOT NULL,
    created_at   TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    content_type TEXT NOT NULL DEFAULT 'text'
);

CREATE INDEX IF NOT EXISTS users_provider_idx      ON users(provider_id);
CREATE INDEX IF NOT EXISTS chat_sessions_owner_idx ON chat_sessions(user_ref, last_updated);
CREATE INDEX IF NOT EXISTS messages_session_idx    ON messages(session_id, created_at);

PRAGMA user_version = 1;
";
