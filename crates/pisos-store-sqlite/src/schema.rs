//! SQL schema for the pisos SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS listings (
    listing_id         TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    url                TEXT NOT NULL,
    price              INTEGER NOT NULL,   -- whole euros
    district           TEXT NOT NULL,
    neighborhood       TEXT NOT NULL,
    rooms              INTEGER,            -- NULL = not advertised
    size_sqm           REAL,               -- NULL = not advertised
    floor              TEXT,
    orientation        TEXT NOT NULL DEFAULT 'unknown',
    seller_kind        TEXT NOT NULL,      -- 'individual' | 'agency'
    is_new_development INTEGER NOT NULL DEFAULT 0,
    description        TEXT,
    first_seen_date    TEXT NOT NULL,      -- YYYY-MM-DD, immutable
    last_seen_date     TEXT NOT NULL,      -- YYYY-MM-DD, non-decreasing
    status             TEXT NOT NULL DEFAULT 'active'
);

-- Price history is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS price_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id     TEXT NOT NULL REFERENCES listings(listing_id),
    new_price      INTEGER NOT NULL,
    change_amount  INTEGER NOT NULL,       -- new - old, signed
    change_percent REAL,                   -- NULL when the old price was 0
    recorded_on    TEXT NOT NULL           -- YYYY-MM-DD
);

CREATE INDEX IF NOT EXISTS idx_status        ON listings(status);
CREATE INDEX IF NOT EXISTS idx_district      ON listings(district);
CREATE INDEX IF NOT EXISTS idx_last_seen     ON listings(last_seen_date);
CREATE INDEX IF NOT EXISTS idx_listing_price ON price_history(listing_id, recorded_on);
CREATE INDEX IF NOT EXISTS idx_date_recorded ON price_history(recorded_on);

PRAGMA user_version = 1;
";
