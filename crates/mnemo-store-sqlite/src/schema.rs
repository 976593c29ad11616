//! SQL schema for the mnemo SQLite store.
//!
//! Executed once at store startup. Idempotent thanks to
//! `CREATE ... IF NOT EXISTS`; future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL.
///
/// Connection-level pragmas (WAL, foreign keys, synchronous, mmap) are set
/// per handle by the pool, not here.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS observations (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    content   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id       INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    to_id         INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    UNIQUE (from_id, to_id, relation_type)
);

CREATE INDEX IF NOT EXISTS entities_name_idx       ON entities(name);
CREATE INDEX IF NOT EXISTS observations_entity_idx ON observations(entity_id);
CREATE INDEX IF NOT EXISTS relations_from_idx      ON relations(from_id);
CREATE INDEX IF NOT EXISTS relations_to_idx        ON relations(to_id);
CREATE INDEX IF NOT EXISTS relations_triple_idx    ON relations(from_id, to_id, relation_type);

-- Full-text shadow tables. Rowids track the base-table ids; the triggers
-- below keep them synchronized on insert and delete. There is no update
-- trigger: no operation renames an entity in place.
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(name, entity_type);

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(content);

CREATE TRIGGER IF NOT EXISTS entities_fts_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, entity_type)
    VALUES (new.id, new.name, new.entity_type);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_ad AFTER DELETE ON entities BEGIN
    DELETE FROM entities_fts WHERE rowid = old.id;
END;

CREATE TRIGGER IF NOT EXISTS observations_fts_ai AFTER INSERT ON observations BEGIN
    INSERT INTO observations_fts(rowid, content)
    VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS observations_fts_ad AFTER DELETE ON observations BEGIN
    DELETE FROM observations_fts WHERE rowid = old.id;
END;

PRAGMA user_version = 1;
";
