//! SQLite schema for the work item store.
//!
//! - `work_item_types` holds each type's merged field set as JSON
//! - `work_items` holds field values in storage shape in `fields_json`
//! - `iterations` and `identities` back the planning and people lookups
//! - `store_meta` records the applied schema version

/// Migration v1: tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS work_item_types (
    name TEXT PRIMARY KEY CHECK (length(name) > 0),
    version INTEGER NOT NULL CHECK (version >= 1),
    extended_type_name TEXT REFERENCES work_item_types(name),
    fields_json TEXT NOT NULL CHECK (json_valid(fields_json)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS work_items (
    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_name TEXT NOT NULL REFERENCES work_item_types(name),
    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
    fields_json TEXT NOT NULL CHECK (json_valid(fields_json)),
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS identities (
    identity_id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL CHECK (length(trim(full_name)) > 0),
    image_url TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS iterations (
    iteration_id TEXT PRIMARY KEY,
    space_id TEXT NOT NULL,
    parent_id TEXT REFERENCES iterations(iteration_id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    start_at_us INTEGER,
    end_at_us INTEGER,
    state TEXT NOT NULL DEFAULT 'new' CHECK (state IN ('new', 'start', 'close')),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 0, CAST(strftime('%s', 'now') AS INTEGER) * 1000000);
"#;

/// Migration v2: lookup indexes and the one-started-iteration constraint.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_work_items_type
    ON work_items(type_name);

CREATE INDEX IF NOT EXISTS idx_work_items_live
    ON work_items(deleted_at_us, item_id);

CREATE INDEX IF NOT EXISTS idx_work_items_iteration
    ON work_items(lower(json_extract(fields_json, '$."system.iteration"')))
    WHERE deleted_at_us IS NULL;

CREATE INDEX IF NOT EXISTS idx_iterations_space_state
    ON iterations(space_id, state);

CREATE UNIQUE INDEX IF NOT EXISTS idx_iterations_one_started
    ON iterations(space_id)
    WHERE state = 'start';
"#;

pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_work_items_type",
    "idx_work_items_live",
    "idx_work_items_iteration",
    "idx_iterations_space_state",
    "idx_iterations_one_started",
];
