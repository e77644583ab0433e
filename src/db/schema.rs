pub const SCHEMA: &str = r#"
-- Documents: schemaless JSON records addressed by collection + id
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,              -- JSON object
    created_at TEXT NOT NULL,        -- RFC 3339
    updated_at TEXT NOT NULL,        -- RFC 3339
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
"#;

/// Applied after `SCHEMA`; failures (already applied) are ignored.
pub const MIGRATIONS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(collection, updated_at)",
];
