use sqlx::{postgres::PgPoolOptions, PgPool};

/// The single table backing the document store: documents keyed by
/// collection path ("providers", "providers/{uid}/reviews") and id.
const CREATE_DOCUMENTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT        NOT NULL,
        doc_id     TEXT        NOT NULL,
        data       JSONB       NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ,
        PRIMARY KEY (collection, doc_id)
    )
";

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        // Run migrations if needed
        sqlx::query(CREATE_DOCUMENTS_TABLE).execute(&pool).await?;

        Ok(Self { pool })
    }
}
