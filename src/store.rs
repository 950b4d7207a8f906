use crate::errors::AppError;
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Root collection holding provider documents.
pub const PROVIDERS_COLLECTION: &str = "providers";

/// Path of a provider's review subcollection.
pub fn reviews_collection(provider_uid: &str) -> String {
    format!("providers/{}/reviews", provider_uid)
}

/// One stored document: its id plus the JSON payload.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// A set of field operations applied to one document in a single store
/// round-trip.
///
/// Three kinds of operations are supported: plain `set`, server-side
/// atomic `increment` of a numeric field, and `array_union` which appends
/// a value to an array field only if not already present. Increment and
/// union combined in one update is what keeps the recommend counter and
/// the membership set consistent under concurrent writers.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    sets: Vec<(String, Value)>,
    increments: Vec<(String, i64)>,
    array_unions: Vec<(String, Value)>,
}

impl DocumentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `field` with `value`.
    pub fn set(mut self, field: &str, value: Value) -> Self {
        self.sets.push((field.to_string(), value));
        self
    }

    /// Atomically adds `delta` to the numeric `field` (missing field
    /// counts as 0).
    pub fn increment(mut self, field: &str, delta: i64) -> Self {
        self.increments.push((field.to_string(), delta));
        self
    }

    /// Appends `value` to the array `field` unless already a member
    /// (missing field counts as an empty array).
    pub fn array_union(mut self, field: &str, value: Value) -> Self {
        self.array_unions.push((field.to_string(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.increments.is_empty() && self.array_unions.is_empty()
    }

    /// Applies the operations to an in-memory document. This is the
    /// reference semantics the SQL compilation in `PgDocumentStore` must
    /// match.
    pub(crate) fn apply(&self, data: &mut Value) {
        if !data.is_object() {
            *data = json!({});
        }
        let Some(obj) = data.as_object_mut() else {
            return;
        };

        for (field, value) in &self.sets {
            obj.insert(field.clone(), value.clone());
        }
        for (field, delta) in &self.increments {
            let current = obj.get(field).and_then(Value::as_i64).unwrap_or(0);
            obj.insert(field.clone(), json!(current + delta));
        }
        for (field, value) in &self.array_unions {
            let entry = obj.entry(field.clone()).or_insert_with(|| json!([]));
            if !entry.is_array() {
                *entry = json!([]);
            }
            if let Some(arr) = entry.as_array_mut() {
                if !arr.contains(value) {
                    arr.push(value.clone());
                }
            }
        }
    }
}

/// The persistence contract required by the core services: read one
/// document, list a (sub)collection, append with a generated id, and
/// apply field operations atomically.
///
/// No multi-document transaction is assumed; callers that need stronger
/// guarantees must design around single-document updates.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches one document by collection path and id.
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, AppError>;

    /// Lists every document in a collection path, oldest first.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, AppError>;

    /// Creates a document with a store-generated id and returns the id.
    async fn create(&self, collection: &str, fields: Value) -> Result<String, AppError>;

    /// Applies `update` to one document in a single round-trip and
    /// returns the post-update document.
    async fn update(
        &self,
        collection: &str,
        doc_id: &str,
        update: DocumentUpdate,
    ) -> Result<Document, AppError>;
}

// ============ PostgreSQL-backed store ============

/// Document store over a Postgres JSONB table. Documents live in a single
/// `documents` table keyed by (collection path, document id).
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

enum BindValue {
    Json(Value),
    Int(i64),
}

/// Compiles a `DocumentUpdate` into a single JSONB expression over the
/// `data` column, collecting bind values in parameter order starting at
/// `$3` ($1/$2 address the row).
///
/// Field names are interpolated into the SQL text; they are crate-defined
/// constants, never caller input.
fn compile_update(update: &DocumentUpdate) -> (String, Vec<BindValue>) {
    let mut expr = String::from("data");
    let mut binds = Vec::new();
    let mut param = 3;

    for (field, value) in &update.sets {
        expr = format!("jsonb_set({expr}, '{{{field}}}', ${param})");
        binds.push(BindValue::Json(value.clone()));
        param += 1;
    }
    for (field, delta) in &update.increments {
        // Reads the pre-update column value, so the add happens inside the
        // UPDATE itself rather than as a client round-trip.
        expr = format!(
            "jsonb_set({expr}, '{{{field}}}', \
             to_jsonb(COALESCE((data->>'{field}')::BIGINT, 0) + ${param}))"
        );
        binds.push(BindValue::Int(*delta));
        param += 1;
    }
    for (field, value) in &update.array_unions {
        expr = format!(
            "jsonb_set({expr}, '{{{field}}}', \
             CASE WHEN COALESCE(data->'{field}', '[]'::jsonb) @> ${param} \
             THEN COALESCE(data->'{field}', '[]'::jsonb) \
             ELSE COALESCE(data->'{field}', '[]'::jsonb) || ${param} END)"
        );
        // Bound as a one-element array so both containment and concat work.
        binds.push(BindValue::Json(json!([value])));
        param += 1;
    }

    (expr, binds)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, AppError> {
        let data = sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 AND doc_id = $2",
        )
        .bind(collection)
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(data.map(|data| Document {
            id: doc_id.to_string(),
            data,
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            "SELECT doc_id, data FROM documents \
             WHERE collection = $1 \
             ORDER BY created_at ASC, doc_id ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, data)| Document { id, data })
            .collect())
    }

    async fn create(&self, collection: &str, fields: Value) -> Result<String, AppError> {
        let doc_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO documents (collection, doc_id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&doc_id)
            .bind(fields)
            .execute(&self.pool)
            .await?;

        Ok(doc_id)
    }

    async fn update(
        &self,
        collection: &str,
        doc_id: &str,
        update: DocumentUpdate,
    ) -> Result<Document, AppError> {
        if update.is_empty() {
            return self.get(collection, doc_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("Document {}/{} not found", collection, doc_id))
            });
        }

        let (expr, binds) = compile_update(&update);
        let sql = format!(
            "UPDATE documents SET data = {expr}, updated_at = now() \
             WHERE collection = $1 AND doc_id = $2 RETURNING data"
        );

        let mut query = sqlx::query_scalar::<_, Value>(&sql)
            .bind(collection)
            .bind(doc_id);
        for bind in binds {
            query = match bind {
                BindValue::Json(value) => query.bind(value),
                BindValue::Int(value) => query.bind(value),
            };
        }

        let data = query.fetch_optional(&self.pool).await?.ok_or_else(|| {
            AppError::NotFound(format!("Document {}/{} not found", collection, doc_id))
        })?;

        Ok(Document {
            id: doc_id.to_string(),
            data,
        })
    }
}

// ============ In-memory store ============

/// In-memory `DocumentStore` with the same observable semantics as the
/// Postgres store. Used by the test suites; documents keep insertion
/// order per collection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document under a caller-chosen id.
    pub async fn insert(&self, collection: &str, doc_id: &str, data: Value) {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|(id, _)| id == doc_id) {
            Some((_, existing)) => *existing = data,
            None => docs.push((doc_id.to_string(), data)),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(id, _)| id == doc_id)
                .map(|(id, data)| Document {
                    id: id.clone(),
                    data: data.clone(),
                })
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, fields: Value) -> Result<String, AppError> {
        let doc_id = Uuid::new_v4().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push((doc_id.clone(), fields));
        Ok(doc_id)
    }

    async fn update(
        &self,
        collection: &str,
        doc_id: &str,
        update: DocumentUpdate,
    ) -> Result<Document, AppError> {
        let mut collections = self.collections.write().await;
        let docs = collections.get_mut(collection).ok_or_else(|| {
            AppError::NotFound(format!("Document {}/{} not found", collection, doc_id))
        })?;
        let (_, data) = docs
            .iter_mut()
            .find(|(id, _)| id == doc_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Document {}/{} not found", collection, doc_id))
            })?;
        update.apply(data);
        Ok(Document {
            id: doc_id.to_string(),
            data: data.clone(),
        })
    }
}
