use anyhow::Result;
use rust_localpros_api::db::Database;
use std::fs;

/// Imports provider documents from a JSON file into the document store.
///
/// Providers are created outside the API surface; this tool is the
/// operations path for getting a directory seeded or updated. Input is a
/// JSON array of provider objects; an optional `uid` field becomes the
/// document id (one is generated otherwise). Existing documents with the
/// same uid are overwritten.
///
/// Usage: seed_providers [providers.json]
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Import Provider Documents ===\n");

    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DB_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("DB_URL or DATABASE_URL must be set");

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "providers.json".to_string());

    let raw = fs::read_to_string(&path)?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)?;

    let total = entries.len();
    if total == 0 {
        println!("No provider entries found in {}", path);
        return Ok(());
    }

    // Connect to database (creates the documents table if missing)
    println!("Connecting to database...");
    let db = Database::new(&database_url).await?;
    println!("✓ Database connected\n");

    println!("Found {} provider entries to import\n", total);

    let mut success_count = 0;
    let mut fail_count = 0;

    for (idx, entry) in entries.into_iter().enumerate() {
        let Some(mut fields) = entry.as_object().cloned() else {
            eprintln!("[{}/{}] ✗ Skipping non-object entry", idx + 1, total);
            fail_count += 1;
            continue;
        };

        // The uid becomes the document id; it is not stored in the payload.
        let uid = match fields.remove("uid") {
            Some(serde_json::Value::String(uid)) if !uid.is_empty() => uid,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let name = fields
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("<unnamed>")
            .to_string();

        let result = sqlx::query(
            "INSERT INTO documents (collection, doc_id, data) VALUES ('providers', $1, $2) \
             ON CONFLICT (collection, doc_id) \
             DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(&uid)
        .bind(serde_json::Value::Object(fields))
        .execute(&db.pool)
        .await;

        match result {
            Ok(_) => {
                println!("[{}/{}] ✓ {} ({})", idx + 1, total, name, uid);
                success_count += 1;
            }
            Err(e) => {
                eprintln!("[{}/{}] ✗ {} failed: {}", idx + 1, total, name, e);
                fail_count += 1;
            }
        }
    }

    println!("\n=== Import complete ===");
    println!("Imported: {}", success_count);
    println!("Failed:   {}", fail_count);

    Ok(())
}
