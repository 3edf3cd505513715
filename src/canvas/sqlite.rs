//! SQLite Canvas Store
//!
//! - Connection pooling via r2d2
//! - Panic-safe transactions with automatic rollback
//! - Version-tracked migrations
//! - WAL mode for concurrent readers during a batch insert
//!
//! rusqlite is blocking; every trait method hops onto `spawn_blocking`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{
    CanvasStore, GroupResult, StoreError, StoreResult, validate_attrs, validate_patch,
};
use crate::config::StorageConfig;
use crate::types::{Canvas, CanvasObject, CanvasObjectAttrs, ObjectPatch};

const SCHEMA: &str = include_str!("schema.sql");

const SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "Index objects by group",
    up: "CREATE INDEX IF NOT EXISTS idx_objects_group ON canvas_objects(canvas_id, group_id)",
}];

const OBJECT_COLUMNS: &str = "id, canvas_id, object_type, x, y, width, height, rotation, \
                              z_index, group_id, properties, created_at, updated_at";

// =============================================================================
// Database
// =============================================================================

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    pub fn from_storage(config: &StorageConfig) -> Self {
        let max_size = config.max_connections.max(1);
        Self {
            max_size,
            min_idle: (max_size / 4).max(1),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_storage(&StorageConfig::default())
    }
}

/// Pooled SQLite handle
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P, config: PoolConfig) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);
        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)
            .map_err(|e| StoreError::Backend(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    /// Single-connection in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )
    }

    fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Fresh databases get the full schema; older ones get pending migrations.
    fn initialize(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if current == 0 {
            conn.execute_batch(SCHEMA)?;
        } else {
            for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
                conn.execute_batch(migration.up)?;
                tracing::info!(
                    version = migration.version,
                    "Applied migration: {}",
                    migration.description
                );
            }
        }

        if current < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Run `f` inside a transaction.
    ///
    /// `Err` or a panic rolls back; a panic is reported as a backend error
    /// instead of poisoning the pool.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));
        match result {
            Ok(Ok(value)) => {
                tx.commit()?;
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(StoreError::Backend(format!("Transaction panicked: {}", panic_msg)))
            }
        }
    }

    /// Run `f` with a pooled connection, outside a transaction
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn()?;
        f(&conn)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("Bad timestamp '{}': {}", value, e)))
}

struct ObjectRow {
    id: String,
    canvas_id: String,
    object_type: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    rotation: f64,
    z_index: Option<i64>,
    group_id: Option<String>,
    properties: String,
    created_at: String,
    updated_at: String,
}

impl ObjectRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            canvas_id: row.get(1)?,
            object_type: row.get(2)?,
            x: row.get(3)?,
            y: row.get(4)?,
            width: row.get(5)?,
            height: row.get(6)?,
            rotation: row.get(7)?,
            z_index: row.get(8)?,
            group_id: row.get(9)?,
            properties: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_object(self) -> StoreResult<CanvasObject> {
        let properties: Map<String, Value> = serde_json::from_str(&self.properties)
            .map_err(|e| StoreError::Backend(format!("Bad properties for {}: {}", self.id, e)))?;
        Ok(CanvasObject {
            attrs: CanvasObjectAttrs {
                object_type: self.object_type,
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                rotation: self.rotation,
                z_index: self.z_index,
                group_id: self.group_id,
                properties,
            },
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            canvas_id: self.canvas_id,
        })
    }
}

fn encode_properties(properties: &Map<String, Value>) -> StoreResult<String> {
    serde_json::to_string(properties)
        .map_err(|e| StoreError::Backend(format!("Failed to encode properties: {}", e)))
}

fn require_canvas(conn: &Connection, canvas_id: &str) -> StoreResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM canvases WHERE id = ?1",
            params![canvas_id],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::CanvasNotFound(canvas_id.to_string())),
    }
}

fn load_object(conn: &Connection, canvas_id: &str, object_id: &str) -> StoreResult<CanvasObject> {
    require_canvas(conn, canvas_id)?;
    let sql = format!(
        "SELECT {} FROM canvas_objects WHERE canvas_id = ?1 AND id = ?2",
        OBJECT_COLUMNS
    );
    conn.query_row(&sql, params![canvas_id, object_id], ObjectRow::read)
        .optional()?
        .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))?
        .into_object()
}

fn store_object(conn: &Connection, object: &CanvasObject) -> StoreResult<()> {
    let attrs = &object.attrs;
    conn.execute(
        "UPDATE canvas_objects
         SET x = ?1, y = ?2, width = ?3, height = ?4, rotation = ?5,
             z_index = ?6, group_id = ?7, properties = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            attrs.x,
            attrs.y,
            attrs.width,
            attrs.height,
            attrs.rotation,
            attrs.z_index,
            attrs.group_id,
            encode_properties(&attrs.properties)?,
            object.updated_at.to_rfc3339(),
            object.id,
        ],
    )?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

/// Canvas store persisted in SQLite
#[derive(Clone)]
pub struct SqliteCanvasStore {
    db: Arc<Database>,
}

impl SqliteCanvasStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn open<P: AsRef<Path>>(path: P, config: PoolConfig) -> StoreResult<Self> {
        Ok(Self::new(Database::open(path, config)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl CanvasStore for SqliteCanvasStore {
    async fn canvas_exists(&self, canvas_id: &str) -> StoreResult<bool> {
        let canvas_id = canvas_id.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| match require_canvas(conn, &canvas_id) {
                Ok(()) => Ok(true),
                Err(StoreError::CanvasNotFound(_)) => Ok(false),
                Err(e) => Err(e),
            })
        })
        .await
    }

    async fn create_canvas(&self, name: &str) -> StoreResult<Canvas> {
        let canvas = Canvas {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let row = canvas.clone();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO canvases (id, name, created_at) VALUES (?1, ?2, ?3)",
                    params![row.id, row.name, row.created_at.to_rfc3339()],
                )?;
                Ok(())
            })
        })
        .await?;
        Ok(canvas)
    }

    async fn get_canvas(&self, canvas_id: &str) -> StoreResult<Canvas> {
        let canvas_id = canvas_id.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let row: Option<(String, String, String)> = conn
                    .query_row(
                        "SELECT id, name, created_at FROM canvases WHERE id = ?1",
                        params![canvas_id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let (id, name, created_at) =
                    row.ok_or_else(|| StoreError::CanvasNotFound(canvas_id.clone()))?;
                Ok(Canvas {
                    id,
                    name,
                    created_at: parse_time(&created_at)?,
                })
            })
        })
        .await
    }

    async fn create_objects_batch(
        &self,
        canvas_id: &str,
        attrs: Vec<CanvasObjectAttrs>,
    ) -> StoreResult<Vec<CanvasObject>> {
        let canvas_id = canvas_id.to_string();
        let created = self
            .blocking(move |db| {
                db.transaction(|conn| {
                    require_canvas(conn, &canvas_id)?;
                    let mut next_z: i64 = conn.query_row(
                        "SELECT COALESCE(MAX(z_index) + 1, 0) FROM canvas_objects WHERE canvas_id = ?1",
                        params![canvas_id],
                        |row| row.get(0),
                    )?;

                    let mut created = Vec::with_capacity(attrs.len());
                    for (index, mut entry) in attrs.into_iter().enumerate() {
                        validate_attrs(&entry)
                            .map_err(|reason| StoreError::InvalidAttributes { index, reason })?;
                        if entry.z_index.is_none() {
                            entry.z_index = Some(next_z);
                            next_z += 1;
                        }
                        let object = CanvasObject::from_attrs(&canvas_id, entry);
                        let a = &object.attrs;
                        conn.execute(
                            &format!(
                                "INSERT INTO canvas_objects ({}) \
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                                OBJECT_COLUMNS
                            ),
                            params![
                                object.id,
                                object.canvas_id,
                                a.object_type,
                                a.x,
                                a.y,
                                a.width,
                                a.height,
                                a.rotation,
                                a.z_index,
                                a.group_id,
                                encode_properties(&a.properties)?,
                                object.created_at.to_rfc3339(),
                                object.updated_at.to_rfc3339(),
                            ],
                        )
                        .map_err(|e| StoreError::InvalidAttributes {
                            index,
                            reason: e.to_string(),
                        })?;
                        created.push(object);
                    }
                    Ok(created)
                })
            })
            .await?;
        tracing::debug!(count = created.len(), "Committed object batch");
        Ok(created)
    }

    async fn get_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<CanvasObject> {
        let (canvas_id, object_id) = (canvas_id.to_string(), object_id.to_string());
        self.blocking(move |db| db.with_conn(|conn| load_object(conn, &canvas_id, &object_id)))
            .await
    }

    async fn list_objects(&self, canvas_id: &str) -> StoreResult<Vec<CanvasObject>> {
        let canvas_id = canvas_id.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                require_canvas(conn, &canvas_id)?;
                let sql = format!(
                    "SELECT {} FROM canvas_objects WHERE canvas_id = ?1 \
                     ORDER BY z_index, created_at",
                    OBJECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![canvas_id], ObjectRow::read)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.into_iter().map(ObjectRow::into_object).collect()
            })
        })
        .await
    }

    async fn update_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        patch: &ObjectPatch,
    ) -> StoreResult<CanvasObject> {
        validate_patch(object_id, patch)?;
        let (canvas_id, object_id, patch) =
            (canvas_id.to_string(), object_id.to_string(), patch.clone());
        self.blocking(move |db| {
            db.transaction(|conn| {
                let mut object = load_object(conn, &canvas_id, &object_id)?;
                object.apply(&patch);
                store_object(conn, &object)?;
                Ok(object)
            })
        })
        .await
    }

    async fn delete_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<()> {
        let (canvas_id, object_id) = (canvas_id.to_string(), object_id.to_string());
        self.blocking(move |db| {
            db.with_conn(|conn| {
                require_canvas(conn, &canvas_id)?;
                let deleted = conn.execute(
                    "DELETE FROM canvas_objects WHERE canvas_id = ?1 AND id = ?2",
                    params![canvas_id, object_id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::ObjectNotFound(object_id.clone()));
                }
                Ok(())
            })
        })
        .await
    }

    async fn group_objects(
        &self,
        canvas_id: &str,
        object_ids: &[String],
        group_id: Option<String>,
    ) -> StoreResult<GroupResult> {
        let canvas_id = canvas_id.to_string();
        let object_ids = object_ids.to_vec();
        let group_id = group_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.blocking(move |db| {
            db.transaction(|conn| {
                let patch = ObjectPatch {
                    group_id: Some(group_id.clone()),
                    ..Default::default()
                };
                let mut objects = Vec::with_capacity(object_ids.len());
                for id in &object_ids {
                    let mut object = load_object(conn, &canvas_id, id)?;
                    object.apply(&patch);
                    store_object(conn, &object)?;
                    objects.push(object);
                }
                Ok(GroupResult {
                    group_id: group_id.clone(),
                    objects,
                })
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn rect(x: f64) -> CanvasObjectAttrs {
        CanvasObjectAttrs::new("rectangle", x, 0.0, 50.0, 30.0).with_property("color", "red")
    }

    #[tokio::test]
    async fn test_batch_round_trip() {
        let store = SqliteCanvasStore::open_in_memory().unwrap();
        let canvas = store.create_canvas("Board").await.unwrap();
        assert!(store.canvas_exists(&canvas.id).await.unwrap());

        let created = store
            .create_objects_batch(&canvas.id, vec![rect(0.0), rect(75.0)])
            .await
            .unwrap();
        let listed = store.list_objects(&canvas.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, created[0].id);
        assert_eq!(listed[1].attrs.x, 75.0);
        assert_eq!(listed[1].attrs.properties["color"], json!("red"));
    }

    #[tokio::test]
    async fn test_invalid_entry_rolls_back_batch() {
        let store = SqliteCanvasStore::open_in_memory().unwrap();
        let canvas = store.create_canvas("Board").await.unwrap();

        let bad = CanvasObjectAttrs::new("blob", 0.0, 0.0, 10.0, 10.0);
        let err = store
            .create_objects_batch(&canvas.id, vec![rect(0.0), rect(75.0), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAttributes { index: 2, .. }));
        assert!(store.list_objects(&canvas.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = SqliteCanvasStore::open_in_memory().unwrap();
        let canvas = store.create_canvas("Board").await.unwrap();
        let created = store
            .create_objects_batch(&canvas.id, vec![rect(0.0)])
            .await
            .unwrap();
        let id = &created[0].id;

        let rotated = store.rotate_object(&canvas.id, id, 450.0).await.unwrap();
        assert_eq!(rotated.attrs.rotation, 90.0);

        let mut props = Map::new();
        props.insert("color".into(), json!("blue"));
        store.restyle_object(&canvas.id, id, props).await.unwrap();
        let reloaded = store.get_object(&canvas.id, id).await.unwrap();
        assert_eq!(reloaded.attrs.properties["color"], json!("blue"));
        assert_eq!(reloaded.attrs.rotation, 90.0);

        store.delete_object(&canvas.id, id).await.unwrap();
        assert!(matches!(
            store.get_object(&canvas.id, id).await,
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_rolls_back_on_missing_member() {
        let store = SqliteCanvasStore::open_in_memory().unwrap();
        let canvas = store.create_canvas("Board").await.unwrap();
        let created = store
            .create_objects_batch(&canvas.id, vec![rect(0.0)])
            .await
            .unwrap();

        let ids = vec![created[0].id.clone(), "ghost".to_string()];
        assert!(matches!(
            store.group_objects(&canvas.id, &ids, None).await,
            Err(StoreError::ObjectNotFound(ref id)) if id == "ghost"
        ));
        let object = store.get_object(&canvas.id, &created[0].id).await.unwrap();
        assert!(object.attrs.group_id.is_none());
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("canvas.db");

        let canvas_id = {
            let store = SqliteCanvasStore::open(&path, PoolConfig::default()).unwrap();
            let canvas = store.create_canvas("Persisted").await.unwrap();
            store
                .create_objects_batch(&canvas.id, vec![rect(0.0)])
                .await
                .unwrap();
            canvas.id
        };

        let reopened = SqliteCanvasStore::open(&path, PoolConfig::default()).unwrap();
        assert_eq!(reopened.get_canvas(&canvas_id).await.unwrap().name, "Persisted");
        assert_eq!(reopened.list_objects(&canvas_id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_panic_is_contained() {
        let db = Database::open_in_memory().unwrap();
        let result: StoreResult<()> = db.transaction(|_conn| panic!("boom"));
        assert!(matches!(result, Err(StoreError::Backend(ref m)) if m.contains("boom")));
        assert!(db.with_conn(|_| Ok(())).is_ok());
    }
}
