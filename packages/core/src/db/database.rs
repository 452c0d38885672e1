//! Database Connection Management
//!
//! This module provides the database connection and schema bootstrap for the
//! catalog store using libsql.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Idempotent bootstrap**: `CREATE TABLE IF NOT EXISTS`, safe on every start
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection handed out
//!
//! # Units of Work
//!
//! Multi-statement writes run on a single connection between `BEGIN IMMEDIATE`
//! and `COMMIT`. Callers obtain the connection from [`DatabaseService::begin_write`]
//! and hand the result of their work to [`DatabaseService::finish`], which
//! commits on success and rolls back on any error.
//!
//! ```no_run
//! # use tailorspace_core::db::{DatabaseService, DatabaseError};
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let db_service = DatabaseService::new(PathBuf::from("./catalog.db")).await?;
//! let conn = db_service.begin_write().await?;
//! let result: Result<u64, DatabaseError> = conn
//!     .execute("DELETE FROM fabrics WHERE id = 7", ())
//!     .await
//!     .map_err(DatabaseError::from);
//! let removed = DatabaseService::finish(&conn, result).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use tailorspace_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/catalog.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        tracing::info!("Catalog database ready at {}", service.db_path.display());
        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// # Schema
    ///
    /// - `fabric_groups`: named swatch collections
    /// - `fabrics`: swatches, deleted with their group
    /// - `nodes`: the self-referential product tree
    /// - `node_fabric_images`: per (node, fabric) image override
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        let statements: [(&str, &str); 4] = [
            (
                "fabric_groups",
                "CREATE TABLE IF NOT EXISTS fabric_groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT
                )",
            ),
            (
                "fabrics",
                "CREATE TABLE IF NOT EXISTS fabrics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    image_urls TEXT,
                    fabric_group_id INTEGER NOT NULL,
                    FOREIGN KEY (fabric_group_id) REFERENCES fabric_groups(id) ON DELETE CASCADE
                )",
            ),
            (
                "nodes",
                "CREATE TABLE IF NOT EXISTS nodes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    price REAL NOT NULL DEFAULT 0,
                    image_urls TEXT,
                    parent_id INTEGER,
                    meta_type TEXT NOT NULL DEFAULT 'product',
                    attributes_list TEXT NOT NULL DEFAULT '[]',
                    fabric_group_id INTEGER,
                    attribute_name TEXT,
                    -- Parent deletion cascades to children (tree structure)
                    FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE,
                    FOREIGN KEY (fabric_group_id) REFERENCES fabric_groups(id) ON DELETE SET NULL
                )",
            ),
            (
                "node_fabric_images",
                "CREATE TABLE IF NOT EXISTS node_fabric_images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    node_id INTEGER NOT NULL,
                    fabric_id INTEGER NOT NULL,
                    image_urls TEXT NOT NULL,
                    UNIQUE (node_id, fabric_id),
                    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE,
                    FOREIGN KEY (fabric_id) REFERENCES fabrics(id) ON DELETE CASCADE
                )",
            ),
        ];

        for (table, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        self.create_indexes(&conn).await?;

        Ok(())
    }

    /// Create lookup indexes used by the tree engine
    async fn create_indexes(&self, conn: &Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_nodes_parent",
                "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
            ),
            (
                "idx_fabrics_group",
                "CREATE INDEX IF NOT EXISTS idx_fabrics_group ON fabrics(fabric_group_id)",
            ),
            (
                "idx_node_fabric_images_fabric",
                "CREATE INDEX IF NOT EXISTS idx_node_fabric_images_fabric ON node_fabric_images(fabric_id)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection to the database
    ///
    /// The connection has no pragmas applied. Prefer `connect_with_timeout()`,
    /// which also enables foreign keys.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    ///
    /// `foreign_keys` is a per-connection setting in SQLite, so every
    /// connection used by the catalog goes through here.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Open a write unit of work
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front so two concurrent
    /// reconciliations serialize on the busy timeout instead of failing at
    /// commit time.
    pub async fn begin_write(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(conn)
    }

    /// Open a read unit of work for a consistent multi-table snapshot
    pub async fn begin_read(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute("BEGIN", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin read transaction: {}", e))
        })?;
        Ok(conn)
    }

    /// Close a unit of work opened by `begin_write` / `begin_read`
    ///
    /// Commits when `result` is `Ok`, rolls back otherwise. A failed commit is
    /// rolled back and reported through `E`.
    pub async fn finish<T, E>(conn: &Connection, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(E::from(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    ))));
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!("Rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Checkpoint the WAL before shutdown
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}
