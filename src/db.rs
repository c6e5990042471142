//! Local SQLite ledger for the back office.
//!
//! Mirrors the hosted backend's tables so the back office can run offline
//! and so the services can be exercised without a network. Uses rusqlite
//! with WAL mode and versioned migrations.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Database connection plus the file it was opened from.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

const DB_FILE_NAME: &str = "backoffice.db";

/// Open (or create) the ledger at `{data_dir}/backoffice.db` and run any
/// pending migrations.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| Error::Config(format!("failed to create data dir: {e}")))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = Connection::open(&db_path)?;
    configure(&conn, true)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// In-memory ledger with the full schema applied.
pub fn open_in_memory() -> Result<DbState> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, false)?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn configure(conn: &Connection, wal: bool) -> Result<()> {
    if wal {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: sales, products, expenses and vouchers.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            cost_price REAL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL,
            total REAL NOT NULL DEFAULT 0,
            payment_method TEXT,
            status TEXT NOT NULL DEFAULT 'completed',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS sale_items (
            id TEXT PRIMARY KEY,
            sale_id TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
            product_id TEXT,
            quantity INTEGER NOT NULL DEFAULT 0,
            unit_price REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL DEFAULT 'otros',
            branch_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS coupons (
            id TEXT PRIMARY KEY,
            code TEXT,
            branch_id TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            redeemed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sales_branch_created ON sales(branch_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_sale_items_sale ON sale_items(sale_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_branch_created ON expenses(branch_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_coupons_branch_status ON coupons(branch_id, status);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        Error::from(e)
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: cash cuts and their review stamps.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cash_cuts (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL,
            date TEXT NOT NULL,
            total_cash REAL NOT NULL DEFAULT 0,
            total_card REAL NOT NULL DEFAULT 0,
            total_transfer REAL NOT NULL DEFAULT 0,
            expenses_amount REAL NOT NULL DEFAULT 0,
            calculated_total REAL NOT NULL DEFAULT 0,
            notes TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            approved_by TEXT,
            approved_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE(branch_id, date)
        );

        CREATE INDEX IF NOT EXISTS idx_cash_cuts_date ON cash_cuts(date);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        Error::from(e)
    })?;

    info!("Applied migration v2");
    Ok(())
}

/// Migration v3: quotations and user profiles.
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS quotations (
            id TEXT PRIMARY KEY,
            folio INTEGER NOT NULL UNIQUE,
            client_id TEXT,
            client_name TEXT,
            branch_id TEXT NOT NULL,
            created_by TEXT,
            items TEXT NOT NULL DEFAULT '[]',
            subtotal REAL NOT NULL DEFAULT 0,
            discount_amount REAL NOT NULL DEFAULT 0,
            iva REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            branch_id TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_quotations_created ON quotations(created_at);

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        Error::from(e)
    })?;

    info!("Applied migration v3");
    Ok(())
}

// ---------------------------------------------------------------------------
// Lenient column readers
// ---------------------------------------------------------------------------

/// Read a numeric column using SQLite's stored type. Text that parses as a
/// number is accepted; NULL and anything else read as 0.
pub(crate) fn f64_at(row: &Row, idx: usize) -> f64 {
    opt_f64_at(row, idx).unwrap_or(0.0)
}

/// Like [`f64_at`] but keeps NULL distinct from zero.
pub(crate) fn opt_f64_at(row: &Row, idx: usize) -> Option<f64> {
    match row.get_ref(idx) {
        Ok(ValueRef::Integer(v)) => Some(v as f64),
        Ok(ValueRef::Real(v)) => Some(v),
        Ok(ValueRef::Null) => None,
        Ok(ValueRef::Text(raw)) => {
            let text = String::from_utf8_lossy(raw);
            match text.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    warn!(column = idx, value = %text, "non-numeric value coerced to 0");
                    Some(0.0)
                }
            }
        }
        Ok(ValueRef::Blob(_)) | Err(_) => {
            warn!(column = idx, "unreadable numeric column coerced to 0");
            Some(0.0)
        }
    }
}

pub(crate) fn i64_at(row: &Row, idx: usize) -> i64 {
    match row.get_ref(idx) {
        Ok(ValueRef::Integer(v)) => v,
        Ok(ValueRef::Real(v)) => v.trunc() as i64,
        _ => f64_at(row, idx).trunc() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_all_tables() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        let tables = table_names(&conn);
        for table in [
            "cash_cuts",
            "coupons",
            "expenses",
            "products",
            "profiles",
            "quotations",
            "sale_items",
            "sales",
            "schema_version",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        run_migrations(&conn).expect("second run");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_cash_cut_unique_per_branch_and_day() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cash_cuts (id, branch_id, date) VALUES ('c1', 'BR-1', '2026-03-14')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO cash_cuts (id, branch_id, date) VALUES ('c2', 'BR-1', '2026-03-14')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_lenient_numeric_readers() {
        let db = open_in_memory().expect("open");
        let conn = db.conn.lock().unwrap();
        let (a, b, c, d, q): (f64, Option<f64>, f64, f64, i64) = conn
            .query_row(
                "SELECT 12.5, NULL, '7.25', 'abc', 3.9",
                [],
                |row| {
                    Ok((
                        f64_at(row, 0),
                        opt_f64_at(row, 1),
                        f64_at(row, 2),
                        f64_at(row, 3),
                        i64_at(row, 4),
                    ))
                },
            )
            .unwrap();
        assert_eq!(a, 12.5);
        assert_eq!(b, None);
        assert_eq!(c, 7.25);
        assert_eq!(d, 0.0);
        assert_eq!(q, 3);
    }

    #[test]
    fn test_init_creates_file_database() {
        let dir = std::env::temp_dir().join(format!("backoffice_db_{}", uuid::Uuid::new_v4()));
        let db = init(&dir).expect("init");
        assert!(db.db_path.exists());
        let mode: String = db
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
