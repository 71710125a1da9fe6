//! Throwaway SQLite databases for tests

use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

/// A small shop database: customers, orders (FK to customers), and an
/// order_items table with a composite primary key.
pub(crate) fn shop_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT DEFAULT 'Lisbon'
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            total REAL,
            receipt BLOB
        );
        CREATE TABLE order_items (
            sku TEXT,
            order_id INTEGER,
            qty INTEGER,
            PRIMARY KEY (order_id, sku),
            FOREIGN KEY (order_id) REFERENCES orders(id)
        );
        INSERT INTO customers (id, name, city) VALUES (1, 'Ana', 'Porto'), (2, 'Bruno', NULL);
        INSERT INTO orders (id, customer_id, total, receipt) VALUES (10, 1, 19.5, x'cafe'), (11, 1, 5.0, NULL);
        "#,
    )
    .unwrap();
    (dir, path)
}

pub(crate) fn count(path: &PathBuf, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}
