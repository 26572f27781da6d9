use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::Mutex;

/// r2d2 manager for the application's own DuckDB file. Pooled connections
/// are clones of one root connection so they share a single database
/// instance.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn open(path: &str) -> Result<Self, duckdb::Error> {
        let root = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            root: Mutex::new(root),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2d2::Pool;

    #[test]
    fn pooled_connections_see_each_others_writes() {
        let pool = Pool::builder()
            .max_size(2)
            .build(DuckDBConnectionManager::open(":memory:").unwrap())
            .unwrap();

        let writer = pool.get().unwrap();
        writer.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (42);").unwrap();

        let reader = pool.get().unwrap();
        let x: i32 = reader.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 42);
    }
}
