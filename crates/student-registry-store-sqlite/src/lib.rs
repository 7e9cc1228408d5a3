use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use student_registry_core::{StudentFields, StudentId, StudentRecord};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS students (
  id TEXT PRIMARY KEY CHECK (length(id) = 24),
  name TEXT NOT NULL CHECK (length(trim(name)) > 0),
  age INTEGER NOT NULL CHECK (age >= 1),
  class_name TEXT NOT NULL CHECK (length(trim(class_name)) > 0),
  created_at_ns INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_created_at ON students(created_at_ns);
";

const SELECT_STUDENT_COLUMNS: &str = "SELECT id, name, age, class_name, created_at_ns FROM students";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub student_count: u64,
    pub schema_status: SchemaStatus,
}

impl SqliteStore {
    /// Open a SQLite-backed student store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending bootstrap steps.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Create the `students` table when it does not exist yet.
    ///
    /// # Errors
    /// Returns an error when bootstrapping fails or the database carries an unknown version.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        if version == 0 {
            {
                let tx =
                    self.write_transaction().context("failed to start migration transaction")?;
                // Another connection may have bootstrapped while this one waited for the lock.
                if current_schema_version(&tx)? == 0 {
                    tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
                    record_schema_version(&tx, 1)?;
                    tx.commit().context("failed to commit migration v1")?;
                    tracing::info!("applied student store schema version 1");
                }
            }
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Persist a new student, assigning its identifier and creation time.
    ///
    /// # Errors
    /// Returns an error when the record fails validation or the insert fails.
    pub fn create_student(&mut self, fields: &StudentFields) -> Result<StudentRecord> {
        let record =
            StudentRecord::from_fields(StudentId::new(), OffsetDateTime::now_utc(), fields.clone());
        self.insert_record(&record)?;
        Ok(record)
    }

    fn insert_record(&mut self, record: &StudentRecord) -> Result<()> {
        record.validate().map_err(|err| anyhow!("record validation failed: {err}"))?;

        let tx = self.write_transaction()?;
        tx.execute(
            "INSERT INTO students(id, name, age, class_name, created_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.name,
                record.age,
                record.class_name,
                unix_nanos(record.created_at)?,
            ],
        )
        .context("failed to insert student")?;
        tx.commit().context("failed to commit student insert")?;
        Ok(())
    }

    /// Load every student, newest first.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded from `SQLite`.
    pub fn list_students(&self) -> Result<Vec<StudentRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_STUDENT_COLUMNS} ORDER BY created_at_ns DESC, id DESC"))?;

        let mut rows = stmt.query([])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(read_student(row)?);
        }

        Ok(students)
    }

    /// Look up one student by identifier.
    ///
    /// # Errors
    /// Returns an error when the query or row decoding fails.
    pub fn get_student(&self, id: StudentId) -> Result<Option<StudentRecord>> {
        find_student(&self.conn, id)
    }

    /// Overwrite every mutable field of one student; `None` when the id is absent.
    ///
    /// # Errors
    /// Returns an error when validation or any statement in the transaction fails.
    pub fn replace_student(
        &mut self,
        id: StudentId,
        fields: &StudentFields,
    ) -> Result<Option<StudentRecord>> {
        let tx = self.write_transaction()?;
        let changed = tx
            .execute(
                "UPDATE students SET name = ?1, age = ?2, class_name = ?3 WHERE id = ?4",
                params![fields.name, fields.age, fields.class_name, id.to_string()],
            )
            .context("failed to update student")?;
        if changed == 0 {
            return Ok(None);
        }

        let updated = find_student(&tx, id)?
            .ok_or_else(|| anyhow!("student {id} vanished inside its update transaction"))?;
        updated.validate().map_err(|err| anyhow!("record validation failed: {err}"))?;
        tx.commit().context("failed to commit student update")?;
        Ok(Some(updated))
    }

    /// Remove one student and return the removed snapshot; `None` when the id is absent.
    ///
    /// # Errors
    /// Returns an error when any statement in the transaction fails.
    pub fn delete_student(&mut self, id: StudentId) -> Result<Option<StudentRecord>> {
        let tx = self.write_transaction()?;
        let Some(snapshot) = find_student(&tx, id)? else {
            return Ok(None);
        };

        tx.execute("DELETE FROM students WHERE id = ?1", params![id.to_string()])
            .context("failed to delete student")?;
        tx.commit().context("failed to commit student delete")?;
        Ok(Some(snapshot))
    }

    /// Immediate, so the write lock (and `busy_timeout`) applies before the first read.
    fn write_transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start write transaction")
    }

    /// Run quick-check plus row-count and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        let student_count = if schema_status.current_version > 0 {
            let count = self
                .conn
                .query_row("SELECT COUNT(*) FROM students", [], |row| row.get::<_, i64>(0))
                .context("failed to count students")?;
            u64::try_from(count).with_context(|| format!("negative student count: {count}"))?
        } else {
            0
        };

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            student_count,
            schema_status,
        })
    }
}

fn find_student(conn: &Connection, id: StudentId) -> Result<Option<StudentRecord>> {
    let mut stmt = conn.prepare(&format!("{SELECT_STUDENT_COLUMNS} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_student(row)?)),
        None => Ok(None),
    }
}

fn read_student(row: &Row<'_>) -> Result<StudentRecord> {
    let id_raw: String = row.get(0)?;
    let created_at_ns: i64 = row.get(4)?;

    Ok(StudentRecord {
        id: StudentId::parse(&id_raw).map_err(|err| anyhow!("corrupt student row: {err}"))?,
        name: row.get(1)?,
        age: row.get(2)?,
        class_name: row.get(3)?,
        created_at: OffsetDateTime::from_unix_timestamp_nanos(i128::from(created_at_ns))
            .with_context(|| format!("invalid created_at_ns: {created_at_ns}"))?,
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = rfc3339(OffsetDateTime::now_utc())?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn unix_nanos(value: OffsetDateTime) -> Result<i64> {
    i64::try_from(value.unix_timestamp_nanos())
        .with_context(|| format!("timestamp out of storable range: {value}"))
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::thread;

    use super::*;
    use time::Duration;
    use ulid::Ulid;

    fn fields(name: &str, age: u32, class_name: &str) -> StudentFields {
        StudentFields { name: name.to_string(), age, class_name: class_name.to_string() }
    }

    fn memory_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    // Test IDs: TDB-001
    #[test]
    fn sqlite_checks_reject_invalid_rows() -> Result<()> {
        let store = memory_store()?;

        let bad_age = store.conn.execute(
            "INSERT INTO students(id, name, age, class_name, created_at_ns) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![StudentId::new().to_string(), "A", 0_i64, "10A1", 0_i64],
        );
        assert!(bad_age.is_err());

        let blank_name = store.conn.execute(
            "INSERT INTO students(id, name, age, class_name, created_at_ns) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![StudentId::new().to_string(), "   ", 10_i64, "10A1", 0_i64],
        );
        assert!(blank_name.is_err());

        let short_id = store.conn.execute(
            "INSERT INTO students(id, name, age, class_name, created_at_ns) VALUES (?1, ?2, ?3, ?4, ?5)",
            params!["abc", "A", 10_i64, "10A1", 0_i64],
        );
        assert!(short_id.is_err());

        Ok(())
    }

    // Test IDs: TDB-002
    #[test]
    fn created_students_receive_distinct_ids() -> Result<()> {
        let mut store = memory_store()?;

        let a = store.create_student(&fields("Nguyen Van A", 15, "10A1"))?;
        let b = store.create_student(&fields("Tran Thi B", 16, "10A2"))?;
        assert_ne!(a.id, b.id);

        let ids = store.list_students()?.iter().map(|record| record.id).collect::<BTreeSet<_>>();
        assert_eq!(ids.len(), 2);
        Ok(())
    }

    // Test IDs: TDB-003
    #[test]
    fn duplicate_id_is_rejected() -> Result<()> {
        let mut store = memory_store()?;
        let record = StudentRecord::from_fields(
            StudentId::new(),
            OffsetDateTime::now_utc(),
            fields("A", 10, "5A"),
        );

        store.insert_record(&record)?;
        assert!(store.insert_record(&record).is_err());
        Ok(())
    }

    // Test IDs: TDB-004
    #[test]
    fn create_and_get_round_trip_preserves_fields_and_timestamp() -> Result<()> {
        let mut store = memory_store()?;
        let created = store.create_student(&fields("Le Van C", 14, "9A3"))?;

        let loaded = store
            .get_student(created.id)?
            .ok_or_else(|| anyhow!("created student should be readable"))?;
        assert_eq!(loaded, created);
        Ok(())
    }

    // Test IDs: TDB-005
    #[test]
    fn list_orders_newest_first_with_id_tie_break() -> Result<()> {
        let mut store = memory_store()?;
        let base = OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000);

        let oldest = StudentRecord::from_fields(
            StudentId::from_bytes([1; 12]),
            base,
            fields("Oldest", 10, "5A"),
        );
        let tie_low = StudentRecord::from_fields(
            StudentId::from_bytes([2; 12]),
            base + Duration::seconds(5),
            fields("Tie low", 10, "5A"),
        );
        let tie_high = StudentRecord::from_fields(
            StudentId::from_bytes([3; 12]),
            base + Duration::seconds(5),
            fields("Tie high", 10, "5A"),
        );
        store.insert_record(&tie_low)?;
        store.insert_record(&oldest)?;
        store.insert_record(&tie_high)?;

        let names = store.list_students()?.into_iter().map(|record| record.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["Tie high", "Tie low", "Oldest"]);
        Ok(())
    }

    // Test IDs: TDB-006
    #[test]
    fn replace_overwrites_fields_but_keeps_identity() -> Result<()> {
        let mut store = memory_store()?;
        let created = store.create_student(&fields("Pham D", 15, "10A1"))?;

        let replacement = fields("Pham Van D", 16, "11A1");
        let updated = store
            .replace_student(created.id, &replacement)?
            .ok_or_else(|| anyhow!("existing student should be updated"))?;
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.fields(), replacement);

        let again = store
            .replace_student(created.id, &replacement)?
            .ok_or_else(|| anyhow!("existing student should be updated twice"))?;
        assert_eq!(again, updated);
        assert_eq!(store.list_students()?, vec![updated]);
        Ok(())
    }

    // Test IDs: TDB-007
    #[test]
    fn replace_and_delete_report_absent_ids() -> Result<()> {
        let mut store = memory_store()?;
        let absent = StudentId::from_bytes([0; 12]);

        assert_eq!(store.replace_student(absent, &fields("X", 1, "1A"))?, None);
        assert_eq!(store.delete_student(absent)?, None);
        assert_eq!(store.get_student(absent)?, None);
        Ok(())
    }

    // Test IDs: TDB-008
    #[test]
    fn delete_returns_snapshot_and_removes_row() -> Result<()> {
        let mut store = memory_store()?;
        let keep = store.create_student(&fields("Keep", 12, "7A"))?;
        let gone = store.create_student(&fields("Gone", 13, "8A"))?;

        let snapshot = store
            .delete_student(gone.id)?
            .ok_or_else(|| anyhow!("existing student should be deleted"))?;
        assert_eq!(snapshot, gone);
        assert_eq!(store.get_student(gone.id)?, None);
        assert_eq!(store.list_students()?, vec![keep]);
        Ok(())
    }

    // Test IDs: TDB-009
    #[test]
    fn schema_status_reports_pending_bootstrap_until_migrated() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;

        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.pending_versions, vec![1]);

        store.migrate()?;
        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());
        Ok(())
    }

    // Test IDs: TDB-010
    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let mut store = memory_store()?;
        store.create_student(&fields("A", 10, "5A"))?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert_eq!(report.student_count, 1);
        assert_eq!(report.schema_status.current_version, 1);
        Ok(())
    }

    // Test IDs: TCONC-001
    #[test]
    fn concurrent_writes_and_reads_preserve_integrity() -> Result<()> {
        let db_path =
            std::env::temp_dir().join(format!("student-registry-concurrency-{}.sqlite3", Ulid::new()));
        {
            let mut init = SqliteStore::open(&db_path)?;
            init.migrate()?;
        }

        let writer_threads = 4;
        let writes_per_thread = 20;
        let reader_threads = 2;
        let read_iterations = 30;

        let mut handles = Vec::new();

        for writer in 0..writer_threads {
            let writer_path = db_path.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                let mut store = SqliteStore::open(&writer_path)?;
                store.migrate()?;
                for index in 0..writes_per_thread {
                    store.create_student(&fields(&format!("writer-{writer}-{index}"), 10, "5A"))?;
                }
                Ok(())
            }));
        }

        for _ in 0..reader_threads {
            let reader_path = db_path.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                let store = SqliteStore::open(&reader_path)?;
                for _ in 0..read_iterations {
                    let _ = store.list_students()?;
                }
                Ok(())
            }));
        }

        for handle in handles {
            let Ok(thread_result) = handle.join() else {
                return Err(anyhow!("concurrency thread panicked"));
            };
            thread_result?;
        }

        let store = SqliteStore::open(&db_path)?;
        let students = store.list_students()?;
        assert_eq!(students.len(), writer_threads * writes_per_thread);
        assert_eq!(
            students.iter().map(|record| record.id).collect::<BTreeSet<_>>().len(),
            students.len()
        );

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);

        remove_db_files(&db_path)
    }

    // Test IDs: TCONC-002
    #[test]
    fn concurrent_deletes_of_disjoint_rows_all_succeed() -> Result<()> {
        let db_path =
            std::env::temp_dir().join(format!("student-registry-deletes-{}.sqlite3", Ulid::new()));
        let deleter_threads = 4;
        let rows_per_deleter = 50;
        let creator_threads = 2;
        let creates_per_thread = 50;

        let mut batches = Vec::new();
        {
            let mut init = SqliteStore::open(&db_path)?;
            init.migrate()?;
            for deleter in 0..deleter_threads {
                let mut ids = Vec::new();
                for index in 0..rows_per_deleter {
                    let record =
                        init.create_student(&fields(&format!("seed-{deleter}-{index}"), 12, "6A"))?;
                    ids.push(record.id);
                }
                batches.push(ids);
            }
        }

        let mut handles = Vec::new();
        for ids in batches {
            let deleter_path = db_path.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                let mut store = SqliteStore::open(&deleter_path)?;
                store.migrate()?;
                for id in ids {
                    let removed = store.delete_student(id)?;
                    assert_eq!(removed.map(|record| record.id), Some(id));
                }
                Ok(())
            }));
        }
        for creator in 0..creator_threads {
            let creator_path = db_path.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                let mut store = SqliteStore::open(&creator_path)?;
                store.migrate()?;
                for index in 0..creates_per_thread {
                    store.create_student(&fields(&format!("new-{creator}-{index}"), 13, "7A"))?;
                }
                Ok(())
            }));
        }

        for handle in handles {
            let Ok(thread_result) = handle.join() else {
                return Err(anyhow!("concurrency thread panicked"));
            };
            thread_result?;
        }

        let store = SqliteStore::open(&db_path)?;
        let students = store.list_students()?;
        assert_eq!(students.len(), creator_threads * creates_per_thread);
        assert!(students.iter().all(|record| record.name.starts_with("new-")));

        drop(store);
        remove_db_files(&db_path)
    }

    fn remove_db_files(db_path: &std::path::Path) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let path = if suffix.is_empty() {
                db_path.to_path_buf()
            } else {
                std::path::PathBuf::from(format!("{}{}", db_path.display(), suffix))
            };
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to cleanup sqlite file {}", path.display()))?;
            }
        }

        Ok(())
    }
}
