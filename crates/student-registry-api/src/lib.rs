use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use student_registry_core::{
    RegistryError, StudentFields, StudentId, StudentPayload, StudentRecord,
};
use student_registry_store_sqlite::{IntegrityReport, SchemaStatus, SqliteStore};

pub const DELETED_MESSAGE: &str = "Student deleted successfully";

/// Find/create/update/delete primitives of the record store.
///
/// Implementations report infrastructure failures through `anyhow`; absence is
/// reported as `None`, never as an error.
pub trait StudentStore: Send + Sync {
    /// # Errors
    /// Returns an error when the store cannot be reached or read.
    fn find_all(&self) -> Result<Vec<StudentRecord>>;

    /// # Errors
    /// Returns an error when the store cannot be reached or read.
    fn find_by_id(&self, id: StudentId) -> Result<Option<StudentRecord>>;

    /// Persist a new record; the store assigns `id` and `created_at`.
    ///
    /// # Errors
    /// Returns an error when the store rejects or cannot complete the write.
    fn create(&self, fields: &StudentFields) -> Result<StudentRecord>;

    /// # Errors
    /// Returns an error when the store rejects or cannot complete the write.
    fn update(&self, id: StudentId, fields: &StudentFields) -> Result<Option<StudentRecord>>;

    /// # Errors
    /// Returns an error when the store rejects or cannot complete the write.
    fn delete(&self, id: StudentId) -> Result<Option<StudentRecord>>;
}

/// [`StudentStore`] backed by a SQLite file; every call opens its own connection.
#[derive(Debug, Clone)]
pub struct SqliteStudentStore {
    db_path: PathBuf,
}

impl SqliteStudentStore {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without applying migrations. Opening creates the
    /// database file and the `schema_migrations` table if they are missing.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        SqliteStore::open(&self.db_path)?.schema_status()
    }

    /// Run the store's integrity probes.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or a probe fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        self.open_store()?.integrity_check()
    }
}

impl StudentStore for SqliteStudentStore {
    fn find_all(&self) -> Result<Vec<StudentRecord>> {
        self.open_store()?.list_students()
    }

    fn find_by_id(&self, id: StudentId) -> Result<Option<StudentRecord>> {
        self.open_store()?.get_student(id)
    }

    fn create(&self, fields: &StudentFields) -> Result<StudentRecord> {
        self.open_store()?.create_student(fields)
    }

    fn update(&self, id: StudentId, fields: &StudentFields) -> Result<Option<StudentRecord>> {
        self.open_store()?.replace_student(id, fields)
    }

    fn delete(&self, id: StudentId) -> Result<Option<StudentRecord>> {
        self.open_store()?.delete_student(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub message: String,
    pub student: StudentRecord,
}

/// The five registry operations with identifier and payload validation in front of the store.
#[derive(Debug, Clone)]
pub struct StudentRegistryApi<S = SqliteStudentStore> {
    store: S,
}

impl StudentRegistryApi<SqliteStudentStore> {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { store: SqliteStudentStore::new(db_path) }
    }
}

impl<S> StudentRegistryApi<S>
where
    S: StudentStore,
{
    #[must_use]
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return every student, newest first.
    ///
    /// # Errors
    /// Returns [`RegistryError::StoreUnavailable`] when the store fails.
    pub fn list(&self) -> Result<Vec<StudentRecord>, RegistryError> {
        self.store.find_all().map_err(store_unavailable)
    }

    /// Fetch one student by its textual identifier.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidIdentifier`] before touching the store when `raw_id`
    /// is malformed, [`RegistryError::NotFound`] when no record matches, and
    /// [`RegistryError::StoreUnavailable`] when the store fails.
    pub fn get(&self, raw_id: &str) -> Result<StudentRecord, RegistryError> {
        let id = StudentId::parse(raw_id)?;
        self.store.find_by_id(id).map_err(store_unavailable)?.ok_or(RegistryError::NotFound(id))
    }

    /// Validate a payload and persist a new student.
    ///
    /// # Errors
    /// Returns [`RegistryError::Validation`] when the payload is incomplete or invalid, and
    /// [`RegistryError::StoreUnavailable`] when the store fails.
    pub fn create(&self, payload: &StudentPayload) -> Result<StudentRecord, RegistryError> {
        let fields = payload.validate()?;
        let record = self.store.create(&fields).map_err(store_unavailable)?;
        tracing::info!(student_id = %record.id, "created student");
        Ok(record)
    }

    /// Replace every field of one student.
    ///
    /// The identifier is checked first, then the payload, then the store.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidIdentifier`], [`RegistryError::Validation`],
    /// [`RegistryError::NotFound`] or [`RegistryError::StoreUnavailable`].
    pub fn update(
        &self,
        raw_id: &str,
        payload: &StudentPayload,
    ) -> Result<StudentRecord, RegistryError> {
        let id = StudentId::parse(raw_id)?;
        let fields = payload.validate()?;
        let record = self
            .store
            .update(id, &fields)
            .map_err(store_unavailable)?
            .ok_or(RegistryError::NotFound(id))?;
        tracing::info!(student_id = %id, "updated student");
        Ok(record)
    }

    /// Permanently remove one student and return its last state.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidIdentifier`], [`RegistryError::NotFound`] or
    /// [`RegistryError::StoreUnavailable`].
    pub fn delete(&self, raw_id: &str) -> Result<DeleteResult, RegistryError> {
        let id = StudentId::parse(raw_id)?;
        let student =
            self.store.delete(id).map_err(store_unavailable)?.ok_or(RegistryError::NotFound(id))?;
        tracing::info!(student_id = %id, "deleted student");
        Ok(DeleteResult { message: DELETED_MESSAGE.to_string(), student })
    }
}

fn store_unavailable(err: anyhow::Error) -> RegistryError {
    RegistryError::StoreUnavailable(format!("{err:#}"))
}
