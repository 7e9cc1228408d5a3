use student_registry_core::{StudentId, StudentPayload, StudentRecord};

use crate::http::{DeletedStudent, StudentsClient};
use crate::view::StudentListView;
use crate::ClientError;

/// The calls the controller makes against the registry.
pub trait StudentsBackend {
    /// # Errors
    /// Returns the transport or API failure for the call.
    fn list(&self) -> Result<Vec<StudentRecord>, ClientError>;
    /// # Errors
    /// Returns the transport or API failure for the call.
    fn get(&self, id: &str) -> Result<StudentRecord, ClientError>;
    /// # Errors
    /// Returns the transport or API failure for the call.
    fn create(&self, payload: &StudentPayload) -> Result<StudentRecord, ClientError>;
    /// # Errors
    /// Returns the transport or API failure for the call.
    fn update(&self, id: &str, payload: &StudentPayload) -> Result<StudentRecord, ClientError>;
    /// # Errors
    /// Returns the transport or API failure for the call.
    fn delete(&self, id: &str) -> Result<DeletedStudent, ClientError>;
}

impl StudentsBackend for StudentsClient {
    fn list(&self) -> Result<Vec<StudentRecord>, ClientError> {
        StudentsClient::list(self)
    }

    fn get(&self, id: &str) -> Result<StudentRecord, ClientError> {
        StudentsClient::get(self, id)
    }

    fn create(&self, payload: &StudentPayload) -> Result<StudentRecord, ClientError> {
        StudentsClient::create(self, payload)
    }

    fn update(&self, id: &str, payload: &StudentPayload) -> Result<StudentRecord, ClientError> {
        StudentsClient::update(self, id, payload)
    }

    fn delete(&self, id: &str) -> Result<DeletedStudent, ClientError> {
        StudentsClient::delete(self, id)
    }
}

const CREATE_FAILED: &str = "could not add student";
const UPDATE_FAILED: &str = "could not update student";
const DELETE_FAILED: &str = "could not delete student";

/// Drives a [`StudentListView`] from a backend: one load per page visit,
/// then local patches from each mutation's response.
#[derive(Debug)]
pub struct StudentListController<B = StudentsClient> {
    backend: B,
    view: StudentListView,
}

impl<B> StudentListController<B>
where
    B: StudentsBackend,
{
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend, view: StudentListView::new() }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn view(&self) -> &StudentListView {
        &self.view
    }

    /// Search, sort, notification and highlight changes go through here.
    pub fn view_mut(&mut self) -> &mut StudentListView {
        &mut self.view
    }

    /// Fetch the whole list. On failure the view is left in `Failed`.
    ///
    /// # Errors
    /// Returns the backend failure after recording it on the view.
    pub fn load(&mut self) -> Result<(), ClientError> {
        self.view.begin_loading();
        match self.backend.list() {
            Ok(students) => {
                tracing::debug!(count = students.len(), "student list loaded");
                self.view.loaded(Ok(students));
                Ok(())
            }
            Err(err) => {
                tracing::warn!("student list failed to load: {err}");
                self.view.loaded(Err(err.to_string()));
                Err(err)
            }
        }
    }

    /// Re-fetch on navigation back to the listing.
    ///
    /// # Errors
    /// See [`StudentListController::load`].
    pub fn reload(&mut self) -> Result<(), ClientError> {
        self.load()
    }

    /// # Errors
    /// `NotReady` outside `Ready`, `Validation` for a draft that would be
    /// rejected, otherwise the backend failure.
    pub fn create(&mut self, draft: &StudentPayload) -> Result<StudentRecord, ClientError> {
        self.ensure_ready()?;
        self.prevalidate(draft)?;
        match self.backend.create(draft) {
            Ok(student) => {
                self.view.apply_created(student.clone());
                Ok(student)
            }
            Err(err) => Err(self.fail(err, CREATE_FAILED)),
        }
    }

    /// # Errors
    /// See [`StudentListController::create`].
    pub fn update(
        &mut self,
        id: &str,
        draft: &StudentPayload,
    ) -> Result<StudentRecord, ClientError> {
        self.ensure_ready()?;
        self.prevalidate(draft)?;
        match self.backend.update(id, draft) {
            Ok(student) => {
                self.view.apply_updated(student.clone());
                Ok(student)
            }
            Err(err) => Err(self.fail(err, UPDATE_FAILED)),
        }
    }

    /// # Errors
    /// `NotReady` outside `Ready`, otherwise the backend failure.
    pub fn delete(&mut self, id: &str) -> Result<DeletedStudent, ClientError> {
        self.ensure_ready()?;
        match self.backend.delete(id) {
            Ok(deleted) => {
                self.view.apply_deleted(&deleted.student);
                Ok(deleted)
            }
            Err(err) => Err(self.fail(err, DELETE_FAILED)),
        }
    }

    /// One student for the edit form: the cached row when the list holds it,
    /// otherwise a fetch from the backend.
    ///
    /// # Errors
    /// Returns the backend failure when the row is not cached.
    pub fn fetch(&self, id: &str) -> Result<StudentRecord, ClientError> {
        if let Some(cached) = StudentId::parse(id).ok().and_then(|parsed| self.cached(parsed)) {
            return Ok(cached.clone());
        }
        self.backend.get(id)
    }

    /// Cached copy of one student, if the list holds it.
    #[must_use]
    pub fn cached(&self, id: StudentId) -> Option<&StudentRecord> {
        self.view.students().iter().find(|student| student.id == id)
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.view.is_ready() {
            Ok(())
        } else {
            Err(ClientError::NotReady)
        }
    }

    fn prevalidate(&mut self, draft: &StudentPayload) -> Result<(), ClientError> {
        match draft.validate() {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = ClientError::Validation(err.to_string());
                self.view.mutation_failed(err.to_string());
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: ClientError, fallback: &str) -> ClientError {
        tracing::debug!("student mutation failed: {err}");
        self.view.mutation_failed(err.notification_text(fallback));
        err
    }
}
