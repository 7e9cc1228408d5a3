use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use student_registry_core::{StudentId, StudentPayload, StudentRecord};

use crate::ClientError;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a successful `DELETE /api/students/:id`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DeletedStudent {
    pub message: String,
    pub student: StudentRecord,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Blocking JSON client for the student registry service.
#[derive(Debug, Clone)]
pub struct StudentsClient {
    agent: ureq::Agent,
    base_url: String,
}

impl StudentsClient {
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, base_url: base_url.trim_end_matches('/').to_string() }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// # Errors
    /// Returns `ClientError::Api` for any non-2xx status, `Transport` when the
    /// server cannot be reached and `Decode` for an unexpected body. Calls that
    /// take an id return `InvalidIdentifier` without a request when it does
    /// not parse.
    pub fn list(&self) -> Result<Vec<StudentRecord>, ClientError> {
        decode(self.agent.get(&self.url("/api/students")).call())
    }

    /// # Errors
    /// See [`StudentsClient::list`].
    pub fn get(&self, id: &str) -> Result<StudentRecord, ClientError> {
        decode(self.agent.get(&self.student_url(id)?).call())
    }

    /// # Errors
    /// See [`StudentsClient::list`].
    pub fn create(&self, payload: &StudentPayload) -> Result<StudentRecord, ClientError> {
        decode(self.agent.post(&self.url("/api/students")).send_json(payload))
    }

    /// # Errors
    /// See [`StudentsClient::list`].
    pub fn update(&self, id: &str, payload: &StudentPayload) -> Result<StudentRecord, ClientError> {
        decode(self.agent.put(&self.student_url(id)?).send_json(payload))
    }

    /// # Errors
    /// See [`StudentsClient::list`].
    pub fn delete(&self, id: &str) -> Result<DeletedStudent, ClientError> {
        decode(self.agent.delete(&self.student_url(id)?).call())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Only canonical ids reach the path, so nothing typed can alter the route.
    fn student_url(&self, id: &str) -> Result<String, ClientError> {
        let id = StudentId::parse(id)
            .map_err(|err| ClientError::InvalidIdentifier(err.to_string()))?;
        Ok(self.url(&format!("/api/students/{id}")))
    }
}

fn decode<T>(result: Result<ureq::Response, ureq::Error>) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    match result {
        Ok(response) => {
            response.into_json::<T>().map_err(|err| ClientError::Decode(err.to_string()))
        }
        Err(ureq::Error::Status(status, response)) => {
            let message = response.into_json::<ErrorBody>().ok().map(|body| body.error);
            tracing::debug!(status, message = ?message, "student registry request rejected");
            Err(ClientError::api(status, message))
        }
        Err(ureq::Error::Transport(transport)) => {
            tracing::debug!("student registry unreachable: {transport}");
            Err(ClientError::Transport(transport.to_string()))
        }
    }
}
