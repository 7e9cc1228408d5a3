use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use ulid::Ulid;

/// Byte length of a [`StudentId`]; the textual form is twice as long.
pub const STUDENT_ID_BYTES: usize = 12;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("invalid student id: {0}")]
    InvalidIdentifier(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("student not found: {0}")]
    NotFound(StudentId),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RegistryError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    Validation,
    NotFound,
    StoreUnavailable,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "invalid_identifier",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Document identifier: 4 bytes of big-endian Unix seconds followed by 8 random bytes,
/// rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StudentId([u8; STUDENT_ID_BYTES]);

impl StudentId {
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(OffsetDateTime::now_utc(), Ulid::new().random())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; STUDENT_ID_BYTES]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; STUDENT_ID_BYTES] {
        &self.0
    }

    fn from_parts(at: OffsetDateTime, entropy: u128) -> Self {
        let seconds = u32::try_from(at.unix_timestamp()).unwrap_or(u32::MAX);
        let entropy = entropy.to_be_bytes();

        let mut bytes = [0_u8; STUDENT_ID_BYTES];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&entropy[8..]);
        Self(bytes)
    }

    /// Parse the 24-character hex form of an identifier.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidIdentifier`] when `raw` is not exactly
    /// 24 hexadecimal characters.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        if raw.len() != STUDENT_ID_BYTES * 2 {
            return Err(RegistryError::InvalidIdentifier(format!(
                "`{raw}` must be {} hexadecimal characters",
                STUDENT_ID_BYTES * 2
            )));
        }

        let mut bytes = [0_u8; STUDENT_ID_BYTES];
        hex::decode_to_slice(raw, &mut bytes).map_err(|err| {
            RegistryError::InvalidIdentifier(format!("`{raw}` is not hexadecimal: {err}"))
        })?;
        Ok(Self(bytes))
    }
}

impl Default for StudentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for StudentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for StudentId {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for StudentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validated, trimmed field values of one student.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct StudentFields {
    pub name: String,
    pub age: u32,
    #[serde(rename = "class")]
    pub class_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: StudentId,
    pub name: String,
    pub age: u32,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StudentRecord {
    /// Build a freshly identified record from validated fields.
    #[must_use]
    pub fn from_fields(id: StudentId, created_at: OffsetDateTime, fields: StudentFields) -> Self {
        Self {
            id,
            name: fields.name,
            age: fields.age,
            class_name: fields.class_name,
            created_at,
        }
    }

    #[must_use]
    pub fn fields(&self) -> StudentFields {
        StudentFields {
            name: self.name.clone(),
            age: self.age,
            class_name: self.class_name.clone(),
        }
    }

    /// Check the persisted-record invariants.
    ///
    /// # Errors
    /// Returns [`RegistryError::Validation`] when `name` or `class` is blank or `age` is zero.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name MUST NOT be empty".to_string());
        }
        if self.age == 0 {
            problems.push("age MUST be a positive integer".to_string());
        }
        if self.class_name.trim().is_empty() {
            problems.push("class MUST NOT be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Validation(problems.join("; ")))
        }
    }
}

/// Unvalidated create/update body as it arrives on the wire.
///
/// Every field is optional here so that a missing field is reported by
/// [`StudentPayload::validate`] instead of by the JSON decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct StudentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl StudentPayload {
    #[must_use]
    pub fn new(name: impl Into<String>, age: i64, class_name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), age: Some(age), class_name: Some(class_name.into()) }
    }

    /// Validate a full-document payload and return trimmed field values.
    ///
    /// All of `name`, `age` and `class` are required; partial payloads are rejected
    /// rather than merged.
    ///
    /// # Errors
    /// Returns [`RegistryError::Validation`] listing every missing or invalid field.
    pub fn validate(&self) -> Result<StudentFields, RegistryError> {
        let missing = [
            ("name", self.name.is_none()),
            ("age", self.age.is_none()),
            ("class", self.class_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(RegistryError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let name = self.name.as_deref().unwrap_or_default().trim().to_string();
        let class_name = self.class_name.as_deref().unwrap_or_default().trim().to_string();
        let raw_age = self.age.unwrap_or_default();

        let mut problems = Vec::new();
        if name.is_empty() {
            problems.push("name MUST NOT be empty".to_string());
        }
        let age = match u32::try_from(raw_age) {
            Ok(age) if age > 0 => age,
            _ => {
                problems.push(format!("age MUST be a positive integer, got {raw_age}"));
                0
            }
        };
        if class_name.is_empty() {
            problems.push("class MUST NOT be empty".to_string());
        }

        if !problems.is_empty() {
            return Err(RegistryError::Validation(problems.join("; ")));
        }

        Ok(StudentFields { name, age, class_name })
    }
}

impl From<StudentFields> for StudentPayload {
    fn from(fields: StudentFields) -> Self {
        Self {
            name: Some(fields.name),
            age: Some(i64::from(fields.age)),
            class_name: Some(fields.class_name),
        }
    }
}
