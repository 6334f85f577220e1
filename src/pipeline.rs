//! Host pipeline adapters
//!
//! Two host contracts sit on top of the validator: the pre-ingest hooks
//! ([`PreIngestPlugin`]) and the single-entry check ([`EntryValidator`]).
//! Both are thin wrappers over [`SchematronValidator::check`].

use tracing::debug;

use crate::error::{ExecutionError, StopProcessing, ValidationError};
use crate::validator::{BatchEntry, SchematronValidator};

/// A catalog entry offered for ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    /// XML metadata document
    pub metadata: Option<String>,
}

impl Entry {
    pub fn new(id: impl Into<String>, metadata: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: Some(metadata.into()),
        }
    }

    /// An entry carrying no metadata
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub entries: Vec<Entry>,
}

/// Replacement entries keyed by the id they replace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub updates: Vec<(String, Entry)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    pub ids: Vec<String>,
}

/// Hooks run by the host before entries are ingested
pub trait PreIngestPlugin {
    fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, StopProcessing>;

    fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, StopProcessing>;

    fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, StopProcessing>;
}

/// Checks one entry outside any request
pub trait EntryValidator {
    fn validate(&self, entry: &Entry) -> Result<(), ValidationError>;
}

impl SchematronValidator {
    /// Validate entries in order. The first invalid entry stops processing;
    /// its message names its 1-based position.
    fn validate_entries<'e>(&self, entries: impl Iterator<Item = &'e Entry>) -> Result<(), StopProcessing> {
        for (index, entry) in entries.enumerate() {
            let number = index + 1;
            debug!(entry = number, id = %entry.id, "Validating entry");
            let outcome = metadata(entry)
                .map_err(ValidationError::from)
                .and_then(|document| self.validate_entry(number, document.as_bytes()));
            let checked = BatchEntry { entry: number, outcome };
            if let Some(message) = checked.failure_message() {
                return Err(StopProcessing(message));
            }
        }
        Ok(())
    }
}

fn metadata(entry: &Entry) -> Result<&str, ExecutionError> {
    entry
        .metadata
        .as_deref()
        .ok_or_else(|| ExecutionError::MissingMetadata(entry.id.clone()))
}

impl PreIngestPlugin for SchematronValidator {
    fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, StopProcessing> {
        self.validate_entries(request.entries.iter())?;
        Ok(request)
    }

    fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, StopProcessing> {
        self.validate_entries(request.updates.iter().map(|(_, entry)| entry))?;
        Ok(request)
    }

    fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, StopProcessing> {
        Ok(request)
    }
}

impl EntryValidator for SchematronValidator {
    fn validate(&self, entry: &Entry) -> Result<(), ValidationError> {
        let metadata = metadata(entry)?;
        SchematronValidator::validate(self, metadata.as_bytes()).map(|_| ())
    }
}
