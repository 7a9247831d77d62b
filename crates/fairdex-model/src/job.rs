use crate::dataset::IdentifierType;
use serde::{Deserialize, Serialize};

/// What a scoring worker needs to evaluate one dataset. Handed out by the
/// dispatcher at claim time; the backing queue row is already gone by then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub dataset_id: i64,
    pub identifier: String,
    pub identifier_type: IdentifierType,
}

impl JobDescriptor {
    #[must_use]
    pub fn new(dataset_id: i64, identifier: &str, identifier_type: IdentifierType) -> Self {
        Self {
            dataset_id,
            identifier: identifier.to_string(),
            identifier_type,
        }
    }
}
