use crate::author::Author;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifier scheme of a catalog entry. Almost every record is a DOI; the
/// remainder are handles or plain URLs from legacy imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Doi,
    Handle,
    Url,
}

impl IdentifierType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::Handle => "handle",
            Self::Url => "url",
        }
    }

    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "handle" => Self::Handle,
            "url" => Self::Url,
            _ => Self::Doi,
        }
    }
}

impl Display for IdentifierType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A catalog entry as read from the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub title: Option<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub published_at: Option<NaiveDate>,
}
