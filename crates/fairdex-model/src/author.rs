use serde::{Deserialize, Serialize};

/// Creator kind, mirroring the DataCite `nameType` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameType {
    Personal,
    Organizational,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameIdentifier {
    /// Identifier scheme, e.g. `ORCID` or `ROR`.
    pub scheme: String,
    pub value: String,
}

/// A dataset creator. Tagged record rather than a free-form JSON blob:
/// consumers branch on `name_type` instead of sniffing field presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name_type: NameType,
    pub name: String,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub name_identifiers: Vec<NameIdentifier>,
}

impl Author {
    #[must_use]
    pub fn personal(name: &str) -> Self {
        Self {
            name_type: NameType::Personal,
            name: name.to_string(),
            affiliations: Vec::new(),
            name_identifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn organizational(name: &str) -> Self {
        Self {
            name_type: NameType::Organizational,
            name: name.to_string(),
            affiliations: Vec::new(),
            name_identifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn orcid(&self) -> Option<&str> {
        self.name_identifiers
            .iter()
            .find(|id| id.scheme.eq_ignore_ascii_case("orcid"))
            .map(|id| id.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serde_round_trip() {
        let author = Author {
            name_type: NameType::Personal,
            name: "Ada Lovelace".to_string(),
            affiliations: vec!["University of London".to_string()],
            name_identifiers: vec![NameIdentifier {
                scheme: "ORCID".to_string(),
                value: "0000-0001-2345-6789".to_string(),
            }],
        };
        let json = serde_json::to_string(&author).unwrap();
        assert!(json.contains("\"Personal\""));
        let back: Author = serde_json::from_str(&json).unwrap();
        assert_eq!(back, author);
        assert_eq!(back.orcid(), Some("0000-0001-2345-6789"));
    }

    #[test]
    fn optional_lists_default_empty() {
        let author: Author =
            serde_json::from_str(r#"{"name_type":"Organizational","name":"CERN"}"#).unwrap();
        assert_eq!(author.name_type, NameType::Organizational);
        assert!(author.affiliations.is_empty());
        assert!(author.orcid().is_none());
    }
}
