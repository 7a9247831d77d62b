use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const DOI_MAX_LEN: usize = 512;

/// Strips resolver URL and `doi:` scheme prefixes and trims whitespace.
/// Accepts `https://doi.org/10.x/y`, `http://dx.doi.org/10.x/y`,
/// `doi:10.x/y`, and bare `10.x/y` forms.
#[must_use]
pub fn normalize_doi(input: &str) -> String {
    let mut s = input.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
    ] {
        if let Some(rest) = strip_prefix_ignore_case(s, prefix) {
            s = rest;
            break;
        }
    }
    if let Some(rest) = strip_prefix_ignore_case(s, "doi:") {
        s = rest;
    }
    s.trim().to_string()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Doi(String);

impl Doi {
    /// Normalizes then validates. A DOI is `10.<registrant>/<suffix>` with a
    /// numeric registrant of at least four digits.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = normalize_doi(input);
        if s.is_empty() {
            return Err(ValidationError("doi must not be empty".to_string()));
        }
        if s.len() > DOI_MAX_LEN {
            return Err(ValidationError(format!("doi exceeds max length {DOI_MAX_LEN}")));
        }
        let rest = s
            .strip_prefix("10.")
            .ok_or_else(|| ValidationError("doi must start with '10.'".to_string()))?;
        let (registrant, suffix) = rest
            .split_once('/')
            .ok_or_else(|| ValidationError("doi must contain a '/' separating prefix and suffix".to_string()))?;
        if registrant.len() < 4 || !registrant.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ValidationError(
                "doi registrant must be numeric (e.g. 10.5281/...)".to_string(),
            ));
        }
        if suffix.is_empty() {
            return Err(ValidationError("doi suffix must not be empty".to_string()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(ValidationError("doi must not contain whitespace".to_string()));
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Case-insensitive comparison key. DOI names compare equal regardless of
    /// case, so lookups key on this rather than the display form.
    #[must_use]
    pub fn lookup_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl Display for Doi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_resolver_prefixes() {
        for input in [
            "https://doi.org/10.5281/zenodo.123",
            "http://dx.doi.org/10.5281/zenodo.123",
            "doi:10.5281/zenodo.123",
            "  10.5281/zenodo.123  ",
        ] {
            assert_eq!(normalize_doi(input), "10.5281/zenodo.123");
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Doi::parse("").is_err());
        assert!(Doi::parse("not-a-doi").is_err());
        assert!(Doi::parse("10.12/short-registrant").is_err());
        assert!(Doi::parse("10.5281/").is_err());
        assert!(Doi::parse("10.5281/has space").is_err());
    }

    #[test]
    fn lookup_key_is_case_insensitive() {
        let a = Doi::parse("10.5281/Zenodo.ABC").unwrap();
        let b = Doi::parse("10.5281/zenodo.abc").unwrap();
        assert_eq!(a.lookup_key(), b.lookup_key());
        assert_ne!(a.as_str(), b.as_str());
    }
}
