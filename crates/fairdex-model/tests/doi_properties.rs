use fairdex_model::{normalize_doi, Doi};
use proptest::prelude::*;

proptest! {
    #[test]
    fn normalize_is_idempotent(s in "\\PC{0,64}") {
        let once = normalize_doi(&s);
        let twice = normalize_doi(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn parse_accepts_all_resolver_forms(
        registrant in "[0-9]{4,6}",
        suffix in "[a-zA-Z0-9._-]{1,24}",
    ) {
        let bare = format!("10.{registrant}/{suffix}");
        let expected = Doi::parse(&bare).unwrap();
        for wrapped in [
            format!("https://doi.org/{bare}"),
            format!("http://dx.doi.org/{bare}"),
            format!("doi:{bare}"),
            format!("  {bare}\t"),
        ] {
            let parsed = Doi::parse(&wrapped).unwrap();
            prop_assert_eq!(parsed.as_str(), expected.as_str());
        }
    }

    #[test]
    fn parsed_doi_is_bare_and_trimmed(s in "\\PC{0,64}") {
        if let Ok(doi) = Doi::parse(&s) {
            prop_assert!(doi.as_str().starts_with("10."));
            prop_assert!(!doi.as_str().chars().any(char::is_whitespace));
        }
    }
}
