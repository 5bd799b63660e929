//! Reading the application URL's hash fragment.
//!
//! The fragment is a query string: `#clean&start=<json>&share=<id>&foo=bar&init-name`.

use url::{Url, form_urlencoded};

/// A key/value pair of the hash, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashProperty {
    /// `clean`: drop every pending init source.
    Clean,
    /// `start=<json>`: inline start data.
    Start(String),
    /// `share=<id>`: start data held by the share service.
    Share(String),
    /// Any other key with a non-empty value.
    User { key: String, value: String },
    /// Any other key without a value names an init fragment.
    InitFragment(String),
}

pub fn parse_hash(url: &Url) -> Vec<HashProperty> {
    let Some(fragment) = url.fragment() else {
        return Vec::new();
    };
    form_urlencoded::parse(fragment.as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| match (key.as_ref(), value.as_ref()) {
            ("clean", _) => HashProperty::Clean,
            ("start", _) => HashProperty::Start(value.into_owned()),
            ("share", id) if !id.is_empty() => HashProperty::Share(value.into_owned()),
            (_, "") => HashProperty::InitFragment(key.into_owned()),
            _ => HashProperty::User {
                key: key.into_owned(),
                value: value.into_owned(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::{HashProperty, parse_hash};

    #[test]
    fn reserved_keys_and_fragments_are_told_apart() {
        let url = Url::parse(
            "https://example.com/#clean&foo=bar&simple&start=%7B%22a%22%3A1%7D&share=s-1",
        )
        .unwrap();
        assert_eq!(
            parse_hash(&url),
            vec![
                HashProperty::Clean,
                HashProperty::User {
                    key: "foo".to_string(),
                    value: "bar".to_string()
                },
                HashProperty::InitFragment("simple".to_string()),
                HashProperty::Start("{\"a\":1}".to_string()),
                HashProperty::Share("s-1".to_string()),
            ]
        );
    }

    #[test]
    fn no_fragment_means_nothing_to_do() {
        let url = Url::parse("https://example.com/index.html").unwrap();
        assert!(parse_hash(&url).is_empty());
    }
}
