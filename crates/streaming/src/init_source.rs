use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::cache::CacheKey;

/// A unit of startup configuration.
///
/// Serialized shapes: `{"initUrl": "..."}`, `{"options": [...]}` (also
/// accepted as `initOptions`) and `{"data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitSource {
    Url {
        #[serde(rename = "initUrl")]
        init_url: String,
    },
    Options {
        #[serde(alias = "initOptions")]
        options: Vec<InitSource>,
    },
    Data {
        data: Value,
    },
}

impl InitSource {
    pub fn url(init_url: impl Into<String>) -> Self {
        InitSource::Url {
            init_url: init_url.into(),
        }
    }

    pub fn data(data: Value) -> Self {
        InitSource::Data { data }
    }

    /// Canonical representation used to memoize resolution.
    ///
    /// `serde_json` objects keep their keys sorted, so equal sources produce
    /// equal keys regardless of how they were built.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(serde_json::to_string(self).unwrap_or_default())
    }
}

/// Builds the init source for an initialization URL or init fragment name.
///
/// Names ending in `.json` (any case) are resolved against `base`. Anything
/// else is a fragment name: every fragment path is tried in order as
/// `<path>/<name>.json`.
pub fn generate_initialization_url(
    base: &Url,
    fragment_paths: &[String],
    name: &str,
) -> InitSource {
    if !name.to_lowercase().ends_with(".json") {
        let options = fragment_paths
            .iter()
            .map(|path| {
                let joined = join_paths(path, &format!("{name}.json"));
                InitSource::url(absolute_to(base, &joined))
            })
            .collect();
        return InitSource::Options { options };
    }
    InitSource::url(absolute_to(base, name))
}

/// Directory of `url`: query, fragment and last path segment removed.
pub fn base_of(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.join("./").unwrap_or(base)
}

fn join_paths(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{file}")
    } else {
        format!("{dir}/{file}")
    }
}

fn absolute_to(base: &Url, reference: &str) -> String {
    base.join(reference)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| reference.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    use super::{InitSource, base_of, generate_initialization_url};

    #[test]
    fn parses_all_shapes() {
        let v = json!([
            {"initUrl": "a.json"},
            {"options": [{"initUrl": "b.json"}]},
            {"initOptions": [{"data": {"x": 1}}]},
            {"data": {"catalog": []}}
        ]);
        let sources: Vec<InitSource> = serde_json::from_value(v).unwrap();
        assert_eq!(sources[0], InitSource::url("a.json"));
        assert!(matches!(sources[1], InitSource::Options { .. }));
        assert!(matches!(&sources[2], InitSource::Options { options } if options.len() == 1));
        assert_eq!(sources[3], InitSource::data(json!({"catalog": []})));
    }

    #[test]
    fn cache_key_ignores_key_order() {
        let a = InitSource::data(serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap());
        let b = InitSource::data(serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn fragment_names_expand_to_options() {
        let base = Url::parse("http://example.com/app/").unwrap();
        let paths = vec!["init/".to_string(), "http://other.org/fragments".to_string()];
        let source = generate_initialization_url(&base, &paths, "terria");
        assert_eq!(
            source,
            InitSource::Options {
                options: vec![
                    InitSource::url("http://example.com/app/init/terria.json"),
                    InitSource::url("http://other.org/fragments/terria.json"),
                ]
            }
        );
    }

    #[test]
    fn json_names_resolve_against_base() {
        let base = Url::parse("http://example.com/app/").unwrap();
        let source = generate_initialization_url(&base, &[], "data/Simple.JSON");
        assert_eq!(source, InitSource::url("http://example.com/app/data/Simple.JSON"));
    }

    #[test]
    fn base_drops_file_query_and_hash() {
        let url = Url::parse("http://example.com/app/index.html?x=1#clean&foo=bar").unwrap();
        assert_eq!(base_of(&url).as_str(), "http://example.com/app/");
    }
}
