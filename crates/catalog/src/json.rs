use serde_json::Value;
use streaming::JsonObject;

/// Fields handled outside the stratum data of a model.
pub const DERIVED_FIELDS: [&str; 2] = ["dereferenced", "knownContainerUniqueIds"];

/// Deep-merges `source` into `target`: nested objects merge key by key,
/// everything else (arrays included) is replaced.
pub fn merge_into(target: &mut JsonObject, source: &JsonObject) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn merged(base: &JsonObject, overlay: &JsonObject) -> JsonObject {
    let mut out = base.clone();
    merge_into(&mut out, overlay);
    out
}

/// Copy of `data` without the derived fields.
pub fn clean_stratum_data(data: &JsonObject) -> JsonObject {
    data.iter()
        .filter(|(k, _)| !DERIVED_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn string_field<'a>(data: &'a JsonObject, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{clean_stratum_data, merged};

    fn obj(v: serde_json::Value) -> streaming::JsonObject {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn nested_objects_merge_arrays_replace() {
        let base = obj(json!({"style": {"color": "red", "size": 1}, "tags": [1, 2]}));
        let overlay = obj(json!({"style": {"size": 2}, "tags": [3]}));
        assert_eq!(
            serde_json::Value::Object(merged(&base, &overlay)),
            json!({"style": {"color": "red", "size": 2}, "tags": [3]})
        );
    }

    #[test]
    fn derived_fields_are_dropped() {
        let data = obj(json!({
            "name": "x",
            "dereferenced": {"a": 1},
            "knownContainerUniqueIds": ["/"]
        }));
        assert_eq!(serde_json::Value::Object(clean_stratum_data(&data)), json!({"name": "x"}));
    }
}
