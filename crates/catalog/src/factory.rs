use foundation::ModelId;
use streaming::JsonObject;
use tracing::debug;

use crate::error::CatalogError;
use crate::json::{string_field, string_list};
use crate::model::{Model, ModelKind};
use crate::registry::ModelRegistry;

/// Builds an empty model of the given `type`.
pub fn create_model(type_name: Option<&str>, id: ModelId) -> Result<Model, CatalogError> {
    match type_name.map(|t| (t, ModelKind::from_type(t))) {
        Some((_, Some(kind))) => Ok(Model::new(id, kind)),
        Some((t, None)) => Err(CatalogError::UnknownType {
            id,
            type_name: Some(t.to_string()),
        }),
        None => Err(CatalogError::UnknownType {
            id,
            type_name: None,
        }),
    }
}

/// Unique id for member JSON: its `id`, else `<container>/<name>`.
pub fn member_id(container: Option<&ModelId>, json: &JsonObject) -> Option<ModelId> {
    if let Some(id) = string_field(json, "id") {
        return Some(ModelId::new(id));
    }
    let local = string_field(json, "localId").or_else(|| string_field(json, "name"))?;
    Some(match container {
        Some(container) => container.child(local),
        None => ModelId::new(local),
    })
}

/// Writes `json` into stratum `stratum_id` of an existing model, or creates
/// and registers a model of `json.type` first.
pub fn upsert_model_from_json(
    registry: &mut ModelRegistry,
    stratum_id: &str,
    container: Option<&ModelId>,
    json: &JsonObject,
    replace: bool,
) -> Result<ModelId, CatalogError> {
    let id = member_id(container, json).ok_or_else(|| {
        CatalogError::InvalidModel("model JSON needs an `id`, `localId` or `name`".to_string())
    })?;

    if !registry.contains(id.as_str()) {
        let model = create_model(string_field(json, "type"), id.clone())?;
        registry.add_model(model)?;
    }
    for key in string_list(json.get("shareKeys")) {
        registry.add_share_key(id.clone(), key);
    }

    let model = registry
        .get_mut(id.as_str())
        .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
    update_model_from_json(model, stratum_id, json, replace);
    if let Some(container) = container {
        model.add_known_container(container.clone());
    }
    debug!(id = %id, stratum = stratum_id, replace, "model upserted");
    Ok(id)
}

/// Applies `json` to one stratum of `model`. Identity fields are not traits.
pub fn update_model_from_json(
    model: &mut Model,
    stratum_id: &str,
    json: &JsonObject,
    replace: bool,
) {
    let traits: JsonObject = json
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "localId" | "type" | "shareKeys"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    model.strata.update(stratum_id, &traits, replace);
}

#[cfg(test)]
mod tests {
    use foundation::ModelId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{create_model, upsert_model_from_json};
    use crate::error::CatalogError;
    use crate::model::ModelKind;
    use crate::registry::ModelRegistry;
    use crate::strata::DEFINITION;

    fn obj(v: serde_json::Value) -> streaming::JsonObject {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_and_missing_types_are_errors() {
        assert!(matches!(
            create_model(Some("wms"), "a".into()),
            Err(CatalogError::UnknownType { type_name: Some(t), .. }) if t == "wms"
        ));
        assert!(matches!(
            create_model(None, "a".into()),
            Err(CatalogError::UnknownType { type_name: None, .. })
        ));
        assert_eq!(
            create_model(Some("csv"), "a".into()).unwrap().kind(),
            ModelKind::Csv
        );
    }

    #[test]
    fn members_get_ids_from_their_container() {
        let mut registry = ModelRegistry::new();
        let id = upsert_model_from_json(
            &mut registry,
            DEFINITION,
            Some(&"/".into()),
            &obj(json!({"type": "csv", "name": "Rainfall"})),
            false,
        )
        .unwrap();
        assert_eq!(id.as_str(), "//Rainfall");
        let model = registry.get("//Rainfall").unwrap();
        assert_eq!(model.known_container_unique_ids(), &[ModelId::new("/")]);
        assert_eq!(model.strata.get_trait("type"), None);
    }

    #[test]
    fn existing_models_are_updated_in_place() {
        let mut registry = ModelRegistry::new();
        let json = obj(json!({"id": "m", "type": "csv", "name": "A", "opacity": 0.5}));
        upsert_model_from_json(&mut registry, DEFINITION, None, &json, false).unwrap();
        upsert_model_from_json(
            &mut registry,
            "init",
            None,
            &obj(json!({"id": "m", "name": "B"})),
            false,
        )
        .unwrap();
        let model = registry.get("m").unwrap();
        assert_eq!(model.name().as_deref(), Some("B"));
        assert_eq!(model.strata.get_trait("opacity"), Some(json!(0.5)));

        upsert_model_from_json(&mut registry, "init", None, &obj(json!({"id": "m"})), true)
            .unwrap();
        assert_eq!(registry.get("m").unwrap().name().as_deref(), Some("A"));
    }

    #[test]
    fn new_model_without_type_is_rejected() {
        let mut registry = ModelRegistry::new();
        let err =
            upsert_model_from_json(&mut registry, DEFINITION, None, &obj(json!({"id": "x"})), false)
                .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownType { .. }));
        assert!(registry.is_empty());
    }
}
