use foundation::ModelId;
use serde_json::Value;
use tracing::debug;

use crate::error::CatalogError;
use crate::factory::upsert_model_from_json;
use crate::model::Model;
use crate::registry::ModelRegistry;

/// Unique id of the catalog root group.
pub const ROOT_GROUP_ID: &str = "/";

/// Upserts each member into `group_id` and appends the member ids to the
/// group's `members` trait in `stratum_id`. A reference whose target is
/// loaded receives the members on its target.
pub fn add_members_from_json(
    registry: &mut ModelRegistry,
    stratum_id: &str,
    group_id: &str,
    members: &[Value],
    replace: bool,
) -> Result<Vec<ModelId>, CatalogError> {
    let group_model_id = group_of(registry, group_id)?.unique_id().clone();

    let mut added = Vec::with_capacity(members.len());
    for member in members {
        let Value::Object(json) = member else {
            return Err(CatalogError::InvalidTraits {
                id: group_model_id.clone(),
                message: "catalog members must be JSON objects".to_string(),
            });
        };
        added.push(upsert_model_from_json(
            registry,
            stratum_id,
            Some(&group_model_id),
            json,
            replace,
        )?);
    }

    let group = registry
        .get_mut(group_id)
        .map(Model::dereferenced_mut)
        .ok_or_else(|| CatalogError::NotFound(group_id.into()))?;
    let mut ids: Vec<Value> = group
        .strata
        .stratum(stratum_id)
        .and_then(|data| data.get("members"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for id in &added {
        let id = Value::String(id.to_string());
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    group.strata.set_trait(stratum_id, "members", Value::Array(ids));
    Ok(added)
}

fn group_of<'a>(registry: &'a ModelRegistry, id: &str) -> Result<&'a Model, CatalogError> {
    registry
        .get(id)
        .map(Model::dereferenced)
        .ok_or_else(|| CatalogError::NotFound(id.into()))
}

/// Materializes inline member objects of a group (or of a reference whose
/// target is a group) into registered models, replacing them with their ids
/// in the stratum they came from. Returns the group's member ids.
pub fn load_members(registry: &mut ModelRegistry, id: &str) -> Result<Vec<ModelId>, CatalogError> {
    let pending: Vec<(String, Vec<Value>)> = {
        let group = group_of(registry, id)?;
        if group.as_group().is_none() {
            return Ok(Vec::new());
        }
        group
            .strata
            .ids_by_priority()
            .into_iter()
            .filter_map(|stratum_id| {
                let members = group.strata.stratum(stratum_id)?.get("members")?.as_array()?;
                members
                    .iter()
                    .any(Value::is_object)
                    .then(|| (stratum_id.to_string(), members.clone()))
            })
            .collect()
    };

    let container = group_of(registry, id)?.unique_id().clone();
    for (stratum_id, members) in pending {
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match member {
                Value::Object(json) => {
                    let member_id = upsert_model_from_json(
                        registry,
                        &stratum_id,
                        Some(&container),
                        &json,
                        false,
                    )?;
                    ids.push(Value::String(member_id.to_string()));
                }
                other => ids.push(other),
            }
        }
        registry
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(id.into()))?
            .dereferenced_mut()
            .strata
            .set_trait(&stratum_id, "members", Value::Array(ids));
    }

    let members = group_of(registry, id)?
        .as_group()
        .map(|g| g.member_ids())
        .unwrap_or_default();
    debug!(group = id, members = members.len(), "group members loaded");
    Ok(members)
}

#[cfg(test)]
mod tests {
    use foundation::ModelId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{ROOT_GROUP_ID, add_members_from_json, load_members};
    use crate::error::CatalogError;
    use crate::model::{Model, ModelKind};
    use crate::registry::ModelRegistry;
    use crate::strata::DEFINITION;

    fn registry_with_root() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .add_model(Model::new(ROOT_GROUP_ID.into(), ModelKind::Group))
            .unwrap();
        registry
    }

    #[test]
    fn catalog_members_are_added_to_the_root() {
        let mut registry = registry_with_root();
        let members = vec![
            json!({"type": "csv", "name": "Rain"}),
            json!({"type": "group", "id": "g", "name": "Group"}),
        ];
        add_members_from_json(&mut registry, DEFINITION, ROOT_GROUP_ID, &members, false).unwrap();
        add_members_from_json(&mut registry, DEFINITION, ROOT_GROUP_ID, &members, false).unwrap();

        let root = registry.get(ROOT_GROUP_ID).unwrap();
        let ids: Vec<String> = root
            .as_group()
            .unwrap()
            .member_ids()
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["//Rain", "g"]);
        assert!(registry.contains("//Rain"));
    }

    #[test]
    fn non_object_members_are_invalid_traits() {
        let mut registry = registry_with_root();
        let err =
            add_members_from_json(&mut registry, DEFINITION, ROOT_GROUP_ID, &[json!(1)], false)
                .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTraits { .. }));
    }

    #[test]
    fn inline_members_are_materialized_on_load() {
        let mut registry = registry_with_root();
        let mut group = Model::new("g".into(), ModelKind::Group);
        group.strata.set_trait(
            DEFINITION,
            "members",
            json!(["existing", {"name": "Inline", "type": "csv", "url": "a.csv"}]),
        );
        registry.add_model(group).unwrap();

        let members = load_members(&mut registry, "g").unwrap();
        assert_eq!(members, vec![ModelId::new("existing"), ModelId::new("g/Inline")]);
        assert_eq!(
            registry.get("g").unwrap().strata.get_trait("members"),
            Some(json!(["existing", "g/Inline"]))
        );
        assert_eq!(
            registry.get("g/Inline").unwrap().strata.get_str("url").as_deref(),
            Some("a.csv")
        );
        // Loading again is a no-op.
        assert_eq!(load_members(&mut registry, "g").unwrap().len(), 2);
    }

    #[test]
    fn non_groups_have_no_members() {
        let mut registry = registry_with_root();
        registry
            .add_model(Model::new("c".into(), ModelKind::Csv))
            .unwrap();
        assert!(load_members(&mut registry, "c").unwrap().is_empty());
        assert!(matches!(
            load_members(&mut registry, "missing"),
            Err(CatalogError::NotFound(_))
        ));
    }
}
