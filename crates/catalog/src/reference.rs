//! Dereferencing of reference models.
//!
//! * `split-reference`: the target is a copy of the model named by
//!   `splitSourceItemId` (dereferenced if it is itself a reference).
//! * `reference`: the target is built from `itemType` + `itemProperties`, or
//!   from the model JSON found at `url`.
//! * `magda-reference`: the target is built from a Magda registry record,
//!   either held inline in `magdaRecord` or fetched by `recordId`. Group
//!   records become groups whose members are registered as further
//!   `magda-reference` models.

use foundation::ModelId;
use serde_json::Value;
use streaming::JsonObject;
use tracing::debug;

use crate::context::CatalogContext;
use crate::error::CatalogError;
use crate::factory::{create_model, update_model_from_json};
use crate::json::string_field;
use crate::model::{Model, ModelKind};
use crate::registry::ModelRegistry;
use crate::strata::{DEFINITION, StratumStore};

/// Query appended to Magda record requests.
const MAGDA_RECORD_QUERY: &str = "optionalAspect=terria&optionalAspect=group&dereference=true";

pub fn magda_record_url(base: &str, record_id: &str) -> String {
    format!(
        "{}/api/v0/registry/records/{}?{}",
        base.trim_end_matches('/'),
        record_id,
        MAGDA_RECORD_QUERY
    )
}

/// Resolves the target of reference `id`. A reference that already has a
/// target is left alone.
pub async fn load_reference(ctx: &CatalogContext, id: &str) -> Result<(), CatalogError> {
    let snapshot = ctx.read(|registry| {
        registry
            .get(id)
            .map(|m| (m.unique_id().clone(), m.kind(), m.strata.clone(), m.target().is_some()))
    });
    let Some((model_id, kind, strata, loaded)) = snapshot else {
        return Err(CatalogError::NotFound(id.into()));
    };
    if loaded {
        return Ok(());
    }

    let (target, members) = match kind {
        ModelKind::SplitReference => (split_target(ctx, &model_id, &strata)?, Vec::new()),
        ModelKind::Reference => (item_target(ctx, &model_id, &strata).await?, Vec::new()),
        ModelKind::MagdaReference => magda_target(ctx, &model_id, &strata).await?,
        ModelKind::Group | ModelKind::Csv => {
            return Err(CatalogError::CannotDereference(model_id));
        }
    };

    ctx.update(|registry| {
        for member in members {
            if !registry.contains(member.unique_id().as_str()) {
                registry.add_model(member)?;
            }
        }
        let model = registry
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(id.into()))?;
        if model.target().is_none() {
            debug!(id, target = target.kind().type_name(), "reference loaded");
            model.set_target(Some(target));
        }
        Ok(())
    })
}

fn split_target(
    ctx: &CatalogContext,
    id: &ModelId,
    strata: &StratumStore,
) -> Result<Model, CatalogError> {
    let source_id = strata
        .get_str("splitSourceItemId")
        .ok_or_else(|| CatalogError::InvalidTraits {
            id: id.clone(),
            message: "a split reference needs `splitSourceItemId`".to_string(),
        })?;
    ctx.read(|registry| {
        let source = registry
            .get(&source_id)
            .ok_or_else(|| CatalogError::NotFound(source_id.as_str().into()))?
            .dereferenced();
        let mut target = Model::new(id.clone(), source.kind());
        target.strata = source.strata.clone();
        Ok(target)
    })
}

async fn item_target(
    ctx: &CatalogContext,
    id: &ModelId,
    strata: &StratumStore,
) -> Result<Model, CatalogError> {
    let json = match (strata.get_str("itemType"), strata.get_str("url")) {
        (Some(item_type), _) => {
            let mut json = match strata.get_trait("itemProperties") {
                Some(Value::Object(props)) => props,
                _ => JsonObject::new(),
            };
            json.insert("type".to_string(), Value::String(item_type));
            json
        }
        (None, Some(url)) => match ctx.fetcher().fetch_json(&url).await? {
            Value::Object(json) => json,
            _ => {
                return Err(CatalogError::InvalidTraits {
                    id: id.clone(),
                    message: format!("{url} does not contain a model"),
                });
            }
        },
        (None, None) => return Err(CatalogError::CannotDereference(id.clone())),
    };
    let mut target = create_model(string_field(&json, "type"), id.clone())?;
    update_model_from_json(&mut target, DEFINITION, &json, false);
    Ok(target)
}

async fn magda_target(
    ctx: &CatalogContext,
    id: &ModelId,
    strata: &StratumStore,
) -> Result<(Model, Vec<Model>), CatalogError> {
    let base = strata.get_str("url");
    let record = match strata.get_trait("magdaRecord") {
        Some(Value::Object(record)) => record,
        _ => {
            let (Some(base), Some(record_id)) = (base.as_deref(), strata.get_str("recordId"))
            else {
                return Err(CatalogError::CannotDereference(id.clone()));
            };
            match ctx
                .fetcher()
                .fetch_json(&magda_record_url(base, &record_id))
                .await?
            {
                Value::Object(record) => record,
                _ => {
                    return Err(CatalogError::InvalidTraits {
                        id: id.clone(),
                        message: format!("Magda record `{record_id}` is not an object"),
                    });
                }
            }
        }
    };
    target_from_magda_record(id, &record, base.as_deref())
}

/// Builds the target of a Magda reference plus the member references of a
/// group record.
pub fn target_from_magda_record(
    id: &ModelId,
    record: &JsonObject,
    base: Option<&str>,
) -> Result<(Model, Vec<Model>), CatalogError> {
    let aspects = record.get("aspects").and_then(Value::as_object);
    let name = string_field(record, "name");

    if let Some(group) = aspects.and_then(|a| a.get("group")).and_then(Value::as_object) {
        let mut target = Model::new(id.clone(), ModelKind::Group);
        let mut member_ids = Vec::new();
        let mut members = Vec::new();
        for member in group
            .get("members")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let (member_id, record) = match member {
                Value::String(member_id) => (member_id.clone(), None),
                Value::Object(record) => match string_field(record, "id") {
                    Some(member_id) => (member_id.to_string(), Some(record)),
                    None => continue,
                },
                _ => continue,
            };
            members.push(magda_member(id, &member_id, record, base));
            member_ids.push(Value::String(member_id));
        }
        target
            .strata
            .set_trait(DEFINITION, "members", Value::Array(member_ids));
        if let Some(name) = name {
            target.strata.set_trait(DEFINITION, "name", Value::from(name));
        }
        return Ok((target, members));
    }

    let terria = aspects
        .and_then(|a| a.get("terria"))
        .and_then(Value::as_object)
        .ok_or_else(|| CatalogError::InvalidTraits {
            id: id.clone(),
            message: "Magda record has neither a `terria` nor a `group` aspect".to_string(),
        })?;
    let mut target = create_model(string_field(terria, "type"), id.clone())?;
    if let Some(name) = name {
        target.strata.set_trait(DEFINITION, "name", Value::from(name));
    }
    if let Some(Value::Object(definition)) = terria.get("definition") {
        update_model_from_json(&mut target, DEFINITION, definition, false);
    }
    Ok((target, Vec::new()))
}

fn magda_member(
    container: &ModelId,
    member_id: &str,
    record: Option<&JsonObject>,
    base: Option<&str>,
) -> Model {
    let mut model = Model::new(ModelId::new(member_id), ModelKind::MagdaReference);
    model.add_known_container(container.clone());
    model
        .strata
        .set_trait(DEFINITION, "recordId", Value::from(member_id));
    if let Some(base) = base {
        model.strata.set_trait(DEFINITION, "url", Value::from(base));
    }
    if let Some(record) = record {
        if let Some(name) = string_field(record, "name") {
            model.strata.set_trait(DEFINITION, "name", Value::from(name));
        }
        // Members without aspects were not dereferenced by the registry and
        // are fetched on demand.
        if record.contains_key("aspects") {
            model
                .strata
                .set_trait(DEFINITION, "magdaRecord", Value::Object(record.clone()));
        }
    }
    model
}

/// Registers (or reuses) the magda reference `id` for a Magda config record.
pub fn upsert_magda_config_reference(
    registry: &mut ModelRegistry,
    id: &ModelId,
    base: &str,
    record: &JsonObject,
) -> Result<(), CatalogError> {
    if !registry.contains(id.as_str()) {
        registry.add_model(Model::new(id.clone(), ModelKind::MagdaReference))?;
    }
    let model = registry
        .get_mut(id.as_str())
        .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
    if model.kind() != ModelKind::MagdaReference {
        return Err(CatalogError::CannotDereference(id.clone()));
    }
    model.strata.set_trait(DEFINITION, "url", Value::from(base));
    model
        .strata
        .set_trait(DEFINITION, "recordId", Value::from(id.as_str()));
    model
        .strata
        .set_trait(DEFINITION, "magdaRecord", Value::Object(record.clone()));
    model.set_target(None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::ModelId;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::StaticFetcher;

    use super::{load_reference, magda_record_url};
    use crate::context::CatalogContext;
    use crate::error::CatalogError;
    use crate::model::{Model, ModelKind};
    use crate::strata::DEFINITION;

    fn context(fetcher: StaticFetcher) -> CatalogContext {
        CatalogContext::new(Arc::new(fetcher))
    }

    fn add(ctx: &CatalogContext, id: &str, kind: ModelKind, traits: serde_json::Value) {
        let mut model = Model::new(id.into(), kind);
        for (key, value) in traits.as_object().cloned().unwrap() {
            model.strata.set_trait(DEFINITION, &key, value);
        }
        ctx.update(|r| r.add_model(model)).unwrap();
    }

    #[tokio::test]
    async fn split_reference_copies_its_source() {
        let ctx = context(StaticFetcher::new());
        add(&ctx, "source", ModelKind::Csv, json!({"name": "Source", "url": "a.csv"}));
        add(
            &ctx,
            "split",
            ModelKind::SplitReference,
            json!({"splitSourceItemId": "source"}),
        );
        load_reference(&ctx, "split").await.unwrap();
        ctx.read(|r| {
            let target = r.get("split").unwrap().target().unwrap();
            assert_eq!(target.kind(), ModelKind::Csv);
            assert_eq!(target.unique_id().as_str(), "split");
            assert_eq!(target.strata.get_str("url").as_deref(), Some("a.csv"));
        });
    }

    #[tokio::test]
    async fn split_reference_without_source_fails() {
        let ctx = context(StaticFetcher::new());
        add(
            &ctx,
            "split",
            ModelKind::SplitReference,
            json!({"splitSourceItemId": "nowhere"}),
        );
        assert_eq!(
            load_reference(&ctx, "split").await,
            Err(CatalogError::NotFound("nowhere".into()))
        );
    }

    #[tokio::test]
    async fn item_reference_from_url() {
        let ctx = context(StaticFetcher::new().with_json(
            "https://example.com/item.json",
            &json!({"type": "csv", "name": "Fetched"}),
        ));
        add(
            &ctx,
            "r",
            ModelKind::Reference,
            json!({"url": "https://example.com/item.json"}),
        );
        load_reference(&ctx, "r").await.unwrap();
        let name = ctx.read(|r| r.get("r").unwrap().dereferenced().name());
        assert_eq!(name.as_deref(), Some("Fetched"));
    }

    #[tokio::test]
    async fn magda_group_records_register_member_references() {
        let record_url = magda_record_url("https://magda.example.com/", "root");
        assert_eq!(
            record_url,
            "https://magda.example.com/api/v0/registry/records/root?optionalAspect=terria&optionalAspect=group&dereference=true"
        );
        let ctx = context(StaticFetcher::new().with_json(
            record_url,
            &json!({
                "id": "root",
                "name": "Root",
                "aspects": {"group": {"members": [
                    {"id": "m1", "name": "Rain", "aspects": {"terria": {"type": "csv", "definition": {"url": "r.csv"}}}},
                    "m2"
                ]}}
            }),
        ));
        add(
            &ctx,
            "root",
            ModelKind::MagdaReference,
            json!({"url": "https://magda.example.com/", "recordId": "root"}),
        );
        load_reference(&ctx, "root").await.unwrap();

        let members = ctx.read(|r| {
            r.get("root")
                .unwrap()
                .dereferenced()
                .as_group()
                .unwrap()
                .member_ids()
        });
        assert_eq!(members, vec![ModelId::new("m1"), ModelId::new("m2")]);

        load_reference(&ctx, "m1").await.unwrap();
        ctx.read(|r| {
            let m1 = r.get("m1").unwrap().dereferenced();
            assert_eq!(m1.kind(), ModelKind::Csv);
            assert_eq!(m1.strata.get_str("url").as_deref(), Some("r.csv"));
            assert_eq!(m1.name().as_deref(), Some("Rain"));
        });
    }

    #[tokio::test]
    async fn non_references_cannot_be_dereferenced() {
        let ctx = context(StaticFetcher::new());
        add(&ctx, "c", ModelKind::Csv, json!({}));
        assert_eq!(
            load_reference(&ctx, "c").await,
            Err(CatalogError::CannotDereference("c".into()))
        );
    }
}
