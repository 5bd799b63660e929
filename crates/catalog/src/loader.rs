//! Applies the `models` block of an init document to the registry.
//!
//! Each model is loaded at most once per batch. A model waits for its
//! `knownContainerUniqueIds` (and, for groups among them, their members)
//! and for the `splitSourceItemId` of a split reference. Everything else
//! loads concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::ModelId;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde_json::Value;
use streaming::{CacheKey, JsonObject, SharedResult, SingleFlightCache};
use tracing::{debug, warn};

use crate::context::CatalogContext;
use crate::error::CatalogError;
use crate::factory::{update_model_from_json, upsert_model_from_json};
use crate::group::load_members;
use crate::json::{clean_stratum_data, string_field, string_list};
use crate::model::{Model, ModelKind};
use crate::reference::load_reference;

pub type ModelLoad = Result<ModelId, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dependency {
    Container(String),
    SplitSource(String),
}

impl Dependency {
    fn id(&self) -> &str {
        match self {
            Dependency::Container(id) | Dependency::SplitSource(id) => id,
        }
    }
}

fn declared_dependencies(data: Option<&Value>) -> Vec<Dependency> {
    let Some(Value::Object(data)) = data else {
        return Vec::new();
    };
    let mut deps: Vec<Dependency> = string_list(data.get("knownContainerUniqueIds"))
        .into_iter()
        .map(Dependency::Container)
        .collect();
    if string_field(data, "type") == Some(ModelKind::SplitReference.type_name()) {
        if let Some(source) = string_field(data, "splitSourceItemId") {
            deps.push(Dependency::SplitSource(source.to_string()));
        }
    }
    deps
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn visit(
    id: &str,
    models: &JsonObject,
    state: &mut BTreeMap<String, Visit>,
    out: &mut BTreeMap<String, Vec<Dependency>>,
) {
    state.insert(id.to_string(), Visit::InProgress);
    let mut kept = Vec::new();
    for dep in declared_dependencies(models.get(id)) {
        match state.get(dep.id()).copied() {
            Some(Visit::InProgress) => {
                warn!(model = id, dependency = dep.id(), "dependency cycle, edge ignored");
                continue;
            }
            Some(Visit::Done) => {}
            None => visit(dep.id(), models, state, out),
        }
        kept.push(dep);
    }
    state.insert(id.to_string(), Visit::Done);
    out.insert(id.to_string(), kept);
}

/// Dependency edges of every model reachable from the block, with edges
/// closing a cycle removed. Traversal follows the block's key order so the
/// same document always drops the same edges.
fn acyclic_dependencies(models: &JsonObject) -> BTreeMap<String, Vec<Dependency>> {
    let mut state = BTreeMap::new();
    let mut out = BTreeMap::new();
    for id in models.keys() {
        if !state.contains_key(id) {
            visit(id, models, &mut state, &mut out);
        }
    }
    out
}

struct LoaderInner {
    ctx: CatalogContext,
    stratum_id: String,
    models: JsonObject,
    replace: bool,
    dependencies: BTreeMap<String, Vec<Dependency>>,
    loads: SingleFlightCache<ModelLoad>,
}

/// One batch of model stratum loads.
#[derive(Clone)]
pub struct StratumLoader {
    inner: Arc<LoaderInner>,
}

impl StratumLoader {
    pub fn new(
        ctx: CatalogContext,
        stratum_id: impl Into<String>,
        models: JsonObject,
        replace: bool,
    ) -> Self {
        let dependencies = acyclic_dependencies(&models);
        Self {
            inner: Arc::new(LoaderInner {
                ctx,
                stratum_id: stratum_id.into(),
                models,
                replace,
                dependencies,
                loads: SingleFlightCache::new(),
            }),
        }
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.inner.models.keys().cloned().collect()
    }

    /// Loads every model of the block. Failures are returned per model and
    /// never stop sibling loads.
    pub async fn load_all(&self) -> Vec<(String, ModelLoad)> {
        let ids = self.model_ids();
        let results = join_all(ids.iter().map(|id| self.load_model_stratum(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// The shared load of `id` within this batch.
    pub fn load_model_stratum(&self, id: &str) -> SharedResult<ModelLoad> {
        let loader = self.clone();
        let owned = id.to_string();
        self.inner
            .loads
            .get_or_start(CacheKey::new(id), move || loader.load_uncached(owned).boxed())
    }

    async fn load_uncached(self, id: String) -> ModelLoad {
        let inner = &self.inner;
        let ctx = &inner.ctx;
        let stratum_id = inner.stratum_id.as_str();
        let model_id = ModelId::new(id.as_str());

        let data = match inner.models.get(&id) {
            None => JsonObject::new(),
            Some(Value::Object(data)) => data.clone(),
            Some(_) => {
                return Err(CatalogError::InvalidTraits {
                    id: model_id,
                    message: "the traits of a model must be a JSON object".to_string(),
                });
            }
        };
        let dependencies = inner.dependencies.get(&id).cloned().unwrap_or_default();

        let containers: Vec<&str> = dependencies
            .iter()
            .filter_map(|d| match d {
                Dependency::Container(c) => Some(c.as_str()),
                Dependency::SplitSource(_) => None,
            })
            .collect();
        let container_loads = join_all(containers.iter().map(|c| {
            let load = self.load_model_stratum(c);
            let ctx = ctx.clone();
            async move {
                let container = load.await?;
                ctx.update(|registry| {
                    let is_group = registry
                        .get(container.as_str())
                        .is_some_and(|m| m.dereferenced().as_group().is_some());
                    if is_group {
                        load_members(registry, container.as_str())?;
                    }
                    Ok::<_, CatalogError>(())
                })
            }
        }))
        .await;
        for result in container_loads {
            result?;
        }

        for dep in &dependencies {
            if let Dependency::SplitSource(source) = dep {
                self.load_model_stratum(source).await?;
            }
        }

        let mut json = clean_stratum_data(&data);
        json.insert("id".to_string(), Value::String(id.clone()));
        let replace = inner.replace;
        let (is_reference, already_dereferenced) = ctx.update(|registry| {
            upsert_model_from_json(registry, stratum_id, None, &json, replace)?;
            let model = registry
                .get_mut(&id)
                .ok_or_else(|| CatalogError::NotFound(model_id.clone()))?;
            for container in &containers {
                model.add_known_container(ModelId::new(*container));
            }
            Ok::<_, CatalogError>((model.is_reference(), model.target().is_some()))
        })?;
        debug!(id = %model_id, stratum = stratum_id, "model stratum loaded");

        let mut dereferenced = match data.get("dereferenced") {
            None => None,
            Some(Value::Object(block)) => Some(block.clone()),
            Some(_) => {
                return Err(CatalogError::InvalidTraits {
                    id: model_id,
                    message: "`dereferenced` must be a JSON object".to_string(),
                });
            }
        };
        if replace && dereferenced.is_none() && is_reference && already_dereferenced {
            dereferenced = Some(JsonObject::new());
        }

        if is_reference {
            if let Err(e) = load_reference(ctx, &id).await {
                if dereferenced.is_some() {
                    warn!(id = %model_id, error = %e, "reference could not be resolved");
                    return Err(CatalogError::CannotDereference(model_id));
                }
                return Err(e);
            }
            let block = dereferenced.unwrap_or_default();
            ctx.update(|registry| {
                if let Some(target) = registry.get_mut(&id).and_then(Model::target_mut) {
                    update_model_from_json(target, stratum_id, &block, replace);
                }
            });
        } else if dereferenced.is_some() {
            return Err(CatalogError::CannotDereference(model_id));
        }

        ctx.update(|registry| {
            let open = registry
                .get(&id)
                .map(Model::dereferenced)
                .and_then(Model::as_group)
                .is_some_and(|group| group.is_open());
            if open {
                load_members(registry, &id)?;
            }
            Ok::<_, CatalogError>(())
        })?;
        Ok(model_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::ModelId;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::StaticFetcher;

    use super::{StratumLoader, acyclic_dependencies};
    use crate::context::CatalogContext;
    use crate::error::CatalogError;
    use crate::model::ModelKind;

    fn obj(v: serde_json::Value) -> streaming::JsonObject {
        v.as_object().cloned().unwrap()
    }

    fn context() -> CatalogContext {
        CatalogContext::new(Arc::new(StaticFetcher::new()))
    }

    async fn load(
        ctx: &CatalogContext,
        models: serde_json::Value,
        replace: bool,
    ) -> Vec<(String, super::ModelLoad)> {
        StratumLoader::new(ctx.clone(), "init", obj(models), replace)
            .load_all()
            .await
    }

    #[tokio::test]
    async fn containers_load_with_their_members_first() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({
                "parent/inline": {"knownContainerUniqueIds": ["parent"], "opacity": 0.5},
                "parent": {"type": "group", "members": [{"name": "inline", "type": "csv"}]}
            }),
            false,
        )
        .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()), "{results:?}");

        ctx.read(|r| {
            let member = r.get("parent/inline").unwrap();
            assert_eq!(member.kind(), ModelKind::Csv);
            assert_eq!(member.known_container_unique_ids(), &[ModelId::new("parent")]);
            assert_eq!(member.strata.get_trait("opacity"), Some(json!(0.5)));
        });
    }

    #[tokio::test]
    async fn malformed_traits_fail_only_their_model() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({"bad": 3, "good": {"type": "csv", "name": "Good"}}),
            false,
        )
        .await;
        assert!(matches!(
            &results[0],
            (id, Err(CatalogError::InvalidTraits { .. })) if id == "bad"
        ));
        assert!(results[1].1.is_ok());
        assert!(ctx.read(|r| r.contains("good")));
    }

    #[tokio::test]
    async fn dereferenced_block_on_plain_model_fails() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({"c": {"type": "csv", "dereferenced": {"name": "x"}}}),
            false,
        )
        .await;
        assert_eq!(
            results[0].1,
            Err(CatalogError::CannotDereference("c".into()))
        );
    }

    #[tokio::test]
    async fn split_reference_loads_its_source_then_dereferences() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({
                "split": {
                    "type": "split-reference",
                    "splitSourceItemId": "src",
                    "dereferenced": {"name": "Split"}
                },
                "src": {"type": "csv", "name": "Source", "url": "a.csv"}
            }),
            false,
        )
        .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()), "{results:?}");
        ctx.read(|r| {
            let target = r.get("split").unwrap().target().unwrap();
            assert_eq!(target.name().as_deref(), Some("Split"));
            assert_eq!(target.strata.get_str("url").as_deref(), Some("a.csv"));
        });
    }

    #[tokio::test]
    async fn replacing_clears_stale_dereferenced_traits() {
        let ctx = context();
        let first = json!({
            "split": {
                "type": "split-reference",
                "splitSourceItemId": "src",
                "dereferenced": {"opacity": 0.2}
            },
            "src": {"type": "csv", "url": "a.csv"}
        });
        load(&ctx, first, false).await;
        let opacity = |ctx: &CatalogContext| {
            ctx.read(|r| r.get("split").unwrap().dereferenced().strata.get_trait("opacity"))
        };
        assert_eq!(opacity(&ctx), Some(json!(0.2)));

        load(
            &ctx,
            json!({"split": {"type": "split-reference", "splitSourceItemId": "src"}}),
            true,
        )
        .await;
        assert_eq!(opacity(&ctx), None);
    }

    #[tokio::test]
    async fn cycles_do_not_deadlock() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({
                "a": {"type": "group", "knownContainerUniqueIds": ["b"]},
                "b": {"type": "group", "knownContainerUniqueIds": ["a"]}
            }),
            false,
        )
        .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()), "{results:?}");
    }

    #[test]
    fn cycle_edges_are_dropped_deterministically() {
        let deps = acyclic_dependencies(&obj(json!({
            "a": {"knownContainerUniqueIds": ["b"]},
            "b": {"knownContainerUniqueIds": ["a"]}
        })));
        assert_eq!(deps["a"].len(), 1);
        assert!(deps["b"].is_empty());
    }

    #[tokio::test]
    async fn unknown_container_without_data_fails_the_member() {
        let ctx = context();
        let results = load(
            &ctx,
            json!({"m": {"type": "csv", "knownContainerUniqueIds": ["nowhere"]}}),
            false,
        )
        .await;
        assert!(matches!(
            results[0].1,
            Err(CatalogError::UnknownType { type_name: None, .. })
        ));
    }

    #[tokio::test]
    async fn open_groups_load_members_eagerly() {
        let ctx = context();
        load(
            &ctx,
            json!({"g": {"type": "group", "isOpen": true, "members": [{"name": "x", "type": "csv"}]}}),
            false,
        )
        .await;
        assert!(ctx.read(|r| r.contains("g/x")));
    }
}
