use std::sync::Arc;

use foundation::ModelId;
use layers::{StyleOption, TableOutput};
use serde_json::Value;
use streaming::JsonObject;

use crate::json::string_list;
use crate::strata::StratumStore;

/// Concrete model types, by their `type` tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Group,
    Csv,
    SplitReference,
    Reference,
    MagdaReference,
}

impl ModelKind {
    pub fn from_type(type_name: &str) -> Option<Self> {
        match type_name {
            "group" => Some(ModelKind::Group),
            "csv" => Some(ModelKind::Csv),
            "split-reference" => Some(ModelKind::SplitReference),
            "reference" => Some(ModelKind::Reference),
            "magda-reference" => Some(ModelKind::MagdaReference),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            ModelKind::Group => "group",
            ModelKind::Csv => "csv",
            ModelKind::SplitReference => "split-reference",
            ModelKind::Reference => "reference",
            ModelKind::MagdaReference => "magda-reference",
        }
    }
}

/// Optional behaviours a model may support.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Capability {
    Any,
    Group,
    Reference,
    Mappable,
    TimeVarying,
}

/// A catalog model: id, type, strata and loaded state.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    unique_id: ModelId,
    kind: ModelKind,
    pub strata: StratumStore,
    known_container_unique_ids: Vec<ModelId>,
    target: Option<Box<Model>>,
    table: Option<Arc<TableOutput>>,
    style_options: Vec<StyleOption>,
}

impl Model {
    pub fn new(unique_id: ModelId, kind: ModelKind) -> Self {
        Self {
            unique_id,
            kind,
            strata: StratumStore::new(),
            known_container_unique_ids: Vec::new(),
            target: None,
            table: None,
            style_options: Vec::new(),
        }
    }

    pub fn unique_id(&self) -> &ModelId {
        &self.unique_id
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn name(&self) -> Option<String> {
        self.strata.get_str("name")
    }

    pub fn known_container_unique_ids(&self) -> &[ModelId] {
        &self.known_container_unique_ids
    }

    /// Records a container; an id already known is not added twice.
    pub fn add_known_container(&mut self, container: ModelId) {
        if !self.known_container_unique_ids.contains(&container) {
            self.known_container_unique_ids.push(container);
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Any => true,
            Capability::Group => self.kind == ModelKind::Group,
            Capability::Reference => self.is_reference(),
            Capability::Mappable | Capability::TimeVarying => self.kind == ModelKind::Csv,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self.kind,
            ModelKind::SplitReference | ModelKind::Reference | ModelKind::MagdaReference
        )
    }

    pub fn as_group(&self) -> Option<GroupView<'_>> {
        (self.kind == ModelKind::Group).then_some(GroupView { model: self })
    }

    pub fn as_reference(&self) -> Option<ReferenceView<'_>> {
        self.is_reference().then_some(ReferenceView { model: self })
    }

    pub fn target(&self) -> Option<&Model> {
        self.target.as_deref()
    }

    pub fn target_mut(&mut self) -> Option<&mut Model> {
        self.target.as_deref_mut()
    }

    pub fn set_target(&mut self, target: Option<Model>) {
        self.target = target.map(Box::new);
    }

    /// The target for a dereferenced reference, otherwise the model itself.
    pub fn dereferenced(&self) -> &Model {
        self.target.as_deref().unwrap_or(self)
    }

    pub fn dereferenced_mut(&mut self) -> &mut Model {
        match self.target {
            Some(ref mut target) => target,
            None => self,
        }
    }

    pub fn table(&self) -> Option<&Arc<TableOutput>> {
        self.table.as_ref()
    }

    pub fn set_table(&mut self, table: TableOutput, style_options: Vec<StyleOption>) {
        self.table = Some(Arc::new(table));
        self.style_options = style_options;
    }

    pub fn style_options(&self) -> &[StyleOption] {
        &self.style_options
    }
}

/// Group-specific reads over a model.
#[derive(Debug, Copy, Clone)]
pub struct GroupView<'a> {
    model: &'a Model,
}

impl<'a> GroupView<'a> {
    pub fn model(&self) -> &'a Model {
        self.model
    }

    pub fn is_open(&self) -> bool {
        self.model.strata.get_bool("isOpen").unwrap_or(false)
    }

    /// Member ids. Inline member objects contribute their `id`, or
    /// `<group id>/<name>` when they have none.
    pub fn member_ids(&self) -> Vec<ModelId> {
        let Some(Value::Array(members)) = self.model.strata.get_trait("members") else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|member| match member {
                Value::String(id) => Some(ModelId::new(id.clone())),
                Value::Object(obj) => inline_member_id(self.model.unique_id(), obj),
                _ => None,
            })
            .collect()
    }

    /// Inline member objects still waiting to be materialized.
    pub fn inline_members(&self) -> Vec<JsonObject> {
        let Some(Value::Array(members)) = self.model.strata.get_trait("members") else {
            return Vec::new();
        };
        members
            .into_iter()
            .filter_map(|m| match m {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect()
    }
}

pub fn inline_member_id(container: &ModelId, member: &JsonObject) -> Option<ModelId> {
    if let Some(id) = member.get("id").and_then(Value::as_str) {
        return Some(ModelId::new(id));
    }
    member
        .get("name")
        .and_then(Value::as_str)
        .map(|name| container.child(name))
}

/// Reference-specific reads over a model.
#[derive(Debug, Copy, Clone)]
pub struct ReferenceView<'a> {
    model: &'a Model,
}

impl<'a> ReferenceView<'a> {
    pub fn model(&self) -> &'a Model {
        self.model
    }

    pub fn is_loaded(&self) -> bool {
        self.model.target.is_some()
    }

    pub fn target(&self) -> Option<&'a Model> {
        self.model.target.as_deref()
    }

    pub fn split_source_item_id(&self) -> Option<ModelId> {
        self.model.strata.get_str("splitSourceItemId").map(ModelId::new)
    }
}

/// Container ids listed in raw stratum data.
pub fn container_ids_in(data: &JsonObject) -> Vec<ModelId> {
    string_list(data.get("knownContainerUniqueIds"))
        .into_iter()
        .map(ModelId::new)
        .collect()
}
