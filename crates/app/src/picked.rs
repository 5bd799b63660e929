use foundation::ModelId;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct PickedFeature {
    pub name: Option<String>,
    /// Model the feature was drawn by.
    pub model_id: Option<ModelId>,
    pub properties: Value,
}

/// Features under the last map click.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PickedFeatures {
    pub features: Vec<PickedFeature>,
}

impl PickedFeatures {
    pub fn remove_for_model(&mut self, id: &str) {
        self.features
            .retain(|feature| feature.model_id.as_ref().is_none_or(|m| m != id));
    }
}

#[cfg(test)]
mod tests {
    use foundation::ModelId;
    use serde_json::Value;

    use super::{PickedFeature, PickedFeatures};

    #[test]
    fn features_of_a_model_are_removed() {
        let feature = |model: Option<&str>| PickedFeature {
            name: None,
            model_id: model.map(ModelId::new),
            properties: Value::Null,
        };
        let mut picked = PickedFeatures {
            features: vec![feature(Some("a")), feature(Some("b")), feature(None)],
        };
        picked.remove_for_model("a");
        assert_eq!(picked.features.len(), 2);
        assert!(picked.features.iter().all(|f| f.model_id.as_ref().is_none_or(|m| m != "a")));
    }
}
