use std::{collections::BTreeMap, sync::Arc};

/// The label set of a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

/// The label under which every managed object names its manager.
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// === Labels ===

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Builds a JSON `LabelSelector` with these labels as `matchLabels`.
    ///
    /// An empty label set produces an empty selector, which selects everything.
    pub fn to_selector_json(&self) -> serde_json::Value {
        if self.0.is_empty() {
            return serde_json::json!({});
        }
        serde_json::json!({ "matchLabels": self.0.as_ref() })
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_labels_select_everything() {
        assert_eq!(Labels::default().to_selector_json(), serde_json::json!({}));
    }

    #[test]
    fn missing_labels_are_empty() {
        let labels = Labels::from(None);
        assert_eq!(labels.get("team"), None);
        assert_eq!(labels, Labels::default());
    }

    #[test]
    fn labels_render_as_match_labels() {
        let labels = Labels::from(Map::from([("team".to_string(), "platform".to_string())]));
        assert_eq!(
            labels.to_selector_json(),
            serde_json::json!({ "matchLabels": { "team": "platform" } })
        );
    }
}
