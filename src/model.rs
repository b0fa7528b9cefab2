use std::fmt;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation};
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind descriptor every reviewed object must carry: core/v1 Pod.
pub fn pod_kind() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Pod")
}

/// Renders a kind as `group/version, Kind=kind`, leaving the group empty for
/// the core API group.
pub struct KindDisplay<'a>(pub &'a GroupVersionKind);

impl fmt::Display for KindDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.0.group, self.0.version, self.0.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TolerationOperator {
    Equal,
    Exists,
    /// Any operator this webhook does not model; never matches a known one.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
    /// Includes `""`, which the API server reads as "all effects".
    #[serde(other)]
    Unrecognized,
}

/// Projection of a core/v1 Toleration.
///
/// Compare with [`Toleration::matches`], which applies operator defaulting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<TolerationOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<TaintEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

impl Toleration {
    /// The toleration injected for pods of `namespace`.
    pub fn for_namespace(key: &str, namespace: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            value: Some(namespace.to_string()),
            effect: Some(TaintEffect::NoSchedule),
            ..Self::default()
        }
    }

    fn effective_operator(&self) -> TolerationOperator {
        self.operator.unwrap_or(TolerationOperator::Equal)
    }

    /// Field-wise comparison of key, operator, value and effect. An absent
    /// operator counts as `Equal`; absent key or value count as empty.
    pub fn matches(&self, other: &Toleration) -> bool {
        self.key.as_deref().unwrap_or("") == other.key.as_deref().unwrap_or("")
            && self.effective_operator() == other.effective_operator()
            && self.value.as_deref().unwrap_or("") == other.value.as_deref().unwrap_or("")
            && self.effect == other.effect
    }
}

/// The only part of a Pod the injector reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodView {
    #[serde(default)]
    pub spec: Option<PodSpecView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodSpecView {
    #[serde(default)]
    pub tolerations: Option<Vec<Toleration>>,
}

impl PodView {
    pub fn from_object(data: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }

    pub fn tolerations(&self) -> &[Toleration] {
        self.spec
            .as_ref()
            .and_then(|s| s.tolerations.as_deref())
            .unwrap_or_default()
    }
}

pub fn tolerations_pointer() -> PointerBuf {
    PointerBuf::from_tokens(["spec", "tolerations"])
}

pub fn tolerations_end_pointer() -> PointerBuf {
    PointerBuf::from_tokens(["spec", "tolerations", "-"])
}

pub fn add_op(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}
