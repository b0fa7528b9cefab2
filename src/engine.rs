use json_patch::{Patch, PatchOperation};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, SerializePatchError};
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{self, KindDisplay, PodView, Toleration};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("expected {}, got {}", KindDisplay(.expected), KindDisplay(.actual))]
    KindMismatch {
        expected: GroupVersionKind,
        actual: GroupVersionKind,
    },
    #[error("admission request carries no object")]
    MissingObject,
    #[error("failed to decode pod: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode toleration: {0}")]
    EncodeToleration(#[source] serde_json::Error),
    #[error("failed to encode patch: {0}")]
    Encode(#[from] SerializePatchError),
}

/// Injects a `NoSchedule` toleration keyed on the pod's namespace.
pub struct TolerationInjector {
    toleration_key: String,
}

impl TolerationInjector {
    pub fn new(toleration_key: impl Into<String>) -> Self {
        Self {
            toleration_key: toleration_key.into(),
        }
    }

    /// Always yields a response for `request`; failures become denials carrying
    /// the error message.
    pub fn decide(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        match self.mutate(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(uid = %request.uid, name = %request.name, "denied: {e}");
                AdmissionResponse::from(request).deny(e.to_string())
            }
        }
    }

    fn mutate(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<AdmissionResponse, MutationError> {
        let expected = model::pod_kind();
        if request.kind != expected {
            return Err(MutationError::KindMismatch {
                expected,
                actual: request.kind.clone(),
            });
        }

        let object = request.object.as_ref().ok_or(MutationError::MissingObject)?;
        let pod = PodView::from_object(&object.data).map_err(MutationError::Decode)?;

        let namespace = request.namespace.as_deref().unwrap_or_default();
        let operations = self.plan(namespace, &pod)?;

        info!(
            uid = %request.uid,
            name = %request.name,
            namespace,
            operations = operations.len(),
            "processing pod"
        );

        let response = AdmissionResponse::from(request);
        if operations.is_empty() {
            return Ok(response);
        }
        Ok(response.with_patch(Patch(operations))?)
    }

    /// Patch operations that leave `pod` with exactly one toleration for
    /// `namespace`. Paths refer to the pod as decoded, before any operation.
    pub fn plan(
        &self,
        namespace: &str,
        pod: &PodView,
    ) -> Result<Vec<PatchOperation>, MutationError> {
        let existing = pod.tolerations();
        let target = Toleration::for_namespace(&self.toleration_key, namespace);
        let mut operations = Vec::new();

        if existing.is_empty() {
            operations.push(model::add_op(
                model::tolerations_pointer(),
                Value::Array(Vec::new()),
            ));
        }

        if !existing.iter().any(|t| t.matches(&target)) {
            operations.push(model::add_op(
                model::tolerations_end_pointer(),
                serde_json::to_value(&target).map_err(MutationError::EncodeToleration)?,
            ));
        }

        Ok(operations)
    }
}
