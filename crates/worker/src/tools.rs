//! Per-kind endpoint and payload mappings for the external generation API.
//!
//! Each kind has a fixed endpoint path and a payload layout the worker
//! expects. Input references arrive as an ordered JSON array; the mapping
//! here names them the way the worker wants them.

use muse_core::JobKind;

use crate::dispatch::DispatchRequest;

/// Endpoint path on the worker API for a given kind.
pub fn endpoint_path(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Upscale => "/v1/image/upscale",
        JobKind::PoseChange => "/v1/image/pose",
        JobKind::OutfitSwap => "/v1/image/outfit",
        JobKind::VideoGen => "/v1/video/generate",
    }
}

/// Build the submission body for a dispatch request.
///
/// The envelope is the same for every kind (`task_ref`, `callback_url`,
/// `params`); the input naming is kind-specific.
pub fn build_payload(request: &DispatchRequest) -> serde_json::Value {
    let refs = request
        .input_refs
        .as_array()
        .cloned()
        .unwrap_or_default();
    let first = refs.first().cloned().unwrap_or(serde_json::Value::Null);
    let second = refs.get(1).cloned().unwrap_or(serde_json::Value::Null);

    let inputs = match request.kind {
        JobKind::Upscale => serde_json::json!({ "image": first }),
        JobKind::PoseChange => serde_json::json!({
            "image": first,
            "pose_reference": second,
        }),
        JobKind::OutfitSwap => serde_json::json!({
            "image": first,
            "garment": second,
        }),
        JobKind::VideoGen => serde_json::json!({ "image": first }),
    };

    serde_json::json!({
        "task_ref": request.job_id,
        "inputs": inputs,
        "params": request.params,
        "callback_url": request.callback_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use muse_core::JobKind;

    fn request(kind: JobKind, refs: serde_json::Value) -> DispatchRequest {
        DispatchRequest {
            job_id: 42,
            kind,
            input_refs: refs,
            params: serde_json::json!({ "strength": 0.8 }),
            callback_url: "https://api.example.com/api/v1/webhooks/jobs/42".into(),
        }
    }

    #[test]
    fn every_kind_has_a_distinct_endpoint() {
        let paths: std::collections::HashSet<_> = muse_core::job::ALL_KINDS
            .iter()
            .map(|k| endpoint_path(*k))
            .collect();
        assert_eq!(paths.len(), muse_core::job::ALL_KINDS.len());
    }

    #[test]
    fn upscale_payload_names_single_image() {
        let payload = build_payload(&request(
            JobKind::Upscale,
            serde_json::json!(["assets/a.png"]),
        ));
        assert_eq!(payload["inputs"]["image"], "assets/a.png");
        assert_eq!(payload["task_ref"], 42);
        assert_eq!(
            payload["callback_url"],
            "https://api.example.com/api/v1/webhooks/jobs/42"
        );
    }

    #[test]
    fn outfit_swap_payload_names_both_inputs() {
        let payload = build_payload(&request(
            JobKind::OutfitSwap,
            serde_json::json!(["assets/model.png", "assets/dress.png"]),
        ));
        assert_eq!(payload["inputs"]["image"], "assets/model.png");
        assert_eq!(payload["inputs"]["garment"], "assets/dress.png");
    }

    #[test]
    fn params_pass_through_unmodified() {
        let payload = build_payload(&request(JobKind::VideoGen, serde_json::json!(["x"])));
        assert_eq!(payload["params"]["strength"], 0.8);
    }
}
