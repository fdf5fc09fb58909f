//! Boundary between map-shaped state payloads and [`InvestigationState`].
//!
//! Workflow engines and state snapshots on disk hand over plain JSON,
//! sometimes wrapped in `state` or `value` envelopes. This is the only place
//! such payloads are accepted; everything past it works on the typed state.

use serde_json::Value;

use dossier_common::{DossierError, InvestigationState};

const ENVELOPE_KEYS: [&str; 2] = ["state", "value"];

/// Accept a map-shaped state, unwrapping nested envelopes until an object
/// with a `subject` key is found.
pub fn state_from_payload(payload: Value) -> Result<InvestigationState, DossierError> {
    let mut candidate = payload;
    loop {
        let Value::Object(map) = &candidate else {
            return Err(DossierError::Contract(format!(
                "expected an object state payload, got {}",
                json_kind(&candidate)
            )));
        };
        if map.contains_key("subject") {
            break;
        }
        let nested = ENVELOPE_KEYS
            .iter()
            .find_map(|key| map.get(*key).filter(|v| v.is_object()).cloned());
        match nested {
            Some(inner) => candidate = inner,
            None => return Err(DossierError::Contract("state payload has no subject".to_string())),
        }
    }
    serde_json::from_value(candidate)
        .map_err(|e| DossierError::Contract(format!("state payload has the wrong shape: {e}")))
}

pub fn state_to_payload(state: &InvestigationState) -> Result<Value, DossierError> {
    serde_json::to_value(state).map_err(|e| DossierError::Contract(format!("state is not serializable: {e}")))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelopes_are_unwrapped() {
        let payload = json!({"value": {"state": {"subject": "Acme", "objectives": ["x"]}}});
        let state = state_from_payload(payload).unwrap();
        assert_eq!(state.subject, "Acme");
        assert!(state.findings.is_empty());
    }

    #[test]
    fn wrong_shaped_payloads_are_contract_violations() {
        for payload in [
            json!([1, 2, 3]),
            json!("Acme"),
            json!({"nothing": "here"}),
            json!({"subject": "Acme", "objectives": "not a list"}),
        ] {
            let err = state_from_payload(payload).unwrap_err();
            assert!(matches!(err, DossierError::Contract(_)), "got {err:?}");
        }
    }

    #[test]
    fn unknown_context_keys_survive_a_round_trip() {
        let payload = json!({
            "subject": "Acme",
            "objectives": ["x"],
            "context": {"iteration": 2, "analyst_note": "check filings"}
        });
        let state = state_from_payload(payload).unwrap();
        assert_eq!(state.context.iteration, 2);
        let back = state_to_payload(&state).unwrap();
        assert_eq!(back["context"]["analyst_note"], "check filings");
    }
}
