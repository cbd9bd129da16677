// =============================================================================
// Remote Reply — strict parsing of the model's answer
// =============================================================================
//
// The reply content must contain one JSON object with
//   action      "buy" | "sell" | "hold"   (case-insensitive)
//   confidence  number or numeric string in [0, 1]
//   reasoning   optional free text
// Markdown code fences and prose around the object are tolerated; anything
// else is `RemoteServiceError::Malformed`.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteServiceError;
use crate::types::Action;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReply {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
}

/// Slice out the outermost `{ ... }` of `content`.
fn extract_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

pub fn parse_reply(content: &str) -> Result<RemoteReply, RemoteServiceError> {
    let malformed = |msg: String| RemoteServiceError::Malformed(msg);

    let object = extract_object(content).ok_or_else(|| malformed("no JSON object in reply".to_string()))?;
    let value: Value = serde_json::from_str(object).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let action_token = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing action field".to_string()))?;
    let action =
        Action::parse_token(action_token).ok_or_else(|| malformed(format!("unknown action '{action_token}'")))?;

    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| malformed("missing or unparseable confidence".to_string()))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(malformed(format!("confidence {confidence} outside [0, 1]")));
    }

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(RemoteReply {
        action,
        confidence,
        reasoning,
    })
}
