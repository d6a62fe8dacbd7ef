//! Replicate prediction payloads.

use serde::Deserialize;

/// Lifecycle status of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Prediction {
    /// Image reference produced by a successful prediction.
    ///
    /// A list output yields its first string element, a string output
    /// yields itself; anything else is treated as no output.
    pub fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::String(url) => Some(url.clone()),
            serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
            _ => None,
        }
    }

    /// Human-readable failure message.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {} ended as {:?}", self.id, self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Prediction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn list_output_yields_first_url() {
        let p = parse(r#"{"id":"p1","status":"succeeded","output":["https://x/a.png","https://x/b.png"]}"#);
        assert_eq!(p.output_url().as_deref(), Some("https://x/a.png"));
    }

    #[test]
    fn string_output_yields_itself() {
        let p = parse(r#"{"id":"p1","status":"succeeded","output":"https://x/a.png"}"#);
        assert_eq!(p.output_url().as_deref(), Some("https://x/a.png"));
    }

    #[test]
    fn empty_or_missing_output_is_none() {
        assert!(parse(r#"{"id":"p1","status":"succeeded","output":[]}"#).output_url().is_none());
        assert!(parse(r#"{"id":"p1","status":"succeeded","output":null}"#).output_url().is_none());
        assert!(parse(r#"{"id":"p1","status":"processing"}"#).output_url().is_none());
    }

    #[test]
    fn statuses() {
        assert!(parse(r#"{"id":"p","status":"failed","error":"boom"}"#).status.is_terminal());
        assert!(!parse(r#"{"id":"p","status":"starting"}"#).status.is_terminal());
        assert_eq!(parse(r#"{"id":"p","status":"queued_weird"}"#).status, PredictionStatus::Unknown);
    }

    #[test]
    fn error_message_prefers_provider_text() {
        let p = parse(r#"{"id":"p","status":"failed","error":"Request was throttled"}"#);
        assert_eq!(p.error_message(), "Request was throttled");
    }
}
