//! Progress event payloads
//!
//! Every event a job publishes carries the same JSON envelope:
//!
//! ```json
//! {"code":202,"event":"analyzing_face","message":"Analyzing face",
//!  "stream_completion":50,"data":null}
//! ```

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::frame;

/// Progress milestones a job reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Stream is open
    Ready,
    /// Upload received, image being prepared
    ProcessingImage,
    /// Image sent to the analysis backend
    AnalyzingFace,
    /// Job finished, result in `data`
    Completed,
    /// Job failed
    Error,
}

impl EventKind {
    /// SSE event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::ProcessingImage => "processing_image",
            EventKind::AnalyzingFace => "analyzing_face",
            EventKind::Completed => "completed",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON payload of a progress event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    /// HTTP-like status code (200 done, 202 in progress, 4xx/5xx failure)
    pub code: u16,
    pub event: EventKind,
    pub message: String,
    /// Completion percentage, 0-100
    pub stream_completion: u8,
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

impl EventMessage {
    pub fn new(code: u16, event: EventKind, message: impl Into<String>) -> Self {
        Self {
            code,
            event,
            message: message.into(),
            stream_completion: 0,
            data: None,
            stream_id: None,
        }
    }

    /// First event of a stream, announcing its id
    pub fn ready(stream_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(200, EventKind::Ready, message).stream_id(stream_id)
    }

    /// Intermediate milestone
    pub fn progress(event: EventKind, message: impl Into<String>, completion: u8) -> Self {
        Self::new(202, event, message).completion(completion)
    }

    /// Final event carrying the job result
    pub fn completed(message: impl Into<String>, data: Value) -> Self {
        Self::new(200, EventKind::Completed, message)
            .completion(100)
            .data(data)
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::new(code, EventKind::Error, message)
    }

    /// Set completion, clamped to 100
    pub fn completion(mut self, percent: u8) -> Self {
        self.stream_completion = percent.min(100);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Encode as a wire-ready SSE frame
    pub fn to_frame(&self) -> Result<Bytes, serde_json::Error> {
        frame::encode_json(self.event.as_str(), self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_progress_frame() {
        let frame = EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50)
            .to_frame()
            .unwrap();

        assert_eq!(
            std::str::from_utf8(&frame).unwrap(),
            "event: analyzing_face\n\
             data: {\"code\":202,\"event\":\"analyzing_face\",\"message\":\"Analyzing face\",\
             \"stream_completion\":50,\"data\":null}\n\n"
        );
    }

    #[test]
    fn test_ready_carries_stream_id() {
        let value = serde_json::to_value(EventMessage::ready("s-1", "Stream initialized")).unwrap();
        assert_eq!(value["stream_id"], "s-1");
        assert_eq!(value["event"], "ready");
        assert_eq!(value["code"], 200);
    }

    #[test]
    fn test_completed_has_data() {
        let message = EventMessage::completed("Scan complete", json!({"score": 0.9}));
        assert_eq!(message.stream_completion, 100);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["data"]["score"], 0.9);
        assert!(value.get("stream_id").is_none());
    }

    #[test]
    fn test_completion_is_clamped() {
        let message = EventMessage::progress(EventKind::ProcessingImage, "x", 250);
        assert_eq!(message.stream_completion, 100);
    }

    #[test]
    fn test_event_names_match_serde() {
        for kind in [
            EventKind::Ready,
            EventKind::ProcessingImage,
            EventKind::AnalyzingFace,
            EventKind::Completed,
            EventKind::Error,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }
}
