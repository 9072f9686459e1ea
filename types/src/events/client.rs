use crate::audio::AudioFrame;
use crate::content::{Blob, Content};
use crate::setup::Setup;
use crate::tools::FunctionResponse;

/// Messages sent from the client to the live service. Each serializes as a
/// single-key object, e.g. `{"toolResponse": {...}}`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
    ClientContent(ClientContent),
}

impl ClientMessage {
    pub fn audio(frame: &AudioFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Some(Blob {
                mime_type: frame.mime_type(),
                data: frame.to_base64(),
            }),
            audio_stream_end: None,
        })
    }

    pub fn audio_stream_end() -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: None,
            audio_stream_end: Some(true),
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse { function_responses })
    }

    pub fn content(turns: Vec<Content>, turn_complete: bool) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns,
            turn_complete,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::INPUT_SAMPLE_RATE;
    use serde_json::json;

    #[test]
    fn test_serialize_audio() {
        let frame = AudioFrame::from_samples(&[0, 1], INPUT_SAMPLE_RATE);
        let value = serde_json::to_value(ClientMessage::audio(&frame)).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"audio": {"mimeType": "audio/pcm;rate=16000", "data": "AAABAA=="}}})
        );
    }

    #[test]
    fn test_serialize_tool_response() {
        let message = ClientMessage::tool_response(vec![FunctionResponse::new(
            "call-1".to_string(),
            "quizSubmit".to_string(),
            json!({"success": true}),
        )]);
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(
            value,
            json!({"toolResponse": {"functionResponses": [
                {"id": "call-1", "name": "quizSubmit", "response": {"success": true}}
            ]}})
        );
    }

    #[test]
    fn test_serialize_content() {
        let message = ClientMessage::content(vec![Content::user_text("hello")], true);
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(
            value,
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "hello"}]}], "turnComplete": true}})
        );
    }
}
