use crate::content::Content;
use crate::tools::FunctionCall;
use serde_json::Value;

/// A message from the live service. Exactly which fields are present decides
/// how the message is routed; unknown fields are ignored.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub generation_complete: Option<bool>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub response_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tool_call() {
        let json = r#"{"toolCall":{"functionCalls":[{"id":"a1","name":"openChapter","args":{"subject":"physics","chapterNumber":2}}]}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let calls = message.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "a1");
        assert_eq!(calls[0].args["chapterNumber"], 2);
    }

    #[test]
    fn test_deserialize_server_content() {
        let json = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hi"},{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}}]},"turnComplete":true}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let content = message.server_content.unwrap();
        assert_eq!(content.turn_complete, Some(true));
        let parts = content.model_turn.unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("hi"));
        assert_eq!(parts[1].inline_data.as_ref().unwrap().mime_type, "audio/pcm;rate=24000");
    }

    #[test]
    fn test_deserialize_unknown_shape() {
        let message: ServerMessage = serde_json::from_str(r#"{"somethingNew":{}}"#).unwrap();
        assert!(message.setup_complete.is_none());
        assert!(message.server_content.is_none());
    }
}
