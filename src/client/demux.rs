use live_voice_types::audio::{parse_pcm_mime, AudioFrame};
use live_voice_types::events::server::ServerContent;
use live_voice_types::{Content, ServerMessage};

use crate::client::SessionEvent;

/// Splits one server message into session events.
///
/// Routing is exclusive and follows a fixed priority: setup completion, tool
/// calls, tool call cancellations, then server content. A message matching
/// none of them yields no events.
pub(crate) fn demux(message: ServerMessage) -> Vec<SessionEvent> {
    if message.setup_complete.is_some() {
        return vec![SessionEvent::SetupComplete];
    }
    if let Some(tool_call) = message.tool_call {
        return vec![SessionEvent::ToolCall(tool_call.function_calls)];
    }
    if let Some(cancellation) = message.tool_call_cancellation {
        return vec![SessionEvent::ToolCallCancellation(cancellation.ids)];
    }
    if let Some(content) = message.server_content {
        return demux_content(content);
    }
    if let Some(go_away) = message.go_away {
        return vec![SessionEvent::GoAway(go_away.time_left)];
    }
    vec![]
}

fn demux_content(content: ServerContent) -> Vec<SessionEvent> {
    // An interruption voids the rest of the message.
    if content.interrupted == Some(true) {
        return vec![SessionEvent::Interrupted];
    }

    let mut events = vec![];

    if let Some(transcription) = content.input_transcription.and_then(|t| t.text) {
        if !transcription.is_empty() {
            events.push(SessionEvent::InputTranscription(transcription));
        }
    }

    if let Some(model_turn) = content.model_turn {
        let mut rest = Content {
            role: model_turn.role,
            parts: vec![],
        };
        for part in model_turn.parts {
            let rate = part
                .inline_data
                .as_ref()
                .and_then(|blob| parse_pcm_mime(&blob.mime_type));
            match (rate, part.inline_data.as_ref()) {
                (Some(rate), Some(blob)) => match AudioFrame::from_base64(&blob.data, rate) {
                    Some(frame) => events.push(SessionEvent::Audio(frame)),
                    None => tracing::warn!("dropping audio part with invalid base64 payload"),
                },
                _ => rest.parts.push(part),
            }
        }
        if !rest.parts.is_empty() {
            events.push(SessionEvent::Content(rest));
        }
    }

    if let Some(transcription) = content.output_transcription.and_then(|t| t.text) {
        if !transcription.is_empty() {
            events.push(SessionEvent::OutputTranscription(transcription));
        }
    }

    if content.turn_complete == Some(true) {
        events.push(SessionEvent::TurnComplete);
    }

    events
}
