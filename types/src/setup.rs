use crate::content::{Content, Part};
use crate::tools::{FunctionDeclaration, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StartSensitivity {
    #[serde(rename = "START_SENSITIVITY_HIGH")]
    High,
    #[serde(rename = "START_SENSITIVITY_LOW")]
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EndSensitivity {
    #[serde(rename = "END_SENSITIVITY_HIGH")]
    High,
    #[serde(rename = "END_SENSITIVITY_LOW")]
    Low,
}

/// Server side voice activity detection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetection {
    pub disabled: bool,
    #[serde(rename = "startOfSpeechSensitivity")]
    pub start_sensitivity: StartSensitivity,
    #[serde(rename = "endOfSpeechSensitivity")]
    pub end_sensitivity: EndSensitivity,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for ActivityDetection {
    fn default() -> Self {
        Self {
            disabled: false,
            start_sensitivity: StartSensitivity::Low,
            end_sensitivity: EndSensitivity::Low,
            prefix_padding_ms: 100,
            silence_duration_ms: 500,
        }
    }
}

/// Capability descriptor sent before any audio: response modality, voice,
/// system instruction, tool declarations and VAD sensitivity.
///
/// A default `LiveConfig` is empty and a session refuses to connect with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveConfig {
    response_modalities: Vec<Modality>,
    voice: Option<String>,
    system_instruction: Option<String>,
    tools: Vec<FunctionDeclaration>,
    activity_detection: Option<ActivityDetection>,
    input_transcription: bool,
    output_transcription: bool,
}

impl LiveConfig {
    pub fn builder() -> LiveConfigBuilder {
        LiveConfigBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.response_modalities.is_empty()
            && self.voice.is_none()
            && self.system_instruction.is_none()
            && self.tools.is_empty()
            && self.activity_detection.is_none()
            && !self.input_transcription
            && !self.output_transcription
    }

    pub fn response_modalities(&self) -> &[Modality] {
        &self.response_modalities
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn tools(&self) -> &[FunctionDeclaration] {
        &self.tools
    }

    /// Builds the `setup` payload for `model_id`.
    pub fn to_setup(&self, model_id: &str) -> Setup {
        let model = if model_id.starts_with("models/") {
            model_id.to_string()
        } else {
            format!("models/{}", model_id)
        };
        let speech_config = self.voice.as_ref().map(|voice| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice.clone(),
                },
            },
        });
        let tools = if self.tools.is_empty() {
            vec![]
        } else {
            vec![Tool {
                function_declarations: self.tools.clone(),
            }]
        };
        Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: self.response_modalities.clone(),
                speech_config,
            },
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            }),
            tools,
            realtime_input_config: self.activity_detection.clone().map(|vad| RealtimeInputConfig {
                automatic_activity_detection: vad,
            }),
            input_audio_transcription: self.input_transcription.then_some(TranscriptionConfig {}),
            output_audio_transcription: self.output_transcription.then_some(TranscriptionConfig {}),
        }
    }
}

pub struct LiveConfigBuilder {
    config: LiveConfig,
}

impl Default for LiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LiveConfig::default(),
        }
    }

    pub fn with_response_modality(mut self, modality: Modality) -> Self {
        if !self.config.response_modalities.contains(&modality) {
            self.config.response_modalities.push(modality);
        }
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.config.voice = Some(voice.to_string());
        self
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.config.system_instruction = Some(instruction.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    pub fn with_activity_detection(mut self, vad: ActivityDetection) -> Self {
        self.config.activity_detection = Some(vad);
        self
    }

    pub fn with_input_transcription(mut self) -> Self {
        self.config.input_transcription = true;
        self
    }

    pub fn with_output_transcription(mut self) -> Self {
        self.config.output_transcription = true;
        self
    }

    pub fn build(self) -> LiveConfig {
        self.config
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input_config: Option<RealtimeInputConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputConfig {
    pub automatic_activity_detection: ActivityDetection,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptionConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_config() {
        assert!(LiveConfig::default().is_empty());
        assert!(LiveConfig::builder().build().is_empty());
        assert!(!LiveConfig::builder().with_response_modality(Modality::Audio).build().is_empty());
    }

    #[test]
    fn test_serialize_setup() {
        let config = LiveConfig::builder()
            .with_response_modality(Modality::Audio)
            .with_voice("Puck")
            .with_system_instruction("You are a helpful tutor.")
            .with_tools(vec![FunctionDeclaration::new("quizSubmit", "Submit the quiz", None)])
            .with_input_transcription()
            .build();
        let setup = serde_json::to_value(config.to_setup("gemini-live-2.5-flash-preview")).unwrap();
        assert_eq!(
            setup,
            json!({
                "model": "models/gemini-live-2.5-flash-preview",
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {"voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Puck"}}}
                },
                "systemInstruction": {"parts": [{"text": "You are a helpful tutor."}]},
                "tools": [{"functionDeclarations": [{"name": "quizSubmit", "description": "Submit the quiz"}]}],
                "inputAudioTranscription": {}
            })
        );
    }

    #[test]
    fn test_model_prefix_kept() {
        let config = LiveConfig::builder().with_response_modality(Modality::Text).build();
        assert_eq!(config.to_setup("models/custom").model, "models/custom");
    }
}
