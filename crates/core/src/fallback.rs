//! Commands the model spells out as JSON in its text output instead of
//! issuing a tool call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::command::{Command, CommandError, VERBS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Navigate,
    LessonControl,
    Discovery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    has_command: Option<bool>,
    #[serde(default)]
    command: Option<FallbackCommand>,
}

/// Finds a command in model text. Returns `None` when there is none.
pub fn extract(text: &str) -> Option<FallbackCommand> {
    from_value(parse_json(text)?)
}

/// Accepts `{hasCommand, command}` or a bare `{type, action, params}`.
pub fn from_value(value: Value) -> Option<FallbackCommand> {
    if value.get("command").is_some() || value.get("hasCommand").is_some() {
        let envelope: Envelope = serde_json::from_value(value).ok()?;
        if envelope.has_command == Some(false) {
            return None;
        }
        return envelope.command;
    }
    serde_json::from_value(value).ok()
}

fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string, e.g. "json"
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_json(text: &str) -> Option<Value> {
    let direct = serde_json::from_str::<Value>(strip_fence(text))
        .ok()
        .filter(Value::is_object);
    if direct.is_some() {
        return direct;
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn default_arg(args: &mut Map<String, Value>, key: &str, value: Value) {
    args.entry(key.to_string()).or_insert(value);
}

fn verb_for(action_key: &str) -> Option<&'static str> {
    let squashed = action_key.replace('_', "");
    VERBS.iter().copied().find(|verb| verb.to_lowercase() == squashed)
}

impl FallbackCommand {
    pub fn new(kind: CommandKind, action: &str, params: Value) -> Self {
        Self {
            kind,
            action: Some(action.to_string()),
            params: params.as_object().cloned(),
        }
    }

    /// Maps onto the same [`Command`] a tool call would produce.
    pub fn to_command(&self) -> Result<Command, CommandError> {
        let action = self.action.as_deref().unwrap_or_default().trim();
        let action_key = action.to_lowercase().replace([' ', '-'], "_");
        let mut args: Map<String, Value> = self
            .params
            .iter()
            .flatten()
            .map(|(k, v)| (camel_case(k), v.clone()))
            .collect();

        let verb = match (self.kind, action_key.as_str()) {
            (CommandKind::Navigate, "chapter" | "open_chapter") => "openChapter",
            (CommandKind::Navigate, "lesson" | "open_lesson") => "openLesson",
            (CommandKind::Navigate, "back" | "go_back" | "forward" | "go_forward") => {
                let direction = if action_key.ends_with("back") { "back" } else { "forward" };
                default_arg(&mut args, "direction", json!(direction));
                "navigateHistory"
            }
            (CommandKind::Navigate, "scroll_up" | "scroll_down" | "scroll_top" | "scroll_bottom") => {
                default_arg(&mut args, "direction", json!(action_key.trim_start_matches("scroll_")));
                "scrollPage"
            }
            (CommandKind::Navigate, "braille") => "openBraille",
            (CommandKind::Navigate, "story" | "story_mode") => "openStoryMode",
            (CommandKind::Discovery, "subjects") => "listSubjects",
            (CommandKind::Discovery, "chapters") => "listChapters",
            _ => match verb_for(&action_key) {
                Some(verb) => verb,
                None => match self.kind {
                    CommandKind::Navigate => {
                        if !action.is_empty() {
                            default_arg(&mut args, "destination", json!(action));
                        }
                        "navigate"
                    }
                    CommandKind::LessonControl => {
                        if !action.is_empty() {
                            default_arg(&mut args, "action", json!(action));
                        }
                        "lessonControl"
                    }
                    CommandKind::Discovery => {
                        if args.contains_key("subject") {
                            "listChapters"
                        } else {
                            "listSubjects"
                        }
                    }
                },
            },
        };

        Command::from_tool_call(verb, &Value::Object(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LessonAction;

    #[test]
    fn test_fenced_envelope() {
        let text = "```json\n{\"hasCommand\":true,\"command\":{\"type\":\"lesson_control\",\"action\":\"pause\"}}\n```";

        let command = extract(text).unwrap();

        assert_eq!(command.kind, CommandKind::LessonControl);
        assert_eq!(
            command.to_command().unwrap(),
            Command::LessonControl {
                action: LessonAction::Pause
            }
        );
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = r#"Sure, opening it now. {"type": "navigate", "action": "chapter", "params": {"chapter_number": 1}} Enjoy!"#;

        let command = extract(text).unwrap();

        assert_eq!(
            command.to_command().unwrap(),
            Command::OpenChapter {
                subject: None,
                chapter_number: 1
            }
        );
    }

    #[test]
    fn test_no_command() {
        assert!(extract("The mitochondria is the powerhouse of the cell.").is_none());
        assert!(extract(r#"{"hasCommand": false, "command": null}"#).is_none());
        assert!(extract("{ not json }").is_none());
        assert!(extract("} backwards {").is_none());
    }

    #[test]
    fn test_navigate_keyword_and_history() {
        let home = FallbackCommand::new(CommandKind::Navigate, "home", json!({}));
        assert_eq!(
            home.to_command().unwrap(),
            Command::Navigate {
                destination: "home".to_string()
            }
        );

        let back = FallbackCommand::new(CommandKind::Navigate, "go back", json!({}));
        assert_eq!(back.to_command().unwrap().name(), "navigateHistory");
    }

    #[test]
    fn test_verb_names_pass_through() {
        let toggle = FallbackCommand::new(CommandKind::Navigate, "toggle_captions", json!(null));
        assert_eq!(toggle.to_command().unwrap(), Command::ToggleCaptions {});

        let camel = FallbackCommand::new(CommandKind::LessonControl, "quizSubmit", json!({}));
        assert_eq!(camel.to_command().unwrap(), Command::QuizSubmit {});
    }

    #[test]
    fn test_discovery_defaults() {
        let subjects = FallbackCommand::new(CommandKind::Discovery, "what can I learn", json!({}));
        assert_eq!(subjects.to_command().unwrap(), Command::ListSubjects {});

        let chapters = FallbackCommand::new(CommandKind::Discovery, "chapters", json!({"subject": "physics"}));
        assert_eq!(
            chapters.to_command().unwrap(),
            Command::ListChapters {
                subject: Some("physics".to_string())
            }
        );
    }

    #[test]
    fn test_unresolvable_navigate_is_an_error() {
        let nowhere = FallbackCommand {
            kind: CommandKind::Navigate,
            action: None,
            params: None,
        };
        assert!(nowhere.to_command().is_err());
    }
}
