use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Tool names the dispatcher understands, in declaration order.
pub const VERBS: &[&str] = &[
    "navigate",
    "openLesson",
    "openChapter",
    "lessonControl",
    "listSubjects",
    "listChapters",
    "convertBraille",
    "toggleFocusMode",
    "openStoryMode",
    "openBraille",
    "setLanguage",
    "toggleLargeText",
    "toggleCaptions",
    "toggleSigns",
    "toggleReduceMotion",
    "quizSelectOption",
    "quizSubmit",
    "scrollPage",
    "navigateHistory",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown tool")]
    UnknownTool(String),
    #[error("invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },
}

/// One application intent, whichever way it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "name",
    content = "args",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    Navigate {
        destination: String,
    },
    OpenLesson {
        #[serde(default)]
        subject: Option<String>,
        #[serde(deserialize_with = "ordinal::required")]
        chapter_number: u32,
        #[serde(default, deserialize_with = "ordinal::optional")]
        lesson_number: Option<u32>,
        #[serde(default)]
        content_type: Option<ContentType>,
    },
    OpenChapter {
        #[serde(default)]
        subject: Option<String>,
        #[serde(deserialize_with = "ordinal::required")]
        chapter_number: u32,
    },
    LessonControl {
        action: LessonAction,
    },
    ListSubjects {},
    ListChapters {
        #[serde(default)]
        subject: Option<String>,
    },
    ConvertBraille {
        text: String,
    },
    ToggleFocusMode {},
    OpenStoryMode {},
    OpenBraille {},
    SetLanguage {
        language: String,
    },
    ToggleLargeText {},
    ToggleCaptions {},
    ToggleSigns {},
    ToggleReduceMotion {},
    QuizSelectOption {
        option: QuizOption,
    },
    QuizSubmit {},
    ScrollPage {
        direction: ScrollDirection,
        #[serde(default, deserialize_with = "ordinal::optional")]
        amount: Option<u32>,
    },
    NavigateHistory {
        #[serde(default)]
        direction: HistoryDirection,
        #[serde(default, deserialize_with = "ordinal::optional")]
        steps: Option<u32>,
    },
}

impl Command {
    /// Builds a command from a function call. `null` arguments count as `{}`.
    pub fn from_tool_call(name: &str, args: &Value) -> Result<Self, CommandError> {
        if !VERBS.contains(&name) {
            return Err(CommandError::UnknownTool(name.to_string()));
        }
        let args = if args.is_null() { json!({}) } else { args.clone() };
        serde_json::from_value(json!({ "name": name, "args": args })).map_err(|e| {
            CommandError::InvalidArguments {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Navigate { .. } => "navigate",
            Command::OpenLesson { .. } => "openLesson",
            Command::OpenChapter { .. } => "openChapter",
            Command::LessonControl { .. } => "lessonControl",
            Command::ListSubjects {} => "listSubjects",
            Command::ListChapters { .. } => "listChapters",
            Command::ConvertBraille { .. } => "convertBraille",
            Command::ToggleFocusMode {} => "toggleFocusMode",
            Command::OpenStoryMode {} => "openStoryMode",
            Command::OpenBraille {} => "openBraille",
            Command::SetLanguage { .. } => "setLanguage",
            Command::ToggleLargeText {} => "toggleLargeText",
            Command::ToggleCaptions {} => "toggleCaptions",
            Command::ToggleSigns {} => "toggleSigns",
            Command::ToggleReduceMotion {} => "toggleReduceMotion",
            Command::QuizSelectOption { .. } => "quizSelectOption",
            Command::QuizSubmit {} => "quizSubmit",
            Command::ScrollPage { .. } => "scrollPage",
            Command::NavigateHistory { .. } => "navigateHistory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LessonAction {
    Play,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    Restart,
}

impl TryFrom<String> for LessonAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let action = match value.trim().to_lowercase().as_str() {
            "play" | "start" => LessonAction::Play,
            "pause" => LessonAction::Pause,
            "resume" | "continue" | "unpause" => LessonAction::Resume,
            "stop" => LessonAction::Stop,
            "next" | "skip" | "forward" => LessonAction::Next,
            "previous" | "prev" | "back" => LessonAction::Previous,
            "restart" | "replay" => LessonAction::Restart,
            _ => return Err(format!("unknown lesson action {:?}", value)),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ContentType {
    Article,
    Video,
    Quiz,
    Practice,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Video => "video",
            ContentType::Quiz => "quiz",
            ContentType::Practice => "practice",
        }
    }
}

impl TryFrom<String> for ContentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let content_type = match value.trim().to_lowercase().trim_end_matches('s') {
            "article" | "reading" | "text" => ContentType::Article,
            "video" => ContentType::Video,
            "quiz" | "quizze" | "test" => ContentType::Quiz,
            "practice" | "exercise" => ContentType::Practice,
            _ => return Err(format!("unknown content type {:?}", value)),
        };
        Ok(content_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl TryFrom<String> for ScrollDirection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "top" => Ok(ScrollDirection::Top),
            "bottom" => Ok(ScrollDirection::Bottom),
            _ => Err(format!("unknown scroll direction {:?}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum HistoryDirection {
    #[default]
    Back,
    Forward,
}

impl HistoryDirection {
    /// Signed history delta for `steps` entries.
    pub fn delta(&self, steps: u32) -> i32 {
        let steps = steps.min(i32::MAX as u32) as i32;
        match self {
            HistoryDirection::Back => -steps,
            HistoryDirection::Forward => steps,
        }
    }
}

impl TryFrom<String> for HistoryDirection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "back" | "backward" | "backwards" | "previous" => Ok(HistoryDirection::Back),
            "forward" | "forwards" | "next" => Ok(HistoryDirection::Forward),
            _ => Err(format!("unknown history direction {:?}", value)),
        }
    }
}

/// Zero-based quiz option. Accepts a 1-based number or a letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct QuizOption(pub usize);

impl TryFrom<Value> for QuizOption {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::String(s) = &value {
            let s = s.trim();
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if c.is_ascii_alphabetic() {
                    let index = c.to_ascii_lowercase() as usize - 'a' as usize;
                    return Ok(QuizOption(index));
                }
            }
        }
        ordinal::parse(&value)
            .map(|n| QuizOption(n as usize - 1))
            .ok_or_else(|| format!("invalid quiz option {}", value))
    }
}

/// Lenient 1-based ordinals: `2`, `2.0`, `"2"`, `"two"`, `"second"`.
pub(crate) mod ordinal {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    const WORDS: &[(&str, &str)] = &[
        ("one", "first"),
        ("two", "second"),
        ("three", "third"),
        ("four", "fourth"),
        ("five", "fifth"),
        ("six", "sixth"),
        ("seven", "seventh"),
        ("eight", "eighth"),
        ("nine", "ninth"),
        ("ten", "tenth"),
    ];

    pub fn parse(value: &Value) -> Option<u32> {
        let n = match value {
            Value::Number(n) => match n.as_u64() {
                Some(n) => n,
                None => {
                    let f = n.as_f64()?;
                    if f.fract() != 0.0 || f < 0.0 {
                        return None;
                    }
                    f as u64
                }
            },
            Value::String(s) => parse_str(s)?,
            _ => return None,
        };
        u32::try_from(n).ok().filter(|n| *n >= 1)
    }

    fn parse_str(s: &str) -> Option<u64> {
        let s = s.trim().to_lowercase();
        if let Ok(n) = s.parse::<u64>() {
            return Some(n);
        }
        let digits = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        if !digits.is_empty() && digits.len() < s.len() {
            // "2nd", "3rd"
            if let Ok(n) = digits.parse::<u64>() {
                return Some(n);
            }
        }
        WORDS
            .iter()
            .position(|(cardinal, ordinal)| *cardinal == s || *ordinal == s)
            .map(|i| i as u64 + 1)
    }

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| D::Error::custom(format!("invalid ordinal {}", value)))
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        parse(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid ordinal {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool() {
        let err = Command::from_tool_call("launchRocket", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "unknown tool");
    }

    #[test]
    fn test_chapter_number_is_lenient() {
        for raw in [json!(2), json!(2.0), json!("2"), json!("two"), json!("second"), json!("2nd")] {
            let command =
                Command::from_tool_call("openChapter", &json!({"subject": "physics", "chapterNumber": raw}))
                    .unwrap();
            assert_eq!(
                command,
                Command::OpenChapter {
                    subject: Some("physics".to_string()),
                    chapter_number: 2
                }
            );
        }
    }

    #[test]
    fn test_zero_or_missing_chapter_is_rejected() {
        let err = Command::from_tool_call("openChapter", &json!({"chapterNumber": 0})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidArguments { .. }));
        assert!(Command::from_tool_call("openChapter", &json!({"subject": "physics"})).is_err());
    }

    #[test]
    fn test_null_args_for_argument_free_verbs() {
        assert_eq!(Command::from_tool_call("quizSubmit", &Value::Null).unwrap(), Command::QuizSubmit {});
        assert_eq!(
            Command::from_tool_call("toggleCaptions", &json!({"unused": true})).unwrap(),
            Command::ToggleCaptions {}
        );
    }

    #[test]
    fn test_lesson_action_synonyms() {
        let command = Command::from_tool_call("lessonControl", &json!({"action": "Continue"})).unwrap();
        assert_eq!(
            command,
            Command::LessonControl {
                action: LessonAction::Resume
            }
        );
        assert!(Command::from_tool_call("lessonControl", &json!({"action": "dance"})).is_err());
    }

    #[test]
    fn test_quiz_option_letter_or_number() {
        let by_letter = Command::from_tool_call("quizSelectOption", &json!({"option": "B"})).unwrap();
        let by_number = Command::from_tool_call("quizSelectOption", &json!({"option": 2})).unwrap();
        assert_eq!(by_letter, by_number);
        assert_eq!(
            by_letter,
            Command::QuizSelectOption {
                option: QuizOption(1)
            }
        );
    }

    #[test]
    fn test_open_lesson_content_type() {
        let command = Command::from_tool_call(
            "openLesson",
            &json!({"chapterNumber": 1, "lessonNumber": "3", "contentType": "Videos"}),
        )
        .unwrap();
        assert_eq!(
            command,
            Command::OpenLesson {
                subject: None,
                chapter_number: 1,
                lesson_number: Some(3),
                content_type: Some(ContentType::Video),
            }
        );
    }

    #[test]
    fn test_history_defaults_to_back() {
        let command = Command::from_tool_call("navigateHistory", &json!({})).unwrap();
        assert_eq!(
            command,
            Command::NavigateHistory {
                direction: HistoryDirection::Back,
                steps: None
            }
        );
        assert_eq!(HistoryDirection::Back.delta(2), -2);
    }

    #[test]
    fn test_name_matches_verb_table() {
        let command = Command::from_tool_call("scrollPage", &json!({"direction": "down"})).unwrap();
        assert_eq!(command.name(), "scrollPage");
        assert!(VERBS.contains(&command.name()));
    }
}
