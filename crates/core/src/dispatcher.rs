use std::sync::Arc;

use futures::future::join_all;
use live_voice_types::{FunctionCall, FunctionResponse};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::app::{LessonCatalog, LessonControls, Navigator, PreferenceSync, Subject};
use crate::braille::to_braille;
use crate::command::{Command, ContentType};
use crate::fallback::{self, FallbackCommand};
use crate::resolve::{
    SubjectResolver, chapter_by_ordinal, chapter_route, destination_route, item_route, resolve_item, subject_route,
};
use crate::settings::{AccessibilityFlag, SettingsStore};

/// Outcome of one command, echoed back to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(flatten)]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl From<CommandResult> for Value {
    fn from(result: CommandResult) -> Self {
        let mut object = result.data;
        object.insert("success".to_string(), Value::Bool(result.success));
        if let Some(error) = result.error {
            object.insert("error".to_string(), Value::String(error));
        }
        Value::Object(object)
    }
}

/// Runs commands against the host application.
///
/// Every path reports through a [`CommandResult`]; nothing here panics or
/// returns an error to the caller.
pub struct CommandDispatcher {
    navigator: Arc<dyn Navigator>,
    catalog: Arc<dyn LessonCatalog>,
    lesson: Arc<dyn LessonControls>,
    settings: SettingsStore,
    preferences: Option<Arc<dyn PreferenceSync>>,
    resolver: SubjectResolver,
}

impl CommandDispatcher {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        catalog: Arc<dyn LessonCatalog>,
        lesson: Arc<dyn LessonControls>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            navigator,
            catalog,
            lesson,
            settings,
            preferences: None,
            resolver: SubjectResolver::new(),
        }
    }

    /// Language changes are also pushed here, for a signed-in user.
    pub fn with_preference_sync(mut self, preferences: Arc<dyn PreferenceSync>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Answers a batch: one response per call, in call order.
    pub async fn execute_tool_calls(&self, calls: &[FunctionCall]) -> Vec<FunctionResponse> {
        let handlers = calls.iter().map(|call| async move {
            let result = match Command::from_tool_call(&call.name, &call.args) {
                Ok(command) => self.execute(&command).await,
                Err(e) => {
                    tracing::warn!("tool call {} ({}) rejected: {}", call.name, call.id, e);
                    CommandResult::failed(e.to_string())
                }
            };
            FunctionResponse::new(call.id.clone(), call.name.clone(), result.into())
        });
        join_all(handlers).await
    }

    /// Runs a fallback command. `false` when it does not resolve or fails.
    pub async fn execute_command(&self, command: &FallbackCommand) -> bool {
        match command.to_command() {
            Ok(command) => self.execute(&command).await.success,
            Err(e) => {
                tracing::debug!("fallback command ignored: {}", e);
                false
            }
        }
    }

    /// Scans model text for a fallback command and runs it.
    pub async fn execute_text(&self, text: &str) -> bool {
        match fallback::extract(text) {
            Some(command) => self.execute_command(&command).await,
            None => false,
        }
    }

    pub async fn execute(&self, command: &Command) -> CommandResult {
        tracing::info!("executing {}", command.name());
        let result = match command {
            Command::Navigate { destination } => self.navigate(destination),
            Command::OpenChapter {
                subject,
                chapter_number,
            } => self.open_chapter(subject.as_deref(), *chapter_number).await,
            Command::OpenLesson {
                subject,
                chapter_number,
                lesson_number,
                content_type,
            } => {
                self.open_lesson(subject.as_deref(), *chapter_number, *lesson_number, *content_type)
                    .await
            }
            Command::LessonControl { action } => match self.lesson.control(*action) {
                Ok(()) => CommandResult::ok().with("action", json!(action)),
                Err(e) => CommandResult::failed(e.to_string()),
            },
            Command::ListSubjects {} => self.list_subjects().await,
            Command::ListChapters { subject } => self.list_chapters(subject.as_deref()).await,
            Command::ConvertBraille { text } => CommandResult::ok()
                .with("text", text.as_str())
                .with("braille", to_braille(text)),
            Command::ToggleFocusMode {} => self.toggle(AccessibilityFlag::FocusMode),
            Command::ToggleLargeText {} => self.toggle(AccessibilityFlag::LargeText),
            Command::ToggleCaptions {} => self.toggle(AccessibilityFlag::Captions),
            Command::ToggleSigns {} => self.toggle(AccessibilityFlag::Signs),
            Command::ToggleReduceMotion {} => self.toggle(AccessibilityFlag::ReduceMotion),
            Command::OpenStoryMode {} => self.navigate("story mode"),
            Command::OpenBraille {} => self.navigate("braille"),
            Command::SetLanguage { language } => self.set_language(language).await,
            Command::QuizSelectOption { option } => match self.lesson.select_quiz_option(option.0) {
                Ok(()) => CommandResult::ok().with("option", option.0 + 1),
                Err(e) => CommandResult::failed(e.to_string()),
            },
            Command::QuizSubmit {} => match self.lesson.submit_quiz() {
                Ok(()) => CommandResult::ok(),
                Err(e) => CommandResult::failed(e.to_string()),
            },
            Command::ScrollPage { direction, amount } => {
                let amount = amount.unwrap_or(1);
                self.navigator.scroll(*direction, amount);
                CommandResult::ok()
                    .with("direction", json!(direction))
                    .with("amount", amount)
            }
            Command::NavigateHistory { direction, steps } => {
                let steps = steps.unwrap_or(1);
                self.navigator.history(direction.delta(steps));
                CommandResult::ok()
                    .with("direction", json!(direction))
                    .with("steps", steps)
            }
        };
        if let Some(error) = result.error.as_deref() {
            tracing::warn!("{} failed: {}", command.name(), error);
        }
        result
    }

    fn go(&self, route: &str) -> Result<(), CommandResult> {
        self.navigator
            .navigate(route)
            .map_err(|e| CommandResult::failed(format!("navigation to {} failed: {}", route, e)))
    }

    fn navigate(&self, destination: &str) -> CommandResult {
        let Some(route) = destination_route(destination) else {
            return CommandResult::failed(format!("unknown destination {:?}", destination));
        };
        match self.go(&route) {
            Ok(()) => CommandResult::ok()
                .with("destination", destination)
                .with("route", route),
            Err(failed) => failed,
        }
    }

    fn toggle(&self, flag: AccessibilityFlag) -> CommandResult {
        match self.settings.toggle(flag) {
            Ok(enabled) => CommandResult::ok()
                .with("setting", flag.key())
                .with("enabled", enabled),
            Err(e) => CommandResult::failed(e.to_string()),
        }
    }

    async fn set_language(&self, language: &str) -> CommandResult {
        let code = match self.settings.set_language(language) {
            Ok(code) => code,
            Err(e) => return CommandResult::failed(e.to_string()),
        };
        if let Some(preferences) = self.preferences.as_ref() {
            if let Err(e) = preferences.put_language(code).await {
                tracing::warn!("language saved locally but not synced: {:#}", e);
            }
        }
        CommandResult::ok().with("language", code)
    }

    async fn subject(&self, query: Option<&str>) -> Result<Subject, CommandResult> {
        let subjects = self
            .catalog
            .subjects()
            .await
            .map_err(|e| CommandResult::failed(format!("failed to load subjects: {}", e)))?;
        let current = self.navigator.current_route();
        self.resolver
            .resolve(&subjects, query, current.as_deref())
            .cloned()
            .ok_or_else(|| match query {
                Some(query) => CommandResult::failed(format!("subject {:?} not found", query)),
                None => CommandResult::failed("no subject given and none could be inferred"),
            })
    }

    async fn open_chapter(&self, subject: Option<&str>, chapter_number: u32) -> CommandResult {
        let subject = match self.subject(subject).await {
            Ok(subject) => subject,
            Err(failed) => return failed,
        };
        let chapters = self.catalog.chapters(&subject.slug).await.unwrap_or_else(|e| {
            tracing::warn!("failed to load chapters of {}: {}", subject.slug, e);
            vec![]
        });

        let (route, resolved) = match chapter_by_ordinal(&chapters, chapter_number) {
            Some(chapter) => (chapter_route(&subject.slug, &chapter.id), "chapter"),
            None => {
                tracing::debug!("chapter {} of {} not found, opening subject", chapter_number, subject.slug);
                (subject_route(&subject.slug), "subject")
            }
        };
        if let Err(failed) = self.go(&route) {
            return failed;
        }
        CommandResult::ok()
            .with("subject", subject.slug.as_str())
            .with("chapterNumber", chapter_number)
            .with("route", route)
            .with("resolved", resolved)
    }

    async fn open_lesson(
        &self,
        subject: Option<&str>,
        chapter_number: u32,
        lesson_number: Option<u32>,
        content_type: Option<ContentType>,
    ) -> CommandResult {
        let subject = match self.subject(subject).await {
            Ok(subject) => subject,
            Err(failed) => return failed,
        };
        let chapters = self.catalog.chapters(&subject.slug).await.unwrap_or_default();

        let (route, resolved) = match chapter_by_ordinal(&chapters, chapter_number) {
            None => (subject_route(&subject.slug), "subject"),
            Some(chapter) => {
                let sections = self
                    .catalog
                    .chapter_tree(&subject.class_id, &subject.slug, &chapter.id)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("failed to load chapter tree of {}: {}", chapter.id, e);
                        vec![]
                    });
                match resolve_item(&sections, lesson_number, content_type) {
                    Some(item) => (item_route(&subject.slug, &chapter.id, &item.id), "item"),
                    None => (chapter_route(&subject.slug, &chapter.id), "chapter"),
                }
            }
        };
        if let Err(failed) = self.go(&route) {
            return failed;
        }

        let mut result = CommandResult::ok()
            .with("subject", subject.slug.as_str())
            .with("chapterNumber", chapter_number)
            .with("route", route)
            .with("resolved", resolved);
        if let Some(lesson_number) = lesson_number {
            result = result.with("lessonNumber", lesson_number);
        }
        if let Some(content_type) = content_type {
            result = result.with("contentType", content_type.as_str());
        }
        result
    }

    async fn list_subjects(&self) -> CommandResult {
        match self.catalog.subjects().await {
            Ok(subjects) => {
                let subjects: Vec<Value> = subjects
                    .iter()
                    .map(|s| json!({ "slug": s.slug, "name": s.name }))
                    .collect();
                CommandResult::ok().with("subjects", subjects)
            }
            Err(e) => CommandResult::failed(format!("failed to load subjects: {}", e)),
        }
    }

    async fn list_chapters(&self, subject: Option<&str>) -> CommandResult {
        let subject = match self.subject(subject).await {
            Ok(subject) => subject,
            Err(failed) => return failed,
        };
        match self.catalog.chapters(&subject.slug).await {
            Ok(mut chapters) => {
                chapters.sort_by_key(|c| c.order);
                let chapters: Vec<Value> = chapters
                    .iter()
                    .enumerate()
                    .map(|(i, c)| json!({ "number": i + 1, "title": c.title }))
                    .collect();
                CommandResult::ok()
                    .with("subject", subject.slug.as_str())
                    .with("chapters", chapters)
            }
            Err(e) => CommandResult::failed(format!("failed to load chapters: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::fixtures::{CATALOG, SOLO_CATALOG};
    use crate::app::{InMemoryCatalog, MockLessonControls, MockNavigator, MockPreferenceSync};
    use crate::command::LessonAction;
    use crate::fallback::CommandKind;
    use crate::settings::Settings;

    fn navigator_expecting(route: &'static str) -> MockNavigator {
        let mut navigator = MockNavigator::new();
        navigator.expect_current_route().returning(|| None);
        navigator
            .expect_navigate()
            .withf(move |r: &str| r == route)
            .times(1)
            .returning(|_| Ok(()));
        navigator
    }

    fn dispatcher(navigator: MockNavigator, lesson: MockLessonControls, catalog: &str) -> CommandDispatcher {
        CommandDispatcher::new(
            Arc::new(navigator),
            Arc::new(InMemoryCatalog::from_json(catalog).unwrap()),
            Arc::new(lesson),
            SettingsStore::in_memory(Settings::default()),
        )
    }

    #[tokio::test]
    async fn test_open_chapter_by_sort_order() {
        // Arrange
        let dispatcher = dispatcher(
            navigator_expecting("/learn/physics/p-light"),
            MockLessonControls::new(),
            CATALOG,
        );
        let calls = vec![FunctionCall::new(
            "call-1",
            "openChapter",
            json!({"subject": "physics", "chapterNumber": 2}),
        )];

        // Act
        let responses = dispatcher.execute_tool_calls(&calls).await;

        // Assert
        assert_eq!(responses.len(), 1);
        let response = &responses[0].response;
        assert_eq!(response["success"], true);
        assert_eq!(response["subject"], "physics");
        assert_eq!(response["chapterNumber"], 2);
    }

    #[tokio::test]
    async fn test_fallback_uses_sole_subject() {
        let dispatcher = dispatcher(
            navigator_expecting("/learn/chemistry/c1"),
            MockLessonControls::new(),
            SOLO_CATALOG,
        );
        let command = FallbackCommand::new(CommandKind::Navigate, "chapter", json!({"chapterNumber": 1}));

        assert!(dispatcher.execute_command(&command).await);
    }

    #[tokio::test]
    async fn test_fenced_pause_reaches_lesson_controls() {
        let mut lesson = MockLessonControls::new();
        lesson
            .expect_control()
            .withf(|action| *action == LessonAction::Pause)
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = dispatcher(MockNavigator::new(), lesson, CATALOG);

        let text = "```json\n{\"hasCommand\":true,\"command\":{\"type\":\"lesson_control\",\"action\":\"pause\"}}\n```";

        assert!(dispatcher.execute_text(text).await);
        assert!(!dispatcher.execute_text("no command here").await);
    }

    #[tokio::test]
    async fn test_every_call_gets_one_response_in_order() {
        // Arrange
        let mut lesson = MockLessonControls::new();
        lesson
            .expect_submit_quiz()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("no quiz on screen")));
        let dispatcher = dispatcher(MockNavigator::new(), lesson, CATALOG);
        let calls = vec![
            FunctionCall::new("a", "toggleCaptions", json!({})),
            FunctionCall::new("b", "launchRocket", json!({})),
            FunctionCall::new("c", "openChapter", json!({"chapterNumber": "many"})),
            FunctionCall::new("d", "quizSubmit", Value::Null),
            FunctionCall::new("e", "convertBraille", json!({"text": "abc"})),
        ];

        // Act
        let responses = dispatcher.execute_tool_calls(&calls).await;

        // Assert
        let ids: Vec<_> = responses.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(responses[0].response["success"], true);
        assert_eq!(responses[1].response, json!({"success": false, "error": "unknown tool"}));
        assert_eq!(responses[2].response["success"], false);
        assert_eq!(responses[3].response["error"], "no quiz on screen");
        assert_eq!(responses[4].response["braille"], "⠁⠃⠉");
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_setting() {
        let dispatcher = dispatcher(MockNavigator::new(), MockLessonControls::new(), CATALOG);

        let first = dispatcher.execute(&Command::ToggleLargeText {}).await;
        let second = dispatcher.execute(&Command::ToggleLargeText {}).await;

        assert_eq!(first.get("enabled"), Some(&json!(true)));
        assert_eq!(second.get("enabled"), Some(&json!(false)));
        assert_eq!(dispatcher.settings().get(), Settings::default());
    }

    #[tokio::test]
    async fn test_open_lesson_resolves_item() {
        let dispatcher = dispatcher(
            navigator_expecting("/learn/physics/p-light/ms-refraction-quiz"),
            MockLessonControls::new(),
            CATALOG,
        );

        let result = dispatcher
            .execute(&Command::OpenLesson {
                subject: Some("Physics".to_string()),
                chapter_number: 2,
                lesson_number: Some(2),
                content_type: Some(ContentType::Quiz),
            })
            .await;

        assert!(result.success);
        assert_eq!(result.get("resolved"), Some(&json!("item")));
    }

    #[tokio::test]
    async fn test_open_lesson_falls_back_to_chapter() {
        let dispatcher = dispatcher(
            navigator_expecting("/learn/physics/p-motion"),
            MockLessonControls::new(),
            CATALOG,
        );

        let result = dispatcher
            .execute(&Command::OpenLesson {
                subject: Some("physics".to_string()),
                chapter_number: 1,
                lesson_number: Some(3),
                content_type: None,
            })
            .await;

        assert!(result.success);
        assert_eq!(result.get("resolved"), Some(&json!("chapter")));
    }

    #[tokio::test]
    async fn test_missing_chapter_falls_back_to_subject() {
        let dispatcher = dispatcher(navigator_expecting("/learn/math"), MockLessonControls::new(), CATALOG);

        let result = dispatcher
            .execute(&Command::OpenChapter {
                subject: Some("math".to_string()),
                chapter_number: 7,
            })
            .await;

        assert!(result.success);
        assert_eq!(result.get("resolved"), Some(&json!("subject")));
    }

    #[tokio::test]
    async fn test_subject_from_current_route() {
        let mut navigator = MockNavigator::new();
        navigator
            .expect_current_route()
            .returning(|| Some("/learn/math/m1".to_string()));
        navigator
            .expect_navigate()
            .withf(|r: &str| r == "/learn/math/m1")
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = dispatcher(navigator, MockLessonControls::new(), CATALOG);

        let result = dispatcher
            .execute(&Command::OpenChapter {
                subject: None,
                chapter_number: 1,
            })
            .await;

        assert_eq!(result.get("subject"), Some(&json!("math")));
    }

    #[tokio::test]
    async fn test_ambiguous_subject_fails() {
        let mut navigator = MockNavigator::new();
        navigator.expect_current_route().returning(|| None);
        let dispatcher = dispatcher(navigator, MockLessonControls::new(), CATALOG);

        let result = dispatcher
            .execute(&Command::OpenChapter {
                subject: None,
                chapter_number: 1,
            })
            .await;

        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_set_language_survives_sync_failure() {
        // Arrange
        let mut sync = MockPreferenceSync::new();
        sync.expect_put_language()
            .withf(|language: &str| language == "hi")
            .times(1)
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("offline")) }));
        let dispatcher = dispatcher(MockNavigator::new(), MockLessonControls::new(), CATALOG)
            .with_preference_sync(Arc::new(sync));

        // Act
        let result = dispatcher
            .execute(&Command::SetLanguage {
                language: "Hindi".to_string(),
            })
            .await;

        // Assert
        assert!(result.success);
        assert_eq!(dispatcher.settings().get().language, "hi");
    }

    #[tokio::test]
    async fn test_scroll_and_history_report_success() {
        let mut navigator = MockNavigator::new();
        navigator.expect_scroll().times(1).return_const(());
        navigator
            .expect_history()
            .withf(|delta| *delta == -2)
            .times(1)
            .return_const(());
        let dispatcher = dispatcher(navigator, MockLessonControls::new(), CATALOG);
        let calls = vec![
            FunctionCall::new("s", "scrollPage", json!({"direction": "down"})),
            FunctionCall::new("h", "navigateHistory", json!({"direction": "back", "steps": 2})),
            FunctionCall::new("x", "scrollPage", json!({"direction": "sideways"})),
        ];

        let responses = dispatcher.execute_tool_calls(&calls).await;

        assert_eq!(responses[0].response["success"], true);
        assert_eq!(responses[1].response["success"], true);
        assert_eq!(responses[2].response["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let dispatcher = dispatcher(MockNavigator::new(), MockLessonControls::new(), CATALOG);

        let result = dispatcher
            .execute(&Command::Navigate {
                destination: "the moon".to_string(),
            })
            .await;

        assert!(!result.success);
    }
}
