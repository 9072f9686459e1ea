use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

/// Key the settings record is stored under.
pub const STORAGE_KEY: &str = "voice-agent-settings";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported language {0:?}")]
    UnsupportedLanguage(String),
    #[error("settings store is closed")]
    Closed,
}

/// Accessibility and voice preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub focus_mode: bool,
    pub large_text: bool,
    pub captions: bool,
    pub signs: bool,
    pub reduce_motion: bool,
    pub language: String,
    pub auto_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_mode: false,
            large_text: false,
            captions: false,
            signs: false,
            reduce_motion: false,
            language: "en".to_string(),
            auto_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessibilityFlag {
    FocusMode,
    LargeText,
    Captions,
    Signs,
    ReduceMotion,
}

impl AccessibilityFlag {
    pub fn key(&self) -> &'static str {
        match self {
            AccessibilityFlag::FocusMode => "focusMode",
            AccessibilityFlag::LargeText => "largeText",
            AccessibilityFlag::Captions => "captions",
            AccessibilityFlag::Signs => "signs",
            AccessibilityFlag::ReduceMotion => "reduceMotion",
        }
    }
}

impl Settings {
    pub fn flag(&self, flag: AccessibilityFlag) -> bool {
        match flag {
            AccessibilityFlag::FocusMode => self.focus_mode,
            AccessibilityFlag::LargeText => self.large_text,
            AccessibilityFlag::Captions => self.captions,
            AccessibilityFlag::Signs => self.signs,
            AccessibilityFlag::ReduceMotion => self.reduce_motion,
        }
    }

    fn flag_mut(&mut self, flag: AccessibilityFlag) -> &mut bool {
        match flag {
            AccessibilityFlag::FocusMode => &mut self.focus_mode,
            AccessibilityFlag::LargeText => &mut self.large_text,
            AccessibilityFlag::Captions => &mut self.captions,
            AccessibilityFlag::Signs => &mut self.signs,
            AccessibilityFlag::ReduceMotion => &mut self.reduce_motion,
        }
    }
}

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "english"),
    ("hi", "hindi"),
    ("es", "spanish"),
    ("fr", "french"),
    ("de", "german"),
    ("bn", "bengali"),
    ("ta", "tamil"),
    ("te", "telugu"),
    ("mr", "marathi"),
    ("gu", "gujarati"),
    ("kn", "kannada"),
    ("ml", "malayalam"),
    ("pa", "punjabi"),
    ("ur", "urdu"),
    ("ar", "arabic"),
    ("zh", "chinese"),
    ("ja", "japanese"),
];

/// Accepts a code (`"hi"`, `"hi-IN"`) or an English name (`"Hindi"`) and returns the code.
pub fn normalize_language(language: &str) -> Option<&'static str> {
    let language = language.trim().to_lowercase();
    let primary = language.split(['-', '_']).next().unwrap_or_default();
    LANGUAGES
        .iter()
        .find(|(code, name)| *code == primary || *name == language)
        .map(|(code, _)| *code)
}

/// Durable backing for a [`SettingsStore`].
pub trait SettingsPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Settings>, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// A flat JSON key-value file; settings live under [`STORAGE_KEY`].
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_record(&self) -> Result<Map<String, Value>, SettingsError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl SettingsPersistence for JsonFileSettings {
    fn load(&self) -> Result<Option<Settings>, SettingsError> {
        let mut record = self.read_record()?;
        match record.remove(STORAGE_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let mut record = self.read_record()?;
        record.insert(STORAGE_KEY.to_string(), serde_json::to_value(settings)?);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

struct Inner {
    tx: watch::Sender<Settings>,
    persistence: Option<Box<dyn SettingsPersistence>>,
    closed: bool,
}

/// Shared settings with read, write and subscribe.
///
/// Writes are serialized and the last one wins; readers always see the
/// latest committed value. A failed save is logged and the in-memory value
/// still changes.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<Inner>>,
    rx: watch::Receiver<Settings>,
}

impl SettingsStore {
    pub fn in_memory(initial: Settings) -> Self {
        Self::build(initial, None)
    }

    /// Loads from `persistence`, falling back to defaults when nothing is stored.
    pub fn open(persistence: Box<dyn SettingsPersistence>) -> Result<Self, SettingsError> {
        let initial = persistence.load()?.unwrap_or_default();
        Ok(Self::build(initial, Some(persistence)))
    }

    fn build(initial: Settings, persistence: Option<Box<dyn SettingsPersistence>>) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tx,
                persistence,
                closed: false,
            })),
            rx,
        }
    }

    pub fn get(&self) -> Settings {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.rx.clone()
    }

    /// Applies `f` and commits the result, returning the new settings.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings, SettingsError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(SettingsError::Closed);
        }
        let mut next = inner.tx.borrow().clone();
        f(&mut next);
        if let Some(persistence) = inner.persistence.as_ref() {
            if let Err(e) = persistence.save(&next) {
                tracing::warn!("failed to persist settings: {}", e);
            }
        }
        inner.tx.send_replace(next.clone());
        Ok(next)
    }

    /// Flips `flag` and returns its new value.
    pub fn toggle(&self, flag: AccessibilityFlag) -> Result<bool, SettingsError> {
        let settings = self.update(|s| {
            let value = s.flag_mut(flag);
            *value = !*value;
        })?;
        Ok(settings.flag(flag))
    }

    /// Stores the language code for `language`.
    pub fn set_language(&self, language: &str) -> Result<&'static str, SettingsError> {
        let code = normalize_language(language).ok_or_else(|| SettingsError::UnsupportedLanguage(language.to_string()))?;
        self.update(|s| s.language = code.to_string())?;
        Ok(code)
    }

    pub fn set_auto_start(&self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|s| s.auto_start = enabled).map(|_| ())
    }

    /// Rejects further writes. Reads keep returning the last value.
    pub fn close(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_twice_is_identity() {
        let store = SettingsStore::in_memory(Settings::default());
        let before = store.get();

        assert!(store.toggle(AccessibilityFlag::Captions).unwrap());
        assert!(!store.toggle(AccessibilityFlag::Captions).unwrap());

        assert_eq!(store.get(), before);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_value() {
        let store = SettingsStore::in_memory(Settings::default());
        let mut rx = store.subscribe();

        store.toggle(AccessibilityFlag::LargeText).unwrap();
        store.toggle(AccessibilityFlag::Signs).unwrap();

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert!(seen.large_text && seen.signs);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("Hindi"), Some("hi"));
        assert_eq!(normalize_language("es-MX"), Some("es"));
        assert_eq!(normalize_language(" EN "), Some("en"));
        assert_eq!(normalize_language("klingon"), None);
    }

    #[test]
    fn test_set_language_rejects_unknown() {
        let store = SettingsStore::in_memory(Settings::default());
        assert_eq!(store.set_language("French").unwrap(), "fr");
        assert!(matches!(
            store.set_language("klingon"),
            Err(SettingsError::UnsupportedLanguage(_))
        ));
        assert_eq!(store.get().language, "fr");
    }

    #[test]
    fn test_closed_store_rejects_writes() {
        let store = SettingsStore::in_memory(Settings::default());
        store.close();
        assert!(matches!(store.set_auto_start(true), Err(SettingsError::Closed)));
        assert!(!store.get().auto_start);
    }

    #[test]
    fn test_json_file_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("storage.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"other-key": 1}"#).unwrap();

        // Act
        let store = SettingsStore::open(Box::new(JsonFileSettings::new(&path))).unwrap();
        assert_eq!(store.get(), Settings::default());
        store.set_auto_start(true).unwrap();
        store.toggle(AccessibilityFlag::ReduceMotion).unwrap();

        // Assert
        let reopened = SettingsStore::open(Box::new(JsonFileSettings::new(&path))).unwrap();
        assert!(reopened.get().auto_start);
        assert!(reopened.get().reduce_motion);
        let record: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record["other-key"], 1);
        assert_eq!(record[STORAGE_KEY]["autoStart"], true);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(Box::new(JsonFileSettings::new(dir.path().join("none.json")))).unwrap();
        assert_eq!(store.get().language, "en");
    }
}
