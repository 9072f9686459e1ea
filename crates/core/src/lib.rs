pub mod app;
pub mod braille;
pub mod command;
pub mod controller;
pub mod dispatcher;
pub mod fallback;
pub mod resolve;
pub mod settings;
pub mod tools;

pub use command::{Command, CommandError};
pub use controller::{AgentState, ControllerError, ControllerOptions, VoiceAgentController};
pub use dispatcher::{CommandDispatcher, CommandResult};
pub use settings::{Settings, SettingsStore};
