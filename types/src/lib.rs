pub mod audio;
pub mod content;
pub mod events;
pub mod setup;
pub mod tools;

pub use audio::AudioFrame;
pub use content::{Blob, Content, Part};
pub use events::{ClientMessage, ServerMessage};
pub use setup::{LiveConfig, Modality};
pub use tools::{FunctionCall, FunctionDeclaration, FunctionResponse, Tool};
