//! App surfaces for running the agent in a terminal: every action is logged
//! and the navigation state is kept in memory.

use std::sync::{Mutex, PoisonError};

use anyhow::{Result, bail};
use voice_command_core::app::{LessonControls, Navigator};
use voice_command_core::command::{LessonAction, ScrollDirection};

struct History {
    entries: Vec<String>,
    index: usize,
}

pub struct TerminalNavigator {
    history: Mutex<History>,
}

impl TerminalNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![start.to_string()],
                index: 0,
            }),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) -> Result<()> {
        if !route.starts_with('/') {
            bail!("not an app route: {:?}", route);
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let next = history.index + 1;
        history.entries.truncate(next);
        history.entries.push(route.to_string());
        history.index = next;
        tracing::info!("navigate -> {}", route);
        Ok(())
    }

    fn current_route(&self) -> Option<String> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.entries.get(history.index).cloned()
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) {
        tracing::info!("scroll {:?} x{}", direction, amount);
    }

    fn history(&self, delta: i32) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let last = history.entries.len().saturating_sub(1) as i64;
        let index = (history.index as i64 + delta as i64).clamp(0, last) as usize;
        history.index = index;
        tracing::info!("history {:+} -> {}", delta, history.entries[index]);
    }
}

#[derive(Default)]
pub struct TerminalLessonControls {
    selected: Mutex<Option<usize>>,
}

impl LessonControls for TerminalLessonControls {
    fn control(&self, action: LessonAction) -> Result<()> {
        tracing::info!("lesson player: {:?}", action);
        Ok(())
    }

    fn select_quiz_option(&self, index: usize) -> Result<()> {
        *self.selected.lock().unwrap_or_else(PoisonError::into_inner) = Some(index);
        tracing::info!("quiz option {} selected", index + 1);
        Ok(())
    }

    fn submit_quiz(&self) -> Result<()> {
        match self.selected.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(index) => {
                tracing::info!("quiz submitted with option {}", index + 1);
                Ok(())
            }
            None => bail!("no quiz option selected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_moves_and_truncates() {
        let navigator = TerminalNavigator::new("/");
        navigator.navigate("/learn").unwrap();
        navigator.navigate("/learn/physics").unwrap();

        navigator.history(-2);
        assert_eq!(navigator.current_route().as_deref(), Some("/"));

        navigator.history(5);
        assert_eq!(navigator.current_route().as_deref(), Some("/learn/physics"));

        navigator.history(-1);
        navigator.navigate("/settings").unwrap();
        navigator.history(1);
        assert_eq!(navigator.current_route().as_deref(), Some("/settings"));
    }

    #[test]
    fn test_rejects_non_routes() {
        let navigator = TerminalNavigator::new("/");
        assert!(navigator.navigate("home").is_err());
        assert_eq!(navigator.current_route().as_deref(), Some("/"));
    }

    #[test]
    fn test_quiz_needs_a_selection() {
        let controls = TerminalLessonControls::default();
        assert!(controls.submit_quiz().is_err());

        controls.select_quiz_option(1).unwrap();
        assert!(controls.submit_quiz().is_ok());
        assert!(controls.submit_quiz().is_err());
    }
}
