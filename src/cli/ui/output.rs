use console::{StyledObject, style};

use crate::resilience::CircuitState;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Circuit state colored by health
    pub fn state(&self, state: CircuitState) -> StyledObject<String> {
        let text = format!("{:<9}", state.to_string());
        match state {
            CircuitState::Closed => style(text).green(),
            CircuitState::HalfOpen => style(text).yellow(),
            CircuitState::Open => style(text).red().bold(),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
