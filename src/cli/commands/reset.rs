//! Reset Command
//!
//! Force a model's circuit back to CLOSED.
//!
//! Usage:
//!   llm-resilience reset <model>
//!   llm-resilience reset --all

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::resilience::CircuitState;
use crate::types::{ResilienceError, Result};

/// Reset one model, or every model not already closed when `all`
pub fn run(ctx: &CommandContext, model: Option<&str>, all: bool) -> Result<()> {
    let out = Output::new();

    let targets: Vec<String> = match (model, all) {
        (Some(model_id), false) => vec![model_id.to_string()],
        (None, true) => ctx
            .breaker
            .stats()
            .into_iter()
            .filter(|s| s.state != CircuitState::Closed || s.consecutive_failures > 0)
            .map(|s| s.model_id)
            .collect(),
        _ => {
            return Err(ResilienceError::Config(
                "Specify either a model id or --all".to_string(),
            ));
        }
    };

    if targets.is_empty() {
        out.info("Nothing to reset; every circuit is closed.");
        return Ok(());
    }

    for model_id in &targets {
        let previous = ctx.breaker.state(model_id);
        ctx.breaker.reset(model_id);
        out.success(&format!("{}: {} -> CLOSED", model_id, previous));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageConfig};

    fn context() -> CommandContext {
        CommandContext::from_config(Config {
            storage: StorageConfig::memory(),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reset_single_model() {
        let ctx = context();
        for _ in 0..5 {
            ctx.breaker.record_failure("a", "x");
        }
        run(&ctx, Some("a"), false).unwrap();
        assert_eq!(ctx.breaker.state("a"), CircuitState::Closed);
    }

    #[test]
    fn test_reset_all() {
        let ctx = context();
        for _ in 0..5 {
            ctx.breaker.record_failure("a", "x");
        }
        ctx.breaker.record_failure("b", "x");

        run(&ctx, None, true).unwrap();
        assert_eq!(ctx.breaker.snapshot("a").consecutive_failures, 0);
        assert_eq!(ctx.breaker.snapshot("b").consecutive_failures, 0);
    }

    #[test]
    fn test_requires_target() {
        let ctx = context();
        assert!(run(&ctx, None, false).is_err());
        assert!(run(&ctx, Some("a"), true).is_err());
    }
}
