//! Status Command
//!
//! Show circuit breaker state per model.
//!
//! Usage:
//!   llm-resilience status [--model <id>] [-f json]

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::resilience::{CircuitRecord, CircuitState};
use crate::types::{CircuitOpen, Result};

/// One row of the status report
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub model_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// Seconds until an open circuit admits a probe
    pub retry_in_secs: Option<u64>,
    pub last_failure_reason: Option<String>,
    /// Model has an entry under `[models]`
    pub configured: bool,
}

/// Status rows for one model, or for every stored or configured model
pub fn collect(ctx: &CommandContext, model: Option<&str>) -> Vec<CircuitStatus> {
    let records = match model {
        Some(model_id) => vec![ctx.breaker.snapshot(model_id)],
        None => {
            let mut records: Vec<CircuitRecord> = ctx
                .breaker
                .stats()
                .into_iter()
                .map(|s| CircuitRecord {
                    model_id: s.model_id,
                    state: s.state,
                    consecutive_failures: s.consecutive_failures,
                    opened_at: s.opened_at,
                    last_failure_reason: s.last_failure_reason,
                })
                .collect();

            for model_id in ctx.registry.model_ids() {
                if !records.iter().any(|r| r.model_id == model_id) {
                    records.push(CircuitRecord::closed(model_id));
                }
            }
            records.sort_by(|a, b| a.model_id.cmp(&b.model_id));
            records
        }
    };

    let now = Utc::now();
    let timeout = ctx.breaker.config().open_timeout;

    records
        .into_iter()
        .map(|record| {
            let retry_in_secs = record.opened_at.map(|opened_at| {
                CircuitOpen {
                    model_id: record.model_id.clone(),
                    opened_at,
                    timeout,
                }
                .retry_in(now)
                .as_secs()
            });

            CircuitStatus {
                configured: ctx.registry.contains(&record.model_id),
                model_id: record.model_id,
                state: record.state,
                consecutive_failures: record.consecutive_failures,
                opened_at: record.opened_at,
                retry_in_secs,
                last_failure_reason: record.last_failure_reason,
            }
        })
        .collect()
}

pub fn run(ctx: &CommandContext, model: Option<&str>, format: OutputFormat) -> Result<()> {
    let rows = collect(ctx, model);

    if format == OutputFormat::Json {
        let report = serde_json::json!({
            "failure_threshold": ctx.breaker.config().failure_threshold,
            "timeout_seconds": ctx.breaker.config().open_timeout.as_secs(),
            "circuits": rows,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let out = Output::new();
    out.section("Circuit Breakers");

    if rows.is_empty() {
        out.info("No circuit state recorded and no models configured.");
        return Ok(());
    }

    let threshold = ctx.breaker.config().failure_threshold;
    for row in &rows {
        let mut line = format!(
            "  {} {} failures {}/{}",
            out.state(row.state),
            row.model_id,
            row.consecutive_failures,
            threshold
        );
        if let Some(secs) = row.retry_in_secs {
            line.push_str(&format!(" | probe in {}s", secs));
        }
        if !row.configured {
            line.push_str(" | not configured");
        }
        println!("{}", line);

        if let Some(reason) = &row.last_failure_reason {
            println!("      last failure: {}", reason);
        }
    }

    let open = rows.iter().filter(|r| r.state == CircuitState::Open).count();
    println!();
    if open > 0 {
        out.warning(&format!("{} of {} circuits open", open, rows.len()));
    } else {
        out.success(&format!("All {} circuits accepting calls", rows.len()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ModelConfig, StorageConfig};

    fn context() -> CommandContext {
        let mut config = Config {
            storage: StorageConfig::memory(),
            ..Config::default()
        };
        config.models.insert(
            "gpt-4o".to_string(),
            ModelConfig {
                fallback_chain: vec!["claude".to_string()],
                ..Default::default()
            },
        );
        CommandContext::from_config(config).unwrap()
    }

    #[test]
    fn test_collect_merges_stored_and_configured() {
        let ctx = context();
        for _ in 0..5 {
            ctx.breaker.record_failure("claude", "[rate_limit] slow down");
        }

        let rows = collect(&ctx, None);
        let ids: Vec<_> = rows.iter().map(|r| r.model_id.as_str()).collect();
        assert_eq!(ids, vec!["claude", "gpt-4o"]);

        let claude = &rows[0];
        assert_eq!(claude.state, CircuitState::Open);
        assert!(!claude.configured);
        assert!(claude.retry_in_secs.unwrap() <= 300);

        let gpt = &rows[1];
        assert_eq!(gpt.state, CircuitState::Closed);
        assert!(gpt.configured);
        assert_eq!(gpt.retry_in_secs, None);
    }

    #[test]
    fn test_collect_single_model() {
        let ctx = context();
        let rows = collect(&ctx, Some("unknown"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, CircuitState::Closed);
    }
}
