//! Chain Command
//!
//! Show the fallback route a request starting at a model would take,
//! with each hop's circuit state and retry policies.
//!
//! Usage:
//!   llm-resilience chain <model> [-f json]

use serde::Serialize;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::resilience::{CircuitState, RetryPolicy};
use crate::types::{ProviderErrorKind, Result};

/// One model on the fallback route
#[derive(Debug, Clone, Serialize)]
pub struct ChainHop {
    pub model_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub rate_limit_policy: RetryPolicy,
    pub network_policy: RetryPolicy,
    pub default_policy: RetryPolicy,
}

/// Route a request starting at `model_id` would take if every model failed
pub fn collect(ctx: &CommandContext, model_id: &str) -> Vec<ChainHop> {
    ctx.router()
        .walk(model_id)
        .into_iter()
        .map(|id| {
            let record = ctx.breaker.snapshot(&id);
            ChainHop {
                rate_limit_policy: ctx.registry.retry_policy(&id, ProviderErrorKind::RateLimit),
                network_policy: ctx.registry.retry_policy(&id, ProviderErrorKind::Timeout),
                default_policy: ctx.registry.retry_policy(&id, ProviderErrorKind::Unknown),
                state: record.state,
                consecutive_failures: record.consecutive_failures,
                model_id: id,
            }
        })
        .collect()
}

fn describe(policy: &RetryPolicy) -> String {
    format!(
        "{}x {:.1}s..{:.0}s{}",
        policy.max_attempts,
        policy.base_delay_secs,
        policy.max_delay_secs,
        if policy.jitter { " ~" } else { "" }
    )
}

pub fn run(ctx: &CommandContext, model_id: &str, format: OutputFormat) -> Result<()> {
    let hops = collect(ctx, model_id);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&hops)?);
        return Ok(());
    }

    let out = Output::new();
    out.section(&format!("Fallback route for {}", model_id));

    if !ctx.registry.contains(model_id) {
        out.warning(&format!(
            "'{}' is not configured; it has no fallbacks and uses the global retry policies",
            model_id
        ));
    }

    for (i, hop) in hops.iter().enumerate() {
        println!(
            "  {}. {} {} (failures {})",
            i + 1,
            out.state(hop.state),
            hop.model_id,
            hop.consecutive_failures
        );
        println!(
            "       retry: rate_limit {} | network {} | default {}",
            describe(&hop.rate_limit_policy),
            describe(&hop.network_policy),
            describe(&hop.default_policy)
        );
    }

    let available = hops
        .iter()
        .filter(|h| h.state != CircuitState::Open)
        .count();
    println!();
    if available == 0 {
        out.warning("Every model on this route has an open circuit");
    } else {
        out.info(&format!("{} of {} models accepting calls", available, hops.len()));
    }

    Ok(())
}
