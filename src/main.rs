mod cli;

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use clap::Parser;

use crate::cli::{Cli, Commands};
use post_guard::budget::{BudgetLedger, InteractionBudget};
use post_guard::config::{GuardConfig, ValidatorOptions};
use post_guard::llm::{LlmConfig, create_provider};
use post_guard::output::OutputValidator;
use post_guard::pipeline::{
    History, HistoryEntry, Orchestrator, SeenCache, SeenMap, build_request,
};
use post_guard::safety::{InboundGate, InboundText, InputSanitizer};
use post_guard::stats::Stats;
use post_guard::store::{JsonFileStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GuardConfig::from_env().context("invalid POST_GUARD_* configuration")?;
    let stats = Arc::new(Stats::new());

    match cli.command {
        Commands::Assess { text } => {
            let sanitizer = InputSanitizer::new(
                config.sanitizer.clone(),
                config.risk,
                Arc::clone(&stats),
            )?;
            let assessment = sanitizer.assess(&text_or_stdin(text)?);
            print_json(&assessment)?;
        }
        Commands::Validate { text, max_chars } => {
            let options = match max_chars {
                Some(max_chars) => ValidatorOptions {
                    max_chars,
                    ..config.orchestrator.validator
                },
                None => config.orchestrator.validator,
            };
            let validator = OutputValidator::new(options, Arc::clone(&stats))?;
            let result = validator.validate(&text_or_stdin(text)?);
            print_json(&result)?;
        }
        Commands::Budget { subject, label } => {
            let label = label.unwrap_or_else(|| subject.clone());
            let budget = open_budget(&config, &stats)?;
            let decision = budget.check_and_reserve(&subject, &label);
            print_json(&decision)?;
        }
        Commands::Admit {
            subject,
            label,
            platform,
            item_id,
            text,
        } => {
            let label = label.unwrap_or_else(|| subject.clone());
            let mut seen = SeenCache::open(Box::new(JsonFileStore::<SeenMap>::new(
                config.seen_path(&platform),
            )));
            if let Some(id) = &item_id {
                if seen.contains(id) {
                    print_json(&serde_json::json!({ "outcome": "already_seen", "item_id": id }))?;
                    return Ok(());
                }
            }

            let sanitizer = InputSanitizer::new(
                config.sanitizer.clone(),
                config.risk,
                Arc::clone(&stats),
            )?;
            let gate = InboundGate::new(sanitizer, Arc::new(open_budget(&config, &stats)?));
            let inbound = InboundText::new(text_or_stdin(text)?, subject, label, platform);
            let decision = gate.admit(&inbound);

            if let Some(id) = &item_id {
                seen.mark(id);
                seen.save().context("failed to save seen items")?;
            }
            print_json(&decision)?;
        }
        Commands::Generate {
            prompt,
            system,
            source,
            max_tokens,
        } => {
            let mut llm_config = LlmConfig::from_env()?;
            llm_config.call_budget = config.orchestrator.call_timeout;
            let provider = create_provider(&llm_config)?;
            let mut history = History::open(
                Box::new(JsonFileStore::<Vec<HistoryEntry>>::new(
                    config.history_path(&source),
                )),
                config.history,
            );
            let orchestrator = Orchestrator::new(config.orchestrator.clone(), Arc::clone(&stats))?;

            let mut request = build_request(&system, &prompt);
            if let Some(max_tokens) = max_tokens {
                request = request.with_max_tokens(max_tokens);
            }
            let outcome = orchestrator
                .generate_with_llm(&*provider, request, &history)
                .await;
            if outcome.accepted {
                history.append(HistoryEntry::new(&outcome.text, &source, "cli"));
            }
            print_json(&serde_json::json!({
                "outcome": outcome,
                "stats": stats.snapshot(),
            }))?;
        }
        Commands::Stats { source } => {
            let now = Utc::now();
            let ledger_store = JsonFileStore::<BudgetLedger>::new(config.ledger_path());
            let ledger = ledger_store
                .load()
                .with_context(|| format!("failed to read {}", ledger_store.describe()))?;
            let history = History::open(
                Box::new(JsonFileStore::<Vec<HistoryEntry>>::new(
                    config.history_path(&source),
                )),
                config.history,
            );
            print_json(&serde_json::json!({
                "replies_last_hour": ledger.total_events_within(now, TimeDelta::hours(1)),
                "replies_last_day": ledger.total_events_within(now, TimeDelta::days(1)),
                "subjects_tracked": ledger.per_subject_events.len(),
                "active_suspensions": ledger
                    .suspensions
                    .iter()
                    .filter(|(_, until)| **until > now)
                    .map(|(subject, until)| (subject.clone(), until.to_rfc3339()))
                    .collect::<std::collections::BTreeMap<_, _>>(),
                "history_entries": history.len(),
            }))?;
        }
    }

    Ok(())
}

fn open_budget(config: &GuardConfig, stats: &Arc<Stats>) -> anyhow::Result<InteractionBudget> {
    let store = JsonFileStore::<BudgetLedger>::new(config.ledger_path());
    Ok(InteractionBudget::new(
        config.budget,
        Box::new(store),
        Arc::clone(stats),
    )?)
}

fn text_or_stdin(text: Option<String>) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    Ok(input)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
