use std::sync::Arc;

use jobscan::classify::rules::KeywordRuleTable;
use jobscan::classify::RelevanceClassifier;
use jobscan::config::{EnginePaths, RunParams};
use jobscan::error::ConfigError;
use jobscan::feed::load_feed;
use jobscan::gate::{SafetyGate, SystemClock};
use jobscan::pipeline::DispatchOrchestrator;
use jobscan::profile::load_profiles;
use jobscan::store::{Ledger, LibSqlLedger};
use jobscan::transport::{MailTransport, NoopTransport, SmtpConfig, SmtpMailer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let params = RunParams::from_env()?;
    let paths = EnginePaths::from_env();

    eprintln!("📬 jobscan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mode: {}",
        if params.live() { "LIVE SEND" } else { "dry run" }
    );
    eprintln!("   Profiles: {}", paths.profiles.display());
    eprintln!("   Feed: {}", paths.feed.display());
    eprintln!("   Ledger: {}\n", paths.ledger.display());

    // ── Ledger ───────────────────────────────────────────────────────────
    let ledger: Arc<dyn Ledger> = Arc::new(LibSqlLedger::new_local(&paths.ledger).await?);
    ledger.run_migrations().await?;

    // ── Inputs ───────────────────────────────────────────────────────────
    let profiles = load_profiles(&paths.profiles)?;
    eprintln!(
        "   Loaded {} profile(s): {}",
        profiles.len(),
        profiles
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let messages = load_feed(&paths.feed)?;
    eprintln!("   Loaded {} feed message(s)", messages.len());

    // ── Transport ────────────────────────────────────────────────────────
    let transport: Arc<dyn MailTransport> = if params.live() {
        let smtp = SmtpConfig::from_env().ok_or(ConfigError::TransportUnconfigured)?;
        Arc::new(SmtpMailer::new(&smtp)?)
    } else {
        Arc::new(NoopTransport)
    };

    // ── Orchestrator ─────────────────────────────────────────────────────
    let table = KeywordRuleTable::default_table();
    eprintln!("   Rule table: v{}\n", table.version());
    let classifier = RelevanceClassifier::new(table);
    let gate = SafetyGate::new(params.gate_config(), Arc::new(SystemClock));

    let mut orchestrator = DispatchOrchestrator::new(
        classifier,
        profiles,
        params,
        Arc::clone(&ledger),
        gate,
        transport,
    );

    let recovery = orchestrator.recover().await?;
    if recovery.recommitted_keys > 0 || recovery.unknown_outcomes > 0 {
        eprintln!(
            "   Recovery: {} key(s) re-committed, {} interrupted send(s) closed",
            recovery.recommitted_keys, recovery.unknown_outcomes
        );
    }

    let stats = orchestrator.run(&messages).await?;

    eprintln!("\n── Run summary ──────────────────────────────────────────");
    eprintln!("   Processed: {}", stats.processed);
    eprintln!("   Relevant:  {}", stats.relevant);
    eprintln!("   Drafted:   {}", stats.drafted);
    eprintln!("   Sent:      {}", stats.sent);
    eprintln!("   Failed:    {}", stats.failed);
    eprintln!("   Skipped:   {}", stats.skipped);
    for (reason, count) in &stats.by_skip_reason {
        eprintln!("     {reason}: {count}");
    }

    let ledger_stats = ledger.statistics().await?;
    eprintln!(
        "   Ledger: {} entr{} total, {} sent all-time",
        ledger_stats.total,
        if ledger_stats.total == 1 { "y" } else { "ies" },
        ledger_stats.sent
    );

    Ok(())
}
