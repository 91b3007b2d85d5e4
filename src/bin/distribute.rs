//! Batch distribution tool
//!
//! Tops every registered user up to a target balance from the faucet.
//!
//! Run with: cargo run --bin distribute --release -- --unit token --target 10 [--dry-run] [--even-split]

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use faucet_onboarding::directory::PgUserDirectory;
use faucet_onboarding::domain::{Amount, Unit};
use faucet_onboarding::gateway::JsonRpcGateway;
use faucet_onboarding::jobs::{DistributionJob, SplitPolicy};
use faucet_onboarding::reconciler::BalanceReconciler;
use faucet_onboarding::telemetry::init_tracing;
use faucet_onboarding::Config;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let unit: Unit = flag_value(&args, "--unit").unwrap_or("token").parse()?;
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let split = if args.iter().any(|a| a == "--even-split") {
        SplitPolicy::Even
    } else {
        SplitPolicy::FirstCome
    };

    let config = Config::from_env()?;
    let onboarding = config.onboarding()?;

    let target = match flag_value(&args, "--target") {
        Some(raw) => {
            let amount: Amount = raw.parse()?;
            let decimals = match unit {
                Unit::Currency => faucet_onboarding::domain::CURRENCY_DECIMALS,
                Unit::Token => config.token_decimals,
            };
            amount.to_base_units(decimals)?
        }
        None => onboarding.target(unit),
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    let gateway = Arc::new(JsonRpcGateway::new(config.json_rpc())?);
    let directory = Arc::new(PgUserDirectory::new(pool.clone()));
    let job = DistributionJob::new(BalanceReconciler::new(gateway, onboarding.reconciler), directory)
        .with_split(split);

    if dry_run {
        let plan = job.plan(unit, target).await?;

        println!("=== Distribution Plan ({}) ===", plan.unit);
        println!("Target: {}", plan.target);
        println!("Faucet balance: {}", plan.faucet_balance);
        if let Some(share) = plan.share {
            println!("Even share per recipient: {}", share);
        }
        for transfer in &plan.transfers {
            println!(
                "  {} {}: {} -> +{}{}",
                transfer.username,
                transfer.address,
                transfer.current,
                transfer.amount,
                if transfer.partial { " (partial)" } else { "" }
            );
        }
        println!("Already funded: {}", plan.already_funded);
        println!("Total to send: {}", plan.total);
        if let Some(index) = plan.exhausted_at {
            println!("Faucet runs out at recipient #{}", index + 1);
        }
    } else {
        let report = job.run(unit, target).await?;

        println!("\n=== Distribution Results ({}) ===", report.unit);
        println!("Target: {}", report.target);
        if let Some(share) = report.share {
            println!("Even share per recipient: {}", share);
        }
        println!("Funded: {}", report.funded);
        println!("Already funded: {}", report.already_funded);
        println!("Failed: {}", report.failed);
        println!("Not attempted: {}", report.not_attempted());
        println!("Total sent: {}", report.total_sent);
        println!("Faucet: {} -> {}", report.faucet_before, report.faucet_after);
        for error in &report.errors {
            println!("  ! {}", error);
        }

        if args.iter().any(|a| a == "--json") {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    pool.close().await;
    Ok(())
}
