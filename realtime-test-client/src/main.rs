use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;
use sse_client::Connection;

#[derive(Parser)]
#[command(name = "realtime-test-client")]
#[command(about = "Realtime Stream Integration Testing Tool")]
struct Cli {
    /// Base URL of the realtime core (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Identity token for the first simulated client
    #[arg(long, default_value = "test-user-a")]
    identity1: String,

    /// Identity token for the second simulated client
    #[arg(long, default_value = "test-user-b")]
    identity2: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test stream connection, greeting, and sequenced heartbeats
    ConnectionTest,
    /// Test a broadcast event reaching every connected client
    BroadcastTest,
    /// Test a message event reaching its recipient and nobody else
    MessageRoutingTest,
    /// Test the offline queue replaying into the publish endpoint in order
    OfflineReplayTest,
    /// Test precaching and offline fallback against the live server
    CacheAgentTest,
    /// Test snapshot diffing and the new-message signal
    SnapshotDiffTest,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    // Fail fast if the backend is down before opening any streams
    println!("{} Checking backend health...", "→".blue());
    let client = reqwest::Client::new();
    let api_client = ApiClient::new(client.clone(), cli.base_url.clone());
    let health = api_client.health().await?;
    println!("{} Backend is reachable ({})", "✓".green(), health);

    // Establish stream connections
    println!("\n{} Establishing stream connections...", "→".blue());
    let mut sse1 = Connection::establish(
        &cli.base_url,
        &cli.identity1,
        format!("Client 1 ({})", cli.identity1),
    )
    .await?;

    let mut sse2 = Connection::establish(
        &cli.base_url,
        &cli.identity2,
        format!("Client 2 ({})", cli.identity2),
    )
    .await?;

    println!("{} Client 1 stream connection established", "✓".green());
    println!("{} Client 2 stream connection established", "✓".green());

    // Run test scenarios
    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&mut sse1, &mut sse2).await?);
        }
        ScenarioChoice::BroadcastTest => {
            results.push(scenarios::test_broadcast(&api_client, &mut sse1, &mut sse2).await?);
        }
        ScenarioChoice::MessageRoutingTest => {
            results.push(
                scenarios::test_message_routing(
                    &cli.identity1,
                    &cli.identity2,
                    &api_client,
                    &mut sse1,
                    &mut sse2,
                )
                .await?,
            );
        }
        ScenarioChoice::OfflineReplayTest => {
            results.push(
                scenarios::test_offline_replay(
                    &cli.identity1,
                    &cli.identity2,
                    &cli.base_url,
                    &mut sse2,
                )
                .await?,
            );
        }
        ScenarioChoice::CacheAgentTest => {
            results.push(scenarios::test_cache_agent(&cli.base_url).await?);
        }
        ScenarioChoice::SnapshotDiffTest => {
            results.push(
                scenarios::test_snapshot_diff(
                    &cli.identity1,
                    &cli.identity2,
                    &api_client,
                    &mut sse2,
                )
                .await?,
            );
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&mut sse1, &mut sse2).await?);
            results.push(scenarios::test_broadcast(&api_client, &mut sse1, &mut sse2).await?);
            results.push(
                scenarios::test_message_routing(
                    &cli.identity1,
                    &cli.identity2,
                    &api_client,
                    &mut sse1,
                    &mut sse2,
                )
                .await?,
            );
            results.push(
                scenarios::test_offline_replay(
                    &cli.identity1,
                    &cli.identity2,
                    &cli.base_url,
                    &mut sse2,
                )
                .await?,
            );
            results.push(scenarios::test_cache_agent(&cli.base_url).await?);
            results.push(
                scenarios::test_snapshot_diff(
                    &cli.identity1,
                    &cli.identity2,
                    &api_client,
                    &mut sse2,
                )
                .await?,
            );
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
