// Signal Relay CLI Validation Tool
// Validates relay functionality through automated scenarios and runs the
// negotiation drivers headless for operator smoke-testing

use clap::{Parser, Subcommand};
use colored::*;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use proctor_signal::peer::{CaptureConfig, NegotiatorConfig, PeerNegotiator, RelayClient};

#[derive(Parser)]
#[command(name = "signal-cli")]
#[command(about = "Signal Relay CLI Validation Tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get server configuration
    Config,

    /// Start (or restart) a monitoring session
    Start {
        /// Session ID (usually the invite identifier)
        #[arg(short = 'i', long)]
        session_id: String,
    },

    /// End a monitoring session
    End {
        #[arg(short = 'i', long)]
        session_id: String,
    },

    /// Show a session's lifecycle status
    Status {
        #[arg(short = 'i', long)]
        session_id: String,
    },

    /// Tail the signal log of a session
    Watch {
        #[arg(short = 'i', long)]
        session_id: String,

        /// Sequence to resume from
        #[arg(long, default_value_t = 0)]
        since: u64,
    },

    /// Publish camera/microphone as the applicant (offerer role)
    Publish {
        /// Session ID; generated when omitted
        #[arg(short = 'i', long)]
        session_id: Option<String>,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,

        /// Publish without video
        #[arg(long)]
        no_video: bool,

        /// Publish without audio
        #[arg(long)]
        no_audio: bool,
    },

    /// Watch an applicant's feed as the admin (answerer role)
    Monitor {
        #[arg(short = 'i', long)]
        session_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
    },

    /// Run automated validation scenarios
    Validate {
        /// Run all validation tests
        #[arg(short, long)]
        all: bool,

        /// Test specific scenario
        #[arg(long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Config => {
            check_config(&cli.server).await;
        }
        Commands::Start { session_id } => {
            start_session(&cli.server, session_id).await;
        }
        Commands::End { session_id } => {
            end_session(&cli.server, session_id).await;
        }
        Commands::Status { session_id } => {
            session_status(&cli.server, session_id).await;
        }
        Commands::Watch { session_id, since } => {
            watch_signals(&cli.server, session_id, *since).await;
        }
        Commands::Publish {
            session_id,
            poll_interval_ms,
            no_video,
            no_audio,
        } => {
            let session_id = session_id.clone().unwrap_or_else(generate_session_id);
            publish(
                &cli.server,
                &session_id,
                *poll_interval_ms,
                !no_video,
                !no_audio,
            )
            .await;
        }
        Commands::Monitor {
            session_id,
            poll_interval_ms,
        } => {
            monitor(&cli.server, session_id, *poll_interval_ms).await;
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli.server).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
    }
}

fn base_url(server: &str) -> String {
    format!("http://{}", server)
}

fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    format!("session-{:06}", rng.gen_range(100000..999999))
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("{}/health", base_url(server));
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!(
                        "  Service: {}",
                        body["service"].as_str().unwrap_or("unknown")
                    );
                    println!(
                        "  Active sessions: {}",
                        body["active_sessions"].as_u64().unwrap_or(0)
                    );
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching server configuration...".cyan());

    let url = format!("{}/config", base_url(server));
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("{} Config endpoint accessible", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("\nConfiguration:");
                    match serde_json::to_string_pretty(&body) {
                        Ok(pretty) => println!("{}", pretty),
                        Err(_) => println!("{}", body),
                    }
                }
            } else {
                println!("{} Config fetch failed: {}", "✗".red(), resp.status());
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

async fn start_session(server: &str, session_id: &str) {
    let relay = RelayClient::new(base_url(server), session_id);
    match relay.start_session().await {
        Ok(()) => println!("{} Session {} started", "✓".green(), session_id.bold()),
        Err(e) => println!("{} Failed to start session: {}", "✗".red(), e),
    }
}

async fn end_session(server: &str, session_id: &str) {
    let relay = RelayClient::new(base_url(server), session_id);
    match relay.end_session().await {
        Ok(()) => println!("{} Session {} ended", "✓".green(), session_id.bold()),
        Err(e) => println!("{} Failed to end session: {}", "✗".red(), e),
    }
}

async fn session_status(server: &str, session_id: &str) {
    let relay = RelayClient::new(base_url(server), session_id);
    match relay.session_status().await {
        Ok(Some(status)) => {
            println!("Session {}: {:?}", session_id.bold(), status);
        }
        Ok(None) => {
            println!("Session {}: never started", session_id.bold());
        }
        Err(e) => println!("{} Status check failed: {}", "✗".red(), e),
    }
}

async fn watch_signals(server: &str, session_id: &str, mut since: u64) {
    println!(
        "{} {}",
        "Watching signal log for".cyan(),
        session_id.bold()
    );
    println!("Press Ctrl+C to stop.\n");

    let relay = RelayClient::new(base_url(server), session_id);

    loop {
        match relay.fetch_signals(since).await {
            Ok(signals) => {
                for message in signals {
                    since = message.sequence;
                    println!(
                        "{} #{} {:?} {}",
                        "◀".green(),
                        message.sequence,
                        message.kind,
                        summarize_payload(&message.payload).bright_white()
                    );
                }
            }
            Err(e) => {
                println!("{} Poll failed: {}", "✗".red(), e);
                break;
            }
        }
        sleep(Duration::from_millis(1000)).await;
    }
}

fn summarize_payload(payload: &serde_json::Value) -> String {
    let text = match payload.as_str() {
        Some(s) => s.to_string(),
        None => payload.to_string(),
    };
    if text.chars().count() > 72 {
        let head: String = text.chars().take(72).collect();
        format!("{head}…")
    } else {
        text
    }
}

async fn publish(server: &str, session_id: &str, poll_interval_ms: u64, video: bool, audio: bool) {
    println!("{}", "Publishing local capture...".cyan());
    println!("  Session ID: {}", session_id.bold());

    let relay = RelayClient::new(base_url(server), session_id);
    let config = NegotiatorConfig {
        poll_interval: Duration::from_millis(poll_interval_ms),
        capture: CaptureConfig { video, audio },
    };

    let mut driver = match PeerNegotiator::offerer(relay, config).await {
        Ok(driver) => driver,
        Err(e) => {
            println!("{} Cannot start publisher: {}", "✗".red(), e);
            return;
        }
    };

    run_driver(&mut driver, session_id).await;
}

async fn monitor(server: &str, session_id: &str, poll_interval_ms: u64) {
    println!("{}", "Monitoring applicant feed...".cyan());
    println!("  Session ID: {}", session_id.bold());

    let relay = RelayClient::new(base_url(server), session_id);
    let config = NegotiatorConfig {
        poll_interval: Duration::from_millis(poll_interval_ms),
        capture: CaptureConfig::default(),
    };

    let mut driver = match PeerNegotiator::answerer(relay, config).await {
        Ok(driver) => driver,
        Err(e) => {
            println!("{} Cannot start monitor: {}", "✗".red(), e);
            return;
        }
    };

    if let Some(mut tracks) = driver.take_remote_tracks() {
        tokio::spawn(async move {
            while let Some(track) = tracks.recv().await {
                println!(
                    "{} Incoming {} track ({})",
                    "◀".green(),
                    track.kind.bold(),
                    track.id
                );
            }
        });
    }

    run_driver(&mut driver, session_id).await;
}

async fn run_driver(driver: &mut PeerNegotiator, session_id: &str) {
    match driver.run().await {
        Ok(status) => {
            println!("{} Session {} is {:?}", "✓".green(), session_id.bold(), status);
            println!("Press {} to stop and end the session.", "Ctrl+C".bold());
            let _ = tokio::signal::ctrl_c().await;
            driver.shutdown().await;
            println!("{} Session ended", "✓".green());
        }
        Err(e) => {
            println!("{} Negotiation failed: {}", "✗".red(), e);
        }
    }
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    println!("\n{}", "Signal Relay:".bold().cyan());
    println!("  {} - Health endpoint check", "health".cyan());
    println!("  {} - Session start/end lifecycle", "lifecycle".cyan());
    println!("  {} - Signal append/read ordering", "signal-order".cyan());
    println!(
        "  {} - Restart clears the prior backlog",
        "restart-clears".cyan()
    );
    println!(
        "  {} - Signaling outside an active session is rejected",
        "inactive-session".cyan()
    );
    println!("\nExample: signal-cli validate --scenario signal-order");
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    let result = match scenario {
        "health" => validate_health(server).await,
        "lifecycle" => validate_lifecycle(server).await,
        "signal-order" => validate_signal_order(server).await,
        "restart-clears" => validate_restart_clears(server).await,
        "inactive-session" => validate_inactive_session(server).await,
        _ => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
            return;
        }
    };

    if result {
        println!("\n{} Scenario passed", "✓".green().bold());
    } else {
        println!("\n{} Scenario failed", "✗".red().bold());
    }
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let scenarios = vec![
        "health",
        "lifecycle",
        "signal-order",
        "restart-clears",
        "inactive-session",
    ];

    let mut passed = 0;
    let mut failed = 0;

    for scenario in scenarios {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        let result = match scenario {
            "health" => validate_health(server).await,
            "lifecycle" => validate_lifecycle(server).await,
            "signal-order" => validate_signal_order(server).await,
            "restart-clears" => validate_restart_clears(server).await,
            "inactive-session" => validate_inactive_session(server).await,
            _ => false,
        };

        if result {
            passed += 1;
        } else {
            failed += 1;
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} Passed: {}", "✓".green(), passed.to_string().green());
    println!("  {} Failed: {}", "✗".red(), failed.to_string().red());
    println!("  Total: {}", passed + failed);

    if failed == 0 {
        println!("\n{}", "All validations passed!".green().bold());
    } else {
        println!(
            "\n{}",
            "Some validations failed. Check output above.".yellow()
        );
    }
}

async fn validate_health(server: &str) -> bool {
    let url = format!("{}/health", base_url(server));
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("{} Health endpoint reachable", "✓".green());
                true
            } else {
                println!("{} Health endpoint returned: {}", "✗".red(), resp.status());
                false
            }
        }
        Err(e) => {
            println!("{} Connection failed: {}", "✗".red(), e);
            false
        }
    }
}

async fn validate_lifecycle(server: &str) -> bool {
    let relay = RelayClient::new(base_url(server), generate_session_id());

    println!("  Starting session {}...", relay.session_id());
    if let Err(e) = relay.start_session().await {
        println!("{} Start failed: {}", "✗".red(), e);
        return false;
    }
    println!("  {} Session started", "✓".green());

    if let Err(e) = relay.end_session().await {
        println!("{} End failed: {}", "✗".red(), e);
        return false;
    }
    println!("  {} Session ended", "✓".green());

    // A second end must also succeed (fire-and-forget unload path)
    if let Err(e) = relay.end_session().await {
        println!("{} Second end failed: {}", "✗".red(), e);
        return false;
    }
    println!("  {} Second end is idempotent", "✓".green());
    true
}

async fn validate_signal_order(server: &str) -> bool {
    let relay = RelayClient::new(base_url(server), generate_session_id());

    if relay.start_session().await.is_err() {
        println!("{} Start failed", "✗".red());
        return false;
    }

    if relay.send_offer("validator-offer-sdp").await.is_err() {
        println!("{} Offer append failed", "✗".red());
        return false;
    }
    if relay.send_answer("validator-answer-sdp").await.is_err() {
        println!("{} Answer append failed", "✗".red());
        return false;
    }

    let signals = match relay.fetch_signals(0).await {
        Ok(signals) => signals,
        Err(e) => {
            println!("{} Signal fetch failed: {}", "✗".red(), e);
            return false;
        }
    };

    if signals.len() != 2 || signals[0].sequence != 1 || signals[1].sequence != 2 {
        println!("{} Unexpected backlog: {:?}", "✗".red(), signals);
        return false;
    }
    println!("  {} Backlog returned in insertion order", "✓".green());

    match relay.fetch_signals(1).await {
        Ok(newer) if newer.len() == 1 && newer[0].sequence == 2 => {
            println!("  {} Cursor window honored", "✓".green());
        }
        other => {
            println!("{} Cursor window broken: {:?}", "✗".red(), other);
            return false;
        }
    }

    let _ = relay.end_session().await;
    true
}

async fn validate_restart_clears(server: &str) -> bool {
    let relay = RelayClient::new(base_url(server), generate_session_id());

    if relay.start_session().await.is_err() || relay.send_offer("stale-offer").await.is_err() {
        println!("{} Setup failed", "✗".red());
        return false;
    }

    // Restarting an active session must replace, not accumulate
    if relay.start_session().await.is_err() {
        println!("{} Restart failed", "✗".red());
        return false;
    }

    match relay.fetch_signals(0).await {
        Ok(signals) if signals.is_empty() => {
            println!("  {} Restart cleared the prior backlog", "✓".green());
            let _ = relay.end_session().await;
            true
        }
        other => {
            println!("{} Backlog survived restart: {:?}", "✗".red(), other);
            false
        }
    }
}

async fn validate_inactive_session(server: &str) -> bool {
    let relay = RelayClient::new(base_url(server), generate_session_id());

    match relay.send_offer("orphan-offer").await {
        Err(e) => {
            println!("  {} Rejected as expected: {}", "✓".green(), e);
            true
        }
        Ok(()) => {
            println!(
                "{} Offer accepted outside an active session",
                "✗".red()
            );
            false
        }
    }
}
