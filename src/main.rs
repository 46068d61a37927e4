use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use eldercare::agents::{CommunicationAgent, HealthMonitorAgent, ReminderAgent, SafetyMonitorAgent};
use eldercare::providers::LogChannel;
use eldercare::simulation::{
    generate_health_data, generate_movement_data, health_averages, movement_averages,
    random_health_reading, random_movement_reading,
};
use eldercare::types::{HealthData, MovementData};
use eldercare::{Config, Orchestrator};

const HEALTH_FEED_PERIOD: Duration = Duration::from_millis(500);
const MOVEMENT_FEED_PERIOD: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "eldercare")]
#[command(about = "Elderly-care monitoring agent runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent fleet against simulated sensor feeds
    Run {
        #[arg(long, default_value = "user_1")]
        user: String,
        #[arg(long, default_value_t = 30, help = "Seconds to run before shutting down")]
        duration_secs: u64,
    },
    /// Print a sample of simulated readings
    Sample {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            user,
            duration_secs,
        } => run_fleet(config, &user, Duration::from_secs(duration_secs)).await?,
        Commands::Sample { count } => {
            print_health_data(&generate_health_data(count));
            print_movement_data(&generate_movement_data(count));
        }
    }

    Ok(())
}

async fn run_fleet(config: Config, user: &str, duration: Duration) -> Result<()> {
    let orchestrator = Orchestrator::with_config(config.orchestrator.clone());

    let health = Arc::new(HealthMonitorAgent::with_config(
        "health_monitor_1",
        config.health.clone(),
    ));
    let safety = Arc::new(SafetyMonitorAgent::with_config(
        "safety_monitor_1",
        config.safety.clone(),
    ));
    let reminder = Arc::new(ReminderAgent::with_config("reminder_1", config.reminder.clone()));
    let communication = Arc::new(CommunicationAgent::with_channel(
        "communication_1",
        Arc::new(LogChannel),
        config.communication.clone(),
    ));

    log::info!("Initializing elderly care system");
    orchestrator
        .register_agent("health_monitor", "Health Monitor", health.clone())
        .await?;
    orchestrator
        .register_agent("safety_monitor", "Safety Monitor", safety.clone())
        .await?;
    orchestrator
        .register_agent("reminder", "Reminder", reminder)
        .await?;
    orchestrator
        .register_agent("communication", "Communication", communication)
        .await?;

    orchestrator.start().await?;
    if let Err(e) = orchestrator.start_agents().await {
        orchestrator.cleanup().await;
        return Err(e.into());
    }
    log::info!("System started; monitoring {} for {:?}", user, duration);

    let (stop_tx, stop_rx) = watch::channel(false);
    let health_feed = tokio::spawn(feed_health(health, user.to_string(), stop_rx.clone()));
    let movement_feed = tokio::spawn(feed_movement(safety, user.to_string(), stop_rx));

    tokio::select! {
        _ = tokio::time::sleep(duration) => log::info!("Run duration elapsed"),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("Received shutdown signal");
        }
    }

    stop_tx.send_replace(true);
    let (health_result, movement_result) = tokio::join!(health_feed, movement_feed);
    health_result?;
    movement_result?;

    let report = orchestrator.cleanup().await;
    let stats = orchestrator.stats();
    println!(
        "\nDispatched {} message(s): {} delivered, {} failed, {} dropped",
        stats.dispatched, stats.delivered, stats.failed, stats.dropped
    );
    println!(
        "Cleaned up {} agent(s), {} failure(s)",
        report.cleaned.len(),
        report.failed.len()
    );
    Ok(())
}

async fn feed_health(agent: Arc<HealthMonitorAgent>, user: String, mut stop: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(HEALTH_FEED_PERIOD);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                if let Err(e) = agent.process_health_data(random_health_reading(&user)).await {
                    log::error!("Health feed for {}: {}", user, e);
                }
            }
        }
    }
}

async fn feed_movement(
    agent: Arc<SafetyMonitorAgent>,
    user: String,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(MOVEMENT_FEED_PERIOD);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                if let Err(e) = agent.process_movement_data(random_movement_reading(&user)).await {
                    log::error!("Movement feed for {}: {}", user, e);
                }
            }
        }
    }
}

fn print_health_data(data: &[HealthData]) {
    println!("\nHealth Data Sample:");
    println!("{}", "=".repeat(110));
    println!(
        "{:<10} {:<12} {:<20} {:<10} {:<10} {:<30}",
        "User ID", "Heart Rate", "Blood Pressure", "Glucose", "Oxygen", "Timestamp"
    );
    println!("{}", "=".repeat(110));
    for record in data {
        let bp = record.blood_pressure();
        println!(
            "{:<10} {:<12.1} {:<20} {:<10.1} {:<10.1} {}",
            record.user_id(),
            record.heart_rate(),
            format!("{:.1}/{:.1}", bp.systolic, bp.diastolic),
            record.blood_glucose(),
            record.oxygen_level(),
            record.timestamp()
        );
    }

    if let Some(avg) = health_averages(data) {
        println!("{}", "-".repeat(110));
        println!(
            "{:<10} {:<12.1} {:<20} {:<10.1} {:<10.1}",
            "AVERAGE:",
            avg.heart_rate,
            format!("{:.1}/{:.1}", avg.systolic, avg.diastolic),
            avg.blood_glucose,
            avg.oxygen_level
        );
    }
}

fn print_movement_data(data: &[MovementData]) {
    let triple = |x: f64, y: f64, z: f64| format!("({:6.2}, {:6.2}, {:6.2})", x, y, z);

    println!("\nMovement Data Sample:");
    println!("{}", "=".repeat(140));
    println!(
        "{:<10} {:<35} {:<35} {:<10} {:<30}",
        "User ID", "Acceleration (x,y,z)", "Position (x,y,z)", "Activity", "Timestamp"
    );
    println!("{}", "=".repeat(140));
    for record in data {
        let a = record.acceleration();
        let p = record.position();
        println!(
            "{:<10} {:<35} {:<35} {:<10.2} {}",
            record.user_id(),
            triple(a.x, a.y, a.z),
            triple(p.x, p.y, p.z),
            record.activity_level(),
            record.timestamp()
        );
    }

    if let Some(avg) = movement_averages(data) {
        let (a, p) = (avg.acceleration, avg.position);
        println!("{}", "-".repeat(140));
        println!(
            "{:<10} {:<35} {:<35} {:<10.2}",
            "AVERAGE:",
            triple(a.x, a.y, a.z),
            triple(p.x, p.y, p.z),
            avg.activity_level
        );
    }
}
