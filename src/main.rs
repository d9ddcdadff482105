// src/main.rs - Host binary: run the transport engine against the simulated gantry
use chessbot::config::{self, Config};
use chessbot::{Hardware, MoveRequest, Slot, TransportEngine, Zone};
use chessbot_shared::GantryState;
use chessbot_simulator::{SimBoard, SimConfig};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CaptureZone {
    Opponent,
    Ally,
}

impl From<CaptureZone> for Zone {
    fn from(zone: CaptureZone) -> Self {
        match zone {
            CaptureZone::Opponent => Zone::OpponentCapture,
            CaptureZone::Ally => Zone::AllyCapture,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "chessbot-host", version, about = "Chess gantry transport engine (simulated hardware)")]
struct Args {
    /// Configuration file; built-in defaults are used when it does not exist
    #[arg(short, long, default_value = "chessbot.toml")]
    config: String,

    /// Home both axes before running any move
    #[arg(long)]
    home: bool,

    /// Moves as `col,row:col,row`, executed in order
    #[arg(value_parser = parse_move)]
    moves: Vec<(Slot, Slot)>,

    /// Send the piece on the destination of the first move to this capture zone first
    #[arg(long, value_enum)]
    capture: Option<CaptureZone>,

    /// Print the final status as JSON
    #[arg(long)]
    json: bool,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_move(s: &str) -> Result<(Slot, Slot), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected 'col,row:col,row', got '{}'", s))?;
    let from: Slot = from.parse().map_err(|e| format!("{}", e))?;
    let to: Slot = to.parse().map_err(|e| format!("{}", e))?;
    Ok((from, to))
}

/// Engine configuration plus the `[simulator]` table, which only this binary reads.
#[derive(Debug, Default, Deserialize)]
struct HostConfig {
    #[serde(flatten)]
    engine: Config,
    #[serde(default)]
    simulator: SimConfig,
}

fn load(path: &str) -> Result<HostConfig, config::ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(HostConfig::default());
    }
    let host: HostConfig = config::load_toml(path)?;
    host.engine.validate()?;
    Ok(host)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();
    let HostConfig { engine: config, simulator } = load(&args.config)?;

    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting chessbot host");
    tracing::info!("Configuration: {}", args.config);
    tracing::info!(
        "Speeds: travel {} mm/s, carry {} mm/s, seat {} mm/s",
        config.speeds.travel_mm_s,
        config.speeds.carry_mm_s,
        config.speeds.seat_mm_s
    );

    let state = Arc::new(GantryState::new());
    let board = SimBoard::new(simulator, config.kinematics.steps_per_mm(), state.clone());
    let engine = TransportEngine::new(
        &config,
        Hardware {
            state,
            step_sink: board.step_sink(),
            magnet: board.magnet(),
            sensor: board.sensor(config.sensor.debounce()),
        },
    )?;

    if args.home {
        engine.home().await?;
    }

    for (i, (from, to)) in args.moves.iter().copied().enumerate() {
        let request = match args.capture {
            Some(zone) if i == 0 => MoveRequest::capture(from, to, zone.into()),
            _ => MoveRequest::plain(from, to),
        };
        match engine.execute(request).await {
            Ok(result) => tracing::info!("Move {} -> {}: {:?}", from, to, result),
            Err(e) => {
                tracing::error!("Move {} -> {} failed: {}", from, to, e);
                break;
            }
        }
    }

    let occupancy = board.occupancy();
    tracing::info!("Final occupancy:\n{}", occupancy);
    if args.json {
        let status = engine.status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}
