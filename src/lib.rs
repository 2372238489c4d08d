//! Simulations of indirect reciprocity.
//!
//! Agents meet in one-shot donor/recipient games, a social norm turns
//! observed behavior into binary reputations, and strategies spread
//! either by Fermi imitation across a well-mixed population or by
//! tabular Q-learning over replayed experience.

pub mod agent;
pub mod config;
pub mod game;
pub mod learning;
pub mod matrix;
pub mod norm;
pub mod population;
pub mod save;

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Payoffs, rewards, and Q-values.
pub type Utility = f64;
/// Mixing weights, error rates, and population fractions.
pub type Probability = f64;
/// Binary standing assigned by a social norm. Always GOOD or BAD.
pub type Reputation = f64;

// ============================================================================
// TRAITS
// ============================================================================
/// Random instance generation for testing and Monte Carlo sampling.
pub trait Arbitrary {
    /// Generate a uniformly random instance.
    fn random() -> Self;
}

// ============================================================================
// REPUTATION MODEL
// All norms in this crate are binary. Reputations live in agent variable
// maps as floats so payoff expressions can reference them directly.
// ============================================================================
/// Standing of an agent the norm approves of.
pub const GOOD: Reputation = 1.0;
/// Standing of an agent the norm disapproves of.
pub const BAD: Reputation = 0.0;
/// Reserved agent variable holding the agent's current standing.
pub const REPUTATION: &str = "reputation";
/// Reserved matrix variable holding the population's good-standing fraction.
pub const FRACTION: &str = "r";
/// Name of the donor move counted by the cooperation rate.
pub const COOPERATE: &str = "C";

/// Render a binary standing as a Q-table state label.
pub fn standing(rep: Reputation) -> &'static str {
    assert!(rep == GOOD || rep == BAD, "standing must be GOOD or BAD");
    if rep == GOOD { "1" } else { "0" }
}

// ============================================================================
// RUN INFRASTRUCTURE
// ============================================================================
/// Interval between progress log messages during long runs.
pub const RUN_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Initialize dual logging (terminal + file) with timestamped log files.
/// Creates `logs/` directory and writes DEBUG level to file, INFO to terminal.
#[cfg(feature = "driver")]
pub fn log() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// Global interrupt flag for graceful shutdown coordination.
#[cfg(feature = "driver")]
static INTERRUPTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
/// Optional run deadline from RUN_DURATION env var.
#[cfg(feature = "driver")]
static DEADLINE: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
/// Check if graceful shutdown was requested (via stdin "Q") or deadline reached.
#[cfg(feature = "driver")]
pub fn interrupted() -> bool {
    INTERRUPTED.load(std::sync::atomic::Ordering::Relaxed)
        || DEADLINE
            .get()
            .map_or(false, |d| std::time::Instant::now() >= *d)
}
/// No-op interrupt check when driver feature disabled.
#[cfg(not(feature = "driver"))]
pub fn interrupted() -> bool {
    false
}
/// Register graceful interrupt handler. Type "Q" + Enter to stop after the
/// current logging window. Optionally set RUN_DURATION (e.g., "2h", "30m").
#[cfg(feature = "driver")]
pub fn brb() {
    if let Ok(duration) = std::env::var("RUN_DURATION") {
        if let Some(deadline) = parse_duration(&duration) {
            let _ = DEADLINE.set(std::time::Instant::now() + deadline);
            log::info!("run will stop after {}", duration);
        }
    }
    std::thread::spawn(|| {
        loop {
            let ref mut buffer = String::new();
            if let Ok(_) = std::io::stdin().read_line(buffer) {
                if buffer.trim().to_uppercase() == "Q" {
                    log::warn!("graceful interrupt requested, finishing current window...");
                    INTERRUPTED.store(true, std::sync::atomic::Ordering::Relaxed);
                    break;
                }
            }
        }
    });
}
/// Parse duration string like "30s", "5m", "2h", "1d" into Duration.
#[cfg(feature = "driver")]
fn parse_duration(s: &str) -> Option<std::time::Duration> {
    let s = s.trim();
    let (num, unit) = s.split_at(s.len().saturating_sub(1));
    let value: u64 = num.parse().ok()?;
    match unit {
        "s" => Some(std::time::Duration::from_secs(value)),
        "m" => Some(std::time::Duration::from_secs(value * 60)),
        "h" => Some(std::time::Duration::from_secs(value * 3600)),
        "d" => Some(std::time::Duration::from_secs(value * 86400)),
        _ => None,
    }
}
