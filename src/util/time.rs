//! Clocks and simulation cadence

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Record the process start (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Physics ticks per second
pub const TICK_RATE: u32 = 60;
/// Wall-clock spacing of physics ticks
pub const TICK_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / TICK_RATE as u64);
/// Spacing of round countdown decrements
pub const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// Integrator timestep in seconds
pub fn tick_delta() -> f32 {
    1.0 / TICK_RATE as f32
}
