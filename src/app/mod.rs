//! Process-wide state

mod state;

pub use state::AppState;
