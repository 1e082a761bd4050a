//! CLI command implementations.

mod ask;
mod assist;
mod chat;
mod config;
mod customers;
mod finalize;
mod kb;
mod serve;
mod speech;

pub use ask::run_ask;
pub use assist::run_assist;
pub use chat::run_chat;
pub use config::run_config;
pub use customers::run_customers;
pub use finalize::run_finalize;
pub use kb::run_kb;
pub use serve::{router, run_serve, AppState};
pub use speech::{run_speak, run_transcribe};

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;

/// Run pre-flight checks, printing what's missing.
fn check_ready(operation: Operation) -> crate::error::Result<()> {
    if let Err(e) = preflight::check(operation) {
        Output::error(&e.to_string());
        return Err(e);
    }
    Ok(())
}
