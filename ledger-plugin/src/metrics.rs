//! Prometheus metrics for the plugin

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    /// Total transfer submissions by path and registry outcome
    pub static ref TRANSFER_SUBMIT_TOTAL: CounterVec = register_counter_vec!(
        "ledger_plugin_transfer_submit_total",
        "Total transfer submissions",
        &["path", "outcome"]
    )
    .unwrap();

    /// Transfers reaching a terminal state
    pub static ref TRANSFER_FINAL_TOTAL: CounterVec = register_counter_vec!(
        "ledger_plugin_transfer_final_total",
        "Transfers reaching a terminal state",
        &["state"]
    )
    .unwrap();

    /// Plugin notifications emitted to local listeners
    pub static ref NOTIFICATION_EMIT_TOTAL: CounterVec = register_counter_vec!(
        "ledger_plugin_notification_emit_total",
        "Plugin notifications emitted",
        &["event"]
    )
    .unwrap();
}
