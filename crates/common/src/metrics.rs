use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

// Prometheus metrics (default registry)
pub static RPC_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "identity_rpc_calls_total",
        "Total correlated calls issued, by topic",
        &["topic"]
    )
    .expect("register rpc_calls_total")
});

pub static RPC_TIMEOUTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "identity_rpc_timeouts_total",
        "Total correlated calls abandoned after the reply deadline, by topic",
        &["topic"]
    )
    .expect("register rpc_timeouts_total")
});

pub static RPC_UNMATCHED_REPLIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "identity_rpc_unmatched_replies_total",
        "Replies that arrived with no pending call (late or foreign)"
    )
    .expect("register rpc_unmatched_replies_total")
});

pub static COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "identity_commands_total",
        "Inbound commands handled, by topic",
        &["topic"]
    )
    .expect("register commands_total")
});

pub static COMMAND_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "identity_command_failures_total",
        "Inbound commands answered with an error, by topic and error kind",
        &["topic", "kind"]
    )
    .expect("register command_failures_total")
});
