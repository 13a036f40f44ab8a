//! Prometheus metrics for the execution core.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, Encoder,
    IntCounterVec, IntGauge, Registry, TextEncoder,
};

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    pub static ref ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "pagepilot_actions_total",
        "Actions executed, by kind and outcome",
        &["kind", "outcome"],
        REGISTRY
    )
    .expect("actions_total registration");
    pub static ref ACTION_RETRIES_TOTAL: IntCounterVec =
        register_int_counter_vec_with_registry!(
            "pagepilot_action_retries_total",
            "Retry attempts beyond the first, by kind",
            &["kind"],
            REGISTRY
        )
        .expect("action_retries_total registration");
    pub static ref TASKS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "pagepilot_tasks_total",
        "Execution tasks, by terminal state",
        &["state"],
        REGISTRY
    )
    .expect("tasks_total registration");
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge_with_registry!(
        "pagepilot_queue_depth",
        "Plans waiting for a worker slot",
        REGISTRY
    )
    .expect("queue_depth registration");
    pub static ref BROWSER_RECREATES_TOTAL: IntCounterVec =
        register_int_counter_vec_with_registry!(
            "pagepilot_browser_recreates_total",
            "Browser context recreations, by trigger",
            &["trigger"],
            REGISTRY
        )
        .expect("browser_recreates_total registration");
}

pub fn global_registry() -> &'static Registry {
    &REGISTRY
}

/// Render the registry in Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_text_format() {
        ACTIONS_TOTAL.with_label_values(&["click", "ok"]).inc();
        QUEUE_DEPTH.set(2);
        let body = render();
        assert!(body.contains("pagepilot_actions_total"));
        assert!(body.contains("pagepilot_queue_depth"));
    }
}
