//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Firehose connections accepted (counter).
pub const FIREHOSE_CONNECTIONS_TOTAL: &str = "firehose_connections_total";
/// Firehose connections closed (counter).
pub const FIREHOSE_DISCONNECTIONS_TOTAL: &str = "firehose_disconnections_total";
/// Open firehose connections (gauge).
pub const FIREHOSE_CONNECTIONS_ACTIVE: &str = "firehose_connections_active";
/// Inbound frames decoded into envelopes (counter).
pub const FIREHOSE_MESSAGES_RECEIVED_TOTAL: &str = "firehose_messages_received_total";
/// Inbound frames dropped as malformed (counter).
pub const FIREHOSE_MESSAGES_DROPPED_TOTAL: &str = "firehose_messages_dropped_total";
/// Invoker calls made by dispatch (counter).
pub const FIREHOSE_DISPATCH_TOTAL: &str = "firehose_dispatch_total";
/// Broadcasts issued (counter).
pub const FIREHOSE_BROADCAST_TOTAL: &str = "firehose_broadcast_total";
/// Outbound frames dropped on a full send queue (counter).
pub const FIREHOSE_SEND_DROPS_TOTAL: &str = "firehose_send_drops_total";
/// Upgrades handed to the fallback listener (counter).
pub const FIREHOSE_UPGRADES_FORWARDED_TOTAL: &str = "firehose_upgrades_forwarded_total";
/// Upgrades terminated for lack of a listener (counter).
pub const FIREHOSE_UPGRADES_REJECTED_TOTAL: &str = "firehose_upgrades_rejected_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // no global install; tests share a process
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            FIREHOSE_CONNECTIONS_TOTAL,
            FIREHOSE_DISCONNECTIONS_TOTAL,
            FIREHOSE_CONNECTIONS_ACTIVE,
            FIREHOSE_MESSAGES_RECEIVED_TOTAL,
            FIREHOSE_MESSAGES_DROPPED_TOTAL,
            FIREHOSE_DISPATCH_TOTAL,
            FIREHOSE_BROADCAST_TOTAL,
            FIREHOSE_SEND_DROPS_TOTAL,
            FIREHOSE_UPGRADES_FORWARDED_TOTAL,
            FIREHOSE_UPGRADES_REJECTED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
            assert!(name.starts_with("firehose_"));
        }
    }
}
