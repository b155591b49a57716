//! Token endpoint metrics
//!
//! - `inpost_token_requests_total` (counter): labels `grant`, `outcome`
//!
//! The library only records; installing a recorder is up to the host.
//! Without one these calls are no-ops.

/// Grant type label values.
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Record one token endpoint call.
pub fn record_token_request(grant: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    metrics::counter!("inpost_token_requests_total", "grant" => grant, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn record_does_not_panic_without_recorder() {
        record_token_request(GRANT_REFRESH_TOKEN, true);
    }

    #[test]
    fn record_increments_counter_with_labels() {
        // Isolated recorder: install_recorder() is a process-wide singleton
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_token_request(GRANT_AUTHORIZATION_CODE, true);
        record_token_request(GRANT_REFRESH_TOKEN, false);

        let output = handle.render();
        assert!(output.contains("inpost_token_requests_total"));
        assert!(output.contains("grant=\"authorization_code\""));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("grant=\"refresh_token\""));
        assert!(output.contains("outcome=\"error\""));
    }
}
