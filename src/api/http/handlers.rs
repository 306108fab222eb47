//! HTTP request handlers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use log::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::net::LineSource;

/// Counter snapshot for the JSON API.
#[derive(Serialize)]
pub struct CountersSnapshot {
    state: String,
    uptime_secs: u64,
    counters: BTreeMap<String, u64>,
}

/// Get the current source snapshot.
pub fn counters_snapshot(source: &LineSource) -> CountersSnapshot {
    CountersSnapshot {
        state: source.state().to_string(),
        uptime_secs: source.uptime_secs(),
        counters: source.counters().snapshot(),
    }
}

/// Create a JSON response.
pub fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut r = Response::new(Full::new(Bytes::from(body)));
            *r.status_mut() = status;
            r.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            r
        }
        Err(e) => {
            error!("json serialize error: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from_static(
                    b"{\"error\":\"serialization\"}",
                )))
                .unwrap()
        }
    }
}

/// Render counters in Prometheus exposition format.
///
/// Counter names keep their dotted form in logs and JSON; here dots become
/// underscores and monotonic counters get a `_total` suffix.
pub fn render_prometheus(source: &LineSource) -> String {
    let g = |name: &str, help: &str, val: u64| -> String {
        format!(
            "# HELP {0} {1}\n# TYPE {0} counter\n{0} {2}\n",
            name, help, val
        )
    };
    let gauge = |name: &str, help: &str, val: u64| -> String {
        format!(
            "# HELP {0} {1}\n# TYPE {0} gauge\n{0} {2}\n",
            name, help, val
        )
    };

    let mut s = String::with_capacity(2048);

    s.push_str(&gauge(
        "svarog_uptime_seconds",
        "Seconds since the source started",
        source.uptime_secs(),
    ));

    for (name, value) in source.counters().snapshot() {
        let metric = format!("svarog_{}_total", name.replace('.', "_"));
        s.push_str(&g(&metric, counter_help(&name), value));
    }

    s
}

fn counter_help(name: &str) -> &'static str {
    match name {
        "open.attempts" => "Attempts to open the server socket",
        "open.errors" => "Failed attempts to open the server socket",
        "accept.succeeded" => "Connections accepted",
        "accept.failed" => "Failed accept calls",
        "characters.received" => "Characters read from all connections",
        "events.processed" => "Lines accepted by the channel",
        "events.failed" => "Lines rejected or overlong",
        "sessions.completed" => "Connections that ended without an I/O error",
        "sessions.broken" => "Connections that ended on an I/O error",
        _ => "Source counter",
    }
}

/// Render the status page.
pub fn render_home(source: &LineSource) -> String {
    let mut rows = String::new();
    for (name, value) in source.counters().snapshot() {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            name, value
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>svarog</title></head>
<body>
<h1>svarog line source</h1>
<p>state: <b>{state}</b>, uptime: {uptime}s</p>
<table border="1" cellpadding="4">
<tr><th>counter</th><th>value</th></tr>
{rows}</table>
<p><a href="/api/counters">JSON counters</a> | <a href="/metrics">Prometheus</a></p>
</body>
</html>
"#,
        state = source.state(),
        uptime = source.uptime_secs(),
        rows = rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::Config;
    use std::sync::Arc;

    fn idle_source() -> LineSource {
        let (channel, _rx) = MemoryChannel::new(4);
        LineSource::new(Config::default(), Arc::new(channel))
    }

    #[test]
    fn prometheus_rendering_has_help_type_and_value() {
        let source = idle_source();
        source.counters().add_and_get("events.processed", 42);

        let body = render_prometheus(&source);
        assert!(body.contains("# HELP svarog_events_processed_total"));
        assert!(body.contains("# TYPE svarog_events_processed_total counter"));
        assert!(body.contains("svarog_events_processed_total 42"));
        assert!(body.contains("# TYPE svarog_uptime_seconds gauge"));
    }

    #[test]
    fn snapshot_serializes_state_and_counters() {
        let source = idle_source();
        source.counters().increment_and_get("accept.succeeded");

        let snap = counters_snapshot(&source);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"state\":\"new\""));
        assert!(json.contains("\"accept.succeeded\":1"));
    }

    #[test]
    fn home_page_shows_state() {
        let source = idle_source();
        let html = render_home(&source);
        assert!(html.contains("state: <b>new</b>"));
    }
}
