//! Prometheus text exposition format.
//!
//! Renders the recorder's families for scraping by a Prometheus server or
//! compatible agent.

use std::fmt::Write;

use crate::registry::PrometheusRecorder;

/// Render every family, including ones with no series yet.
pub fn render_prometheus(recorder: &PrometheusRecorder) -> String {
    let mut out = String::new();

    for family in recorder.snapshot() {
        let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());
        for (values, value) in &family.series {
            let labels: Vec<String> = family
                .label_names
                .iter()
                .zip(values)
                .map(|(name, v)| format!("{name}=\"{}\"", escape_label_value(v)))
                .collect();
            let _ = writeln!(out, "{}{{{}}} {}", family.name, labels.join(","), value);
        }
    }

    out
}

/// Escape backslash, double quote and newline.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MetricsRecorder;

    #[test]
    fn render_empty() {
        let output = render_prometheus(&PrometheusRecorder::new());
        // Type declarations are present even without series.
        assert!(output.contains("# HELP workflow_queue_length "));
        assert!(output.contains("# TYPE workflow_queue_length gauge"));
        assert!(output.contains("# TYPE workflow_queue_queries counter"));
    }

    #[test]
    fn render_series() {
        let r = PrometheusRecorder::new();
        r.record_queue_length("build", true, false, 12);
        r.record_query("build", true, false);
        let output = render_prometheus(&r);

        assert!(output.contains(
            "workflow_queue_length{name=\"build\",cache_hit=\"true\",failed=\"false\"} 12"
        ));
        assert!(output.contains(
            "workflow_queue_queries{name=\"build\",cache_hit=\"true\",failed=\"false\"} 1"
        ));
    }

    #[test]
    fn escapes_label_values() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label_value("x\ny"), "x\\ny");
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let r = PrometheusRecorder::new();
        r.record_credits("f00d", "ghp***abc", 10);
        let output = render_prometheus(&r);

        // Every non-comment line should match: metric_name{labels} value
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains("} "),
                "line should have labels: {line}"
            );
        }
    }
}
