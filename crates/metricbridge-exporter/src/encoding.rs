//! Prometheus text exposition (format version 0.0.4).

use crate::types::{MetricFamily, MetricValue};

pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn render_text(families: &[MetricFamily]) -> String {
    let mut output = String::new();

    for family in families {
        output.push_str("# HELP ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(&escape_help(&family.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(family.metric_type.as_prometheus_type());
        output.push('\n');

        for sample in &family.samples {
            match &sample.value {
                MetricValue::Counter(value) | MetricValue::Gauge(value) => {
                    output.push_str(&render_sample_line(&family.name, &sample.labels, *value));
                }
                MetricValue::Histogram {
                    buckets,
                    count,
                    sum,
                } => {
                    let bucket_name = format!("{}_bucket", family.name);
                    for (bound, cumulative) in buckets {
                        let mut labels = sample.labels.clone();
                        labels.push(("le".to_string(), format_bucket_bound(*bound)));
                        output.push_str(&render_sample_line(
                            &bucket_name,
                            &labels,
                            *cumulative as f64,
                        ));
                    }
                    let mut labels = sample.labels.clone();
                    labels.push(("le".to_string(), "+Inf".to_string()));
                    output.push_str(&render_sample_line(&bucket_name, &labels, *count as f64));

                    output.push_str(&render_sample_line(
                        &format!("{}_sum", family.name),
                        &sample.labels,
                        *sum,
                    ));
                    output.push_str(&render_sample_line(
                        &format!("{}_count", family.name),
                        &sample.labels,
                        *count as f64,
                    ));
                }
            }
        }
    }

    output
}

fn render_sample_line(name: &str, labels: &[(String, String)], value: f64) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_metric_value(value));
    rendered.push('\n');
    rendered
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_bucket_bound(value: f64) -> String {
    if value.is_infinite() {
        "+Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::render_text;
    use crate::types::{MetricFamily, MetricSample, MetricType, MetricValue};

    #[test]
    fn renders_gauge_family() {
        let families = vec![MetricFamily {
            name: "test_subsys_counter".to_string(),
            help: "counter".to_string(),
            metric_type: MetricType::Gauge,
            samples: vec![MetricSample {
                labels: vec![],
                value: MetricValue::Gauge(15.0),
            }],
        }];

        assert_eq!(
            render_text(&families),
            "# HELP test_subsys_counter counter\n\
             # TYPE test_subsys_counter gauge\n\
             test_subsys_counter 15\n"
        );
    }

    #[test]
    fn renders_histogram_with_inf_bucket() {
        let families = vec![MetricFamily {
            name: "latency_timer".to_string(),
            help: "latency".to_string(),
            metric_type: MetricType::Histogram,
            samples: vec![MetricSample {
                labels: vec![("for_topic".to_string(), "orders".to_string())],
                value: MetricValue::Histogram {
                    buckets: vec![(0.5, 40), (0.99, 95)],
                    count: 100,
                    sum: 120.5,
                },
            }],
        }];

        let output = render_text(&families);
        assert!(output.contains("# TYPE latency_timer histogram\n"));
        assert!(output.contains("latency_timer_bucket{for_topic=\"orders\",le=\"0.5\"} 40\n"));
        assert!(output.contains("latency_timer_bucket{for_topic=\"orders\",le=\"0.99\"} 95\n"));
        assert!(output.contains("latency_timer_bucket{for_topic=\"orders\",le=\"+Inf\"} 100\n"));
        assert!(output.contains("latency_timer_sum{for_topic=\"orders\"} 120.5\n"));
        assert!(output.contains("latency_timer_count{for_topic=\"orders\"} 100\n"));
    }

    #[test]
    fn escapes_label_values() {
        let families = vec![MetricFamily {
            name: "m".to_string(),
            help: "help".to_string(),
            metric_type: MetricType::Gauge,
            samples: vec![MetricSample {
                labels: vec![("path".to_string(), "a\"b\\c".to_string())],
                value: MetricValue::Gauge(0.25),
            }],
        }];

        assert!(render_text(&families).contains("m{path=\"a\\\"b\\\\c\"} 0.25\n"));
    }
}
