use metricbridge_common::Labels;

/// Name fragments that carry an identifier, and the label the identifier
/// moves into. Applied in order.
const STRUCTURED_MARKERS: [(&str, &str); 2] = [
    ("-for-broker-", "for_broker"),
    ("-for-topic-", "for_topic"),
];

/// Replaces space, `.`, `-`, `=` and `/` with `_`.
pub fn flatten(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            ' ' | '.' | '-' | '=' | '/' => '_',
            other => other,
        })
        .collect()
}

/// Cache key for a published series. Built from flattened parts so that
/// names differing only in separator characters share one series.
pub fn identity_key(namespace: &str, subsystem: &str, name: &str) -> String {
    format!(
        "{}_{}_{}",
        flatten(namespace),
        flatten(subsystem),
        flatten(name)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredName {
    pub name: String,
    pub labels: Labels,
}

impl StructuredName {
    pub fn literal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: Labels::new(),
        }
    }
}

/// Moves identifiers embedded in a metric name into labels:
/// `bytes-for-broker-3` becomes `bytes-for-broker` with `for_broker="3"`.
/// A marker with nothing before or after it is left in the name as is.
pub fn extract_structured(name: &str) -> StructuredName {
    let mut structured = StructuredName::literal(name);

    for (marker, label) in STRUCTURED_MARKERS {
        let Some((base, suffix)) = structured.name.split_once(marker) else {
            continue;
        };
        if base.is_empty() || suffix.is_empty() {
            continue;
        }

        structured
            .labels
            .insert(label.to_string(), suffix.to_string());
        let renamed = format!("{base}{}", marker.trim_end_matches('-'));
        structured.name = renamed;
    }

    structured
}

#[cfg(test)]
mod tests {
    use super::{extract_structured, flatten, identity_key};

    #[test]
    fn flatten_replaces_separators() {
        assert_eq!(flatten("a.b-c d=e/f"), "a_b_c_d_e_f");
    }

    #[test]
    fn flatten_is_idempotent() {
        for name in ["counter", "request_latency", "a.b-c d=e/f", ""] {
            let once = flatten(name);
            assert_eq!(flatten(&once), once);
        }
        assert_eq!(flatten("already_clean"), "already_clean");
    }

    #[test]
    fn identity_key_uses_flattened_parts() {
        assert_eq!(identity_key("test", "subsys", "counter"), "test_subsys_counter");
        assert_eq!(
            identity_key("my-app", "http.server", "req.count"),
            identity_key("my_app", "http_server", "req-count")
        );
    }

    #[test]
    fn broker_suffix_becomes_label() {
        let structured = extract_structured("request-latency-in-ms-for-broker-3");
        assert_eq!(structured.name, "request-latency-in-ms-for-broker");
        assert_eq!(structured.labels.get("for_broker").map(String::as_str), Some("3"));
    }

    #[test]
    fn topic_suffix_becomes_label() {
        let structured = extract_structured("record-send-rate-for-topic-orders.v1");
        assert_eq!(structured.name, "record-send-rate-for-topic");
        assert_eq!(
            structured.labels.get("for_topic").map(String::as_str),
            Some("orders.v1")
        );
    }

    #[test]
    fn plain_names_have_no_labels() {
        let structured = extract_structured("incoming-byte-rate");
        assert_eq!(structured.name, "incoming-byte-rate");
        assert!(structured.labels.is_empty());
    }

    #[test]
    fn malformed_names_stay_literal() {
        for name in ["bytes-for-broker-", "-for-broker-1", "bytes-for-broker", "-for-topic-"] {
            let structured = extract_structured(name);
            assert_eq!(structured.name, name);
            assert!(structured.labels.is_empty(), "{name} produced labels");
        }
    }
}
