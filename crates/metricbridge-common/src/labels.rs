use std::collections::BTreeMap;

/// Label name → value. Ordered so label names always come out sorted.
pub type Labels = BTreeMap<String, String>;

/// Canonical `{a="x",b="y"}` rendering, empty string for an empty set.
pub fn render_label_set(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let pairs = labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{pairs}}}")
}
