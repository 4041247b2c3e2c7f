use std::env;
use std::sync::OnceLock;

static BRIDGE_EAGER: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// When `TENSOR_BRIDGE_EAGER` is set, written payloads materialize
/// immediately instead of waiting for first use as an op input.
pub(crate) fn eager_enabled() -> bool {
    *BRIDGE_EAGER.get_or_init(|| match env::var("TENSOR_BRIDGE_EAGER") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
