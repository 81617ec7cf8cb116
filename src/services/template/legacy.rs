//! Fallback resolver for expressions the parser rejects.
//!
//! Performs dotted-path navigation over the same context roots, without
//! functions, blocks, or operators. Never fails: anything unresolvable
//! renders as the empty string.

use serde_json::Value;

use super::functions::navigate_segment;

pub(crate) fn resolve_path(expr: &str, roots: &Value) -> Value {
    let mut current = roots.clone();
    for segment in expr.split('.').map(str::trim) {
        if segment.is_empty() {
            return Value::Null;
        }
        current = navigate_segment(&current, segment);
        if current.is_null() {
            return Value::Null;
        }
    }
    current
}
