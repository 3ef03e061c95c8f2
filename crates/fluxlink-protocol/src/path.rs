use std::fmt::Write as _;

use crate::Value;

/// One segment of a call path or event path: a method/property name, or a
/// numeric index (arrays, tuple-indexed children).
#[derive(Clone, Debug, PartialEq, Eq, Hash, facet::Facet)]
pub enum PathSegment {
    Str(String),
    Num(i64),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Str(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        PathSegment::Str(s)
    }
}

impl From<i64> for PathSegment {
    fn from(n: i64) -> Self {
        PathSegment::Num(n)
    }
}

/// The built-in channel events that a bare (empty-prefix) subscription name
/// can collide with; see §4.6.
pub const BUILTIN_EVENT_NAMES: [&str; 4] = ["ready", "error", "close", "state"];

/// A path of segments used to address a call/notify target or an event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, facet::Facet)]
pub struct EventPath(pub Vec<PathSegment>);

impl EventPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The canonical dispatch key used by the Channel endpoint's listener
    /// table (§4.6):
    ///
    /// - A non-empty path is JSON-encoded in full.
    /// - A single segment equal to one of the built-in names (`ready`,
    ///   `error`, `close`, `state`) is keyed by that literal name *only*
    ///   when it was subscribed under the empty prefix — callers
    ///   represent that by constructing the path with exactly one segment
    ///   and checking `is_builtin_name` before calling this, or by going
    ///   through `Channel::on` which makes that distinction explicit.
    /// - Any other single segment is wrapped in a one-element list and
    ///   JSON-encoded, so a user event named `"state"` (subscribed via the
    ///   explicit path `["state"]`) never collides with the built-in
    ///   state update.
    pub fn canonical_key(&self) -> String {
        encode_json_list(&self.0)
    }

    /// True if this path is a single segment matching one of the built-in
    /// event names. Used by `Channel` to decide whether a bare,
    /// empty-prefix subscription should key on the literal name instead of
    /// the JSON-encoded single-element list.
    pub fn is_builtin_name(&self) -> Option<&str> {
        if let [PathSegment::Str(name)] = self.0.as_slice() {
            if BUILTIN_EVENT_NAMES.contains(&name.as_str()) {
                return Some(name.as_str());
            }
        }
        None
    }
}

fn encode_json_list(segments: &[PathSegment]) -> String {
    let mut out = String::from("[");
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match seg {
            PathSegment::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            // String coercion: numeric segments encode as their string form,
            // so `["a", 1]` and `["a", "1"]` share a canonical key.
            PathSegment::Num(n) => {
                out.push('"');
                let _ = write!(out, "{n}");
                out.push('"');
            }
        }
    }
    out.push(']');
    out
}

/// Converts call/notify/create arguments into the wire `Value` list.
pub fn args_to_value(args: Vec<Value>) -> Value {
    Value::List(args)
}
