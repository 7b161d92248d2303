//! Cache keys for cacheable resources.
//!
//! A [`ResourceKey`] is the pair of a resource kind and its call arguments.
//! Arguments are stored in canonical JSON form (object fields sorted, no
//! whitespace) so equivalent argument objects always produce the same key,
//! whatever field order the caller used and whatever map ordering
//! `serde_json` was compiled with.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::error::{SyncError, SyncResult};

/// Canonical form of "no arguments".
const EMPTY_ARGS: &str = "{}";

/// Identity of one cacheable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    kind: String,
    args: String,
}

impl ResourceKey {
    /// Build a key from a kind and serializable arguments.
    ///
    /// `()` and `None` arguments are treated as the empty record, so
    /// `("shoppingList", ())` and `("shoppingList", {})` are the same key.
    pub fn new<A: Serialize + ?Sized>(kind: &str, args: &A) -> SyncResult<Self> {
        let value = serde_json::to_value(args).map_err(|e| SyncError::encode(kind, e))?;
        Ok(Self::from_value(kind, &value))
    }

    /// Build a key for a resource that takes no arguments.
    pub fn unit(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            args: EMPTY_ARGS.to_string(),
        }
    }

    pub fn from_value(kind: &str, args: &Value) -> Self {
        let args = match args {
            Value::Null => EMPTY_ARGS.to_string(),
            other => canonical_json(other),
        };
        Self {
            kind: kind.to_string(),
            args,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Canonical JSON of the arguments.
    pub fn args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.args)
    }
}

/// Serialize a JSON value with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (name, field)) in fields.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
