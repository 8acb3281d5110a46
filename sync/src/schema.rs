/// Declarative schemas for payloads received from peers.
///
/// Network responses are untrusted JSON. Each expected shape is described once as
/// a static [`Schema`] and checked by [`validate`], which reports every violation
/// with the path of the offending field instead of failing on the first one.
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::config::{MAX_BLOCKS_PER_REQUEST, MAX_TRANSACTIONS_PER_RESPONSE};

/// String formats understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Non-empty, even-length hexadecimal, optionally `0x` prefixed.
    Hex,
}

impl Format {
    fn name(&self) -> &'static str {
        match self {
            Format::Hex => "hex",
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Format::Hex => {
                let digits = value.strip_prefix("0x").unwrap_or(value);
                !digits.is_empty()
                    && digits.len() % 2 == 0
                    && digits.bytes().all(|b| b.is_ascii_hexdigit())
            }
        }
    }
}

#[derive(Debug)]
pub enum SchemaKind {
    Object {
        required: &'static [&'static str],
        properties: &'static [(&'static str, Schema)],
    },
    Array {
        items: &'static Schema,
        unique_items: bool,
        max_items: Option<usize>,
    },
    String {
        format: Option<Format>,
    },
}

#[derive(Debug)]
pub struct Schema {
    pub id: &'static str,
    pub kind: SchemaKind,
}

pub static HEX_STRING: Schema = Schema {
    id: "HexString",
    kind: SchemaKind::String {
        format: Some(Format::Hex),
    },
};

/// Id of the highest block shared with a peer.
pub static COMMON_BLOCK: Schema = Schema {
    id: "CommonBlock",
    kind: SchemaKind::String {
        format: Some(Format::Hex),
    },
};

/// Hex-encoded blocks returned by `getBlocksFromId`.
pub static BLOCKS_LIST: Schema = Schema {
    id: "WSBlocksList",
    kind: SchemaKind::Array {
        items: &HEX_STRING,
        unique_items: false,
        max_items: Some(MAX_BLOCKS_PER_REQUEST),
    },
};

/// Response of `getTransactions`.
pub static TRANSACTIONS_RESPONSE: Schema = Schema {
    id: "WSTransactionsResponse",
    kind: SchemaKind::Object {
        required: &["transactions"],
        properties: &[(
            "transactions",
            Schema {
                id: "WSTransactionsList",
                kind: SchemaKind::Array {
                    items: &HEX_STRING,
                    unique_items: true,
                    max_items: Some(MAX_TRANSACTIONS_PER_RESPONSE),
                },
            },
        )],
    },
};

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, empty for the document root. Array items use `[i]`.
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Non-empty list of violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(path, message)])
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if some violation concerns `path`.
    pub fn mentions(&self, path: &str) -> bool {
        self.0.iter().any(|error| error.path == path)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check `value` against `schema`, collecting every violation.
pub fn validate(schema: &Schema, value: &Value) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    check(schema, value, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn check(schema: &Schema, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    match &schema.kind {
        SchemaKind::Object {
            required,
            properties,
        } => {
            let Some(object) = value.as_object() else {
                errors.push(FieldError::new(path, "should be object"));
                return;
            };
            for name in required.iter() {
                if !object.contains_key(*name) {
                    errors.push(FieldError::new(
                        join(path, name),
                        format!("missing required property '{name}'"),
                    ));
                }
            }
            for (name, property) in properties.iter() {
                if let Some(field) = object.get(*name) {
                    check(property, field, &join(path, name), errors);
                }
            }
        }
        SchemaKind::Array {
            items,
            unique_items,
            max_items,
        } => {
            let Some(array) = value.as_array() else {
                errors.push(FieldError::new(path, "should be array"));
                return;
            };
            if let Some(max) = max_items {
                if array.len() > *max {
                    errors.push(FieldError::new(
                        path,
                        format!("should not have more than {max} items"),
                    ));
                }
            }
            if *unique_items {
                let mut seen: HashMap<String, usize> = HashMap::with_capacity(array.len());
                for (index, item) in array.iter().enumerate() {
                    if let Some(first) = seen.insert(item.to_string(), index) {
                        errors.push(FieldError::new(
                            path,
                            format!(
                                "should not have duplicate items (items {first} and {index} are identical)"
                            ),
                        ));
                        break;
                    }
                }
            }
            for (index, item) in array.iter().enumerate() {
                check(items, item, &format!("{path}[{index}]"), errors);
            }
        }
        SchemaKind::String { format } => {
            let Some(text) = value.as_str() else {
                errors.push(FieldError::new(path, "should be string"));
                return;
            };
            if let Some(format) = format {
                if !format.matches(text) {
                    errors.push(FieldError::new(
                        path,
                        format!("should match format \"{}\"", format.name()),
                    ));
                }
            }
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
