//! Structural shape validators used as tool input/output contracts.
//!
//! Contracts describe the shape of a `serde_json::Value` and are independent
//! of any particular (de)serialization of the tool's own types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected shape of a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Contract {
    /// Accepts anything, including `null`.
    Any,
    String,
    /// Any JSON number.
    Number,
    /// A number without a fractional part.
    Integer,
    Boolean,
    Array { items: Box<Contract> },
    Object {
        fields: Vec<FieldContract>,
        /// Reject fields not listed in `fields`.
        #[serde(default)]
        strict: bool,
    },
}

/// One named field of an object contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldContract {
    pub name: String,
    pub shape: Contract,
    pub required: bool,
}

/// First mismatch found while validating a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: expected {expected}, found {found}")]
pub struct ContractViolation {
    /// JSON path of the offending value, rooted at `$`.
    pub path: String,
    pub expected: String,
    pub found: String,
}

/// Builder for [`Contract::Object`].
#[derive(Debug, Clone, Default)]
pub struct ObjectContract {
    fields: Vec<FieldContract>,
    strict: bool,
}

impl ObjectContract {
    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, shape: impl Into<Contract>) -> Self {
        self.fields.push(FieldContract {
            name: name.into(),
            shape: shape.into(),
            required: true,
        });
        self
    }

    /// Add an optional field. When present it must still match `shape`.
    pub fn optional(mut self, name: impl Into<String>, shape: impl Into<Contract>) -> Self {
        self.fields.push(FieldContract {
            name: name.into(),
            shape: shape.into(),
            required: false,
        });
        self
    }

    /// Reject unknown fields.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl From<ObjectContract> for Contract {
    fn from(obj: ObjectContract) -> Self {
        Contract::Object {
            fields: obj.fields,
            strict: obj.strict,
        }
    }
}

impl Contract {
    /// Start an object contract.
    pub fn object() -> ObjectContract {
        ObjectContract::default()
    }

    /// An array whose every element matches `items`.
    pub fn array(items: impl Into<Contract>) -> Self {
        Contract::Array {
            items: Box::new(items.into()),
        }
    }

    /// Check `value` against this contract.
    pub fn validate(&self, value: &Value) -> Result<(), ContractViolation> {
        self.check(value, "$")
    }

    /// Short human-readable name of the expected shape.
    pub fn describe(&self) -> String {
        match self {
            Contract::Any => "any".into(),
            Contract::String => "string".into(),
            Contract::Number => "number".into(),
            Contract::Integer => "integer".into(),
            Contract::Boolean => "boolean".into(),
            Contract::Array { items } => format!("array<{}>", items.describe()),
            Contract::Object { .. } => "object".into(),
        }
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), ContractViolation> {
        let matches = match self {
            Contract::Any => true,
            Contract::String => value.is_string(),
            Contract::Number => value.is_number(),
            Contract::Integer => value.is_i64() || value.is_u64(),
            Contract::Boolean => value.is_boolean(),
            Contract::Array { items } => {
                let Some(elements) = value.as_array() else {
                    return Err(self.violation(path, value));
                };
                for (i, element) in elements.iter().enumerate() {
                    items.check(element, &format!("{path}[{i}]"))?;
                }
                true
            }
            Contract::Object { fields, strict } => {
                let Some(map) = value.as_object() else {
                    return Err(self.violation(path, value));
                };
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match map.get(&field.name) {
                        Some(v) => field.shape.check(v, &field_path)?,
                        None if field.required => {
                            return Err(ContractViolation {
                                path: field_path,
                                expected: field.shape.describe(),
                                found: "nothing".into(),
                            });
                        }
                        None => {}
                    }
                }
                if *strict {
                    if let Some(extra) = map
                        .keys()
                        .find(|k| !fields.iter().any(|f| &f.name == *k))
                    {
                        return Err(ContractViolation {
                            path: format!("{path}.{extra}"),
                            expected: "no such field".into(),
                            found: kind_of(&map[extra]).into(),
                        });
                    }
                }
                true
            }
        };

        if matches {
            Ok(())
        } else {
            Err(self.violation(path, value))
        }
    }

    fn violation(&self, path: &str, value: &Value) -> ContractViolation {
        ContractViolation {
            path: path.to_string(),
            expected: self.describe(),
            found: kind_of(value).into(),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
