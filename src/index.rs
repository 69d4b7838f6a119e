//! Index key resolution and default index names.

use bson::{Bson, Document};

use crate::error::{FacadeError, FacadeResult, messages};

/// The `field_or_spec` argument of `create_index`.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSpec {
    /// A single ascending field.
    Field(String),
    /// A key document of field → direction (`1`, `-1`, `"text"`, ...).
    Keys(Document),
}

impl From<&str> for IndexSpec {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl From<String> for IndexSpec {
    fn from(field: String) -> Self {
        Self::Field(field)
    }
}

impl From<Document> for IndexSpec {
    fn from(keys: Document) -> Self {
        Self::Keys(keys)
    }
}

impl IndexSpec {
    /// Resolve to a non-empty key document.
    pub fn to_keys(&self) -> FacadeResult<Document> {
        let keys = match self {
            Self::Field(field) if field.is_empty() => Document::new(),
            Self::Field(field) => {
                let mut keys = Document::new();
                keys.insert(field.clone(), 1_i32);
                keys
            }
            Self::Keys(keys) => keys.clone(),
        };

        if keys.is_empty() {
            return Err(FacadeError::argument(messages::INDEX_KEYS_EMPTY));
        }
        Ok(keys)
    }
}

/// Generate the default name for an index over `keys`.
///
/// `{ title: -1 }` becomes `title_-1`; `{ a: 1, b: "text" }` becomes `a_1_b_text`.
pub fn index_name(keys: &Document) -> FacadeResult<String> {
    if keys.is_empty() {
        return Err(FacadeError::argument(messages::INDEX_KEYS_EMPTY));
    }

    let mut parts = Vec::with_capacity(keys.len() * 2);
    for (field, direction) in keys {
        parts.push(field.clone());
        parts.push(direction_label(field, direction)?);
    }
    Ok(parts.join("_"))
}

fn direction_label(field: &str, direction: &Bson) -> FacadeResult<String> {
    match direction {
        Bson::Int32(n) => Ok(n.to_string()),
        Bson::Int64(n) => Ok(n.to_string()),
        Bson::Double(f) if f.fract() == 0.0 => Ok((*f as i64).to_string()),
        Bson::Double(f) => Ok(f.to_string()),
        Bson::String(s) => Ok(s.clone()),
        other => Err(FacadeError::argument(format!(
            "bad index key pattern for '{}': values must be numbers or strings, found {}",
            field, other
        ))),
    }
}
