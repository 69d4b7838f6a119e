//! Update operators for the in-memory driver.

use bson::{Bson, Document};

use super::value::{add_numbers, get_path, remove_path, set_path, values_equal};
use crate::args::is_operator_update;
use crate::error::{FacadeError, FacadeResult, messages};

const FAILED_TO_PARSE: i32 = 9;
const TYPE_MISMATCH: i32 = 14;
const IMMUTABLE_FIELD: i32 = 66;

/// Apply `update` to `doc` in place.
///
/// `inserting` enables `$setOnInsert`. Returns whether the document changed.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> FacadeResult<bool> {
    if !is_operator_update(update) {
        return Err(FacadeError::server_code(
            FAILED_TO_PARSE,
            messages::UPDATE_NO_ATOMIC,
        ));
    }

    let before = doc.clone();
    for (op, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            FacadeError::server_code(
                FAILED_TO_PARSE,
                format!("Modifiers operate on fields but we found a non-document for {}", op),
            )
        })?;

        match op.as_str() {
            "$set" => set_fields(doc, fields)?,
            "$setOnInsert" if inserting => set_fields(doc, fields)?,
            "$setOnInsert" => {}
            "$unset" => {
                for path in fields.keys() {
                    guard_id(path)?;
                    remove_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    guard_id(path)?;
                    increment(doc, path, delta)?;
                }
            }
            "$push" => {
                for (path, value) in fields {
                    guard_id(path)?;
                    push(doc, path, value)?;
                }
            }
            other => {
                return Err(FacadeError::server_code(
                    FAILED_TO_PARSE,
                    format!("Unknown modifier: {}", other),
                ));
            }
        }
    }

    if let (Some(old), Some(new)) = (before.get("_id"), doc.get("_id")) {
        if !values_equal(old, new) {
            return Err(immutable_id());
        }
    }

    Ok(*doc != before)
}

fn immutable_id() -> FacadeError {
    FacadeError::server_code(
        IMMUTABLE_FIELD,
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

fn guard_id(path: &str) -> FacadeResult<()> {
    if path == "_id" || path.starts_with("_id.") {
        return Err(immutable_id());
    }
    Ok(())
}

fn set_fields(doc: &mut Document, fields: &Document) -> FacadeResult<()> {
    for (path, value) in fields {
        if !set_path(doc, path, value.clone()) {
            return Err(FacadeError::server_code(
                28,
                format!("Cannot create field in element for path '{}'", path),
            ));
        }
    }
    Ok(())
}

fn increment(doc: &mut Document, path: &str, delta: &Bson) -> FacadeResult<()> {
    let non_numeric = |what: &str| {
        FacadeError::server_code(
            TYPE_MISMATCH,
            format!("Cannot apply $inc {} for field '{}'", what, path),
        )
    };

    if super::value::as_f64(delta).is_none() {
        return Err(non_numeric("with a non-numeric argument"));
    }

    let next = match get_path(doc, path) {
        None => delta.clone(),
        Some(current) => {
            add_numbers(current, delta).ok_or_else(|| non_numeric("to a non-numeric value"))?
        }
    };
    set_path(doc, path, next);
    Ok(())
}

fn push(doc: &mut Document, path: &str, value: &Bson) -> FacadeResult<()> {
    let additions = match value {
        Bson::Document(spec) if spec.contains_key("$each") => spec
            .get_array("$each")
            .map_err(|_| {
                FacadeError::server_code(
                    FAILED_TO_PARSE,
                    "The argument to $each in $push must be an array",
                )
            })?
            .clone(),
        other => vec![other.clone()],
    };

    let mut items = match get_path(doc, path) {
        None => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(_) => {
            return Err(FacadeError::server_code(
                2,
                format!("The field '{}' must be an array", path),
            ));
        }
    };
    items.extend(additions);
    set_path(doc, path, Bson::Array(items));
    Ok(())
}
