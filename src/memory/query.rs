//! Query matching, projection and sorting for the in-memory driver.

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::value::{compare, get_path, is_truthy, remove_path, set_path, type_rank, values_equal};
use crate::error::{FacadeError, FacadeResult};

const BAD_VALUE: i32 = 2;

/// Check whether `doc` satisfies `filter`.
pub fn matches(doc: &Document, filter: &Document) -> FacadeResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition, key)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(condition, key)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" { any } else { !any }
            }
            op if op.starts_with('$') => {
                return Err(FacadeError::server_code(
                    BAD_VALUE,
                    format!("unknown top level operator: {}", op),
                ));
            }
            field => field_matches(get_path(doc, field), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(condition: &'a Bson, op: &str) -> FacadeResult<Vec<&'a Document>> {
    let bad = || FacadeError::server_code(BAD_VALUE, format!("{} must be a nonempty array", op));
    let items = condition.as_array().filter(|a| !a.is_empty()).ok_or_else(bad)?;

    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                FacadeError::server_code(
                    BAD_VALUE,
                    "$or/$and/$nor entries need to be full objects",
                )
            })
        })
        .collect()
}

/// An operator expression is a document whose first key starts with `$`.
fn is_operator_expression(condition: &Document) -> bool {
    condition
        .keys()
        .next()
        .map(|k| k.starts_with('$'))
        .unwrap_or(false)
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> FacadeResult<bool> {
    match condition {
        Bson::Document(ops) if is_operator_expression(ops) => {
            for (op, arg) in ops {
                if !apply_operator(value, op, arg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        target => Ok(equals_or_contains(value, target)),
    }
}

fn equals_or_contains(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(v) if values_equal(v, target) => true,
        Some(Bson::Array(items)) => items.iter().any(|item| values_equal(item, target)),
        Some(_) => false,
    }
}

fn ordered(value: Option<&Bson>, target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let check = |v: &Bson| type_rank(v) == type_rank(target) && accept(compare(v, target));
    match value {
        None => false,
        Some(v) if check(v) => true,
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(_) => false,
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> FacadeResult<bool> {
    let matched = match op {
        "$eq" => equals_or_contains(value, arg),
        "$ne" => !equals_or_contains(value, arg),
        "$gt" => ordered(value, arg, Ordering::is_gt),
        "$gte" => ordered(value, arg, Ordering::is_ge),
        "$lt" => ordered(value, arg, Ordering::is_lt),
        "$lte" => ordered(value, arg, Ordering::is_le),
        "$in" | "$nin" => {
            let candidates = arg.as_array().ok_or_else(|| {
                FacadeError::server_code(BAD_VALUE, format!("{} needs an array", op))
            })?;
            let found = candidates.iter().any(|c| equals_or_contains(value, c));
            if op == "$in" { found } else { !found }
        }
        "$exists" => value.is_some() == is_truthy(arg),
        "$not" => !field_matches(value, arg)?,
        other => {
            return Err(FacadeError::server_code(
                BAD_VALUE,
                format!("unknown operator: {}", other),
            ));
        }
    };
    Ok(matched)
}

/// Equality fields of a filter, used to seed an upserted document.
pub fn equality_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }
        let value = match condition {
            Bson::Document(ops) if is_operator_expression(ops) => match ops.get("$eq") {
                Some(v) => v.clone(),
                None => continue,
            },
            other => other.clone(),
        };
        set_path(&mut seed, key, value);
    }
    seed
}

/// Apply an inclusion or exclusion projection.
pub fn project(doc: &Document, projection: &Document) -> FacadeResult<Document> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }

    let include_id = projection.get("_id").map(is_truthy).unwrap_or(true);
    let fields: Vec<(&String, bool)> = projection
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(k, v)| (k, is_truthy(v)))
        .collect();

    let inclusion = fields.iter().any(|(_, included)| *included);
    if let Some((field, _)) = fields.iter().find(|(_, included)| *included != inclusion) {
        return Err(FacadeError::server_code(
            31254,
            format!("Cannot do exclusion on field {} in inclusion projection", field),
        ));
    }

    if inclusion {
        let mut out = Document::new();
        if include_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (field, _) in fields {
            if let Some(value) = get_path(doc, field) {
                set_path(&mut out, field, value.clone());
            }
        }
        Ok(out)
    } else {
        let mut out = doc.clone();
        for (field, _) in fields {
            remove_path(&mut out, field);
        }
        if !include_id {
            out.remove("_id");
        }
        Ok(out)
    }
}

/// Validate a sort specification, returning `(path, descending)` pairs.
pub fn sort_keys(sort: &Document) -> FacadeResult<Vec<(String, bool)>> {
    sort.iter()
        .map(|(field, direction)| match direction {
            Bson::Int32(1) | Bson::Int64(1) => Ok((field.clone(), false)),
            Bson::Int32(-1) | Bson::Int64(-1) => Ok((field.clone(), true)),
            Bson::Double(d) if *d == 1.0 => Ok((field.clone(), false)),
            Bson::Double(d) if *d == -1.0 => Ok((field.clone(), true)),
            _ => Err(FacadeError::server_code(
                15975,
                "$sort key ordering must be 1 (for ascending) or -1 (for descending)",
            )),
        })
        .collect()
}

/// Compare two documents under validated sort keys.
pub fn compare_by(a: &Document, b: &Document, keys: &[(String, bool)]) -> Ordering {
    for (path, descending) in keys {
        let left = get_path(a, path).unwrap_or(&Bson::Null);
        let right = get_path(b, path).unwrap_or(&Bson::Null);
        let ord = compare(left, right);
        let ord = if *descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort of documents by a sort specification.
pub fn sort_documents(docs: &mut [Document], sort: &Document) -> FacadeResult<()> {
    let keys = sort_keys(sort)?;
    docs.sort_by(|a, b| compare_by(a, b, &keys));
    Ok(())
}
