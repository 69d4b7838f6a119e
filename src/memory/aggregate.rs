//! Aggregation pipeline evaluation for the in-memory driver.

use bson::{Bson, Document};

use super::query::{matches, project, sort_documents};
use super::value::{add_numbers, as_f64, compare, get_path, is_truthy, values_equal};
use crate::error::{FacadeError, FacadeResult, messages};

/// Run `pipeline` over `docs`.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> FacadeResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(FacadeError::server_code(
                    40323,
                    messages::PIPELINE_STAGE_SHAPE,
                ));
            }
        };

        docs = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => {
                let spec = stage_document(name, spec)?;
                docs.iter()
                    .map(|doc| project_stage(doc, spec))
                    .collect::<FacadeResult<_>>()?
            }
            "$group" => group(&docs, stage_document(name, spec)?)?,
            "$sort" => {
                sort_documents(&mut docs, stage_document(name, spec)?)?;
                docs
            }
            "$skip" => {
                let n = stage_count(name, spec, 15956)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = stage_count(name, spec, 15958)?;
                if n == 0 {
                    return Err(FacadeError::server_code(15958, "the limit must be positive"));
                }
                docs.into_iter().take(n).collect()
            }
            "$count" => {
                let field = spec.as_str().filter(|f| !f.is_empty()).ok_or_else(|| {
                    FacadeError::server_code(40156, "the count field must be a non-empty string")
                })?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field, count_bson(docs.len()));
                    vec![out]
                }
            }
            other => {
                return Err(FacadeError::server_code(
                    40324,
                    format!("Unrecognized pipeline stage name: '{}'", other),
                ));
            }
        };
    }
    Ok(docs)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> FacadeResult<&'a Document> {
    spec.as_document().ok_or_else(|| {
        FacadeError::server_code(
            15959,
            format!("the {} specification must be an object", name),
        )
    })
}

fn stage_count(name: &str, spec: &Bson, code: i32) -> FacadeResult<usize> {
    as_f64(spec)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| {
            FacadeError::server_code(code, format!("invalid argument to {} stage", name))
        })
}

fn count_bson(n: usize) -> Bson {
    i32::try_from(n)
        .map(Bson::Int32)
        .unwrap_or(Bson::Int64(n as i64))
}

/// Evaluate an expression: `"$path"` is a field reference, documents are
/// evaluated field by field, anything else is a literal.
fn evaluate(doc: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(s) if s.starts_with('$') => get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null),
        Bson::Document(fields) => {
            let mut out = Document::new();
            for (key, value) in fields {
                out.insert(key.clone(), evaluate(doc, value));
            }
            Bson::Document(out)
        }
        other => other.clone(),
    }
}

fn project_stage(doc: &Document, spec: &Document) -> FacadeResult<Document> {
    let computed = spec
        .iter()
        .any(|(_, v)| matches!(v, Bson::String(_) | Bson::Document(_)));
    if !computed {
        return project(doc, spec);
    }

    let mut out = Document::new();
    if spec.get("_id").map(is_truthy).unwrap_or(true) {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (field, value) in spec {
        match value {
            Bson::String(_) | Bson::Document(_) => {
                out.insert(field.clone(), evaluate(doc, value));
            }
            _ if field == "_id" => {}
            flag if is_truthy(flag) => {
                if let Some(v) = get_path(doc, field) {
                    out.insert(field.clone(), v.clone());
                }
            }
            _ => {
                return Err(FacadeError::server_code(
                    31254,
                    format!("Cannot do exclusion on field {} in inclusion projection", field),
                ));
            }
        }
    }
    Ok(out)
}

enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    Count,
}

impl Accumulator {
    fn parse(field: &str, spec: &Bson) -> FacadeResult<(Self, Bson)> {
        let spec = spec.as_document().filter(|d| d.len() == 1).ok_or_else(|| {
            FacadeError::server_code(
                40234,
                format!("The field '{}' must be an accumulator object", field),
            )
        })?;
        let (op, arg) = spec
            .iter()
            .next()
            .ok_or_else(|| FacadeError::server_code(40234, "empty accumulator"))?;

        let acc = match op.as_str() {
            "$sum" => Self::Sum,
            "$avg" => Self::Avg,
            "$min" => Self::Min,
            "$max" => Self::Max,
            "$first" => Self::First,
            "$last" => Self::Last,
            "$push" => Self::Push,
            "$addToSet" => Self::AddToSet,
            "$count" => Self::Count,
            other => {
                return Err(FacadeError::server_code(
                    15952,
                    format!("unknown group operator '{}'", other),
                ));
            }
        };
        Ok((acc, arg.clone()))
    }

    fn fold(&self, docs: &[&Document], arg: &Bson) -> Bson {
        let values = || docs.iter().map(|doc| evaluate(doc, arg));
        match self {
            Self::Sum => values()
                .filter(|v| as_f64(v).is_some())
                .fold(Bson::Int32(0), |acc, v| add_numbers(&acc, &v).unwrap_or(acc)),
            Self::Avg => {
                let nums: Vec<f64> = values().filter_map(|v| as_f64(&v)).collect();
                if nums.is_empty() {
                    Bson::Null
                } else {
                    Bson::Double(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            Self::Min => values()
                .filter(|v| !matches!(v, Bson::Null))
                .min_by(compare)
                .unwrap_or(Bson::Null),
            Self::Max => values()
                .filter(|v| !matches!(v, Bson::Null))
                .max_by(compare)
                .unwrap_or(Bson::Null),
            Self::First => values().next().unwrap_or(Bson::Null),
            Self::Last => values().last().unwrap_or(Bson::Null),
            Self::Push => Bson::Array(values().collect()),
            Self::AddToSet => {
                let mut set: Vec<Bson> = Vec::new();
                for v in values() {
                    if !set.iter().any(|s| values_equal(s, &v)) {
                        set.push(v);
                    }
                }
                Bson::Array(set)
            }
            Self::Count => count_bson(docs.len()),
        }
    }
}

fn group(docs: &[Document], spec: &Document) -> FacadeResult<Vec<Document>> {
    let id_expr = spec.get("_id").ok_or_else(|| {
        FacadeError::server_code(15955, "a group specification must include an _id")
    })?;

    let mut accumulators = Vec::new();
    for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (acc, arg) = Accumulator::parse(field, acc)?;
        accumulators.push((field.clone(), acc, arg));
    }

    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for doc in docs {
        let key = evaluate(doc, id_expr);
        match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (field, acc, arg) in &accumulators {
                out.insert(field.clone(), acc.fold(&members, arg));
            }
            out
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> Vec<Document> {
        vec![
            doc! { "type": "doc1", "n": 1 },
            doc! { "type": "doc2", "n": 2 },
            doc! { "type": "doc1", "n": 3 },
            doc! { "type": "doc4", "n": 4 },
        ]
    }

    #[test]
    fn test_group_count_all() {
        let out = run_pipeline(
            sample(),
            &[
                doc! { "$match": {} },
                doc! { "$group": { "_id": Bson::Null, "count": { "$sum": 1 } } },
            ],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "_id": Bson::Null, "count": 4 }]);
    }

    #[test]
    fn test_group_by_field() {
        let out = run_pipeline(
            sample(),
            &[
                doc! { "$group": {
                    "_id": "$type",
                    "total": { "$sum": "$n" },
                    "avg": { "$avg": "$n" },
                    "max": { "$max": "$n" },
                    "all": { "$push": "$n" },
                } },
                doc! { "$sort": { "_id": 1 } },
            ],
        )
        .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0],
            doc! { "_id": "doc1", "total": 4, "avg": 2.0, "max": 3, "all": [1, 3] }
        );
    }

    #[test]
    fn test_skip_limit_count() {
        let out = run_pipeline(
            sample(),
            &[doc! { "$skip": 1 }, doc! { "$limit": 2 }, doc! { "$count": "n" }],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "n": 2 }]);
    }

    #[test]
    fn test_project_with_reference() {
        let out = run_pipeline(
            vec![doc! { "_id": 1, "type": "doc", "n": 5 }],
            &[doc! { "$project": { "_id": 0, "kind": "$type", "n": 1 } }],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "kind": "doc", "n": 5 }]);
    }

    #[test]
    fn test_unrecognized_stage() {
        let err = run_pipeline(sample(), &[doc! { "$bogus": {} }]).unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized pipeline stage name: '$bogus'");
    }

    #[test]
    fn test_group_requires_id() {
        let err = run_pipeline(sample(), &[doc! { "$group": { "c": { "$sum": 1 } } }]).unwrap_err();
        assert_eq!(err.code(), Some(15955));
    }
}
