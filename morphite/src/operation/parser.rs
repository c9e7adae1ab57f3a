use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::operation::{DeleteQuery, OperationSpec, UpdateQuery};
use crate::store::Document;
use log::warn;
use serde_json::Value;

/// Structural keys change collection lifecycle; they cannot be combined with
/// data keys in one change-unit file.
const STRUCTURAL_KEYS: [&str; 3] = ["drop", "rename", "create"];
const DATA_KEYS: [&str; 3] = ["insert", "update", "delete"];

/// Update operators the engine recognizes at the top level of an update
/// document. A document containing any of these is passed to the store
/// unchanged; anything else is treated as a bare field map.
const UPDATE_OPERATORS: [&str; 3] = ["$set", "$inc", "$push"];

/// Decodes a change-unit's JSON body into its typed operations.
///
/// Discrimination is by top-level keys, in fixed precedence order
/// `drop` > `rename` > `create` > collection-operation bundle. A bundle
/// (`collectionName` plus any of `insert`/`update`/`delete`) yields its
/// operations in fixed order insert, update, delete, all against the same
/// collection.
///
/// # Errors
/// `ParseError` when the body is not a JSON object, contains none of the
/// recognized keys, or mixes a structural key with a data key. Within an
/// `update`/`delete` block, a missing or non-array `queries` field is also
/// fatal; an individual query entry lacking its required sub-fields is
/// skipped with a warning instead.
pub fn parse_change_unit(body: &Value) -> MorphiteResult<Vec<OperationSpec>> {
    let body = body.as_object().ok_or_else(|| {
        MorphiteError::new("change unit body must be a JSON object", ErrorKind::ParseError)
    })?;

    let has_structural = STRUCTURAL_KEYS.iter().any(|key| body.contains_key(*key));
    let has_data = DATA_KEYS.iter().any(|key| body.contains_key(*key));
    if has_structural && has_data {
        return Err(MorphiteError::new(
            "change unit mixes structural keys (drop/rename/create) with collection operations",
            ErrorKind::ParseError,
        ));
    }

    if let Some(drop) = body.get("drop") {
        return parse_drop(drop);
    }
    if let Some(rename) = body.get("rename") {
        return parse_rename(rename);
    }
    if let Some(create) = body.get("create") {
        return parse_create(create);
    }
    if has_data {
        return parse_bundle(body);
    }

    Err(MorphiteError::new(
        "change unit contains no recognized operation keys",
        ErrorKind::ParseError,
    ))
}

fn parse_drop(drop: &Value) -> MorphiteResult<Vec<OperationSpec>> {
    let names = string_array(drop, "drop")?;
    Ok(names
        .into_iter()
        .map(|collection| OperationSpec::Drop { collection })
        .collect())
}

fn parse_rename(rename: &Value) -> MorphiteResult<Vec<OperationSpec>> {
    let entries = rename.as_array().ok_or_else(|| {
        MorphiteError::new("'rename' must be an array of objects", ErrorKind::ParseError)
    })?;
    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let old_collection = required_string(entry, "oldCollection", "rename")?;
        let new_collection = required_string(entry, "newCollection", "rename")?;
        specs.push(OperationSpec::Rename {
            old_collection,
            new_collection,
        });
    }
    Ok(specs)
}

fn parse_create(create: &Value) -> MorphiteResult<Vec<OperationSpec>> {
    let collections = string_array(create, "create")?;
    Ok(vec![OperationSpec::Create { collections }])
}

fn parse_bundle(body: &Document) -> MorphiteResult<Vec<OperationSpec>> {
    let collection = match body.get("collectionName").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            return Err(MorphiteError::new(
                "collection operations require a 'collectionName' string",
                ErrorKind::ParseError,
            ))
        }
    };

    let mut specs = Vec::new();
    if let Some(insert) = body.get("insert") {
        specs.push(parse_insert(&collection, insert)?);
    }
    if let Some(update) = body.get("update") {
        specs.push(parse_update(&collection, update)?);
    }
    if let Some(delete) = body.get("delete") {
        specs.push(parse_delete(&collection, delete)?);
    }
    Ok(specs)
}

fn parse_insert(collection: &str, insert: &Value) -> MorphiteResult<OperationSpec> {
    let entries = insert.as_array().ok_or_else(|| {
        MorphiteError::new("'insert' must be an array of documents", ErrorKind::ParseError)
    })?;
    let mut documents = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_object() {
            Some(document) => documents.push(document.clone()),
            None => {
                return Err(MorphiteError::new(
                    "'insert' entries must be JSON objects",
                    ErrorKind::ParseError,
                ))
            }
        }
    }
    Ok(OperationSpec::Insert {
        collection: collection.to_string(),
        documents,
    })
}

fn parse_update(collection: &str, update: &Value) -> MorphiteResult<OperationSpec> {
    let entries = queries_of(update, "update")?;
    let mut queries = Vec::with_capacity(entries.len());
    for entry in entries {
        let filter = entry.get("query").and_then(Value::as_object);
        let update_doc = entry.get("update").and_then(Value::as_object);
        match (filter, update_doc) {
            (Some(filter), Some(update_doc)) => queries.push(UpdateQuery {
                filter: filter.clone(),
                update: normalize_update(update_doc.clone()),
            }),
            _ => {
                // Partial application within a file is permitted; the faulty
                // entry is dropped, the rest still run.
                warn!(
                    "skipping malformed update query for collection '{}': {}",
                    collection, entry
                );
            }
        }
    }
    Ok(OperationSpec::Update {
        collection: collection.to_string(),
        queries,
    })
}

fn parse_delete(collection: &str, delete: &Value) -> MorphiteResult<OperationSpec> {
    let entries = queries_of(delete, "delete")?;
    let mut queries = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.get("query").and_then(Value::as_object) {
            Some(filter) => queries.push(DeleteQuery {
                filter: filter.clone(),
            }),
            None => {
                warn!(
                    "skipping malformed delete query for collection '{}': {}",
                    collection, entry
                );
            }
        }
    }
    Ok(OperationSpec::Delete {
        collection: collection.to_string(),
        queries,
    })
}

/// Normalizes an authored update document for the store.
///
/// Authors commonly write bare field maps (`{"x": 1}`) expecting
/// field-replacement semantics, but the store draws the operator/field-map
/// line explicitly. A document whose top-level keys include a recognized
/// operator passes through unchanged; anything else is wrapped as the
/// operand of `$set`.
pub(crate) fn normalize_update(update: Document) -> Document {
    let has_operator = update
        .keys()
        .any(|key| UPDATE_OPERATORS.contains(&key.as_str()));
    if has_operator {
        return update;
    }
    let mut wrapped = Document::new();
    wrapped.insert("$set".to_string(), Value::Object(update));
    wrapped
}

fn queries_of<'a>(block: &'a Value, key: &str) -> MorphiteResult<&'a Vec<Value>> {
    block
        .get("queries")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            MorphiteError::new(
                &format!("'{}' requires a 'queries' array", key),
                ErrorKind::ParseError,
            )
        })
}

fn string_array(value: &Value, key: &str) -> MorphiteResult<Vec<String>> {
    let entries = value.as_array().ok_or_else(|| {
        MorphiteError::new(
            &format!("'{}' must be an array of collection names", key),
            ErrorKind::ParseError,
        )
    })?;
    entries
        .iter()
        .map(|entry| {
            entry.as_str().map(str::to_string).ok_or_else(|| {
                MorphiteError::new(
                    &format!("'{}' entries must be strings", key),
                    ErrorKind::ParseError,
                )
            })
        })
        .collect()
}

fn required_string(entry: &Value, field: &str, context: &str) -> MorphiteResult<String> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            MorphiteError::new(
                &format!("'{}' entries require a '{}' string", context, field),
                ErrorKind::ParseError,
            )
        })
}
