use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::store::Document;
use serde_json::Value;

/// Checks whether a stored document matches a filter document.
///
/// Matching is per-field equality: every key of the filter must resolve to an
/// equal value in the document. Keys may be dotted paths into nested objects
/// (`"address.city"`). An empty filter matches every document.
pub(crate) fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(path, expected)| lookup_path(document, path) == Some(expected))
}

/// Applies a normalized update document to a stored document in place.
///
/// The update document must consist of operator keys; the parser wraps bare
/// field maps in `$set` before they reach a backend. Supported operators are
/// `$set`, `$inc` and `$push`.
///
/// # Returns
/// `true` if the document was modified.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> MorphiteResult<bool> {
    let mut modified = false;
    for (operator, operand) in update {
        let fields = match operand {
            Value::Object(fields) => fields,
            _ => {
                return Err(MorphiteError::new(
                    &format!("operand of '{}' must be an object", operator),
                    ErrorKind::OperationError,
                ))
            }
        };
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                    modified = true;
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    increment_path(document, path, delta)?;
                    modified = true;
                }
            }
            "$push" => {
                for (path, value) in fields {
                    push_path(document, path, value.clone())?;
                    modified = true;
                }
            }
            other => {
                return Err(MorphiteError::new(
                    &format!("unsupported update operator '{}'", other),
                    ErrorKind::OperationError,
                ))
            }
        }
    }
    Ok(modified)
}

/// Resolves a dotted path inside a document.
fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Sets a dotted path inside a document, creating intermediate objects.
///
/// A non-object value found on the way is replaced by an object; the last
/// writer wins, as it does for a plain key overwrite.
fn set_path(document: &mut Document, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };

    let mut current = document;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        if !entry.is_object() {
            *entry = Value::Object(Document::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

fn increment_path(document: &mut Document, path: &str, delta: &Value) -> MorphiteResult<()> {
    let current = lookup_path(document, path).cloned();
    let updated = match (current, delta) {
        (None, delta) => delta.clone(),
        (Some(Value::Number(current)), Value::Number(delta)) => {
            match (current.as_i64(), delta.as_i64()) {
                (Some(a), Some(b)) => Value::from(a + b),
                _ => {
                    let a = current.as_f64().unwrap_or(0.0);
                    let b = delta.as_f64().unwrap_or(0.0);
                    Value::from(a + b)
                }
            }
        }
        _ => {
            return Err(MorphiteError::new(
                &format!("'$inc' requires numeric values at '{}'", path),
                ErrorKind::OperationError,
            ))
        }
    };
    set_path(document, path, updated);
    Ok(())
}

fn push_path(document: &mut Document, path: &str, value: Value) -> MorphiteResult<()> {
    let mut array = match lookup_path(document, path).cloned() {
        None => Vec::new(),
        Some(Value::Array(existing)) => existing,
        Some(_) => {
            return Err(MorphiteError::new(
                &format!("'$push' requires an array at '{}'", path),
                ErrorKind::OperationError,
            ))
        }
    };
    array.push(value);
    set_path(document, path, Value::Array(array));
    Ok(())
}
