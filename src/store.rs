//! Document-store primitives over the workspace SQLite file.
//!
//! Each collection is a table `(id TEXT PRIMARY KEY, doc TEXT NOT NULL)`
//! holding one JSON document per row. Handlers express mutations as field
//! operations; the store applies them read-modify-write, so array-union and
//! nested-path writes behave like the document database they stand in for.

use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Classes,
}

impl Collection {
    pub fn table(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Classes => "classes",
        }
    }
}

/// A field-level mutation addressed by a path of object keys. Intermediate
/// objects are created as needed; a non-object value on the path is replaced.
#[derive(Debug, Clone)]
pub enum FieldOp {
    Set { path: Vec<String>, value: Value },
    ArrayUnion { path: Vec<String>, value: Value },
    ArrayAppend { path: Vec<String>, value: Value },
}

impl FieldOp {
    pub fn set(path: &[&str], value: Value) -> Self {
        FieldOp::Set {
            path: owned_path(path),
            value,
        }
    }

    pub fn array_union(path: &[&str], value: Value) -> Self {
        FieldOp::ArrayUnion {
            path: owned_path(path),
            value,
        }
    }

    pub fn array_append(path: &[&str], value: Value) -> Self {
        FieldOp::ArrayAppend {
            path: owned_path(path),
            value,
        }
    }
}

fn owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

pub fn get(conn: &Connection, collection: Collection, key: &str) -> anyhow::Result<Option<Value>> {
    let sql = format!("SELECT doc FROM {} WHERE id = ?", collection.table());
    let raw: Option<String> = conn
        .query_row(&sql, [key], |r| r.get(0))
        .optional()
        .with_context(|| format!("lookup in {}", collection.table()))?;
    match raw {
        Some(text) => {
            let doc = serde_json::from_str(&text)
                .with_context(|| format!("stored document {} is invalid JSON", key))?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

/// Single-result equality query on a top-level field. First match by key
/// order wins, mirroring a `where(field, ==, value).limit(1)` stream.
pub fn find_by_field(
    conn: &Connection,
    collection: Collection,
    field: &str,
    value: &str,
) -> anyhow::Result<Option<(String, Value)>> {
    let sql = format!(
        "SELECT id, doc FROM {} WHERE json_extract(doc, ?) = ? ORDER BY id LIMIT 1",
        collection.table()
    );
    let row: Option<(String, String)> = conn
        .query_row(&sql, (format!("$.{}", field), value), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()
        .with_context(|| format!("field query on {}", collection.table()))?;
    match row {
        Some((id, text)) => {
            let doc = serde_json::from_str(&text)
                .with_context(|| format!("stored document {} is invalid JSON", id))?;
            Ok(Some((id, doc)))
        }
        None => Ok(None),
    }
}

pub fn insert(
    conn: &Connection,
    collection: Collection,
    key: &str,
    doc: &Value,
) -> anyhow::Result<()> {
    let sql = format!("INSERT INTO {}(id, doc) VALUES(?, ?)", collection.table());
    let text = serde_json::to_string(doc)?;
    conn.execute(&sql, (key, text))
        .with_context(|| format!("insert into {}", collection.table()))?;
    Ok(())
}

/// Applies the ops to the stored document and writes it back. Returns false
/// without writing when the document does not exist.
pub fn update(
    conn: &Connection,
    collection: Collection,
    key: &str,
    ops: &[FieldOp],
) -> anyhow::Result<bool> {
    let Some(mut doc) = get(conn, collection, key)? else {
        return Ok(false);
    };
    apply_ops(&mut doc, ops);
    let sql = format!("UPDATE {} SET doc = ? WHERE id = ?", collection.table());
    let text = serde_json::to_string(&doc)?;
    let changed = conn
        .execute(&sql, (text, key))
        .with_context(|| format!("update in {}", collection.table()))?;
    if changed != 1 {
        return Err(anyhow!(
            "update of {}/{} touched {} rows",
            collection.table(),
            key,
            changed
        ));
    }
    Ok(true)
}

/// Returns false when there was nothing to remove.
pub fn remove(conn: &Connection, collection: Collection, key: &str) -> anyhow::Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
    let changed = conn
        .execute(&sql, [key])
        .with_context(|| format!("delete from {}", collection.table()))?;
    Ok(changed > 0)
}

pub fn scan(conn: &Connection, collection: Collection) -> anyhow::Result<Vec<(String, Value)>> {
    let sql = format!("SELECT id, doc FROM {} ORDER BY id", collection.table());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("scan of {}", collection.table()))?;
    let mut out = Vec::with_capacity(rows.len());
    for (id, text) in rows {
        let doc = serde_json::from_str(&text)
            .with_context(|| format!("stored document {} is invalid JSON", id))?;
        out.push((id, doc));
    }
    Ok(out)
}

pub fn apply_ops(doc: &mut Value, ops: &[FieldOp]) {
    for op in ops {
        match op {
            FieldOp::Set { path, value } => {
                *slot_mut(doc, path) = value.clone();
            }
            FieldOp::ArrayUnion { path, value } => {
                let slot = slot_mut(doc, path);
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    if !items.iter().any(|v| v == value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldOp::ArrayAppend { path, value } => {
                let slot = slot_mut(doc, path);
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    items.push(value.clone());
                }
            }
        }
    }
}

fn slot_mut<'a>(mut cur: &'a mut Value, path: &[String]) -> &'a mut Value {
    for seg in path {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        match cur {
            Value::Object(map) => {
                cur = map.entry(seg.as_str()).or_insert(Value::Null);
            }
            _ => unreachable!(),
        }
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({ "class_code": "CSE402" });
        apply_ops(
            &mut doc,
            &[FieldOp::set(&["sections", "CS-4101", "teacher"], json!("t1"))],
        );
        assert_eq!(doc["sections"]["CS-4101"]["teacher"], json!("t1"));
    }

    #[test]
    fn array_union_skips_existing_value() {
        let mut doc = json!({ "sections": { "A": { "students": ["s1"] } } });
        let op = FieldOp::array_union(&["sections", "A", "students"], json!("s1"));
        apply_ops(&mut doc, std::slice::from_ref(&op));
        apply_ops(&mut doc, std::slice::from_ref(&op));
        assert_eq!(doc["sections"]["A"]["students"], json!(["s1"]));
    }

    #[test]
    fn array_union_materializes_missing_array() {
        let mut doc = json!({ "sections": {} });
        apply_ops(
            &mut doc,
            &[FieldOp::array_union(&["sections", "B", "students"], json!("s2"))],
        );
        assert_eq!(doc["sections"]["B"]["students"], json!(["s2"]));
    }

    #[test]
    fn array_append_keeps_duplicates() {
        let mut doc = json!({ "classes": [] });
        let entry = json!({ "class_code": "CSE402", "section": "A" });
        let op = FieldOp::array_append(&["classes"], entry.clone());
        apply_ops(&mut doc, std::slice::from_ref(&op));
        apply_ops(&mut doc, std::slice::from_ref(&op));
        assert_eq!(doc["classes"], json!([entry, entry]));
    }

    #[test]
    fn set_replaces_whole_subtree() {
        let mut doc = json!({
            "sections": { "A": { "attendance": { "2024-01-01": [{ "student_id": "s1", "status": "present" }] } } }
        });
        apply_ops(
            &mut doc,
            &[FieldOp::set(
                &["sections", "A", "attendance", "2024-01-01"],
                json!([{ "student_id": "s2", "status": "absent" }]),
            )],
        );
        assert_eq!(
            doc["sections"]["A"]["attendance"]["2024-01-01"],
            json!([{ "student_id": "s2", "status": "absent" }])
        );
    }
}
