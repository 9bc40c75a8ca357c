use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{get_optional_str, get_required_str, parse_doc, required_principal, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_class_code, ClassDoc, SectionDoc};
use crate::store::{self, Collection, FieldOp};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn membership_entry(class_code: &str, section: &str) -> serde_json::Value {
    json!({ "class_code": class_code, "section": section })
}

/// Appends the (class, section) pair to the caller's membership list.
/// Append, not union: repeated joins repeat the entry.
fn record_membership(
    conn: &Connection,
    user_id: &str,
    class_code: &str,
    section: &str,
) -> Result<(), HandlerErr> {
    let found = store::update(
        conn,
        Collection::Users,
        user_id,
        &[FieldOp::array_append(
            &["classes"],
            membership_entry(class_code, section),
        )],
    )
    .map_err(HandlerErr::db_update)?;
    if !found {
        return Err(HandlerErr::not_found("user not found"));
    }
    Ok(())
}

/// Teacher "add class": creates the class or section when missing, then
/// takes over the section and records the membership. The class write and
/// the user write share one transaction.
fn classes_attach(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let principal = required_principal(req)?;
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section = get_required_str(&req.params, "section")?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;

    let outcome = match store::get(&tx, Collection::Classes, &class_code)
        .map_err(HandlerErr::db_query)?
    {
        None => {
            let subject_name =
                get_optional_str(&req.params, "subjectName").unwrap_or_else(|| class_code.clone());
            let mut sections = BTreeMap::new();
            sections.insert(
                section.clone(),
                SectionDoc {
                    teacher: Some(principal.id.clone()),
                    ..SectionDoc::default()
                },
            );
            let class = ClassDoc {
                class_code: class_code.clone(),
                subject_name,
                sections,
            };
            let doc = serde_json::to_value(&class)
                .map_err(|e| HandlerErr::db_update(format!("serialize class: {}", e)))?;
            store::insert(&tx, Collection::Classes, &class_code, &doc)
                .map_err(HandlerErr::db_update)?;
            "created"
        }
        Some(doc) => {
            let class: ClassDoc = parse_doc(doc, "class")?;
            let outcome = if class.sections.contains_key(&section) {
                "attached"
            } else {
                "sectionAdded"
            };
            // Takeover is unconditional: last assigned teacher wins.
            store::update(
                &tx,
                Collection::Classes,
                &class_code,
                &[FieldOp::set(
                    &["sections", section.as_str(), "teacher"],
                    json!(principal.id),
                )],
            )
            .map_err(HandlerErr::db_update)?;
            outcome
        }
    };

    record_membership(&tx, &principal.id, &class_code, &section)?;
    tx.commit().map_err(HandlerErr::db_commit)?;

    Ok(json!({
        "outcome": outcome,
        "classCode": class_code,
        "section": section,
    }))
}

/// Student join: the section roster takes the id with set-union semantics,
/// the student's membership list takes a plain append. A missing section on
/// an existing class is created lazily; a missing class is an error.
fn sections_join(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let principal = required_principal(req)?;
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section = get_required_str(&req.params, "section")?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;

    let Some(doc) =
        store::get(&tx, Collection::Classes, &class_code).map_err(HandlerErr::db_query)?
    else {
        return Err(HandlerErr::not_found("class not found"));
    };
    let class: ClassDoc = parse_doc(doc, "class")?;
    let section_created = !class.sections.contains_key(&section);

    store::update(
        &tx,
        Collection::Classes,
        &class_code,
        &[FieldOp::array_union(
            &["sections", section.as_str(), "students"],
            json!(principal.id),
        )],
    )
    .map_err(HandlerErr::db_update)?;

    record_membership(&tx, &principal.id, &class_code, &section)?;
    tx.commit().map_err(HandlerErr::db_commit)?;

    Ok(json!({
        "classCode": class_code,
        "section": section,
        "sectionCreated": section_created,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.attach" => Some(with_conn(state, req, classes_attach)),
        "sections.join" => Some(with_conn(state, req, sections_join)),
        _ => None,
    }
}
