use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{get_required_str, parse_doc, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_class_code, ClassDoc, SectionDoc, UserDoc};
use crate::store::{self, Collection, FieldOp};
use crate::tally;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn fetch_class(conn: &Connection, code: &str) -> Result<Option<ClassDoc>, HandlerErr> {
    let Some(doc) = store::get(conn, Collection::Classes, code).map_err(HandlerErr::db_query)?
    else {
        return Ok(None);
    };
    Ok(Some(parse_doc(doc, "class")?))
}

fn classes_create(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let subject_name = get_required_str(&req.params, "subjectName")?;
    let section_names: Vec<String> = match req.params.get("sections") {
        None => Vec::new(),
        Some(v) => {
            let Some(items) = v.as_array() else {
                return Err(HandlerErr::bad_params("sections must be an array of names"));
            };
            let mut names = Vec::new();
            for item in items {
                match item.as_str().map(str::trim) {
                    Some(name) if !name.is_empty() => names.push(name.to_string()),
                    _ => {
                        return Err(HandlerErr::bad_params(
                            "section names must be non-empty strings",
                        ))
                    }
                }
            }
            names
        }
    };

    if fetch_class(conn, &class_code)?.is_some() {
        return Err(HandlerErr::conflict("class code already exists"));
    }

    let mut sections = BTreeMap::new();
    for name in section_names {
        sections.insert(name, SectionDoc::default());
    }
    let class = ClassDoc {
        class_code: class_code.clone(),
        subject_name: subject_name.clone(),
        sections,
    };
    let doc = serde_json::to_value(&class)
        .map_err(|e| HandlerErr::db_update(format!("serialize class: {}", e)))?;
    store::insert(conn, Collection::Classes, &class_code, &doc).map_err(HandlerErr::db_update)?;

    Ok(json!({
        "classCode": class_code,
        "subjectName": subject_name,
        "sectionCount": class.sections.len(),
    }))
}

fn classes_list(conn: &Connection, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let docs = store::scan(conn, Collection::Classes).map_err(HandlerErr::db_query)?;
    let mut classes = Vec::with_capacity(docs.len());
    for (code, doc) in docs {
        let class: ClassDoc = parse_doc(doc, "class")?;
        let counts = tally::count_class(&class);
        classes.push(json!({
            "classCode": code,
            "subjectName": class.subject_name,
            "sectionCount": class.sections.len(),
            "studentCount": counts.student_count,
            "teacherCount": counts.teacher_count,
        }));
    }
    Ok(json!({ "classes": classes }))
}

fn sections_list(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    // A missing class reads as an empty section list, not an error.
    let sections: Vec<String> = match fetch_class(conn, &class_code)? {
        Some(class) => class.sections.keys().cloned().collect(),
        None => Vec::new(),
    };
    Ok(json!({ "classCode": class_code, "sections": sections }))
}

fn sections_ensure(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section = get_required_str(&req.params, "section")?;

    let Some(class) = fetch_class(conn, &class_code)? else {
        return Err(HandlerErr::not_found("class not found"));
    };
    if class.sections.contains_key(&section) {
        return Ok(json!({ "classCode": class_code, "section": section, "created": false }));
    }

    let empty = serde_json::to_value(SectionDoc::default())
        .map_err(|e| HandlerErr::db_update(format!("serialize section: {}", e)))?;
    store::update(
        conn,
        Collection::Classes,
        &class_code,
        &[FieldOp::set(&["sections", section.as_str()], empty)],
    )
    .map_err(HandlerErr::db_update)?;

    Ok(json!({ "classCode": class_code, "section": section, "created": true }))
}

fn sections_assign_teacher(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section = get_required_str(&req.params, "section")?;
    let teacher_id = get_required_str(&req.params, "teacherId")?;

    // Last writer wins; referencing a missing section creates it lazily.
    let found = store::update(
        conn,
        Collection::Classes,
        &class_code,
        &[FieldOp::set(
            &["sections", section.as_str(), "teacher"],
            json!(teacher_id),
        )],
    )
    .map_err(HandlerErr::db_update)?;
    if !found {
        return Err(HandlerErr::not_found("class not found"));
    }

    Ok(json!({ "classCode": class_code, "section": section, "teacherId": teacher_id }))
}

fn sections_roster(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section_name = get_required_str(&req.params, "section")?;

    let Some(class) = fetch_class(conn, &class_code)? else {
        return Err(HandlerErr::not_found("class not found"));
    };
    let Some(section) = class.sections.get(&section_name) else {
        return Err(HandlerErr::not_found("section not found"));
    };

    // Ids that no longer resolve to a user are dropped from the roster.
    let mut students = Vec::new();
    for student_id in &section.students {
        let Some(doc) =
            store::get(conn, Collection::Users, student_id).map_err(HandlerErr::db_query)?
        else {
            continue;
        };
        let user: UserDoc = parse_doc(doc, "user")?;
        students.push(json!({
            "userId": student_id,
            "name": user.name,
            "studentId": user.student_id,
        }));
    }

    Ok(json!({
        "classCode": class_code,
        "section": section_name,
        "teacher": section.teacher,
        "students": students,
    }))
}

/// Removes the class document. Membership entries pointing at it become
/// dangling; every read path skips them.
fn classes_delete(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let removed = store::remove(conn, Collection::Classes, &class_code)
        .map_err(HandlerErr::db_update)?;
    if !removed {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(json!({ "classCode": class_code, "deleted": true }))
}

fn classes_counts(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    // Zero-valued counts for a missing class, never an error.
    let counts = match fetch_class(conn, &class_code)? {
        Some(class) => tally::count_class(&class),
        None => tally::ClassCounts::default(),
    };
    Ok(json!({
        "classCode": class_code,
        "studentCount": counts.student_count,
        "teacherCount": counts.teacher_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(with_conn(state, req, classes_create)),
        "classes.delete" => Some(with_conn(state, req, classes_delete)),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        "classes.counts" => Some(with_conn(state, req, classes_counts)),
        "sections.list" => Some(with_conn(state, req, sections_list)),
        "sections.ensure" => Some(with_conn(state, req, sections_ensure)),
        "sections.assignTeacher" => Some(with_conn(state, req, sections_assign_teacher)),
        "sections.roster" => Some(with_conn(state, req, sections_roster)),
        _ => None,
    }
}
