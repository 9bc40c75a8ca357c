use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{get_optional_str, get_required_str, parse_doc, required_principal, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_class_code, AttendanceRecord, ClassDoc, Role, UserDoc};
use crate::store::{self, Collection, FieldOp};
use crate::tally;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

/// Date param, `YYYY-MM-DD`, defaulting to today.
fn resolve_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match get_optional_str(params, "date") {
        Some(raw) => {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
            Ok(raw)
        }
        None => Ok(chrono::Local::now().date_naive().to_string()),
    }
}

fn parse_records(params: &serde_json::Value) -> Result<Vec<AttendanceRecord>, HandlerErr> {
    let Some(items) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let student_id = item
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params("record missing studentId"))?;
        // Any status string is accepted and stored; aggregation only counts
        // the three known ones.
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params("record missing status"))?;
        records.push(AttendanceRecord {
            student_id: student_id.to_string(),
            status: status.to_string(),
        });
    }
    Ok(records)
}

fn fetch_class(conn: &Connection, code: &str) -> Result<Option<ClassDoc>, HandlerErr> {
    let Some(doc) = store::get(conn, Collection::Classes, code).map_err(HandlerErr::db_query)?
    else {
        return Ok(None);
    };
    Ok(Some(parse_doc(doc, "class")?))
}

/// Replaces the record list stored at the date key. Never a merge: saving
/// twice for one date discards the earlier roster wholesale.
fn attendance_save(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section = get_required_str(&req.params, "section")?;
    let date = resolve_date(&req.params)?;
    let records = parse_records(&req.params)?;

    let Some(class) = fetch_class(conn, &class_code)? else {
        return Err(HandlerErr::not_found("class not found"));
    };
    if !class.sections.contains_key(&section) {
        return Err(HandlerErr::not_found("section not found"));
    }

    let list = serde_json::to_value(&records)
        .map_err(|e| HandlerErr::db_update(format!("serialize records: {}", e)))?;
    store::update(
        conn,
        Collection::Classes,
        &class_code,
        &[FieldOp::set(
            &["sections", section.as_str(), "attendance", date.as_str()],
            list,
        )],
    )
    .map_err(HandlerErr::db_update)?;

    Ok(json!({
        "classCode": class_code,
        "section": section,
        "date": date,
        "recordCount": records.len(),
    }))
}

/// Roster plus whatever is stored at the date key, so the caller can prefill
/// a sheet before saving it back.
fn attendance_sheet_open(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_code = normalize_class_code(&get_required_str(&req.params, "classCode")?);
    let section_name = get_required_str(&req.params, "section")?;
    let date = resolve_date(&req.params)?;

    let Some(class) = fetch_class(conn, &class_code)? else {
        return Err(HandlerErr::not_found("class not found"));
    };
    let Some(section) = class.sections.get(&section_name) else {
        return Err(HandlerErr::not_found("section not found"));
    };

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

    let records: Vec<serde_json::Value> = section
        .attendance
        .get(&date)
        .map(|list| {
            list.iter()
                .map(|r| json!({ "studentId": r.student_id, "status": r.status }))
                .collect()
        })
        .unwrap_or_default();

    Ok(json!({
        "classCode": class_code,
        "section": section_name,
        "date": date,
        "students": students,
        "records": records,
    }))
}

/// Present/absent/excused totals per membership entry, in membership order.
/// Students may only query themselves; staff name any student.
fn attendance_summary(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let principal = required_principal(req)?;
    let requested = get_optional_str(&req.params, "studentId");
    let target = match principal.role {
        Role::Student => match requested {
            Some(id) if id != principal.id => {
                return Err(HandlerErr::unauthorized(
                    "students may only view their own attendance",
                ))
            }
            _ => principal.id.clone(),
        },
        _ => requested.ok_or_else(|| HandlerErr::bad_params("missing studentId"))?,
    };

    let Some(doc) = store::get(conn, Collection::Users, &target).map_err(HandlerErr::db_query)?
    else {
        return Err(HandlerErr::not_found("student not found"));
    };
    let user: UserDoc = parse_doc(doc, "user")?;

    let rows = tally::summarize_memberships(&user.classes, &target, |code| fetch_class(conn, code))?;

    let mut totals = tally::AttendanceTotals::default();
    let row_values: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            totals.add(tally::AttendanceTotals {
                present: row.present,
                absent: row.absent,
                excused: row.excused,
            });
            json!({
                "classCode": row.class_code,
                "subjectName": row.subject_name,
                "section": row.section,
                "present": row.present,
                "absent": row.absent,
                "excused": row.excused,
            })
        })
        .collect();

    Ok(json!({
        "studentId": target,
        "rows": row_values,
        "totals": {
            "present": totals.present,
            "absent": totals.absent,
            "excused": totals.excused,
        },
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.save" => Some(with_conn(state, req, attendance_save)),
        "attendance.sheetOpen" => Some(with_conn(state, req, attendance_sheet_open)),
        "attendance.summary" => Some(with_conn(state, req, attendance_summary)),
        _ => None,
    }
}
