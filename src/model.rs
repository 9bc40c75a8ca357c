use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATUS_PRESENT: &str = "present";
pub const STATUS_ABSENT: &str = "absent";
pub const STATUS_EXCUSED: &str = "excused";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

/// One entry in a user's membership list. Append-only: repeated joins of the
/// same pair produce repeated entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRef {
    pub class_code: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub classes: Vec<MembershipRef>,
}

/// Status is stored as the raw string the caller sent. Values outside the
/// three known statuses are kept but never counted by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default)]
    pub attendance: BTreeMap<String, Vec<AttendanceRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDoc {
    pub class_code: String,
    pub subject_name: String,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionDoc>,
}

/// Class codes are case-normalized before any lookup or write.
pub fn normalize_class_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
