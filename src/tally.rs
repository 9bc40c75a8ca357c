use crate::model::{
    ClassDoc, MembershipRef, STATUS_ABSENT, STATUS_EXCUSED, STATUS_PRESENT,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTotals {
    pub present: u32,
    pub absent: u32,
    pub excused: u32,
}

impl AttendanceTotals {
    pub fn add(&mut self, other: AttendanceTotals) {
        self.present += other.present;
        self.absent += other.absent;
        self.excused += other.excused;
    }
}

/// One summary row per membership entry, in membership-list order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub class_code: String,
    pub subject_name: String,
    pub section: String,
    pub present: u32,
    pub absent: u32,
    pub excused: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub student_count: u32,
    pub teacher_count: u32,
}

/// Scans every date's record list in one section for the student and tallies
/// the three known statuses. Anything else is left uncounted.
pub fn tally_section(class: &ClassDoc, section: &str, student_id: &str) -> Option<AttendanceTotals> {
    let section = class.sections.get(section)?;
    let mut totals = AttendanceTotals::default();
    for records in section.attendance.values() {
        for record in records {
            if record.student_id != student_id {
                continue;
            }
            match record.status.as_str() {
                STATUS_PRESENT => totals.present += 1,
                STATUS_ABSENT => totals.absent += 1,
                STATUS_EXCUSED => totals.excused += 1,
                _ => {}
            }
        }
    }
    Some(totals)
}

/// Walks the membership list in order, fetching each class through `fetch`.
/// Entries whose class or section no longer exists are skipped silently;
/// duplicate entries yield duplicate rows. Store errors abort the walk.
pub fn summarize_memberships<F, E>(
    memberships: &[MembershipRef],
    student_id: &str,
    mut fetch: F,
) -> Result<Vec<SectionSummary>, E>
where
    F: FnMut(&str) -> Result<Option<ClassDoc>, E>,
{
    let mut rows = Vec::new();
    for entry in memberships {
        let Some(class) = fetch(&entry.class_code)? else {
            continue;
        };
        let Some(totals) = tally_section(&class, &entry.section, student_id) else {
            continue;
        };
        rows.push(SectionSummary {
            class_code: class.class_code.clone(),
            subject_name: class.subject_name.clone(),
            section: entry.section.clone(),
            present: totals.present,
            absent: totals.absent,
            excused: totals.excused,
        });
    }
    Ok(rows)
}

/// Enrolled students summed across sections, plus the number of sections with
/// a teacher assigned. Zero-valued for an empty class.
pub fn count_class(class: &ClassDoc) -> ClassCounts {
    let mut counts = ClassCounts::default();
    for section in class.sections.values() {
        counts.student_count += section.students.len() as u32;
        if section.teacher.is_some() {
            counts.teacher_count += 1;
        }
    }
    counts
}
