//! Canonicalization of parsed replies into [`CandidateRecord`]s.
//!
//! Every leaf is classified exactly once as resolved or unresolved. Nothing
//! the model returned is dropped: unresolved leaves keep the raw text.

mod checks;
pub mod dedup;
pub mod degree;

pub use checks::{is_placeholder, is_valid_email, is_valid_phone};
pub use dedup::{DedupKey, dedup_entries, dedup_set};
pub use degree::normalize_degree;

use tracing::debug;

use crate::models::record::{
    BasicInfo, CandidateRecord, Degree, EducationEntry, Field, FieldMap, FieldPath, ParsedRecord,
    PersonalInfo, ProjectEntry, Unresolved, UnresolvedReason, WorkEntry,
};
use crate::models::schema::{
    BasicField, EducationField, FieldKind, PersonalField, ProjectField, SchemaField, WorkField,
};

/// A finalized record plus the paths of its unresolved leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub record: CandidateRecord,
    pub unresolved: Vec<FieldPath>,
}

impl CanonicalRecord {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Classify a text-like value according to its field kind.
pub fn classify_text(kind: FieldKind, raw: Option<&str>) -> Field {
    let Some(raw) = raw.map(str::trim) else {
        return Field::missing();
    };
    if raw.is_empty() {
        return Field::missing();
    }
    if is_placeholder(raw) {
        return Field::unresolved(UnresolvedReason::Placeholder, raw);
    }

    let valid = match kind {
        FieldKind::Email => is_valid_email(raw),
        FieldKind::Phone => is_valid_phone(raw),
        FieldKind::Text | FieldKind::Date | FieldKind::Degree => true,
    };

    if valid {
        Field::Resolved(raw.to_string())
    } else {
        Field::unresolved(UnresolvedReason::InvalidFormat, raw)
    }
}

/// Classify a degree value.
pub fn classify_degree(raw: Option<&str>) -> Field<Degree> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Field::missing();
    };
    if is_placeholder(raw) {
        return Field::unresolved(UnresolvedReason::Placeholder, raw);
    }

    match normalize_degree(raw) {
        Some(degree) => Field::Resolved(degree),
        None => Field::Unresolved(Unresolved {
            reason: UnresolvedReason::NeedsReview,
            raw: Some(raw.to_string()),
            provisional: Some(Degree::Other),
        }),
    }
}

fn field<K: SchemaField>(map: &FieldMap<K>, key: K) -> Field {
    classify_text(key.kind(), map.get(&key).map(String::as_str))
}

fn education_entry(map: &FieldMap<EducationField>) -> EducationEntry {
    EducationEntry {
        school: field(map, EducationField::School),
        major: field(map, EducationField::Major),
        degree: classify_degree(map.get(&EducationField::Degree).map(String::as_str)),
        enrollment_date: field(map, EducationField::EnrollmentDate),
        graduation_date: field(map, EducationField::GraduationDate),
    }
}

fn work_entry(map: &FieldMap<WorkField>) -> WorkEntry {
    WorkEntry {
        company: field(map, WorkField::Company),
        title: field(map, WorkField::Title),
        start_date: field(map, WorkField::StartDate),
        end_date: field(map, WorkField::EndDate),
        description: field(map, WorkField::Description),
    }
}

fn project_entry(map: &FieldMap<ProjectField>) -> ProjectEntry {
    ProjectEntry {
        name: field(map, ProjectField::Name),
        role: field(map, ProjectField::Role),
        start_date: field(map, ProjectField::StartDate),
        end_date: field(map, ProjectField::EndDate),
        description: field(map, ProjectField::Description),
    }
}

fn set_field(items: &[String]) -> Field<Vec<String>> {
    let items = dedup_set(
        items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !is_placeholder(item))
            .map(str::to_string),
    );

    if items.is_empty() {
        Field::missing()
    } else {
        Field::Resolved(items)
    }
}

/// Highest resolved degree across the education entries.
fn highest_degree(education: &[EducationEntry]) -> Field<Degree> {
    education
        .iter()
        .filter_map(|entry| entry.degree.value().copied())
        .max()
        .map(Field::Resolved)
        .unwrap_or_else(Field::missing)
}

/// Turn a parsed reply into the canonical record.
pub fn canonicalize(parsed: &ParsedRecord) -> CanonicalRecord {
    let education = dedup_entries(parsed.education.iter().map(education_entry).collect());
    let work_experience = dedup_entries(parsed.work_experience.iter().map(work_entry).collect());
    let projects = dedup_entries(parsed.projects.iter().map(project_entry).collect());

    let record = CandidateRecord {
        basic: BasicInfo {
            name: field(&parsed.basic, BasicField::Name),
            vendor: field(&parsed.basic, BasicField::Vendor),
        },
        personal: PersonalInfo {
            gender: field(&parsed.personal, PersonalField::Gender),
            birth_date: field(&parsed.personal, PersonalField::BirthDate),
            phone: field(&parsed.personal, PersonalField::Phone),
            email: field(&parsed.personal, PersonalField::Email),
            registered_residence: field(&parsed.personal, PersonalField::RegisteredResidence),
            current_residence: field(&parsed.personal, PersonalField::CurrentResidence),
            marital_status: field(&parsed.personal, PersonalField::MaritalStatus),
            highest_degree: highest_degree(&education),
        },
        education,
        work_experience,
        projects,
        skills: set_field(&parsed.skills),
        certifications: set_field(&parsed.certifications),
    };

    let unresolved = record.unresolved_paths();
    debug!(
        "Canonicalized record with {} unresolved field(s)",
        unresolved.len()
    );

    CanonicalRecord { record, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::SKILLS_KEY;
    use pretty_assertions::assert_eq;

    fn parsed_li_lei() -> ParsedRecord {
        let mut parsed = ParsedRecord::default();
        parsed.basic.insert(BasicField::Name, "李雷".into());
        parsed
            .personal
            .insert(PersonalField::Email, "lilei@example.com".into());
        parsed.personal.insert(PersonalField::Gender, "未提及".into());

        let mut edu = FieldMap::new();
        edu.insert(EducationField::School, "清华大学".into());
        edu.insert(EducationField::Degree, "硕士".into());
        parsed.education.push(edu);

        parsed.skills = vec!["Rust".into(), "rust".into(), "N/A".into(), "Go".into()];
        parsed
    }

    #[test]
    fn test_canonicalize_classifies_fields() {
        let canonical = canonicalize(&parsed_li_lei());
        let record = &canonical.record;

        assert_eq!(record.name(), Some("李雷"));
        assert_eq!(record.education[0].degree, Field::Resolved(Degree::Master));
        assert_eq!(record.personal.highest_degree, Field::Resolved(Degree::Master));
        assert_eq!(record.personal.phone, Field::missing());
        assert_eq!(
            record.personal.gender,
            Field::unresolved(UnresolvedReason::Placeholder, "未提及")
        );
        assert_eq!(
            record.skills,
            Field::Resolved(vec!["Rust".to_string(), "Go".to_string()])
        );
        assert!(record.certifications.value().is_none());

        let paths: Vec<String> = canonical.unresolved.iter().map(|p| p.to_string()).collect();
        assert!(paths.contains(&"personal.phone".to_string()));
        assert!(paths.contains(&"education[0].major".to_string()));
        assert!(paths.contains(&"certifications".to_string()));
        assert!(!paths.contains(&SKILLS_KEY.to_string()));
    }

    #[test]
    fn test_every_leaf_classified_once() {
        let canonical = canonicalize(&parsed_li_lei());
        let mut resolved = 0;
        let mut total = 0;
        canonical.record.visit_leaves(|_, is_resolved| {
            total += 1;
            if is_resolved {
                resolved += 1;
            }
        });

        // 2 basic + 7 personal + highest degree + 5 per education entry + 2 sets
        assert_eq!(total, 2 + 7 + 1 + 5 + 2);
        assert_eq!(resolved + canonical.unresolved.len(), total);
    }

    #[test]
    fn test_format_checks() {
        assert_eq!(
            classify_text(FieldKind::Email, Some("lilei.example.com")),
            Field::unresolved(UnresolvedReason::InvalidFormat, "lilei.example.com")
        );
        assert_eq!(
            classify_text(FieldKind::Phone, Some("138-0000-1111")),
            Field::Resolved("138-0000-1111".to_string())
        );
        assert_eq!(
            classify_text(FieldKind::Phone, Some("12345")),
            Field::unresolved(UnresolvedReason::InvalidFormat, "12345")
        );
        assert_eq!(classify_text(FieldKind::Text, Some("   ")), Field::missing());
    }

    #[test]
    fn test_unknown_degree_flagged_with_provisional_other() {
        assert_eq!(
            classify_degree(Some("大专")),
            Field::Unresolved(Unresolved {
                reason: UnresolvedReason::NeedsReview,
                raw: Some("大专".to_string()),
                provisional: Some(Degree::Other),
            })
        );
        assert_eq!(classify_degree(Some("其他")), Field::Resolved(Degree::Other));
    }

    #[test]
    fn test_highest_degree_and_dedup() {
        let mut parsed = ParsedRecord::default();
        parsed.basic.insert(BasicField::Name, "韩梅梅".into());
        for (school, degree, start) in [
            ("北京大学", "本科", "2012-09"),
            ("MIT", "PhD", "2016-09"),
            ("北京大学", "学士", "2012-09"),
        ] {
            let mut edu = FieldMap::new();
            edu.insert(EducationField::School, school.to_string());
            edu.insert(EducationField::Degree, degree.to_string());
            edu.insert(EducationField::EnrollmentDate, start.to_string());
            parsed.education.push(edu);
        }

        let record = canonicalize(&parsed).record;

        assert_eq!(record.education.len(), 2);
        assert_eq!(record.personal.highest_degree, Field::Resolved(Degree::Doctorate));
    }

    #[test]
    fn test_adding_information_never_unresolves() {
        let base = canonicalize(&parsed_li_lei());

        let mut richer = parsed_li_lei();
        richer
            .personal
            .insert(PersonalField::Phone, "13800001111".into());
        let richer = canonicalize(&richer);

        assert!(richer.unresolved.len() < base.unresolved.len());
        for path in &richer.unresolved {
            assert!(base.unresolved.contains(path), "{path} became unresolved");
        }
    }
}
