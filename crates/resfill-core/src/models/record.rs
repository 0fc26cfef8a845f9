//! Candidate record data models.
//!
//! [`ParsedRecord`] is the partially-filled shape the response parser
//! produces; [`CandidateRecord`] is the finalized shape in which every leaf
//! is a [`Field`] classified as resolved or unresolved.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::schema::{
    BasicField, CERTIFICATIONS_KEY, EducationField, PersonalField, ProjectField, SKILLS_KEY,
    SchemaField, WorkField,
};

/// Field values keyed by a schema enum. Absent key means the model returned
/// the sentinel (or nothing) for that field.
pub type FieldMap<K> = BTreeMap<K, String>;

/// Output of the response parser, before canonicalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecord {
    pub basic: FieldMap<BasicField>,
    pub personal: FieldMap<PersonalField>,
    pub education: Vec<FieldMap<EducationField>>,
    pub work_experience: Vec<FieldMap<WorkField>>,
    pub projects: Vec<FieldMap<ProjectField>>,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
}

/// A leaf of the finalized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field<T = String> {
    Resolved(T),
    Unresolved(Unresolved<T>),
}

/// Why a field could not be resolved, plus whatever text the model gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unresolved<T> {
    pub reason: UnresolvedReason,
    /// Text the model returned, kept for the reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Best-effort value kept for review (e.g. `other` for unknown degrees).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Sentinel empty value or key absent.
    Missing,
    /// A placeholder phrase such as "N/A" or "未提及".
    Placeholder,
    /// Failed the minimal format check for its kind.
    InvalidFormat,
    /// Recognizable text that still needs a human decision.
    NeedsReview,
}

impl<T> Field<T> {
    pub fn missing() -> Self {
        Field::Unresolved(Unresolved {
            reason: UnresolvedReason::Missing,
            raw: None,
            provisional: None,
        })
    }

    pub fn unresolved(reason: UnresolvedReason, raw: impl Into<String>) -> Self {
        Field::Unresolved(Unresolved {
            reason,
            raw: Some(raw.into()),
            provisional: None,
        })
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Field::Resolved(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Resolved(v) => Some(v),
            Field::Unresolved(_) => None,
        }
    }

    /// Raw model text of an unresolved field.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Field::Resolved(_) => None,
            Field::Unresolved(u) => u.raw.as_deref(),
        }
    }
}

/// Canonical degree levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degree {
    Other,
    Bachelor,
    Master,
    Doctorate,
}

impl Degree {
    pub const ALL: [Degree; 4] = [
        Degree::Bachelor,
        Degree::Master,
        Degree::Doctorate,
        Degree::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Degree::Bachelor => "bachelor",
            Degree::Master => "master",
            Degree::Doctorate => "doctorate",
            Degree::Other => "other",
        }
    }

    /// Label written into the spreadsheet.
    pub fn label(&self) -> &'static str {
        match self {
            Degree::Bachelor => "本科",
            Degree::Master => "硕士",
            Degree::Doctorate => "博士",
            Degree::Other => "其他",
        }
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: Field,
    pub vendor: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub gender: Field,
    pub birth_date: Field,
    pub phone: Field,
    pub email: Field,
    pub registered_residence: Field,
    pub current_residence: Field,
    pub marital_status: Field,
    /// Derived from the education entries.
    pub highest_degree: Field<Degree>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub school: Field,
    pub major: Field,
    pub degree: Field<Degree>,
    pub enrollment_date: Field,
    pub graduation_date: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub company: Field,
    pub title: Field,
    pub start_date: Field,
    pub end_date: Field,
    pub description: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: Field,
    pub role: Field,
    pub start_date: Field,
    pub end_date: Field,
    pub description: Field,
}

/// The finalized candidate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub basic: BasicInfo,
    pub personal: PersonalInfo,
    pub education: Vec<EducationEntry>,
    pub work_experience: Vec<WorkEntry>,
    pub projects: Vec<ProjectEntry>,
    /// Unresolved when empty.
    pub skills: Field<Vec<String>>,
    /// Unresolved when empty.
    pub certifications: Field<Vec<String>>,
}

/// Location of a leaf inside a [`CandidateRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    pub section: &'static str,
    pub index: Option<usize>,
    pub key: Option<&'static str>,
}

impl FieldPath {
    pub fn flat<K: SchemaField>(field: K) -> Self {
        Self {
            section: K::SECTION,
            index: None,
            key: Some(field.key()),
        }
    }

    pub fn entry<K: SchemaField>(index: usize, field: K) -> Self {
        Self {
            section: K::SECTION,
            index: Some(index),
            key: Some(field.key()),
        }
    }

    pub fn set(section: &'static str) -> Self {
        Self {
            section,
            index: None,
            key: None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section)?;
        if let Some(i) = self.index {
            write!(f, "[{i}]")?;
        }
        if let Some(key) = self.key {
            write!(f, ".{key}")?;
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl BasicInfo {
    pub fn get(&self, field: BasicField) -> &Field {
        match field {
            BasicField::Name => &self.name,
            BasicField::Vendor => &self.vendor,
        }
    }
}

impl PersonalInfo {
    pub fn get(&self, field: PersonalField) -> &Field {
        match field {
            PersonalField::Gender => &self.gender,
            PersonalField::BirthDate => &self.birth_date,
            PersonalField::Phone => &self.phone,
            PersonalField::Email => &self.email,
            PersonalField::RegisteredResidence => &self.registered_residence,
            PersonalField::CurrentResidence => &self.current_residence,
            PersonalField::MaritalStatus => &self.marital_status,
        }
    }
}

impl EducationEntry {
    /// Text fields of the entry; the degree is exposed separately.
    pub fn text(&self, field: EducationField) -> Option<&Field> {
        match field {
            EducationField::School => Some(&self.school),
            EducationField::Major => Some(&self.major),
            EducationField::Degree => None,
            EducationField::EnrollmentDate => Some(&self.enrollment_date),
            EducationField::GraduationDate => Some(&self.graduation_date),
        }
    }

    pub fn is_resolved(&self, field: EducationField) -> bool {
        match field {
            EducationField::Degree => self.degree.is_resolved(),
            other => self.text(other).is_some_and(Field::is_resolved),
        }
    }

    pub fn resolved_count(&self) -> usize {
        EducationField::ALL
            .iter()
            .filter(|f| self.is_resolved(**f))
            .count()
    }
}

impl WorkEntry {
    pub fn get(&self, field: WorkField) -> &Field {
        match field {
            WorkField::Company => &self.company,
            WorkField::Title => &self.title,
            WorkField::StartDate => &self.start_date,
            WorkField::EndDate => &self.end_date,
            WorkField::Description => &self.description,
        }
    }

    pub fn resolved_count(&self) -> usize {
        WorkField::ALL
            .iter()
            .filter(|f| self.get(**f).is_resolved())
            .count()
    }
}

impl ProjectEntry {
    pub fn get(&self, field: ProjectField) -> &Field {
        match field {
            ProjectField::Name => &self.name,
            ProjectField::Role => &self.role,
            ProjectField::StartDate => &self.start_date,
            ProjectField::EndDate => &self.end_date,
            ProjectField::Description => &self.description,
        }
    }

    pub fn resolved_count(&self) -> usize {
        ProjectField::ALL
            .iter()
            .filter(|f| self.get(**f).is_resolved())
            .count()
    }
}

impl CandidateRecord {
    /// Visit every leaf with its path and resolution state.
    pub fn visit_leaves(&self, mut visit: impl FnMut(FieldPath, bool)) {
        for f in BasicField::ALL {
            visit(FieldPath::flat(*f), self.basic.get(*f).is_resolved());
        }
        for f in PersonalField::ALL {
            visit(FieldPath::flat(*f), self.personal.get(*f).is_resolved());
        }
        visit(
            FieldPath {
                section: PersonalField::SECTION,
                index: None,
                key: Some("highest_degree"),
            },
            self.personal.highest_degree.is_resolved(),
        );
        for (i, entry) in self.education.iter().enumerate() {
            for f in EducationField::ALL {
                visit(FieldPath::entry(i, *f), entry.is_resolved(*f));
            }
        }
        for (i, entry) in self.work_experience.iter().enumerate() {
            for f in WorkField::ALL {
                visit(FieldPath::entry(i, *f), entry.get(*f).is_resolved());
            }
        }
        for (i, entry) in self.projects.iter().enumerate() {
            for f in ProjectField::ALL {
                visit(FieldPath::entry(i, *f), entry.get(*f).is_resolved());
            }
        }
        visit(FieldPath::set(SKILLS_KEY), self.skills.is_resolved());
        visit(
            FieldPath::set(CERTIFICATIONS_KEY),
            self.certifications.is_resolved(),
        );
    }

    /// Paths of all unresolved leaves, in record order.
    pub fn unresolved_paths(&self) -> Vec<FieldPath> {
        let mut paths = Vec::new();
        self.visit_leaves(|path, resolved| {
            if !resolved {
                paths.push(path);
            }
        });
        paths
    }

    pub fn name(&self) -> Option<&str> {
        self.basic.name.value().map(String::as_str)
    }
}
