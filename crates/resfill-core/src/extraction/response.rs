//! Model reply parsing.
//!
//! Replies are located leniently (fences, prose and stray braces around the
//! object are ignored) and mapped strictly onto the schema: keys outside the
//! schema are ignored, and values of the wrong shape are either coerced or
//! dropped with a note.

use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::dates::coerce_date;
use crate::canonical::is_placeholder;
use crate::error::ExtractionError;
use crate::models::record::{FieldMap, ParsedRecord};
use crate::models::schema::{
    BasicField, CERTIFICATIONS_KEY, EducationField, ExtractionSchema, FieldKind, PersonalField,
    ProjectField, SKILLS_KEY, SchemaField, WorkField,
};

/// Joiner for arrays returned where a single value was expected.
const LIST_JOINER: &str = "、";

/// Separators accepted inside a skill or certification string.
const SET_SEPARATORS: [char; 5] = [',', '，', '、', ';', '；'];

/// Non-fatal observation made while mapping a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseNote {
    /// A value had a shape the field cannot take and was dropped.
    WrongType { path: String, found: &'static str },
    /// A date matched no coercion rule; the raw text was kept.
    FormatUnrecognized { path: String, raw: String },
}

impl std::fmt::Display for ParseNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseNote::WrongType { path, found } => write!(f, "{path}: unexpected {found}"),
            ParseNote::FormatUnrecognized { path, raw } => {
                write!(f, "{path}: unrecognized date {raw:?}")
            }
        }
    }
}

/// A mapped model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub record: ParsedRecord,
    pub notes: Vec<ParseNote>,
    /// Every top-level section was present in the reply.
    pub complete: bool,
}

/// Parse a raw model reply into a [`ParsedResponse`].
pub fn parse_response(raw: &str) -> Result<ParsedResponse, ExtractionError> {
    let mut found_object = false;
    let mut root = None;

    for object in json_objects(raw) {
        found_object = true;
        if ExtractionSchema::TOP_LEVEL_KEYS
            .iter()
            .any(|key| object.contains_key(*key))
        {
            root = Some(object);
            break;
        }
    }

    let Some(root) = root else {
        return Err(if found_object {
            ExtractionError::MissingSections {
                raw: raw.to_string(),
            }
        } else {
            ExtractionError::NoJsonObject {
                raw: raw.to_string(),
            }
        });
    };

    let complete = ExtractionSchema::TOP_LEVEL_KEYS
        .iter()
        .all(|key| root.contains_key(*key));

    let mut notes = Vec::new();
    let record = ParsedRecord {
        basic: map_section::<BasicField>(&root, &mut notes),
        personal: map_section::<PersonalField>(&root, &mut notes),
        education: map_sequence::<EducationField>(&root, &mut notes),
        work_experience: map_sequence::<WorkField>(&root, &mut notes),
        projects: map_sequence::<ProjectField>(&root, &mut notes),
        skills: map_set(&root, SKILLS_KEY, &mut notes),
        certifications: map_set(&root, CERTIFICATIONS_KEY, &mut notes),
    };

    debug!(
        "Parsed reply: complete={}, {} notes, {} education, {} work, {} projects",
        complete,
        notes.len(),
        record.education.len(),
        record.work_experience.len(),
        record.projects.len()
    );

    Ok(ParsedResponse {
        record,
        notes,
        complete,
    })
}

/// First JSON object embedded in `raw`, if any.
pub fn locate_json_object(raw: &str) -> Option<Map<String, Value>> {
    json_objects(raw).next()
}

/// Every balanced `{...}` span of `raw` that parses as a JSON object, in
/// order of their opening brace. When a span fails to parse, scanning
/// resumes at the next `{` after its start.
fn json_objects(raw: &str) -> impl Iterator<Item = Map<String, Value>> + '_ {
    let mut search_from = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = raw.get(search_from..)?.find('{') {
            let start = search_from + offset;
            search_from = start + 1;

            let Some(len) = balanced_span(&raw[start..]) else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw[start..start + len]) {
                Ok(Value::Object(map)) => {
                    search_from = start + len;
                    return Some(map);
                }
                Ok(_) => {}
                Err(e) => trace!("Candidate span at {} is not JSON: {}", start, e),
            }
        }
        None
    })
}

/// Byte length of the brace-balanced span starting at `s[0] == '{'`.
fn balanced_span(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text of a scalar-ish value; `None` for the sentinel.
fn scalar(value: &Value, path: &str, notes: &mut Vec<ParseNote>) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Value::Array(_) | Value::Object(_) => {
                        notes.push(ParseNote::WrongType {
                            path: format!("{path}[{i}]"),
                            found: type_name(item),
                        });
                        None
                    }
                    other => scalar(other, path, notes),
                })
                .collect();
            parts.join(LIST_JOINER)
        }
        Value::Object(_) => {
            notes.push(ParseNote::WrongType {
                path: path.to_string(),
                found: "object",
            });
            return None;
        }
    };

    (!text.is_empty()).then_some(text)
}

fn map_fields<K: SchemaField>(
    object: &Map<String, Value>,
    prefix: &str,
    notes: &mut Vec<ParseNote>,
) -> FieldMap<K> {
    let mut fields = FieldMap::new();

    for field in K::ALL {
        let Some(value) = object.get(field.key()) else {
            continue;
        };
        let path = format!("{prefix}.{}", field.key());
        let Some(text) = scalar(value, &path, notes) else {
            continue;
        };

        let text = if field.kind() == FieldKind::Date {
            match coerce_date(&text) {
                Some(date) => date,
                None => {
                    if !is_placeholder(&text) {
                        notes.push(ParseNote::FormatUnrecognized {
                            path,
                            raw: text.clone(),
                        });
                    }
                    text
                }
            }
        } else {
            text
        };

        fields.insert(*field, text);
    }

    fields
}

fn map_section<K: SchemaField>(
    root: &Map<String, Value>,
    notes: &mut Vec<ParseNote>,
) -> FieldMap<K> {
    match root.get(K::SECTION) {
        Some(Value::Object(object)) => map_fields(object, K::SECTION, notes),
        Some(Value::Null) | None => FieldMap::new(),
        Some(other) => {
            notes.push(ParseNote::WrongType {
                path: K::SECTION.to_string(),
                found: type_name(other),
            });
            FieldMap::new()
        }
    }
}

/// Map a repeated section. Entries whose every field is the sentinel are
/// dropped, since they carry nothing.
fn map_sequence<K: SchemaField>(
    root: &Map<String, Value>,
    notes: &mut Vec<ParseNote>,
) -> Vec<FieldMap<K>> {
    let entries: Vec<(usize, &Map<String, Value>)> = match root.get(K::SECTION) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::Object(object) => Some((i, object)),
                Value::Null => None,
                other => {
                    notes.push(ParseNote::WrongType {
                        path: format!("{}[{i}]", K::SECTION),
                        found: type_name(other),
                    });
                    None
                }
            })
            .collect(),
        Some(Value::Object(object)) => vec![(0, object)],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            notes.push(ParseNote::WrongType {
                path: K::SECTION.to_string(),
                found: type_name(other),
            });
            Vec::new()
        }
    };

    entries
        .into_iter()
        .map(|(i, object)| map_fields::<K>(object, &format!("{}[{i}]", K::SECTION), notes))
        .filter(|fields| !fields.is_empty())
        .collect()
}

fn split_set(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(&SET_SEPARATORS[..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn map_set(root: &Map<String, Value>, key: &str, notes: &mut Vec<ParseNote>) -> Vec<String> {
    match root.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| scalar(item, &format!("{key}[{i}]"), notes))
            .collect(),
        Some(Value::String(text)) => split_set(text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            notes.push(ParseNote::WrongType {
                path: key.to_string(),
                found: type_name(other),
            });
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPLY: &str = r#"{
        "basic": {"name": "李雷", "vendor": ""},
        "personal": {"phone": null, "email": "lilei@example.com", "birth_date": "1995年3月"},
        "education": [{"school": "清华大学", "degree": "硕士", "enrollment_date": "2018.09"}],
        "work_experience": [],
        "projects": [],
        "skills": ["Rust", "Python"],
        "certifications": ""
    }"#;

    #[test]
    fn test_parse_plain_reply() {
        let parsed = parse_response(REPLY).unwrap();

        assert!(parsed.complete);
        assert!(parsed.notes.is_empty());
        assert_eq!(
            parsed.record.basic.get(&BasicField::Name).map(String::as_str),
            Some("李雷")
        );
        assert!(!parsed.record.basic.contains_key(&BasicField::Vendor));
        assert!(!parsed.record.personal.contains_key(&PersonalField::Phone));
        assert_eq!(
            parsed.record.personal.get(&PersonalField::BirthDate).map(String::as_str),
            Some("1995-03")
        );
        assert_eq!(
            parsed.record.education[0]
                .get(&EducationField::EnrollmentDate)
                .map(String::as_str),
            Some("2018-09")
        );
        assert_eq!(parsed.record.skills, vec!["Rust", "Python"]);
        assert!(parsed.record.certifications.is_empty());
    }

    #[test]
    fn test_fenced_reply_equals_plain() {
        let fenced = format!("Here is the result:\n```json\n{REPLY}\n```\nLet me know!");
        assert_eq!(parse_response(&fenced).unwrap(), parse_response(REPLY).unwrap());
    }

    #[test]
    fn test_locate_skips_invalid_candidates() {
        let raw = r#"note {not json} then {"basic": {"name": "韩梅梅 {x}"}}"#;
        let object = locate_json_object(raw).unwrap();
        assert_eq!(object["basic"]["name"], "韩梅梅 {x}");
    }

    #[test]
    fn test_braces_inside_strings() {
        assert_eq!(balanced_span(r#"{"a": "}\"{"} tail"#), Some(13));
        assert_eq!(balanced_span("{unterminated"), None);
    }

    #[test]
    fn test_no_object_is_failure() {
        let err = parse_response("I could not read this résumé.").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonObject { .. }));
        assert_eq!(err.raw_reply(), Some("I could not read this résumé."));
    }

    #[test]
    fn test_object_without_sections_is_failure() {
        let err = parse_response(r#"{"candidate": "李雷"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingSections { .. }));
    }

    #[test]
    fn test_value_coercions() {
        let raw = r#"{
            "basic": {"name": ["李", "雷"]},
            "personal": {"phone": 13800001111, "gender": {"value": "男"}},
            "work_experience": {"company": "ACME", "start_date": "Spring 2019", "end_date": "至今"},
            "skills": "Rust, Go，SQL、Docker; K8s"
        }"#;
        let parsed = parse_response(raw).unwrap();

        assert!(!parsed.complete);
        assert_eq!(
            parsed.record.basic.get(&BasicField::Name).map(String::as_str),
            Some("李、雷")
        );
        assert_eq!(
            parsed.record.personal.get(&PersonalField::Phone).map(String::as_str),
            Some("13800001111")
        );
        assert!(!parsed.record.personal.contains_key(&PersonalField::Gender));

        assert_eq!(parsed.record.work_experience.len(), 1);
        let work = &parsed.record.work_experience[0];
        assert_eq!(work.get(&WorkField::StartDate).map(String::as_str), Some("Spring 2019"));
        assert_eq!(work.get(&WorkField::EndDate).map(String::as_str), Some("present"));

        assert_eq!(parsed.record.skills, vec!["Rust", "Go", "SQL", "Docker", "K8s"]);
        assert_eq!(
            parsed.notes,
            vec![
                ParseNote::WrongType {
                    path: "personal.gender".into(),
                    found: "object"
                },
                ParseNote::FormatUnrecognized {
                    path: "work_experience[0].start_date".into(),
                    raw: "Spring 2019".into()
                },
            ]
        );
    }

    #[test]
    fn test_blank_entries_dropped() {
        let raw = r#"{"projects": [{"name": "", "role": null}, {"name": "推荐系统"}]}"#;
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.record.projects.len(), 1);
        assert_eq!(
            parsed.record.projects[0].get(&ProjectField::Name).map(String::as_str),
            Some("推荐系统")
        );
    }
}
