//! The closed extraction schema.
//!
//! Every field the pipeline requests from the model is an enum variant here.
//! The prompt builder, the response parser and the canonicalizer all walk
//! these enums, so a field name exists in exactly one place.

use serde_json::{Map, Value};

/// Value shape and validation rule of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text.
    Text,
    /// A date coerced to `YYYY-MM` or `YYYY-MM-DD`.
    Date,
    /// Phone number; needs a minimum run of digits.
    Phone,
    /// Email address; needs an `@`.
    Email,
    /// Degree level, normalized to the closed degree set.
    Degree,
}

/// Static description of one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    /// Instruction shown to the model for this field.
    pub description: &'static str,
}

/// Implemented by the per-section field enums.
pub trait SchemaField: Copy + Eq + Ord + std::fmt::Debug + 'static {
    /// JSON key of the section that owns the field.
    const SECTION: &'static str;
    /// Every field of the section, in prompt order.
    const ALL: &'static [Self];

    fn spec(self) -> FieldSpec;

    fn key(self) -> &'static str {
        self.spec().key
    }

    fn kind(self) -> FieldKind {
        self.spec().kind
    }
}

macro_rules! schema_section {
    (
        $(#[$meta:meta])*
        pub enum $name:ident in $section:literal {
            $($variant:ident => ($key:literal, $kind:ident, $desc:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl SchemaField for $name {
            const SECTION: &'static str = $section;
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn spec(self) -> FieldSpec {
                match self {
                    $($name::$variant => FieldSpec {
                        key: $key,
                        kind: FieldKind::$kind,
                        description: $desc,
                    }),+
                }
            }
        }
    };
}

schema_section! {
    /// Identity fields.
    pub enum BasicField in "basic" {
        Name => ("name", Text, "候选人姓名"),
        Vendor => ("vendor", Text, "所属供应商或来源渠道"),
    }
}

schema_section! {
    /// Personal details.
    pub enum PersonalField in "personal" {
        Gender => ("gender", Text, "性别"),
        BirthDate => ("birth_date", Date, "出生日期（YYYY-MM-DD 或 YYYY-MM）"),
        Phone => ("phone", Phone, "联系电话"),
        Email => ("email", Email, "电子邮箱"),
        RegisteredResidence => ("registered_residence", Text, "户籍所在地"),
        CurrentResidence => ("current_residence", Text, "现居住地"),
        MaritalStatus => ("marital_status", Text, "婚姻状况"),
    }
}

schema_section! {
    /// One education entry.
    pub enum EducationField in "education" {
        School => ("school", Text, "毕业院校"),
        Major => ("major", Text, "专业"),
        Degree => ("degree", Degree, "学历（本科/硕士/博士/其他）"),
        EnrollmentDate => ("enrollment_date", Date, "入学时间（YYYY-MM）"),
        GraduationDate => ("graduation_date", Date, "毕业时间（YYYY-MM）"),
    }
}

schema_section! {
    /// One work-history entry.
    pub enum WorkField in "work_experience" {
        Company => ("company", Text, "单位名称"),
        Title => ("title", Text, "岗位/职务"),
        StartDate => ("start_date", Date, "开始时间（YYYY-MM）"),
        EndDate => ("end_date", Date, "结束时间（YYYY-MM，仍在职填“至今”）"),
        Description => ("description", Text, "工作内容"),
    }
}

schema_section! {
    /// One project entry.
    pub enum ProjectField in "projects" {
        Name => ("name", Text, "项目名称"),
        Role => ("role", Text, "担任角色/职责"),
        StartDate => ("start_date", Date, "开始时间（YYYY-MM）"),
        EndDate => ("end_date", Date, "结束时间（YYYY-MM，进行中填“至今”）"),
        Description => ("description", Text, "项目描述"),
    }
}

/// JSON key of the skill set.
pub const SKILLS_KEY: &str = "skills";
/// JSON key of the certification set.
pub const CERTIFICATIONS_KEY: &str = "certifications";

/// Versioned view over the whole schema.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionSchema {
    pub version: u32,
}

impl ExtractionSchema {
    pub const CURRENT: ExtractionSchema = ExtractionSchema { version: 1 };

    /// Top-level keys the model reply is expected to carry.
    pub const TOP_LEVEL_KEYS: [&'static str; 7] = [
        BasicField::SECTION,
        PersonalField::SECTION,
        EducationField::SECTION,
        WorkField::SECTION,
        ProjectField::SECTION,
        SKILLS_KEY,
        CERTIFICATIONS_KEY,
    ];

    /// JSON skeleton of the expected reply, descriptions as values.
    pub fn skeleton(&self) -> Value {
        let mut root = Map::new();
        root.insert(BasicField::SECTION.into(), object_of::<BasicField>());
        root.insert(PersonalField::SECTION.into(), object_of::<PersonalField>());
        root.insert(
            EducationField::SECTION.into(),
            Value::Array(vec![object_of::<EducationField>()]),
        );
        root.insert(
            WorkField::SECTION.into(),
            Value::Array(vec![object_of::<WorkField>()]),
        );
        root.insert(
            ProjectField::SECTION.into(),
            Value::Array(vec![object_of::<ProjectField>()]),
        );
        root.insert(SKILLS_KEY.into(), Value::Array(vec!["技能".into()]));
        root.insert(CERTIFICATIONS_KEY.into(), Value::Array(vec!["证书".into()]));
        Value::Object(root)
    }

    /// Flat list of every field path, e.g. `education[].degree`.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        paths.extend(paths_of::<BasicField>(false));
        paths.extend(paths_of::<PersonalField>(false));
        paths.extend(paths_of::<EducationField>(true));
        paths.extend(paths_of::<WorkField>(true));
        paths.extend(paths_of::<ProjectField>(true));
        paths.push(format!("{SKILLS_KEY}[]"));
        paths.push(format!("{CERTIFICATIONS_KEY}[]"));
        paths
    }
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self::CURRENT
    }
}

fn object_of<K: SchemaField>() -> Value {
    let map: Map<String, Value> = K::ALL
        .iter()
        .map(|f| {
            let spec = f.spec();
            (spec.key.to_string(), Value::String(spec.description.to_string()))
        })
        .collect();
    Value::Object(map)
}

fn paths_of<K: SchemaField>(repeated: bool) -> impl Iterator<Item = String> {
    let prefix = if repeated {
        format!("{}[]", K::SECTION)
    } else {
        K::SECTION.to_string()
    };
    K::ALL.iter().map(move |f| format!("{prefix}.{}", f.key()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_has_every_section() {
        let skeleton = ExtractionSchema::CURRENT.skeleton();
        for key in ExtractionSchema::TOP_LEVEL_KEYS {
            assert!(skeleton.get(key).is_some(), "missing {key}");
        }
        assert_eq!(
            skeleton["education"][0]["degree"],
            Value::String("学历（本科/硕士/博士/其他）".into())
        );
    }

    #[test]
    fn test_field_paths() {
        let paths = ExtractionSchema::CURRENT.field_paths();
        assert!(paths.contains(&"personal.email".to_string()));
        assert!(paths.contains(&"work_experience[].title".to_string()));
        assert!(paths.contains(&"skills[]".to_string()));
        assert_eq!(paths.len(), 2 + 7 + 5 + 5 + 5 + 2);
    }

    #[test]
    fn test_keys_are_unique_per_section() {
        fn unique<K: SchemaField>() -> bool {
            let mut keys: Vec<_> = K::ALL.iter().map(|f| f.key()).collect();
            keys.sort_unstable();
            keys.windows(2).all(|w| w[0] != w[1])
        }
        assert!(unique::<BasicField>());
        assert!(unique::<PersonalField>());
        assert!(unique::<EducationField>());
        assert!(unique::<WorkField>());
        assert!(unique::<ProjectField>());
    }
}
