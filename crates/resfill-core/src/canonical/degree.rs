//! Degree normalization.
//!
//! Keyword groups are tried doctorate first, then bachelor, then master, so
//! that "undergraduate" is not read as "graduate" and "博士研究生" is not read
//! as a master's degree.

use crate::models::record::Degree;

struct Keywords {
    degree: Degree,
    /// Matched anywhere in the lowercased text.
    phrases: &'static [&'static str],
    /// Matched against whole tokens with dots removed.
    abbreviations: &'static [&'static str],
}

const KEYWORDS: [Keywords; 3] = [
    Keywords {
        degree: Degree::Doctorate,
        phrases: &["博士", "doctor", "doctoral", "doctorate"],
        abbreviations: &["phd", "dphil", "edd", "dsc"],
    },
    Keywords {
        degree: Degree::Bachelor,
        phrases: &["本科", "学士", "bachelor", "undergraduate"],
        abbreviations: &["bs", "bsc", "ba", "beng", "bba"],
    },
    Keywords {
        degree: Degree::Master,
        phrases: &["硕士", "研究生", "master", "graduate", "postgraduate"],
        abbreviations: &["ms", "msc", "ma", "meng", "mba", "mphil"],
    },
];

const OTHER_LABELS: [&str; 2] = ["other", "其他"];

/// Map free degree text onto the closed degree set.
///
/// Returns `None` when no keyword matches; the caller keeps the raw text for
/// review.
pub fn normalize_degree(raw: &str) -> Option<Degree> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if OTHER_LABELS.contains(&text.as_str()) {
        return Some(Degree::Other);
    }

    let tokens: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.replace('.', ""))
        .filter(|t| !t.is_empty())
        .collect();

    KEYWORDS
        .iter()
        .find(|group| {
            group.phrases.iter().any(|p| text.contains(p))
                || tokens
                    .iter()
                    .any(|t| group.abbreviations.contains(&t.as_str()))
        })
        .map(|group| group.degree)
}
