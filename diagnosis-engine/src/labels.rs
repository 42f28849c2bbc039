use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Diagnosis vocabulary produced by label normalization.
///
/// The four canonical members cover every label the classifiers are expected
/// to emit. `Unclassified` is the escape hatch for anything else: it carries
/// the best-effort slug so a diagnosis session never fails solely because a
/// classifier invented a label. Consumers treat it as non-normal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiagnosisType {
    Adenocarcinoma,
    LargeCellCarcinoma,
    SquamousCellCarcinoma,
    Normal,
    Unclassified(String),
}

impl DiagnosisType {
    pub fn as_str(&self) -> &str {
        match self {
            DiagnosisType::Adenocarcinoma => "adenocarcinoma",
            DiagnosisType::LargeCellCarcinoma => "large_cell_carcinoma",
            DiagnosisType::SquamousCellCarcinoma => "squamous_cell_carcinoma",
            DiagnosisType::Normal => "normal",
            DiagnosisType::Unclassified(slug) => slug,
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, DiagnosisType::Normal)
    }

    fn from_slug(slug: &str) -> Self {
        match slug {
            "adenocarcinoma" => DiagnosisType::Adenocarcinoma,
            "large_cell_carcinoma" => DiagnosisType::LargeCellCarcinoma,
            "squamous_cell_carcinoma" => DiagnosisType::SquamousCellCarcinoma,
            "normal" => DiagnosisType::Normal,
            other => DiagnosisType::Unclassified(other.to_string()),
        }
    }
}

impl fmt::Display for DiagnosisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DiagnosisType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DiagnosisType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(normalize(&label))
    }
}

/// Map a raw classifier label onto the diagnosis vocabulary.
///
/// Lower-cases and trims, then consults a fixed alias table covering the
/// delimiter variants the two classifiers are known to emit. Anything else
/// is slugified and passed through as `Unclassified`; this is a total
/// function by design.
pub fn normalize(raw: &str) -> DiagnosisType {
    let label = raw.trim().to_lowercase();
    if let Some(known) = lookup_alias(&label) {
        return known;
    }
    DiagnosisType::from_slug(&slugify(&label))
}

fn lookup_alias(label: &str) -> Option<DiagnosisType> {
    let diagnosis = match label {
        "adenocarcinoma" => DiagnosisType::Adenocarcinoma,
        "large cell carcinoma" | "large.cell.carcinoma" | "large_cell_carcinoma" => {
            DiagnosisType::LargeCellCarcinoma
        }
        "squamous cell carcinoma" | "squamous.cell.carcinoma" | "squamous_cell_carcinoma" => {
            DiagnosisType::SquamousCellCarcinoma
        }
        "normal" => DiagnosisType::Normal,
        _ => return None,
    };
    Some(diagnosis)
}

/// Whitespace runs become a single `_`; dots become `_`.
fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_separator = false;
    for ch in label.chars() {
        if ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            slug.push('_');
            pending_separator = false;
        }
        slug.push(if ch == '.' { '_' } else { ch });
    }
    slug
}
