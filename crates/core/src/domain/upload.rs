use serde::{Deserialize, Serialize};

use crate::domain::deal::{DealId, OrgId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Title,
    Environmental,
    Survey,
    Financial,
    Legal,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Environmental => "environmental",
            Self::Survey => "survey",
            Self::Financial => "financial",
            Self::Legal => "legal",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "title" => Some(Self::Title),
            "environmental" => Some(Self::Environmental),
            "survey" => Some(Self::Survey),
            "financial" => Some(Self::Financial),
            "legal" => Some(Self::Legal),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: UploadId,
    pub org_id: OrgId,
    pub deal_id: DealId,
    pub filename: String,
    pub kind: DocumentKind,
}
