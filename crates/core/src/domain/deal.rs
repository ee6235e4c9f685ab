use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

/// Pipeline stages a deal moves through. `Killed` is terminal and reachable from any
/// non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    Intake,
    TriageDone,
    Preapp,
    Concept,
    Neighbors,
    Submitted,
    Hearing,
    Approved,
    ExitMarketed,
    Exited,
    Killed,
}

impl DealStatus {
    pub const PIPELINE: [DealStatus; 10] = [
        Self::Intake,
        Self::TriageDone,
        Self::Preapp,
        Self::Concept,
        Self::Neighbors,
        Self::Submitted,
        Self::Hearing,
        Self::Approved,
        Self::ExitMarketed,
        Self::Exited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::TriageDone => "TRIAGE_DONE",
            Self::Preapp => "PREAPP",
            Self::Concept => "CONCEPT",
            Self::Neighbors => "NEIGHBORS",
            Self::Submitted => "SUBMITTED",
            Self::Hearing => "HEARING",
            Self::Approved => "APPROVED",
            Self::ExitMarketed => "EXIT_MARKETED",
            Self::Exited => "EXITED",
            Self::Killed => "KILLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INTAKE" => Some(Self::Intake),
            "TRIAGE_DONE" => Some(Self::TriageDone),
            "PREAPP" => Some(Self::Preapp),
            "CONCEPT" => Some(Self::Concept),
            "NEIGHBORS" => Some(Self::Neighbors),
            "SUBMITTED" => Some(Self::Submitted),
            "HEARING" => Some(Self::Hearing),
            "APPROVED" => Some(Self::Approved),
            "EXIT_MARKETED" => Some(Self::ExitMarketed),
            "EXITED" => Some(Self::Exited),
            "KILLED" => Some(Self::Killed),
            _ => None,
        }
    }

    /// 1-based position in the linear pipeline; `None` for `Killed`.
    pub fn pipeline_step(&self) -> Option<u8> {
        Self::PIPELINE.iter().position(|status| status == self).map(|index| index as u8 + 1)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Killed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub org_id: OrgId,
    pub name: String,
    pub status: DealStatus,
    pub sku: Option<String>,
    pub jurisdiction_id: Option<String>,
}

impl Deal {
    /// One-line summary injected into agent preambles.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} ({}), status {}", self.name, self.id.0, self.status.as_str());
        if let Some(sku) = &self.sku {
            summary.push_str(&format!(", sku {sku}"));
        }
        if let Some(jurisdiction) = &self.jurisdiction_id {
            summary.push_str(&format!(", jurisdiction {jurisdiction}"));
        }
        summary
    }
}
