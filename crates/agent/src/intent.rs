use serde::{Deserialize, Serialize};

use crate::catalog::AgentKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    General,
    Research,
    Finance,
    Legal,
    Risk,
    DueDiligence,
    Tax,
    Design,
    Operations,
    Marketing,
}

/// Specialist lineup and extra coordinator guidance for one intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentProfile {
    pub specialists: Vec<AgentKey>,
    pub planner_context: Option<&'static str>,
}

const SCORED_INTENTS: [(QueryIntent, &[&str]); 9] = [
    (
        QueryIntent::Research,
        &["find land", "parcel", "comparable", "comps", "demographic", "research", "owner"],
    ),
    (
        QueryIntent::Finance,
        &[
            "finance", "underwrite", "pro forma", "proforma", "irr", "returns", "cash flow",
            "loan", "debt", "equity", "dscr", "cap rate", "noi",
        ],
    ),
    (
        QueryIntent::Legal,
        &[
            "contract", "agreement", "lease", "zoning", "permit", "entitlement", "legal",
            "variance", "rezon", "conditional use",
        ],
    ),
    (QueryIntent::Risk, &["risk", "flood", "environmental", "insurance", "assessment", "wetland"]),
    (
        QueryIntent::DueDiligence,
        &["due diligence", "diligence", "title", "survey", "phase i", "checklist", "inspection"],
    ),
    (
        QueryIntent::Tax,
        &[
            "tax", "irc", "irs", "depreciation", "1031", "basis", "recapture", "capital gains",
            "cost seg",
        ],
    ),
    (
        QueryIntent::Design,
        &["design", "site plan", "building", "layout", "architecture", "programming", "parking"],
    ),
    (
        QueryIntent::Operations,
        &["construction", "schedule", "contractor", "budget tracking", "project status"],
    ),
    (
        QueryIntent::Marketing,
        &["market", "lease up", "lease-up", "sale", "disposition", "offering memo", "listing", "buyer"],
    ),
];

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Research => "research",
            Self::Finance => "finance",
            Self::Legal => "legal",
            Self::Risk => "risk",
            Self::DueDiligence => "due_diligence",
            Self::Tax => "tax",
            Self::Design => "design",
            Self::Operations => "operations",
            Self::Marketing => "marketing",
        }
    }

    /// Keyword-scores `query` against every intent. Ties go to the intent listed first;
    /// no hits is `General`.
    pub fn classify(query: &str) -> Self {
        let normalized = normalize_text(query);
        let mut best = (Self::General, 0usize);
        for (intent, keywords) in SCORED_INTENTS {
            let score = keywords.iter().filter(|keyword| normalized.contains(**keyword)).count();
            if score > best.1 {
                best = (intent, score);
            }
        }
        best.0
    }

    pub fn profile(&self) -> IntentProfile {
        use AgentKey::*;

        let (specialists, planner_context): (Vec<AgentKey>, Option<&'static str>) = match self {
            Self::General => (AgentKey::ALL.to_vec(), None),
            Self::Research => (
                vec![Research, MarketIntel, Risk, Finance],
                Some("Start with parcel and market facts. Bring in risk and finance only once the site is identified."),
            ),
            Self::Finance => (
                vec![Finance, TaxStrategist, Legal, Risk],
                Some("Lead with the numbers. State every underwriting assumption and show debt sizing against each constraint."),
            ),
            Self::Legal => (
                vec![Entitlements, Legal, Finance, Research],
                Some("Identify the zoning district and the entitlement path first, then the approval odds and timeline."),
            ),
            Self::Risk => (
                vec![Risk, DueDiligence, Research, Finance, Legal],
                Some("Rank risks by likelihood and impact and pair each with a mitigation."),
            ),
            Self::DueDiligence => (
                vec![DueDiligence, Risk, Legal, Entitlements],
                Some("Work from the diligence checklist. Call out missing documents and expired reports."),
            ),
            Self::Tax => (
                vec![TaxStrategist, Finance, Legal],
                Some("Frame tax guidance as options with their requirements; flag items needing CPA review."),
            ),
            Self::Design => (
                vec![Design, Entitlements, Legal, Research],
                Some("Check the site plan against setbacks, parking and permitted uses before estimating cost."),
            ),
            Self::Operations => (
                vec![Operations, Finance, Risk],
                Some("Anchor on schedule and budget variance; surface blockers with owners."),
            ),
            Self::Marketing => (
                vec![Marketing, MarketIntel, Research, Finance],
                Some("Position the deal against current market conditions and the most likely buyer pool."),
            ),
        };
        IntentProfile { specialists, planner_context }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}
