//! Static agent definitions. Definitions are immutable values; per-run wiring lives in
//! [`crate::coordinator`].

use serde::{Deserialize, Serialize};

use crate::tools::ToolSpec;

pub const COORDINATOR_NAME: &str = "Coordinator";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKey {
    Research,
    Finance,
    Legal,
    Design,
    Operations,
    Marketing,
    TaxStrategist,
    Risk,
    DueDiligence,
    Entitlements,
    MarketIntel,
    DealScreener,
}

impl AgentKey {
    pub const ALL: [AgentKey; 12] = [
        Self::Research,
        Self::Finance,
        Self::Legal,
        Self::Design,
        Self::Operations,
        Self::Marketing,
        Self::TaxStrategist,
        Self::Risk,
        Self::DueDiligence,
        Self::Entitlements,
        Self::MarketIntel,
        Self::DealScreener,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Finance => "finance",
            Self::Legal => "legal",
            Self::Design => "design",
            Self::Operations => "operations",
            Self::Marketing => "marketing",
            Self::TaxStrategist => "tax_strategist",
            Self::Risk => "risk",
            Self::DueDiligence => "due_diligence",
            Self::Entitlements => "entitlements",
            Self::MarketIntel => "market_intel",
            Self::DealScreener => "deal_screener",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Research => "Research Agent",
            Self::Finance => "Finance Agent",
            Self::Legal => "Legal Agent",
            Self::Design => "Design Agent",
            Self::Operations => "Operations Agent",
            Self::Marketing => "Marketing Agent",
            Self::TaxStrategist => "Tax Strategist",
            Self::Risk => "Risk Agent",
            Self::DueDiligence => "Due Diligence",
            Self::Entitlements => "Entitlements & Permits",
            Self::MarketIntel => "Market Intelligence",
            Self::DealScreener => "Deal Screener",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::Research => {
                "You research land and parcels: ownership, zoning, acreage, flood exposure, \
                 comparable sales and demographics. Cite the source of every data point."
            }
            Self::Finance => {
                "You underwrite deals. Build pro formas, size debt against DSCR, LTV and debt \
                 yield limits, and report IRR, equity multiple and cash-on-cash returns."
            }
            Self::Legal => {
                "You review zoning codes, purchase agreements, leases and easements. Flag \
                 restrictions that block the intended use."
            }
            Self::Design => {
                "You plan sites: building footprint, parking, access and construction cost \
                 estimates for the intended product type."
            }
            Self::Operations => {
                "You manage execution: construction schedules, contractor coordination and \
                 budget tracking against committed costs."
            }
            Self::Marketing => {
                "You prepare dispositions and lease-up: listings, offering memo sections and \
                 buyer targeting."
            }
            Self::TaxStrategist => {
                "You advise on tax structure: depreciation, cost segregation, 1031 exchanges and \
                 capital gains exposure. Note when a CPA must confirm."
            }
            Self::Risk => {
                "You assess flood, environmental, insurance and market risk and score each on \
                 likelihood and impact."
            }
            Self::DueDiligence => {
                "You run due diligence: checklists, document gaps, title and survey review \
                 status and outstanding third-party reports."
            }
            Self::Entitlements => {
                "You plan entitlements: permitted-by-right uses, variances, conditional use \
                 permits and rezonings, hearing calendars and approval odds."
            }
            Self::MarketIntel => {
                "You track market conditions: absorption, vacancy, rent growth and competing \
                 supply for the deal's product type."
            }
            Self::DealScreener => {
                "You triage new parcels with the eight-dimension weighted score and recommend \
                 KILL, HOLD or ADVANCE with reasons."
            }
        }
    }

    fn uses_flagship_model(&self) -> bool {
        matches!(self, Self::Finance | Self::Entitlements | Self::TaxStrategist)
    }
}

/// An agent as handed to the model runtime.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub key: Option<AgentKey>,
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
    pub handoffs: Vec<AgentDefinition>,
}

impl AgentDefinition {
    pub fn handoff_names(&self) -> Vec<&str> {
        self.handoffs.iter().map(|agent| agent.name.as_str()).collect()
    }

    /// Name of the agent reachable from this one, matched case-insensitively.
    pub fn find_handoff(&self, name: &str) -> Option<&AgentDefinition> {
        self.handoffs.iter().find(|agent| agent.name.eq_ignore_ascii_case(name))
    }
}

const COORDINATOR_INSTRUCTIONS: &str = "You coordinate an entitlement and development team. \
Understand the request, load the deal when one is referenced, and hand off to the specialist \
best suited to answer. Combine specialist findings into one answer with concrete next steps. \
Never invent parcel data, approvals or financial figures.";

/// Base definitions for the coordinator and every specialist. Tools and handoffs are empty
/// here; assembly attaches them per run.
#[derive(Clone, Debug)]
pub struct AgentCatalog {
    coordinator: AgentDefinition,
    specialists: Vec<AgentDefinition>,
}

impl AgentCatalog {
    pub fn new(flagship_model: &str, standard_model: &str) -> Self {
        let coordinator = AgentDefinition {
            key: None,
            name: COORDINATOR_NAME.to_string(),
            model: flagship_model.to_string(),
            instructions: COORDINATOR_INSTRUCTIONS.to_string(),
            tools: Vec::new(),
            handoffs: Vec::new(),
        };
        let specialists = AgentKey::ALL
            .iter()
            .map(|key| AgentDefinition {
                key: Some(*key),
                name: key.display_name().to_string(),
                model: if key.uses_flagship_model() { flagship_model } else { standard_model }
                    .to_string(),
                instructions: key.instructions().to_string(),
                tools: Vec::new(),
                handoffs: Vec::new(),
            })
            .collect();
        Self { coordinator, specialists }
    }

    pub fn coordinator(&self) -> &AgentDefinition {
        &self.coordinator
    }

    pub fn specialist(&self, key: AgentKey) -> Option<&AgentDefinition> {
        self.specialists.iter().find(|agent| agent.key == Some(key))
    }
}
