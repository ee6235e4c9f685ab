use serde::Serialize;

use crate::catalog::AgentKey;

/// Tool exposed to an agent. Execution lives behind the model runtime; the catalog only
/// declares what each agent may call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

const fn tool(name: &'static str, description: &'static str) -> ToolSpec {
    ToolSpec { name, description }
}

const WEB_SEARCH: ToolSpec = tool("web_search", "Search the public web");

const COORDINATOR_TOOLS: &[ToolSpec] = &[
    tool("get_deal_status", "Load a deal with its open tasks and recent outputs"),
    tool("update_deal_status", "Move a deal to another pipeline stage"),
    tool("create_task", "Create a task on a deal"),
    tool("route_to_agents", "Score the query against specialist categories"),
    WEB_SEARCH,
];

const RESEARCH_TOOLS: &[ToolSpec] = &[
    tool("search_parcels", "Find parcels by address, owner or bounding box"),
    tool("get_parcel_details", "Load zoning, acreage and flood data for a parcel"),
    tool("find_comparables", "Find comparable sales near a parcel"),
    WEB_SEARCH,
];

const FINANCE_TOOLS: &[ToolSpec] = &[
    tool("calculate_proforma", "Build a pro forma with NOI, IRR and equity multiple"),
    tool("calculate_debt_sizing", "Size a loan from DSCR, LTV and debt yield constraints"),
    tool("run_sensitivity", "Vary rent, cap rate and cost inputs"),
];

const LEGAL_TOOLS: &[ToolSpec] = &[
    tool("lookup_zoning_code", "Look up permitted uses for a zoning district"),
    tool("review_contract_terms", "Summarize key terms of a PSA, LOI or lease"),
];

const DESIGN_TOOLS: &[ToolSpec] = &[
    tool("estimate_construction_cost", "Estimate hard and soft costs by building type"),
    tool("calculate_parking", "Compute required parking for a use mix"),
];

const OPERATIONS_TOOLS: &[ToolSpec] = &[
    tool("build_schedule", "Lay out construction phases and durations"),
    tool("track_budget", "Compare committed costs to budget categories"),
];

const MARKETING_TOOLS: &[ToolSpec] = &[
    tool("draft_listing", "Draft a listing or offering memo section"),
    tool("identify_buyers", "Match the deal against the buyer list"),
];

const TAX_TOOLS: &[ToolSpec] = &[
    tool("estimate_depreciation", "Estimate depreciation and cost segregation benefit"),
    tool("evaluate_1031_exchange", "Check 1031 exchange timing and eligibility"),
    WEB_SEARCH,
];

const RISK_TOOLS: &[ToolSpec] = &[
    tool("assess_flood_risk", "Summarize FEMA flood zone exposure"),
    tool("assess_environmental_risk", "Summarize environmental findings"),
    tool("score_risk_matrix", "Score likelihood and impact across risk categories"),
];

const DUE_DILIGENCE_TOOLS: &[ToolSpec] = &[
    tool("build_dd_checklist", "Create a due diligence checklist for the deal type"),
    tool("list_deal_documents", "List uploaded documents by kind"),
];

const ENTITLEMENTS_TOOLS: &[ToolSpec] = &[
    tool("get_parish_pack", "Load the jurisdiction's regulatory briefing"),
    tool("recommend_entitlement_strategy", "Rank entitlement strategies for the deal"),
    tool("lookup_hearing_calendar", "Find upcoming planning commission hearings"),
];

const MARKET_INTEL_TOOLS: &[ToolSpec] = &[
    tool("get_market_snapshot", "Load absorption, vacancy and rent trends"),
    WEB_SEARCH,
];

const DEAL_SCREENER_TOOLS: &[ToolSpec] = &[
    tool("score_parcel", "Run weighted triage scoring across eight dimensions"),
    tool("record_triage_decision", "Record a KILL/HOLD/ADVANCE decision"),
];

pub fn coordinator_tools() -> Vec<ToolSpec> {
    COORDINATOR_TOOLS.to_vec()
}

pub fn tools_for(key: AgentKey) -> Vec<ToolSpec> {
    let tools = match key {
        AgentKey::Research => RESEARCH_TOOLS,
        AgentKey::Finance => FINANCE_TOOLS,
        AgentKey::Legal => LEGAL_TOOLS,
        AgentKey::Design => DESIGN_TOOLS,
        AgentKey::Operations => OPERATIONS_TOOLS,
        AgentKey::Marketing => MARKETING_TOOLS,
        AgentKey::TaxStrategist => TAX_TOOLS,
        AgentKey::Risk => RISK_TOOLS,
        AgentKey::DueDiligence => DUE_DILIGENCE_TOOLS,
        AgentKey::Entitlements => ENTITLEMENTS_TOOLS,
        AgentKey::MarketIntel => MARKET_INTEL_TOOLS,
        AgentKey::DealScreener => DEAL_SCREENER_TOOLS,
    };
    tools.to_vec()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{coordinator_tools, tools_for};
    use crate::catalog::AgentKey;

    #[test]
    fn every_specialist_declares_unique_tools() {
        for key in AgentKey::ALL {
            let tools = tools_for(key);
            assert!(!tools.is_empty(), "{key:?} has no tools");
            let names: BTreeSet<_> = tools.iter().map(|tool| tool.name).collect();
            assert_eq!(names.len(), tools.len(), "{key:?} repeats a tool");
        }
        assert!(coordinator_tools().iter().any(|tool| tool.name == "route_to_agents"));
    }
}
