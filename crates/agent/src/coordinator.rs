//! Per-run handoff graph assembly. Every call returns freshly cloned definitions, so runs
//! with different intents never share wiring.

use std::collections::HashSet;

use crate::catalog::{AgentCatalog, AgentDefinition, AgentKey};
use crate::intent::QueryIntent;
use crate::tools::{coordinator_tools, tools_for};

/// Coordinator wired to the specialists of `intent`'s profile. Specialists get their own
/// tools and no handoffs.
pub fn create_intent_aware_coordinator(
    catalog: &AgentCatalog,
    intent: QueryIntent,
) -> AgentDefinition {
    let profile = intent.profile();

    let mut seen = HashSet::new();
    let team: Vec<AgentDefinition> = profile
        .specialists
        .iter()
        .copied()
        .filter(|key| seen.insert(*key))
        .filter_map(|key| specialist_for_run(catalog, key))
        .collect();

    let base = catalog.coordinator();
    let instructions = match profile.planner_context {
        Some(context) => format!("{}\n\n{}", base.instructions, context),
        None => base.instructions.clone(),
    };

    AgentDefinition {
        tools: coordinator_tools(),
        handoffs: team,
        instructions,
        ..base.clone()
    }
}

pub fn create_configured_coordinator(catalog: &AgentCatalog) -> AgentDefinition {
    create_intent_aware_coordinator(catalog, QueryIntent::General)
}

fn specialist_for_run(catalog: &AgentCatalog, key: AgentKey) -> Option<AgentDefinition> {
    catalog.specialist(key).map(|definition| AgentDefinition {
        tools: tools_for(key),
        handoffs: Vec::new(),
        ..definition.clone()
    })
}
