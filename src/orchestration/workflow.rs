// Workflow - the legal assistant's stage graph

use super::orchestrator::{CompiledOrchestrator, ConfigurationError, Orchestrator};
use super::stages::{
    AggregateStage, ClassifyStage, CompanyResearchStage, FallbackStage, GeneralResearchStage,
    StageServices,
};
use super::types::{InteractionState, StageId};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const CLASSIFY: &str = "classify";
pub const GENERAL_RESEARCH: &str = "general_research";
pub const COMPANY_RESEARCH: &str = "company_research";
pub const AGGREGATE: &str = "aggregate";
pub const FALLBACK: &str = "fallback";

/// Research branches for the classified query. Empty when out of scope.
pub fn route_research(state: &InteractionState) -> BTreeSet<StageId> {
    let mut next = BTreeSet::new();
    let Some(classification) = state.classification else {
        return next;
    };

    if classification.general {
        next.insert(StageId::new(GENERAL_RESEARCH));
    }
    if classification.company {
        next.insert(StageId::new(COMPANY_RESEARCH));
    }
    next
}

/// classify -> {general_research, company_research} -> aggregate, or classify -> fallback
pub fn build_workflow(services: StageServices) -> Result<CompiledOrchestrator, ConfigurationError> {
    let mut graph = Orchestrator::new();

    graph
        .register_stage(CLASSIFY, Arc::new(ClassifyStage::new(services.clone())))
        .register_stage(
            GENERAL_RESEARCH,
            Arc::new(GeneralResearchStage::new(services.clone())),
        )
        .register_stage(
            COMPANY_RESEARCH,
            Arc::new(CompanyResearchStage::new(services.clone())),
        )
        .register_stage(AGGREGATE, Arc::new(AggregateStage::new(services.clone())))
        .register_stage(FALLBACK, Arc::new(FallbackStage::new(services)))
        .add_conditional_edge(
            CLASSIFY,
            route_research,
            [GENERAL_RESEARCH, COMPANY_RESEARCH, FALLBACK],
            FALLBACK,
        )
        .add_edge(GENERAL_RESEARCH, AGGREGATE)
        .add_edge(COMPANY_RESEARCH, AGGREGATE);

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::ClassificationResult;

    fn classified(general: bool, company: bool) -> InteractionState {
        let mut state = InteractionState::new("s", "t", "q");
        state.classification = Some(ClassificationResult::new(general, company));
        state
    }

    #[test]
    fn test_route_research() {
        assert!(route_research(&classified(false, false)).is_empty());
        assert!(route_research(&InteractionState::new("s", "t", "q")).is_empty());
        assert_eq!(
            route_research(&classified(true, false)),
            BTreeSet::from([StageId::new(GENERAL_RESEARCH)])
        );
        assert_eq!(route_research(&classified(true, true)).len(), 2);
    }
}
