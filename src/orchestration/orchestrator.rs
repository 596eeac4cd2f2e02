// Orchestrator - compiles a stage graph and runs it with conditional fan-out

use super::stages::{Stage, StageError};
use super::types::{InteractionState, StageId, StateField, StateUpdate};
use futures_util::future::try_join_all;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Picks the next stages from the current state. Evaluated once per run.
pub type DecisionFn = Arc<dyn Fn(&InteractionState) -> BTreeSet<StageId> + Send + Sync>;

struct ConditionalEdge {
    decide: DecisionFn,
    candidates: BTreeSet<StageId>,
    default: StageId,
}

/// Graph builder. Nothing is validated until [`Orchestrator::compile`].
#[derive(Default)]
pub struct Orchestrator {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    edges: HashMap<StageId, BTreeSet<StageId>>,
    conditionals: HashMap<StageId, ConditionalEdge>,
    problems: Vec<ConfigurationError>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_stage(&mut self, id: impl Into<StageId>, stage: Arc<dyn Stage>) -> &mut Self {
        let id = id.into();
        tracing::debug!(stage = %id, description = stage.description(), "stage registered");
        if self.stages.insert(id.clone(), stage).is_some() {
            self.problems.push(ConfigurationError::DuplicateStage(id));
        }
        self
    }

    pub fn add_edge(&mut self, from: impl Into<StageId>, to: impl Into<StageId>) -> &mut Self {
        self.edges.entry(from.into()).or_default().insert(to.into());
        self
    }

    /// Route from `from` to whatever `decide` returns, restricted to `candidates`.
    ///
    /// An empty decision routes to `default`, which must itself be a candidate.
    pub fn add_conditional_edge<F, I, S>(
        &mut self,
        from: impl Into<StageId>,
        decide: F,
        candidates: I,
        default: impl Into<StageId>,
    ) -> &mut Self
    where
        F: Fn(&InteractionState) -> BTreeSet<StageId> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        let from = from.into();
        let edge = ConditionalEdge {
            decide: Arc::new(decide),
            candidates: candidates.into_iter().map(Into::into).collect(),
            default: default.into(),
        };
        if self.conditionals.insert(from.clone(), edge).is_some() {
            self.problems
                .push(ConfigurationError::DuplicateConditional(from));
        }
        self
    }

    /// Validate the graph and freeze it
    pub fn compile(mut self) -> Result<CompiledOrchestrator, ConfigurationError> {
        if let Some(problem) = self.problems.drain(..).next() {
            return Err(problem);
        }

        // Every referenced stage must be registered
        for (from, targets) in &self.edges {
            self.require(from)?;
            for to in targets {
                self.require(to)?;
            }
        }
        for (from, edge) in &self.conditionals {
            self.require(from)?;
            for candidate in &edge.candidates {
                self.require(candidate)?;
            }
            if !edge.candidates.contains(&edge.default) {
                return Err(ConfigurationError::DefaultNotCandidate {
                    from: from.clone(),
                    default: edge.default.clone(),
                });
            }
        }

        let successors = self.all_successors();
        let start = self.find_start(&successors)?;
        check_acyclic(&self.stages, &successors)?;

        let descendants = descendants(&self.stages, &successors);
        let reachable = descendants.get(&start).cloned().unwrap_or_default();
        let mut unreachable: Vec<&StageId> = self
            .stages
            .keys()
            .filter(|id| **id != start && !reachable.contains(*id))
            .collect();
        unreachable.sort();
        if let Some(id) = unreachable.first() {
            return Err(ConfigurationError::Unreachable((*id).clone()));
        }

        tracing::debug!(start = %start, stages = self.stages.len(), "orchestration graph compiled");

        Ok(CompiledOrchestrator {
            stages: self.stages,
            edges: self.edges,
            conditionals: self.conditionals,
            descendants,
            start,
        })
    }

    fn require(&self, id: &StageId) -> Result<(), ConfigurationError> {
        if self.stages.contains_key(id) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownStage(id.clone()))
        }
    }

    /// Static edges plus every conditional candidate
    fn all_successors(&self) -> HashMap<StageId, BTreeSet<StageId>> {
        let mut successors: HashMap<StageId, BTreeSet<StageId>> = self.edges.clone();
        for (from, edge) in &self.conditionals {
            successors
                .entry(from.clone())
                .or_default()
                .extend(edge.candidates.iter().cloned());
        }
        successors
    }

    fn find_start(
        &self,
        successors: &HashMap<StageId, BTreeSet<StageId>>,
    ) -> Result<StageId, ConfigurationError> {
        let targeted: HashSet<&StageId> = successors.values().flatten().collect();
        let mut starts: Vec<StageId> = self
            .stages
            .keys()
            .filter(|id| !targeted.contains(id))
            .cloned()
            .collect();
        starts.sort();

        match starts.len() {
            0 => Err(ConfigurationError::NoStart),
            1 => Ok(starts.remove(0)),
            _ => Err(ConfigurationError::MultipleStarts(starts)),
        }
    }
}

fn check_acyclic(
    stages: &HashMap<StageId, Arc<dyn Stage>>,
    successors: &HashMap<StageId, BTreeSet<StageId>>,
) -> Result<(), ConfigurationError> {
    let mut in_degree: HashMap<&StageId, usize> = stages.keys().map(|id| (id, 0)).collect();
    for to in successors.values().flatten() {
        if let Some(degree) = in_degree.get_mut(to) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&StageId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for to in successors.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(to) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(to);
                }
            }
        }
    }

    if visited == stages.len() {
        return Ok(());
    }

    let mut cyclic: Vec<&StageId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree > 0)
        .map(|(id, _)| *id)
        .collect();
    cyclic.sort();
    Err(ConfigurationError::Cycle(
        cyclic.first().map(|id| (*id).clone()).unwrap_or_else(|| StageId::new("?")),
    ))
}

/// Every stage reachable from each stage, itself excluded
fn descendants(
    stages: &HashMap<StageId, Arc<dyn Stage>>,
    successors: &HashMap<StageId, BTreeSet<StageId>>,
) -> HashMap<StageId, HashSet<StageId>> {
    stages
        .keys()
        .map(|id| {
            let mut seen: HashSet<StageId> = HashSet::new();
            let mut stack: Vec<&StageId> = successors.get(id).into_iter().flatten().collect();
            while let Some(next) = stack.pop() {
                if seen.insert(next.clone()) {
                    stack.extend(successors.get(next).into_iter().flatten());
                }
            }
            (id.clone(), seen)
        })
        .collect()
}

/// Final state plus the stages that ran, in execution order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: InteractionState,
    pub executed: Vec<StageId>,
}

/// A validated, immutable stage graph
pub struct CompiledOrchestrator {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    edges: HashMap<StageId, BTreeSet<StageId>>,
    conditionals: HashMap<StageId, ConditionalEdge>,
    descendants: HashMap<StageId, HashSet<StageId>>,
    start: StageId,
}

impl CompiledOrchestrator {
    pub fn start(&self) -> &StageId {
        &self.start
    }

    pub async fn run(&self, state: InteractionState) -> Result<InteractionState, EngineError> {
        Ok(self.run_traced(state).await?.state)
    }

    /// Run breadth-first from the start stage.
    ///
    /// Each step runs its ready stages concurrently and fails fast. A stage
    /// downstream of another ready stage waits, so a join runs only after
    /// every branch scheduled above it in this run has completed.
    pub async fn run_traced(&self, mut state: InteractionState) -> Result<RunReport, EngineError> {
        let mut executed: Vec<StageId> = Vec::new();
        let mut completed: HashSet<StageId> = HashSet::new();
        let mut ready: BTreeSet<StageId> = BTreeSet::from([self.start.clone()]);

        while !ready.is_empty() {
            let (runnable, waiting) = self.split_ready(ready);
            tracing::debug!(session_id = %state.session_id, stages = ?runnable, "running step");

            let updates = try_join_all(runnable.iter().map(|id| self.execute(id, &state))).await?;

            for (id, update) in runnable.iter().zip(updates) {
                state.apply(update);
                completed.insert(id.clone());
                executed.push(id.clone());
            }

            let mut next = waiting;
            for id in &runnable {
                for successor in self.next_stages(id, &state)? {
                    if !completed.contains(&successor) {
                        next.insert(successor);
                    }
                }
            }
            ready = next;
        }

        tracing::info!(session_id = %state.session_id, stages = ?executed, "orchestration finished");
        Ok(RunReport { state, executed })
    }

    /// Split ready stages into those runnable now and those downstream of another ready stage
    fn split_ready(&self, ready: BTreeSet<StageId>) -> (Vec<StageId>, BTreeSet<StageId>) {
        let (waiting, runnable): (BTreeSet<StageId>, BTreeSet<StageId>) =
            ready.iter().cloned().partition(|candidate| {
                ready.iter().any(|other| {
                    other != candidate
                        && self
                            .descendants
                            .get(other)
                            .is_some_and(|below| below.contains(candidate))
                })
            });
        (runnable.into_iter().collect(), waiting)
    }

    async fn execute(
        &self,
        id: &StageId,
        state: &InteractionState,
    ) -> Result<StateUpdate, EngineError> {
        let stage = self
            .stages
            .get(id)
            .ok_or_else(|| EngineError::UnregisteredStage(id.clone()))?;

        let update = stage.run(state).await.map_err(|source| {
            tracing::error!(session_id = %state.session_id, stage = %id, error = %source, "stage failed");
            EngineError::Stage {
                stage: id.clone(),
                source,
            }
        })?;

        let declared = stage.writes();
        if let Some(field) = update.touched().into_iter().find(|f| !declared.contains(f)) {
            return Err(EngineError::UndeclaredWrite {
                stage: id.clone(),
                field,
            });
        }

        tracing::debug!(session_id = %state.session_id, stage = %id, "stage complete");
        Ok(update)
    }

    fn next_stages(
        &self,
        id: &StageId,
        state: &InteractionState,
    ) -> Result<BTreeSet<StageId>, EngineError> {
        let mut next: BTreeSet<StageId> = self.edges.get(id).cloned().unwrap_or_default();

        if let Some(edge) = self.conditionals.get(id) {
            let mut chosen = (edge.decide)(state);
            if chosen.is_empty() {
                chosen.insert(edge.default.clone());
            }
            if let Some(target) = chosen.iter().find(|t| !edge.candidates.contains(*t)) {
                return Err(EngineError::UnknownRoute {
                    from: id.clone(),
                    target: target.clone(),
                });
            }
            tracing::info!(session_id = %state.session_id, from = %id, route = ?chosen, "routing decision");
            next.extend(chosen);
        }

        Ok(next)
    }
}

/// Malformed graph. Raised by [`Orchestrator::compile`], never during a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Stage registered twice: {0}")]
    DuplicateStage(StageId),

    #[error("Stage {0} has more than one conditional edge")]
    DuplicateConditional(StageId),

    #[error("Edge references unregistered stage: {0}")]
    UnknownStage(StageId),

    #[error("Default route {default} from {from} is not one of its candidates")]
    DefaultNotCandidate { from: StageId, default: StageId },

    #[error("Graph has no start stage")]
    NoStart,

    #[error("Graph has more than one start stage: {0:?}")]
    MultipleStarts(Vec<StageId>),

    #[error("Stage {0} is unreachable from the start stage")]
    Unreachable(StageId),

    #[error("Graph contains a cycle through {0}")]
    Cycle(StageId),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Stage {stage} failed: {source}")]
    Stage { stage: StageId, source: StageError },

    /// Only reachable by scheduling a stage the compiled graph does not hold
    #[error("Stage {0} is not registered")]
    UnregisteredStage(StageId),

    #[error("Route from {from} selected {target}, which is not a candidate")]
    UnknownRoute { from: StageId, target: StageId },

    #[error("Stage {stage} wrote undeclared field {field:?}")]
    UndeclaredWrite { stage: StageId, field: StateField },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::stages::FnStage;
    use crate::orchestration::types::ClassificationResult;
    use std::sync::Mutex;
    use std::time::Duration;

    fn noop(writes: &'static [StateField]) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(writes, |_| async { Ok(StateUpdate::default()) }))
    }

    fn writer(field: StateField, text: &'static str) -> Arc<dyn Stage> {
        let writes: &'static [StateField] = match field {
            StateField::GeneralResponse => &[StateField::GeneralResponse],
            StateField::CompanyResponse => &[StateField::CompanyResponse],
            _ => &[StateField::FinalResponse],
        };
        Arc::new(FnStage::new(writes, move |_| async move {
            Ok(match field {
                StateField::GeneralResponse => StateUpdate::general_response(text),
                StateField::CompanyResponse => StateUpdate::company_response(text),
                _ => StateUpdate::final_response(text),
            })
        }))
    }

    #[test]
    fn test_compile_rejects_unregistered_candidate() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("a", noop(&[]))
            .register_stage("b", noop(&[]))
            .add_conditional_edge("a", |_| BTreeSet::new(), ["b", "ghost"], "b");

        assert_eq!(
            graph.compile().err(),
            Some(ConfigurationError::UnknownStage(StageId::new("ghost")))
        );
    }

    #[tokio::test]
    async fn test_execute_reports_unregistered_stage() {
        let mut graph = Orchestrator::new();
        graph.register_stage("only", noop(&[]));
        let compiled = graph.compile().unwrap();

        let err = compiled
            .execute(&StageId::new("ghost"), &InteractionState::new("s", "t", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnregisteredStage(id) if id == StageId::new("ghost")));
    }

    #[test]
    fn test_compile_rejects_multiple_starts() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("a", noop(&[]))
            .register_stage("b", noop(&[]))
            .register_stage("c", noop(&[]))
            .add_edge("a", "c")
            .add_edge("b", "c");

        assert!(matches!(
            graph.compile(),
            Err(ConfigurationError::MultipleStarts(starts)) if starts.len() == 2
        ));
    }

    #[test]
    fn test_compile_rejects_cycle_and_unreachable() {
        let mut cyclic = Orchestrator::new();
        cyclic
            .register_stage("start", noop(&[]))
            .register_stage("x", noop(&[]))
            .register_stage("y", noop(&[]))
            .add_edge("start", "x")
            .add_edge("x", "y")
            .add_edge("y", "x");
        assert!(matches!(cyclic.compile(), Err(ConfigurationError::Cycle(_))));

        let mut island = Orchestrator::new();
        island
            .register_stage("start", noop(&[]))
            .register_stage("p", noop(&[]))
            .register_stage("q", noop(&[]))
            .add_edge("p", "q")
            .add_edge("q", "p");
        // p and q only point at each other, so "start" is the sole zero in-degree node
        assert!(island.compile().is_err());
    }

    #[test]
    fn test_compile_requires_default_among_candidates() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("a", noop(&[]))
            .register_stage("b", noop(&[]))
            .register_stage("c", noop(&[]))
            .add_edge("a", "c")
            .add_conditional_edge("a", |_| BTreeSet::new(), ["b"], "c");

        assert!(matches!(
            graph.compile(),
            Err(ConfigurationError::DefaultNotCandidate { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_duplicate_stage() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("a", noop(&[]))
            .register_stage("a", noop(&[]));
        assert_eq!(
            graph.compile().err(),
            Some(ConfigurationError::DuplicateStage(StageId::new("a")))
        );
    }

    #[tokio::test]
    async fn test_empty_decision_routes_to_default() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("start", noop(&[]))
            .register_stage("branch", writer(StateField::FinalResponse, "branch"))
            .register_stage("fallback", writer(StateField::FinalResponse, "fallback"))
            .add_conditional_edge("start", |_| BTreeSet::new(), ["branch", "fallback"], "fallback");
        let compiled = graph.compile().unwrap();

        let report = compiled
            .run_traced(InteractionState::new("s", "t", "q"))
            .await
            .unwrap();
        assert_eq!(report.state.final_response.as_deref(), Some("fallback"));
        assert_eq!(
            report.executed,
            vec![StageId::new("start"), StageId::new("fallback")]
        );
    }

    #[tokio::test]
    async fn test_join_waits_for_longer_branch() {
        // start -> {short, long1}; long1 -> long2; short, long2 -> join
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let recorder = |name: &'static str, delay: u64| -> Arc<dyn Stage> {
            let order = order.clone();
            Arc::new(FnStage::new(&[], move |_| {
                let order = order.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    order.lock().unwrap().push(name);
                    Ok(StateUpdate::default())
                }
            }))
        };

        let mut graph = Orchestrator::new();
        graph
            .register_stage("start", recorder("start", 0))
            .register_stage("short", recorder("short", 0))
            .register_stage("long1", recorder("long1", 20))
            .register_stage("long2", recorder("long2", 20))
            .register_stage("join", recorder("join", 0))
            .add_conditional_edge(
                "start",
                |_| BTreeSet::from([StageId::new("short"), StageId::new("long1")]),
                ["short", "long1"],
                "short",
            )
            .add_edge("long1", "long2")
            .add_edge("short", "join")
            .add_edge("long2", "join");
        let compiled = graph.compile().unwrap();

        let report = compiled
            .run_traced(InteractionState::new("s", "t", "q"))
            .await
            .unwrap();

        let order = order.lock().unwrap().clone();
        assert_eq!(order.last(), Some(&"join"));
        assert_eq!(order.iter().filter(|n| **n == "join").count(), 1);
        assert_eq!(report.executed.len(), 5);
    }

    #[tokio::test]
    async fn test_fan_out_runs_concurrently() {
        let slow = |field: StateField| -> Arc<dyn Stage> {
            let writes: &'static [StateField] = match field {
                StateField::GeneralResponse => &[StateField::GeneralResponse],
                _ => &[StateField::CompanyResponse],
            };
            Arc::new(FnStage::new(writes, move |_| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(match field {
                    StateField::GeneralResponse => StateUpdate::general_response("g"),
                    _ => StateUpdate::company_response("c"),
                })
            }))
        };

        let mut graph = Orchestrator::new();
        graph
            .register_stage("start", noop(&[]))
            .register_stage("g", slow(StateField::GeneralResponse))
            .register_stage("c", slow(StateField::CompanyResponse))
            .add_conditional_edge(
                "start",
                |_| BTreeSet::from([StageId::new("g"), StageId::new("c")]),
                ["g", "c"],
                "g",
            );
        let compiled = graph.compile().unwrap();

        let began = std::time::Instant::now();
        let state = compiled.run(InteractionState::new("s", "t", "q")).await.unwrap();
        assert!(began.elapsed() < Duration::from_millis(190));
        assert_eq!(state.general_response.as_deref(), Some("g"));
        assert_eq!(state.company_response.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_run() {
        let failing: Arc<dyn Stage> = Arc::new(FnStage::new(&[], |_| async {
            Err(StageError::Processing("boom".to_string()))
        }));
        let mut graph = Orchestrator::new();
        graph
            .register_stage("start", noop(&[]))
            .register_stage("bad", failing)
            .register_stage("after", writer(StateField::FinalResponse, "never"))
            .add_edge("start", "bad")
            .add_edge("bad", "after");
        let compiled = graph.compile().unwrap();

        let err = compiled
            .run(InteractionState::new("s", "t", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Stage { stage, .. } if stage.as_str() == "bad"));
    }

    #[tokio::test]
    async fn test_undeclared_write_rejected() {
        let sneaky: Arc<dyn Stage> = Arc::new(FnStage::new(&[StateField::GeneralResponse], |_| async {
            Ok(StateUpdate::final_response("not mine"))
        }));
        let mut graph = Orchestrator::new();
        graph.register_stage("only", sneaky);
        let compiled = graph.compile().unwrap();

        let err = compiled
            .run(InteractionState::new("s", "t", "q"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UndeclaredWrite { field: StateField::FinalResponse, .. }
        ));
    }

    #[tokio::test]
    async fn test_decision_outside_candidates_is_error() {
        let mut graph = Orchestrator::new();
        graph
            .register_stage("start", noop(&[]))
            .register_stage("a", noop(&[]))
            .register_stage("b", noop(&[]))
            .add_edge("start", "b")
            .add_conditional_edge(
                "start",
                |_| BTreeSet::from([StageId::new("b")]),
                ["a"],
                "a",
            );
        let compiled = graph.compile().unwrap();

        let state = InteractionState::new("s", "t", "q");
        let err = compiled.run(state).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRoute { .. }));
    }

    #[tokio::test]
    async fn test_decision_reads_state_written_before_fan_out() {
        let classify: Arc<dyn Stage> = Arc::new(FnStage::new(&[StateField::Classification], |_| async {
            Ok(StateUpdate::classification(ClassificationResult::new(false, true)))
        }));
        let mut graph = Orchestrator::new();
        graph
            .register_stage("classify", classify)
            .register_stage("general", writer(StateField::GeneralResponse, "g"))
            .register_stage("company", writer(StateField::CompanyResponse, "c"))
            .add_conditional_edge(
                "classify",
                |state| {
                    let mut next = BTreeSet::new();
                    if let Some(c) = state.classification {
                        if c.general {
                            next.insert(StageId::new("general"));
                        }
                        if c.company {
                            next.insert(StageId::new("company"));
                        }
                    }
                    next
                },
                ["general", "company"],
                "general",
            );
        let compiled = graph.compile().unwrap();

        let report = compiled
            .run_traced(InteractionState::new("s", "t", "q"))
            .await
            .unwrap();
        assert_eq!(
            report.executed,
            vec![StageId::new("classify"), StageId::new("company")]
        );
        assert!(report.state.general_response.is_none());
    }
}
