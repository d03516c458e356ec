//! The top-level pipeline driver.
//!
//! A [`Pipeline`] owns the stage registry, the delivery dispatcher, the
//! inspector, and a snapshot of the built plan. The driver moves through a
//! small state machine:
//!
//! - **Building**: inputs may be seeded and stages registered.
//! - **Inspected**: the plan is built and cached; any structural mutation
//!   falls back to Building and invalidates the cache.
//! - **Running**: stages execute in order; mutation is rejected.
//! - **Done**: outputs are retrievable; re-running re-inspects first.
//!
//! Stages execute sequentially on the caller's thread. A stage whose
//! `parallel` flag is set runs its factories on a rayon worker pool, which
//! is safe because dependency inference never binds factories within one
//! stage to each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sluice_core::observability::stage_span;
use sluice_core::{Delivery, FactoryClass, TypeToken};

use crate::config::PipelineConfig;
use crate::dispatcher::DeliverableDispatcher;
use crate::error::{Error, Result};
use crate::factory::{AnyFactory, Factory, LifecycleFailure, LifecycleTimings};
use crate::inspector::PipelineInspector;
use crate::metrics::FlowMetrics;
use crate::optimizer::{PipelineOptimizer, StageAssignment, StageMergeOptimizer};
use crate::plan::{ExecutionPlan, NodeId};
use crate::report::{BenchmarkRow, RunReport, RunState};
use crate::stage::Stage;

/// A cooperative cancellation flag.
///
/// Clone the token and hand it to whatever should be able to stop the run;
/// the pipeline checks it between stages, so in-flight factories finish
/// and partial outputs stay in the registry.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The pipeline driver's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Inputs and stages may be registered.
    Building,
    /// The plan is built and cached.
    Inspected,
    /// Stages are executing; mutation is rejected.
    Running,
    /// The last run completed; outputs are retrievable.
    Done,
}

impl PipelineState {
    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Building => matches!(target, Self::Inspected),
            Self::Inspected => matches!(target, Self::Building | Self::Running),
            Self::Running => matches!(target, Self::Done),
            Self::Done => matches!(target, Self::Building | Self::Inspected),
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Inspected => write!(f, "inspected"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// The top-level driver: seeds inputs, registers stages, runs, and exposes
/// outputs.
pub struct Pipeline {
    stages: Vec<Stage>,
    dispatcher: DeliverableDispatcher,
    inspector: PipelineInspector,
    optimizer: Option<Box<dyn PipelineOptimizer>>,
    config: PipelineConfig,
    state: PipelineState,
    plan: Option<ExecutionPlan>,
    metrics: FlowMetrics,
    last_report: Option<RunReport>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates an empty pipeline with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Creates an empty pipeline with the given configuration.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            stages: Vec::new(),
            dispatcher: DeliverableDispatcher::new(),
            inspector: PipelineInspector::new(),
            optimizer: None,
            config,
            state: PipelineState::Building,
            plan: None,
            metrics: FlowMetrics::new(),
            last_report: None,
        }
    }

    /// Returns the driver's current state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the pipeline's dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &DeliverableDispatcher {
        &self.dispatcher
    }

    /// Returns the report of the most recent run, if any.
    #[must_use]
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Installs a custom optimizer, replacing the configured default.
    pub fn set_optimizer(&mut self, optimizer: Box<dyn PipelineOptimizer>) -> &mut Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Registers a pre-built delivery envelope as a pipeline input.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running or the envelope is a
    /// duplicate.
    pub fn set_input_delivery(&mut self, delivery: Delivery) -> Result<&mut Self> {
        self.ensure_mutable("input seeding")?;
        self.dispatcher.add_deliverable(delivery)?;
        Ok(self)
    }

    /// Seeds a value as an any-consumer input with the default delivery id.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running.
    pub fn set_input<T: Send + Sync + 'static>(&mut self, value: T) -> Result<&mut Self> {
        self.set_input_delivery(Delivery::new(value))
    }

    /// Seeds a value under an explicit delivery id.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running.
    pub fn set_input_with_id<T: Send + Sync + 'static>(
        &mut self,
        value: T,
        delivery_id: impl Into<String>,
    ) -> Result<&mut Self> {
        self.set_input_delivery(Delivery::new(value).with_delivery_id(delivery_id))
    }

    /// Seeds a value scoped to a single consumer class.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running.
    pub fn set_input_for<C: 'static, T: Send + Sync + 'static>(
        &mut self,
        value: T,
    ) -> Result<&mut Self> {
        self.set_input_delivery(Delivery::new(value).with_consumer::<C>())
    }

    /// Registers a stage after the existing ones.
    ///
    /// The previous end stage loses its end marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running.
    pub fn add_stage(&mut self, mut stage: Stage) -> Result<&mut Self> {
        self.ensure_mutable("stage registration")?;
        if let Some(previous) = self.stages.last_mut() {
            previous.end = false;
        }
        stage.end = true;
        self.stages.push(stage);
        Ok(self)
    }

    /// Registers a factory as its own single-factory stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running or the factory's slot
    /// declarations are invalid.
    pub fn add_factory<F: Factory>(&mut self, factory: F) -> Result<&mut Self> {
        let stage = Stage::new().add_factory(factory)?;
        self.add_stage(stage)
    }

    /// Constructs a factory from its `Default` and registers it as its own
    /// stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is running or the factory's slot
    /// declarations are invalid.
    pub fn add_stage_of<F: Factory + Default>(&mut self) -> Result<&mut Self> {
        self.add_factory(F::default())
    }

    /// Builds (or returns the cached) execution plan.
    ///
    /// Inspection is idempotent: without structural mutation, repeated
    /// calls return an identical plan.
    ///
    /// # Errors
    ///
    /// Returns an error if a required slot is unsatisfied or ambiguous.
    pub fn inspect(&mut self) -> Result<&ExecutionPlan> {
        if self.state == PipelineState::Running {
            return Err(self.rejected_transition(PipelineState::Inspected, "inspect during run"));
        }
        if self.plan.is_none() {
            let seeds = self.dispatcher.deliveries()?;
            let plan = self.inspector.inspect(&self.stages, &seeds)?;
            plan.validate()?;
            debug!(nodes = plan.len(), edges = plan.edges().len(), "plan built");
            self.plan = Some(plan);
        }
        if matches!(self.state, PipelineState::Building | PipelineState::Done) {
            self.state = PipelineState::Inspected;
        }
        self.plan.as_ref().ok_or_else(|| {
            Error::Core(sluice_core::Error::internal("plan missing after inspection"))
        })
    }

    /// Inspects the pipeline and renders the plan as text.
    ///
    /// # Errors
    ///
    /// Returns an error if inspection fails.
    pub fn describe(&mut self) -> Result<String> {
        Ok(self.inspect()?.render())
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if inspection fails, a factory fails, or the run is
    /// cancelled; the error names the failing node.
    pub fn run(&mut self) -> Result<RunReport> {
        self.run_with_cancellation(&CancellationToken::new())
    }

    /// Runs the pipeline, checking the token between stages.
    ///
    /// On cancellation the current stage finishes its in-flight factories,
    /// no new stage starts, and the partial outputs remain registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, or the first failure
    /// encountered.
    pub fn run_with_cancellation(&mut self, token: &CancellationToken) -> Result<RunReport> {
        if self.state == PipelineState::Running {
            return Err(self.rejected_transition(PipelineState::Running, "re-entrant run"));
        }

        self.inspect()?;
        self.apply_optimizer()?;

        let plan = self
            .plan
            .clone()
            .ok_or_else(|| Error::Core(sluice_core::Error::internal("plan missing after inspect")))?;
        plan.assert_covered()?;

        let mut report = RunReport::new();
        report.state = RunState::Running;
        report.started_at = Some(Utc::now());
        info!(run_id = %report.id, stages = self.stages.len(), "run started");

        self.state = PipelineState::Running;
        let outcome = self.execute_stages(&report.id.to_string(), token);
        self.state = PipelineState::Done;

        report.completed_at = Some(Utc::now());
        match outcome {
            Ok(rows) => {
                report.state = RunState::Succeeded;
                if self.config.benchmark {
                    report.rows = rows;
                }
                self.metrics.record_run("succeeded");
                info!(run_id = %report.id, "run succeeded");
                self.last_report = Some(report.clone());
                Ok(report)
            }
            Err(err) => {
                report.state = if matches!(err, Error::Cancelled) {
                    self.metrics.record_run("cancelled");
                    RunState::Cancelled
                } else {
                    self.metrics.record_run("failed");
                    RunState::Failed
                };
                info!(run_id = %report.id, state = %report.state, "run ended early");
                self.last_report = Some(report);
                Err(err)
            }
        }
    }

    /// Returns the output of the last factory of the end stage.
    ///
    /// The end stage is the last registered one; an optimizer rewrite
    /// keeps the marker on whatever stage its factories were moved into.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no such output exists, or a type
    /// mismatch if `T` is not its type.
    pub fn get_last_output<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let class = self
            .stages
            .iter()
            .rev()
            .find(|stage| stage.is_end())
            .and_then(|stage| stage.descriptors().last().map(|d| d.class))
            .ok_or_else(|| Error::DeliveryNotFound {
                token: TypeToken::of::<T>(),
            })?;
        let deliveries = self.dispatcher.find_deliverables_by_producer(class)?;
        let delivery = deliveries
            .last()
            .ok_or(Error::OutputNotFound { factory: class })?;
        Ok(delivery.get::<T>()?)
    }

    /// Returns the output produced by the given factory class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputNotFound`] if the factory has not produced.
    pub fn get_output<F: Factory>(&self) -> Result<Arc<F::Output>> {
        let class = FactoryClass::of::<F>();
        let deliveries = self.dispatcher.find_deliverables_by_producer(class)?;
        let delivery = deliveries
            .last()
            .ok_or(Error::OutputNotFound { factory: class })?;
        Ok(delivery.get::<F::Output>()?)
    }

    /// Returns the newest delivery of the given payload type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeliveryNotFound`] if no delivery of that type
    /// exists. Use [`Pipeline::deliveries_of`] when an empty result is
    /// acceptable.
    pub fn get_deliverable<T: 'static>(&self) -> Result<Delivery> {
        let token = TypeToken::of::<T>();
        self.dispatcher
            .find_deliverables_by_type(token)?
            .pop()
            .ok_or(Error::DeliveryNotFound { token })
    }

    /// Returns every delivery of the given payload type (possibly none).
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn deliveries_of<T: 'static>(&self) -> Result<Vec<Delivery>> {
        self.dispatcher
            .find_deliverables_by_type(TypeToken::of::<T>())
    }

    /// Rejects mutation while running; otherwise falls back to Building
    /// and invalidates the cached plan.
    fn ensure_mutable(&mut self, what: &str) -> Result<()> {
        if self.state == PipelineState::Running {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: PipelineState::Building.to_string(),
                reason: format!("{what} during run"),
            });
        }
        self.state = PipelineState::Building;
        self.plan = None;
        Ok(())
    }

    fn rejected_transition(&self, to: PipelineState, reason: &str) -> Error {
        Error::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Applies the configured optimizer, regrouping stages if the
    /// assignment changes any boundary.
    fn apply_optimizer(&mut self) -> Result<()> {
        if self.optimizer.is_none() && !self.config.optimize {
            return Ok(());
        }
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::Core(sluice_core::Error::internal("optimizer ran before inspection")))?;
        let assignment = match &self.optimizer {
            Some(optimizer) => optimizer.optimize(plan)?,
            None => StageMergeOptimizer::new().optimize(plan)?,
        };
        assignment.validate(plan)?;
        if assignment.is_identity_for(plan) {
            return Ok(());
        }
        debug!(
            stages_before = plan.stage_count(),
            stages_after = assignment.stage_count(),
            "applying stage rewrite"
        );
        self.apply_assignment(&assignment)?;

        // Rebuild the plan on the new boundaries; the edge set is unchanged.
        let seeds = self.dispatcher.deliveries()?;
        let plan = self.inspector.inspect(&self.stages, &seeds)?;
        plan.validate()?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Physically regroups factories according to a stage assignment.
    ///
    /// The end marker follows the end stage's last factory to wherever
    /// compaction moves it, so `get_last_output` keeps naming the same
    /// factory with and without the optimizer.
    fn apply_assignment(&mut self, assignment: &StageAssignment) -> Result<()> {
        let stage_count = assignment.stage_count();
        let old_stages = std::mem::take(&mut self.stages);

        let mut regrouped: Vec<Vec<Box<dyn AnyFactory>>> =
            (0..stage_count).map(|_| Vec::new()).collect();
        let mut parallel = vec![true; stage_count];
        let mut end_stage = stage_count.saturating_sub(1);

        let mut node_index = 0;
        for stage in old_stages {
            let was_parallel = stage.is_parallel();
            let was_end = stage.is_end();
            for factory in stage.into_factories() {
                let new_stage = assignment.stage_of(NodeId(node_index))?;
                regrouped[new_stage].push(factory);
                parallel[new_stage] &= was_parallel;
                if was_end {
                    // Factories are regrouped in registration order, so
                    // this settles on the new stage of the end stage's
                    // last factory.
                    end_stage = new_stage;
                }
                node_index += 1;
            }
        }

        self.stages = regrouped
            .into_iter()
            .zip(parallel)
            .map(|(factories, par)| Stage::from_parts(factories, par))
            .collect();
        if let Some(stage) = self.stages.get_mut(end_stage) {
            stage.end = true;
        }
        self.plan = None;
        Ok(())
    }

    /// Drives every stage in order, returning the benchmark rows.
    fn execute_stages(&mut self, run_id: &str, token: &CancellationToken) -> Result<Vec<BenchmarkRow>> {
        let pool = match self.config.parallel_workers {
            Some(workers) if self.stages.iter().any(Stage::is_parallel) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| {
                        Error::Core(sluice_core::Error::internal(format!(
                            "worker pool construction failed: {e}"
                        )))
                    })?,
            ),
            _ => None,
        };

        let mut rows = Vec::new();
        for stage_id in 0..self.stages.len() {
            if token.is_cancelled() {
                info!(stage_id, "cancellation observed, stopping before stage");
                return Err(Error::Cancelled);
            }
            let span = stage_span("run_stage", run_id, stage_id);
            let _guard = span.enter();

            let stage_rows = Self::run_stage(
                stage_id,
                &mut self.stages[stage_id],
                &self.dispatcher,
                &self.metrics,
                pool.as_ref(),
            )?;
            rows.extend(stage_rows);
        }
        Ok(rows)
    }

    /// Runs one stage: dispatch, execute, and collect each factory.
    fn run_stage(
        stage_id: usize,
        stage: &mut Stage,
        dispatcher: &DeliverableDispatcher,
        metrics: &FlowMetrics,
        pool: Option<&rayon::ThreadPool>,
    ) -> Result<Vec<BenchmarkRow>> {
        let mut rows = Vec::with_capacity(stage.len());

        if stage.is_parallel() && stage.len() > 1 {
            // Dispatch everything up front, run concurrently, then collect
            // in registration order. Equivalent to the sequential path
            // because factories within a stage never depend on each other.
            if !dispatcher.is_empty()? {
                for factory in stage.factories_mut() {
                    dispatcher.dispatch(factory.as_mut())?;
                }
            }

            let factories = stage.factories_mut();
            let outcomes: Vec<std::result::Result<LifecycleTimings, LifecycleFailure>> =
                match pool {
                    Some(pool) => pool.install(|| {
                        factories.par_iter_mut().map(|f| f.execute()).collect()
                    }),
                    None => factories.par_iter_mut().map(|f| f.execute()).collect(),
                };

            for (index, outcome) in outcomes.into_iter().enumerate() {
                let timings = Self::unwrap_outcome(stage_id, stage, index, outcome)?;
                Self::collect_factory(stage_id, stage, index, timings, dispatcher, metrics, &mut rows)?;
            }
        } else {
            for index in 0..stage.len() {
                if !dispatcher.is_empty()? {
                    dispatcher.dispatch(stage.factories_mut()[index].as_mut())?;
                }
                let outcome = stage.factories_mut()[index].execute();
                let timings = Self::unwrap_outcome(stage_id, stage, index, outcome)?;
                Self::collect_factory(stage_id, stage, index, timings, dispatcher, metrics, &mut rows)?;
            }
        }

        debug!(stage_id, factories = stage.len(), "stage completed");
        Ok(rows)
    }

    /// Wraps a lifecycle failure with its node coordinates.
    fn unwrap_outcome(
        stage_id: usize,
        stage: &Stage,
        index: usize,
        outcome: std::result::Result<LifecycleTimings, LifecycleFailure>,
    ) -> Result<LifecycleTimings> {
        outcome.map_err(|failure| Error::FactoryFailed {
            stage_id,
            factory: stage.factories()[index].descriptor().class,
            phase: failure.phase,
            source: failure.source,
        })
    }

    /// Re-publishes a factory's output and records its timings.
    fn collect_factory(
        stage_id: usize,
        stage: &Stage,
        index: usize,
        timings: LifecycleTimings,
        dispatcher: &DeliverableDispatcher,
        metrics: &FlowMetrics,
        rows: &mut Vec<BenchmarkRow>,
    ) -> Result<()> {
        let factory = &stage.factories()[index];
        dispatcher.collect_deliverable(factory.as_ref())?;

        let name = factory.descriptor().class.short_name();
        let total = timings.read + timings.process + timings.write;
        metrics.observe_factory_duration(&name, total.as_secs_f64());
        rows.push(BenchmarkRow {
            stage_id,
            factory: name,
            read: timings.read,
            process: timings.process,
            write: timings.write,
        });
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{FactoryError, SlotSpec};

    #[derive(Default)]
    struct Doubler {
        input: u32,
        result: u32,
    }

    impl Factory for Doubler {
        type Output = u32;

        fn slots(&self) -> Vec<SlotSpec<Self>> {
            vec![SlotSpec::field(|f: &mut Self| &mut f.input)]
        }

        fn process(&mut self) -> std::result::Result<(), FactoryError> {
            self.result = self.input * 2;
            Ok(())
        }

        fn get(&self) -> u32 {
            self.result
        }
    }

    #[test]
    fn empty_pipeline_runs_to_done() {
        let mut pipeline = Pipeline::new();
        let report = pipeline.run().unwrap();
        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn inspect_transitions_building_to_inspected() {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(7_u32).unwrap();
        pipeline.add_stage_of::<Doubler>().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Building);
        pipeline.inspect().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Inspected);
    }

    #[test]
    fn mutation_after_inspection_invalidates_the_plan() {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(7_u32).unwrap();
        pipeline.add_stage_of::<Doubler>().unwrap();
        pipeline.inspect().unwrap();

        pipeline.set_input(String::from("extra")).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Building);
    }

    #[test]
    fn run_produces_output_and_report() {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(21_u32).unwrap();
        pipeline.add_stage_of::<Doubler>().unwrap();

        let report = pipeline.run().unwrap();
        assert_eq!(report.state, RunState::Succeeded);
        assert!(report.started_at.is_some());
        assert!(report.completed_at.is_some());
        assert_eq!(*pipeline.get_output::<Doubler>().unwrap(), 42);
        assert_eq!(*pipeline.get_last_output::<u32>().unwrap(), 42);
    }

    #[test]
    fn benchmark_rows_follow_the_config() {
        let mut with_rows = Pipeline::with_config(PipelineConfig {
            benchmark: true,
            ..PipelineConfig::default()
        });
        with_rows.set_input(1_u32).unwrap();
        with_rows.add_stage_of::<Doubler>().unwrap();
        let report = with_rows.run().unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].stage_id, 0);

        let mut without_rows = Pipeline::new();
        without_rows.set_input(1_u32).unwrap();
        without_rows.add_stage_of::<Doubler>().unwrap();
        assert!(without_rows.run().unwrap().rows.is_empty());
    }

    #[test]
    fn pre_cancelled_token_stops_before_any_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(1_u32).unwrap();
        pipeline.add_stage_of::<Doubler>().unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = pipeline.run_with_cancellation(&token).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(pipeline.last_report().unwrap().state, RunState::Cancelled);
        // No factory executed, so no output was collected.
        assert!(pipeline.get_output::<Doubler>().is_err());
    }

    #[test]
    fn end_marker_follows_the_last_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(1_u32).unwrap();
        pipeline.add_stage_of::<Doubler>().unwrap();
        assert!(pipeline.stages[0].is_end());

        pipeline.add_stage(Stage::new()).unwrap();
        assert!(!pipeline.stages[0].is_end());
        assert!(pipeline.stages[1].is_end());
    }

    #[test]
    fn failing_factory_names_its_node() {
        #[derive(Default)]
        struct Exploding;

        impl Factory for Exploding {
            type Output = ();

            fn process(&mut self) -> std::result::Result<(), FactoryError> {
                Err("boom".into())
            }

            fn get(&self) {}
        }

        let mut pipeline = Pipeline::new();
        pipeline.add_stage_of::<Exploding>().unwrap();
        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            Error::FactoryFailed { stage_id: 0, .. }
        ));
        assert_eq!(pipeline.last_report().unwrap().state, RunState::Failed);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn state_machine_transitions() {
        use PipelineState::{Building, Done, Inspected, Running};

        assert!(Building.can_transition_to(Inspected));
        assert!(!Building.can_transition_to(Done));
        assert!(Inspected.can_transition_to(Running));
        assert!(Inspected.can_transition_to(Building));
        assert!(Running.can_transition_to(Done));
        assert!(!Running.can_transition_to(Building));
        assert!(Done.can_transition_to(Inspected));
    }
}
