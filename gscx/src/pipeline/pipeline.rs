//! Pipeline executor.

use super::metrics::{PipelineMetrics, TaskMetrics};
use super::task::BoxedTask;
use gscx_shared::errors::GscxError;
use std::fmt;
use std::time::Instant;

pub struct ExecutionPlan<Ctx> {
    tasks: Vec<BoxedTask<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self { tasks }
    }

    pub fn tasks(self) -> Vec<BoxedTask<Ctx>> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct Pipeline<Ctx> {
    tasks: Vec<BoxedTask<Ctx>>,
}

impl<Ctx> Pipeline<Ctx> {
    pub fn new(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self { tasks }
    }
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn from_plan<Ctx>(plan: ExecutionPlan<Ctx>) -> Pipeline<Ctx> {
        Pipeline::new(plan.tasks())
    }
}

/// A run that stopped at a failing task.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Name of the task that failed.
    pub task: String,
    pub error: GscxError,
    /// Tasks that completed before the failure.
    pub metrics: PipelineMetrics,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} failed: {}", self.task, self.error)
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every task in order against `ctx`.
    ///
    /// Stops at the first error. Tasks after the failing one are dropped
    /// without running.
    pub fn execute<Ctx>(
        pipeline: Pipeline<Ctx>,
        ctx: &mut Ctx,
    ) -> Result<PipelineMetrics, PipelineFailure> {
        let total_start = Instant::now();
        let mut tasks = Vec::with_capacity(pipeline.tasks.len());

        for task in pipeline.tasks {
            let name = task.name().to_string();
            let task_start = Instant::now();

            if let Err(error) = task.run(ctx) {
                tracing::debug!(task = %name, "Pipeline halted");
                return Err(PipelineFailure {
                    task: name,
                    error,
                    metrics: PipelineMetrics {
                        total_duration_ms: total_start.elapsed().as_millis(),
                        tasks,
                    },
                });
            }

            tasks.push(TaskMetrics {
                name,
                duration_ms: task_start.elapsed().as_millis(),
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            tasks,
        })
    }
}
