//! Table-driven pipeline execution.
//!
//! ## Architecture
//!
//! ```text
//! ExecutionPlan → Pipeline → Tasks
//!
//! - ExecutionPlan: ordered task table
//! - Pipeline: built from a plan, consumed by one execution
//! - Task: atomic unit of work with mutable access to the context
//! ```
//!
//! Tasks run one after another on the calling thread. The first failing task
//! halts the run; metrics for the tasks that completed are kept.
//!
//! ## Example
//!
//! ```ignore
//! use gscx::pipeline::{ExecutionPlan, PipelineBuilder, PipelineExecutor};
//!
//! let plan = ExecutionPlan::new(vec![Box::new(TaskA), Box::new(TaskB)]);
//! let pipeline = PipelineBuilder::from_plan(plan);
//! match PipelineExecutor::execute(pipeline, &mut ctx) {
//!     Ok(metrics) => println!("took {}ms", metrics.total_duration_ms),
//!     Err(failure) => println!("{} failed: {}", failure.task, failure.error),
//! }
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod task;

pub use metrics::{PipelineMetrics, TaskMetrics};
pub use pipeline::{ExecutionPlan, Pipeline, PipelineBuilder, PipelineExecutor, PipelineFailure};
pub use task::{BoxedTask, PipelineTask};
