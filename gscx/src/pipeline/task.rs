//! Task trait for pipeline execution.

use gscx_shared::errors::GscxResult;

/// A unit of work in a pipeline.
///
/// Tasks are consumed by running them and get exclusive access to the
/// pipeline context for the duration of the call.
pub trait PipelineTask<Ctx> {
    fn run(self: Box<Self>, ctx: &mut Ctx) -> GscxResult<()>;

    /// Stable task name used for logging and metrics lookup.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
