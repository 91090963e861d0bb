//! Job rendering: binding configured jobs to one iteration's identity.

use seedbench_core::{IterationContext, JobSpec, StageSpec};

/// A job with placeholders substituted and its environment resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJob {
    pub name: String,
    /// First element is the executable.
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout_secs: u64,
}

/// A stage ready to launch as one task group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub name: String,
    pub jobs: Vec<ResolvedJob>,
}

/// Substitute `{tag}`, `{seed}`, `{device}` and `{iteration}` in one argument.
pub fn render_arg(arg: &str, ctx: &IterationContext) -> String {
    arg.replace("{tag}", &ctx.tag.to_string())
        .replace("{seed}", &ctx.seed.to_string())
        .replace("{device}", &ctx.device.to_string())
        .replace("{iteration}", &ctx.index.to_string())
}

/// Environment every collaborator receives.
pub fn iteration_env(ctx: &IterationContext) -> Vec<(String, String)> {
    vec![
        ("ITER_TAG".to_string(), ctx.tag.to_string()),
        ("SEED".to_string(), ctx.seed.to_string()),
        ("ITERATION".to_string(), ctx.index.to_string()),
        ("TOTAL_ITERATIONS".to_string(), ctx.total.to_string()),
        (
            "CUDA_VISIBLE_DEVICES".to_string(),
            ctx.device.visible_devices().to_string(),
        ),
    ]
}

pub fn resolve_job(job: &JobSpec, ctx: &IterationContext) -> ResolvedJob {
    ResolvedJob {
        name: job.name.clone(),
        command: job.command.iter().map(|a| render_arg(a, ctx)).collect(),
        env: iteration_env(ctx),
        timeout_secs: job.timeout_secs,
    }
}

pub fn resolve_stage(stage: &StageSpec, ctx: &IterationContext) -> ResolvedStage {
    ResolvedStage {
        name: stage.name.clone(),
        jobs: stage.jobs.iter().map(|j| resolve_job(j, ctx)).collect(),
    }
}
