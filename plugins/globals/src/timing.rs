use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use plugin_api::{runner, CommandRunner, Dependency, Plugin, SetupContext};
use tracing::info;

use crate::globals::GLOBALS_ID;

pub const TIMING_ID: &str = "gantry:timing";

/// Outcome of one timed command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub command: String,
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// Collects run records; may be shared across runs.
#[derive(Debug, Default)]
pub struct RunRecorder {
    runs: Mutex<Vec<RunRecord>>,
}

impl RunRecorder {
    pub fn record(&self, record: RunRecord) {
        self.runs.lock().push(record);
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().clone()
    }

    pub fn last(&self) -> Option<RunRecord> {
        self.runs.lock().last().cloned()
    }
}

/// Extension exposed under [`TIMING_ID`].
#[derive(Debug, Clone)]
pub struct Timing {
    recorder: Arc<RunRecorder>,
}

impl Timing {
    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }
}

/// Times every command run with a private recorder.
pub fn timing() -> Plugin {
    timing_into(Arc::default())
}

/// Times every command run, recording into `recorder`.
///
/// Ordered after the globals plugin when present so that help and version
/// output is not timed.
pub fn timing_into(recorder: Arc<RunRecorder>) -> Plugin {
    Plugin::new(TIMING_ID)
        .name("command timing")
        .depends_on(Dependency::optional(GLOBALS_ID))
        .setup(setup)
        .extension(move |_ctx| {
            let recorder = Arc::clone(&recorder);
            async move { Ok(Timing { recorder }) }
        })
}

async fn setup(ctx: SetupContext) -> anyhow::Result<()> {
    ctx.decorate_command(timed)?;
    Ok(())
}

fn timed(next: CommandRunner) -> CommandRunner {
    runner(move |ctx| {
        let next = next.clone();
        async move {
            let start = Instant::now();
            let result = next(Arc::clone(&ctx)).await;
            let elapsed = start.elapsed();
            info!(
                command = %ctx.meta.name,
                elapsed_ms = elapsed.as_millis() as u64,
                ok = result.is_ok(),
                "command finished"
            );
            if let Some(timing) = ctx.extension::<Timing>(TIMING_ID) {
                timing.recorder().record(RunRecord {
                    command: ctx.meta.name.clone(),
                    elapsed,
                    succeeded: result.is_ok(),
                });
            }
            result
        }
    })
}
