use channelz_types::ChannelzError;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// The one scheduling primitive channelz needs from an event engine.
pub trait TimerEngine: Send + Sync + 'static {
    /// Runs `task` once, no earlier than `delay` from now, off the caller's
    /// thread.
    fn run_after(&self, delay: Duration, task: TimerTask);
}

/// Timer engine backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioEngine {
    handle: tokio::runtime::Handle,
}

impl TokioEngine {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// The engine of the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl TimerEngine for TokioEngine {
    fn run_after(&self, delay: Duration, task: TimerTask) {
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
        });
    }
}

/// Process-wide engine on a dedicated timer thread, started on first use.
pub fn default_engine() -> Result<Arc<dyn TimerEngine>, ChannelzError> {
    static RUNTIME: OnceLock<Option<tokio::runtime::Runtime>> = OnceLock::new();
    let runtime = RUNTIME.get_or_init(|| {
        match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("channelz-timer")
            .enable_time()
            .build()
        {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                warn!(error = %err, "failed to start channelz timer runtime");
                None
            }
        }
    });
    match runtime {
        Some(runtime) => Ok(Arc::new(TokioEngine::new(runtime.handle().clone()))),
        None => Err(ChannelzError::Internal(
            "channelz timer runtime unavailable".into(),
        )),
    }
}
