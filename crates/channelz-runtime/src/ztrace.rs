use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::engine::TimerEngine;
use crate::node::Node;

/// String arguments for a ztrace run. Producers ignore keys they do not
/// know.
pub type ZTraceArgs = BTreeMap<String, String>;

pub type ZTraceCallback = Box<dyn FnOnce(JsonValue) + Send + 'static>;

/// One-shot diagnostic snapshot producer offered by a data source.
///
/// `run` must not block: the producer schedules its work on `engine` and
/// hands its result to `callback` when done.
pub trait ZTrace: Send + 'static {
    fn run(
        self: Box<Self>,
        deadline: Instant,
        args: ZTraceArgs,
        engine: Arc<dyn TimerEngine>,
        callback: ZTraceCallback,
    );
}

/// Lead of the `{"end": true}` timer over the caller's deadline; timers fire
/// at or after their due time.
const DEADLINE_LEAD: Duration = Duration::from_millis(5);

fn deadline_timeout(deadline: Instant, now: Instant) -> Duration {
    deadline
        .saturating_duration_since(now)
        .saturating_sub(DEADLINE_LEAD)
}

/// Delivers to the wrapped callback at most once; later completions are
/// dropped.
struct OnceCallback {
    callback: Mutex<Option<ZTraceCallback>>,
}

impl OnceCallback {
    fn new(callback: ZTraceCallback) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(callback)),
        })
    }

    fn complete(&self, result: JsonValue) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }
}

impl Node {
    /// Starts the named ztrace from the first attached source offering it.
    ///
    /// Returns immediately. `callback` fires exactly once on `engine`: with
    /// the producer's result, with `{"end": true}` if `deadline` passes
    /// first, or with a `not_found` error when no source offers `name`.
    /// The deadline fallback is aimed a few milliseconds early so it lands
    /// on or before `deadline`.
    pub fn run_ztrace(
        &self,
        name: &str,
        deadline: Instant,
        args: ZTraceArgs,
        engine: Arc<dyn TimerEngine>,
        callback: impl FnOnce(JsonValue) + Send + 'static,
    ) {
        let once = OnceCallback::new(Box::new(callback));
        let ztrace = self
            .data_sources()
            .iter()
            .find_map(|source| source.get_ztrace(name));
        let Some(ztrace) = ztrace else {
            let payload = json!({
                "error": {
                    "kind": "not_found",
                    "message": format!("ztrace {name} not found on node {}", self.uuid()),
                }
            });
            engine.run_after(
                Duration::ZERO,
                Box::new(move || {
                    once.complete(payload);
                }),
            );
            return;
        };

        let uuid = self.uuid();
        let name = name.to_owned();
        let timeout = deadline_timeout(deadline, Instant::now());
        let on_deadline = Arc::clone(&once);
        engine.run_after(
            timeout,
            Box::new(move || {
                if on_deadline.complete(json!({"end": true})) {
                    debug!(%uuid, ztrace = %name, "ztrace deadline passed before producer finished");
                }
            }),
        );
        ztrace.run(
            deadline,
            args,
            engine,
            Box::new(move |result| {
                once.complete(result);
            }),
        );
    }
}
