//! JavaScript on embedded QuickJS
//!
//! Each run gets its own QuickJS runtime on its own worker thread. The user
//! source is compiled as the body of a `Function`, so its top-level
//! bindings live in a private scope; the body ends by returning a lookup
//! closure that the host uses to resolve names inside that scope.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquickjs::{Context, Ctx, Runtime};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::normalize;
use crate::runtime::{RuntimeAdapter, append_log, grade, run_in_worker};
use crate::types::{ExecutionRequest, ExecutionResult, Language, ResourceLimits};
use crate::worker::{WorkerMessage, WorkerRequest};

pub use console::ConsoleCapture;
pub use detect::{CallableResolver, EntryPoint, Scope, detect};

mod console;
pub mod detect;

const NO_ENTRY_POINT: &str = "No executable function found. Define a function (for example \
`function solve(nums) { ... }`) or a `class Solution` with a method.";

/// Compile the user source and keep its lookup closure on the global object
const LOAD: &str = r#"
(function (source) {
  try {
    globalThis.__lookup = new Function(
      source + "\n;return function (name) { try { return eval(name); } catch (_) { return undefined; } };"
    )();
    return JSON.stringify({ ok: true });
  } catch (e) {
    return JSON.stringify({ ok: false, error: String(e) });
  }
})
"#;

const IS_FUNCTION: &str = r#"
(function (name) {
  return typeof globalThis.__lookup(name) === 'function';
})
"#;

const METHODS: &str = r#"
(function (name) {
  var cls = globalThis.__lookup(name);
  if (typeof cls !== 'function' || !cls.prototype) return '[]';
  var proto = cls.prototype;
  return JSON.stringify(Object.getOwnPropertyNames(proto).filter(function (key) {
    if (key === 'constructor') return false;
    var desc = Object.getOwnPropertyDescriptor(proto, key);
    return desc !== undefined && typeof desc.value === 'function';
  }));
})
"#;

/// Call the entry point with the given arguments and render the result
///
/// `undefined` renders as `undefined`; everything else goes through
/// `JSON.stringify`, falling back to `String()` for values it can't encode.
const INVOKE: &str = r#"
(function (target, args) {
  try {
    var fn, self;
    if (target.method !== undefined) {
      var Cls = globalThis.__lookup(target.class);
      self = new Cls();
      fn = self[target.method];
    } else {
      fn = globalThis.__lookup(target.name);
    }
    var value = fn.apply(self, args);
    var output;
    if (value === undefined) {
      output = 'undefined';
    } else {
      try { output = JSON.stringify(value); } catch (_) { output = undefined; }
      if (output === undefined) output = String(value);
    }
    return JSON.stringify({ ok: true, output: output });
  } catch (e) {
    return JSON.stringify({ ok: false, error: String(e) });
  }
})
"#;

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Envelope {
    fn into_result(self) -> Result<String, String> {
        if self.ok {
            Ok(self.output.unwrap_or_default())
        } else {
            Err(self.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }
}

/// JavaScript adapter
pub struct JavaScriptRuntime {
    limits: ResourceLimits,
}

impl JavaScriptRuntime {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.limits_for(Language::JavaScript))
    }

    fn timeout(&self) -> Duration {
        self.limits
            .timeout()
            .unwrap_or(Duration::from_millis(crate::config::JAVASCRIPT_TIMEOUT_MS))
    }
}

#[async_trait]
impl RuntimeAdapter for JavaScriptRuntime {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    #[instrument(skip_all, fields(cases = request.test_cases.len()))]
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult {
        let memory_limit = self.limits.memory_bytes();
        run_in_worker("polyjudge-js", &request, self.timeout(), move |request, cancel| {
            run_session(request, cancel, memory_limit)
        })
        .await
    }
}

/// Body of a JavaScript worker thread
fn run_session(
    request: WorkerRequest,
    cancel: CancellationToken,
    memory_limit: Option<usize>,
) -> WorkerMessage {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => return WorkerMessage::error(format!("Failed to start JavaScript engine: {e}"), ""),
    };
    rt.set_interrupt_handler(Some(Box::new(move || cancel.is_cancelled())));
    if let Some(bytes) = memory_limit {
        rt.set_memory_limit(bytes);
    }

    let ctx = match Context::full(&rt) {
        Ok(ctx) => ctx,
        Err(e) => return WorkerMessage::error(format!("Failed to start JavaScript engine: {e}"), ""),
    };

    ctx.with(|ctx| session(&ctx, &request))
}

fn session(ctx: &Ctx<'_>, request: &WorkerRequest) -> WorkerMessage {
    let console = match ConsoleCapture::install(ctx) {
        Ok(console) => console,
        Err(e) => return WorkerMessage::error(describe(ctx, e), ""),
    };
    let mut logs = String::new();

    let loaded = call(ctx, LOAD, &[Value::String(request.code.clone())]);
    append_log(&mut logs, &console.drain());
    if let Err(error) = loaded {
        return WorkerMessage::error(error, logs);
    }

    if request.test_cases.is_empty() {
        return WorkerMessage::Success {
            results: Vec::new(),
            logs,
        };
    }

    let scope = QuickJsScope { ctx };
    let Some(entry) = detect(&request.code, request.entry_hint.as_deref(), &scope) else {
        return WorkerMessage::error(NO_ENTRY_POINT, logs);
    };
    debug!(%entry, "entry point resolved");

    let target = entry.target();
    let mut results = Vec::with_capacity(request.test_cases.len());
    for case in &request.test_cases {
        let args = Value::Array(normalize::to_arguments(&case.input));

        let started = Instant::now();
        let outcome = call(ctx, INVOKE, &[target.clone(), args]);
        let elapsed = started.elapsed();

        append_log(&mut logs, &console.drain());
        results.push(grade(case, outcome, elapsed));
    }

    WorkerMessage::Success { results, logs }
}

/// Evaluate `function` applied to JSON-encoded `args` and unwrap the
/// envelope it returns
fn call(ctx: &Ctx<'_>, function: &str, args: &[Value]) -> Result<String, String> {
    let rendered = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let script = format!("{}({rendered})", function.trim());

    let raw = ctx.eval::<String, _>(script).map_err(|e| describe(ctx, e))?;
    serde_json::from_str::<Envelope>(&raw)
        .map_err(|e| format!("malformed reply from JavaScript engine: {e}"))?
        .into_result()
}

/// Best available text for an engine-level error
fn describe(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if err.is_exception() {
        let value = ctx.catch();
        if let Some(exception) = value.as_exception() {
            return exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string());
        }
        return format!("uncaught exception: {value:?}");
    }
    err.to_string()
}

/// Name resolution inside the evaluated program's private scope
struct QuickJsScope<'a, 'js> {
    ctx: &'a Ctx<'js>,
}

impl QuickJsScope<'_, '_> {
    fn eval_with_name<T>(&self, function: &str, name: &str) -> Option<T>
    where
        T: for<'js> rquickjs::FromJs<'js>,
    {
        let script = format!("{}({})", function.trim(), Value::String(name.to_string()));
        self.ctx.eval::<T, _>(script).ok()
    }

    fn methods(&self, class: &str) -> Vec<String> {
        self.eval_with_name::<String>(METHODS, class)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }
}

impl Scope for QuickJsScope<'_, '_> {
    fn is_function(&self, name: &str) -> bool {
        self.eval_with_name::<bool>(IS_FUNCTION, name).unwrap_or(false)
    }

    fn first_method(&self, class: &str) -> Option<String> {
        self.methods(class).into_iter().next()
    }

    fn has_method(&self, class: &str, method: &str) -> bool {
        self.methods(class).iter().any(|m| m == method)
    }
}
