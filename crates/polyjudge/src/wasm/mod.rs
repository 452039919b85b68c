//! WASI module host
//!
//! Runs WebAssembly command modules with an in-memory stdin and bounded
//! in-memory stdout/stderr. One [`WasmHost`] owns one engine; every run
//! gets a fresh [`Store`], so no state leaks between invocations.
//!
//! Runs are interrupted through epochs: a background thread bumps the
//! engine epoch every [`EPOCH_TICK`] and each store checks its own
//! cancellation token when its deadline is reached. Cancelling one run
//! never disturbs another run sharing the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use wasmtime::{
    Config as EngineConfig, Engine, Instance, Linker, Module, Store, StoreLimits,
    StoreLimitsBuilder, UpdateDeadline, Val, ValType,
};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::p2::WasiCtxBuilder;
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit};

use crate::types::MountConfig;

/// Interval between epoch increments
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Output captured per stream when no limit is configured
const DEFAULT_OUTPUT_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum WasmError {
    #[error("failed to create WebAssembly engine: {0}")]
    Engine(String),

    #[error("WebAssembly module not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to compile WebAssembly module: {0}")]
    Compile(String),

    #[error("failed to instantiate WebAssembly module: {0}")]
    Instantiate(String),

    #[error("module exports neither `_start` nor a callable `main`")]
    MissingEntryPoint,

    #[error("cannot preopen {path}: {message}")]
    Preopen { path: PathBuf, message: String },

    #[error("execution was interrupted")]
    Interrupted,
}

/// Everything one module run needs
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// `argv`, including the program name
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Vec<u8>,
    /// Host directories made visible to the guest
    pub mounts: Vec<MountConfig>,
    /// Linear memory cap in bytes
    pub memory_limit: Option<usize>,
    /// Capture cap per output stream in bytes
    pub output_limit: Option<usize>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = input.into();
        self
    }

    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn output_limit(mut self, bytes: Option<usize>) -> Self {
        self.output_limit = bytes;
        self
    }
}

/// Captured result of a run that was not interrupted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set when the guest trapped instead of exiting
    pub trap: Option<String>,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.trap.is_none() && self.exit_code == 0
    }
}

struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// A wasmtime engine with a running epoch ticker
pub struct WasmHost {
    engine: Engine,
    ticker: CancellationToken,
}

impl WasmHost {
    pub fn new() -> Result<Self, WasmError> {
        let mut config = EngineConfig::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| WasmError::Engine(format!("{e:#}")))?;

        let ticker = CancellationToken::new();
        let stop = ticker.clone();
        let ticking = engine.clone();
        thread::Builder::new()
            .name("wasm-epoch".to_string())
            .spawn(move || {
                while !stop.is_cancelled() {
                    thread::sleep(EPOCH_TICK);
                    ticking.increment_epoch();
                }
            })
            .map_err(|e| WasmError::Engine(format!("failed to start epoch ticker: {e}")))?;

        Ok(Self { engine, ticker })
    }

    /// Compile a module from binary or text format
    pub fn compile(&self, bytes: &[u8]) -> Result<Module, WasmError> {
        Module::new(&self.engine, bytes).map_err(|e| WasmError::Compile(format!("{e:#}")))
    }

    /// Compile a module from a file on disk
    #[instrument(skip(self))]
    pub fn load(&self, path: &Path) -> Result<Module, WasmError> {
        if !path.exists() {
            return Err(WasmError::NotFound(path.to_path_buf()));
        }
        let module = Module::from_file(&self.engine, path)
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;
        debug!("module compiled");
        Ok(module)
    }

    /// Check that `module` links against WASI and has an entry point,
    /// without running it
    pub fn check(&self, module: &Module) -> Result<(), WasmError> {
        self.linker()?
            .instantiate_pre(module)
            .map_err(|e| WasmError::Instantiate(format!("{e:#}")))?;
        if module.get_export("_start").is_none() && module.get_export("main").is_none() {
            return Err(WasmError::MissingEntryPoint);
        }
        Ok(())
    }

    fn linker(&self) -> Result<Linker<HostState>, WasmError> {
        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| &mut state.wasi)
            .map_err(|e| WasmError::Instantiate(format!("{e:#}")))?;
        Ok(linker)
    }

    /// Instantiate `module` in a fresh store and run its entry point
    ///
    /// The run aborts with [`WasmError::Interrupted`] soon after `cancel`
    /// is cancelled.
    pub fn run(
        &self,
        module: &Module,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, WasmError> {
        let output_capacity = invocation.output_limit.unwrap_or(DEFAULT_OUTPUT_CAPACITY);
        let stdout = MemoryOutputPipe::new(output_capacity);
        let stderr = MemoryOutputPipe::new(output_capacity);

        let mut builder = WasiCtxBuilder::new();
        builder
            .stdin(MemoryInputPipe::new(invocation.stdin.clone()))
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .args(invocation.args.as_slice());
        for (key, value) in &invocation.env {
            builder.env(key, value);
        }
        for mount in &invocation.mounts {
            let source = Path::new(&mount.source);
            if !source.is_dir() {
                if mount.optional {
                    warn!(path = %mount.source, "optional mount missing, skipping");
                    continue;
                }
                return Err(WasmError::Preopen {
                    path: source.to_path_buf(),
                    message: "not a directory".to_string(),
                });
            }
            let (dir_perms, file_perms) = if mount.writable {
                (DirPerms::all(), FilePerms::all())
            } else {
                (DirPerms::READ, FilePerms::READ)
            };
            builder
                .preopened_dir(source, &mount.target, dir_perms, file_perms)
                .map_err(|e| WasmError::Preopen {
                    path: source.to_path_buf(),
                    message: format!("{e:#}"),
                })?;
        }

        let mut limits = StoreLimitsBuilder::new();
        if let Some(bytes) = invocation.memory_limit {
            limits = limits.memory_size(bytes);
        }

        let mut store = Store::new(
            &self.engine,
            HostState {
                wasi: builder.build_p1(),
                limits: limits.build(),
            },
        );
        store.limiter(|state| &mut state.limits);
        store.set_epoch_deadline(1);
        let token = cancel.clone();
        store.epoch_deadline_callback(move |_| {
            if token.is_cancelled() {
                Err(wasmtime::Error::msg("execution interrupted"))
            } else {
                Ok(UpdateDeadline::Continue(1))
            }
        });

        let instance = self
            .linker()?
            .instantiate(&mut store, module)
            .map_err(|e| WasmError::Instantiate(format!("{e:#}")))?;

        let (exit_code, trap) = match call_entry(&mut store, &instance)? {
            Ok(code) => (code, None),
            Err(err) => {
                if let Some(exit) = err.downcast_ref::<I32Exit>() {
                    (exit.0, None)
                } else if cancel.is_cancelled() {
                    return Err(WasmError::Interrupted);
                } else {
                    (1, Some(format!("{err:#}")))
                }
            }
        };

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&stdout.contents()).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.contents()).into_owned(),
            exit_code,
            trap,
        })
    }
}

impl Drop for WasmHost {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

/// A module compiled from disk on first use and cached afterwards
#[derive(Debug)]
pub struct LazyModule {
    path: PathBuf,
    cell: OnceCell<Module>,
}

impl LazyModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The compiled module; compilation runs on the blocking pool
    ///
    /// A failed compilation is not cached, so the next call retries.
    pub async fn get(&self, host: &Arc<WasmHost>) -> Result<Module, WasmError> {
        self.cell
            .get_or_try_init(|| async {
                let host = host.clone();
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || host.load(&path))
                    .await
                    .map_err(|e| WasmError::Compile(format!("compilation task failed: {e}")))?
            })
            .await
            .cloned()
    }
}

/// Call `_start`, or else an exported `main` with zeroed arguments
///
/// The outer error is a missing or unusable entry point; the inner one is
/// whatever the guest raised.
fn call_entry(
    store: &mut Store<HostState>,
    instance: &Instance,
) -> Result<wasmtime::Result<i32>, WasmError> {
    if let Ok(start) = instance.get_typed_func::<(), ()>(&mut *store, "_start") {
        return Ok(start.call(&mut *store, ()).map(|()| 0));
    }

    let main = instance
        .get_func(&mut *store, "main")
        .ok_or(WasmError::MissingEntryPoint)?;
    let ty = main.ty(&*store);
    let params = ty
        .params()
        .map(|param| match param {
            ValType::I32 => Ok(Val::I32(0)),
            ValType::I64 => Ok(Val::I64(0)),
            ValType::F32 => Ok(Val::F32(0)),
            ValType::F64 => Ok(Val::F64(0)),
            _ => Err(WasmError::MissingEntryPoint),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut results = vec![Val::I32(0); ty.results().len()];

    Ok(main
        .call(&mut *store, &params, &mut results)
        .map(|()| match results.first() {
            Some(Val::I32(code)) => *code,
            _ => 0,
        }))
}
