//! Script executor using QuickJS
//!
//! Every execution gets its own runtime and context, so two scripts never
//! share state. The only free binding a script sees besides the language
//! built-ins is `require`, which hands out the modules of its
//! [`CapabilityEnvironment`].

use crate::capability::{Capability, CapabilityEnvironment, NativeFn};
use crate::config::ExecutorConfig;
use crate::transpile::{strip_types, TranspileError};
use rquickjs::{
    CatchResultExt, CaughtError, Context, Ctx, Exception, Function, Object, Persistent, Runtime,
    Value,
};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};
use thiserror::Error;
use vessel_api::{ExtensionId, ScriptLanguage};

/// Builds the script function; async bodies may use `await`
const COMPILE: &str = r#"(function (body, isAsync) {
    var Ctor = isAsync ? Object.getPrototypeOf(async function () {}).constructor : Function;
    return new Ctor("require", body);
})"#;

const REQUIRE_FACTORY: &str = r#"(function (modules) {
    return function require(name) {
        if (Object.prototype.hasOwnProperty.call(modules, name)) {
            return modules[name];
        }
        throw new Error('Cannot find module "' + name + '"');
    };
})"#;

/// Host functions take and return JSON text
const NATIVE_SHIM: &str = r#"(function (native) {
    return function () {
        return JSON.parse(native(JSON.stringify(Array.prototype.slice.call(arguments))));
    };
})"#;

/// Records how a promise settles in a plain object the host can poll
const ASYNC_DRIVER: &str = r#"(function (promise) {
    var state = { done: false, ok: false, value: undefined, error: undefined };
    Promise.resolve(promise).then(
        function (value) { state.done = true; state.ok = true; state.value = value; },
        function (error) { state.done = true; state.error = error; }
    );
    return state;
})"#;

const DESCRIBE: &str = r#"(function (error) {
    if (error instanceof Error) {
        return error.name + ": " + error.message;
    }
    return "Uncaught " + String(error);
})"#;

const CALL_METHOD: &str = r#"(function (target, name, args) {
    var result = target[name].apply(target, JSON.parse(args));
    return result === undefined ? "null" : JSON.stringify(result);
})"#;

/// Whether the script body may `await`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run to completion and return the body's value
    #[default]
    Sync,

    /// Wrap the body in an async function and wait for its promise
    Async,
}

/// Where a script came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOrigin {
    pub extension_id: ExtensionId,
    pub file: Option<String>,
}

impl ScriptOrigin {
    pub fn new(extension_id: ExtensionId, file: impl Into<String>) -> Self {
        Self {
            extension_id,
            file: Some(file.into()),
        }
    }

    /// Origin of a script that was not read from a file
    pub fn inline(extension_id: ExtensionId) -> Self {
        Self {
            extension_id,
            file: None,
        }
    }
}

impl fmt::Display for ScriptOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", self.extension_id, file),
            None => write!(f, "{}:<inline>", self.extension_id),
        }
    }
}

/// One script to run
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub code: String,
    pub language: ScriptLanguage,
    pub mode: ExecutionMode,
    pub origin: ScriptOrigin,
}

impl ScriptRequest {
    pub fn new(code: impl Into<String>, origin: ScriptOrigin) -> Self {
        Self {
            code: code.into(),
            language: ScriptLanguage::JavaScript,
            mode: ExecutionMode::Sync,
            origin,
        }
    }

    pub fn language(mut self, language: ScriptLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Errors raised while running a script
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("Script engine unavailable for {origin}: {message}")]
    Engine { origin: ScriptOrigin, message: String },

    #[error("Failed to transpile {origin}: {source}")]
    Transpile {
        origin: ScriptOrigin,
        #[source]
        source: TranspileError,
    },

    #[error("Failed to compile {origin}: {message}")]
    Compile { origin: ScriptOrigin, message: String },

    #[error("Failed to prepare capabilities for {origin}: {message}")]
    Environment { origin: ScriptOrigin, message: String },

    #[error("Script {origin} failed: {message}")]
    Runtime { origin: ScriptOrigin, message: String },

    #[error("Script {origin} exceeded its time limit of {}ms", .timeout.as_millis())]
    Timeout {
        origin: ScriptOrigin,
        timeout: Duration,
    },

    #[error("Script {origin} is waiting on a promise that can never settle")]
    Stalled { origin: ScriptOrigin },

    #[error("Failed to read a value produced by {origin}: {message}")]
    Conversion { origin: ScriptOrigin, message: String },
}

impl ScriptError {
    pub fn origin(&self) -> &ScriptOrigin {
        match self {
            Self::Engine { origin, .. }
            | Self::Transpile { origin, .. }
            | Self::Compile { origin, .. }
            | Self::Environment { origin, .. }
            | Self::Runtime { origin, .. }
            | Self::Timeout { origin, .. }
            | Self::Stalled { origin }
            | Self::Conversion { origin, .. } => origin,
        }
    }
}

type ErrorKind = fn(ScriptOrigin, String) -> ScriptError;

fn compile_error(origin: ScriptOrigin, message: String) -> ScriptError {
    ScriptError::Compile { origin, message }
}

fn environment_error(origin: ScriptOrigin, message: String) -> ScriptError {
    ScriptError::Environment { origin, message }
}

fn runtime_error(origin: ScriptOrigin, message: String) -> ScriptError {
    ScriptError::Runtime { origin, message }
}

fn conversion_error(origin: ScriptOrigin, message: String) -> ScriptError {
    ScriptError::Conversion { origin, message }
}

/// One QuickJS runtime with its single context
struct Engine {
    context: Context,
    runtime: Runtime,
    timeout: Option<Duration>,
    deadline: Rc<Cell<Option<Instant>>>,
    interrupted: Rc<Cell<bool>>,
}

/// Clears the deadline when dropped
struct Armed<'a>(&'a Engine);

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.0.deadline.set(None);
    }
}

impl Engine {
    fn new(config: &ExecutorConfig) -> rquickjs::Result<Self> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(config.memory_limit_bytes);
        runtime.set_max_stack_size(config.max_stack_size_bytes);

        let deadline: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
        let interrupted = Rc::new(Cell::new(false));
        {
            let (deadline, interrupted) = (Rc::clone(&deadline), Rc::clone(&interrupted));
            runtime.set_interrupt_handler(Some(Box::new(move || {
                let expired = deadline.get().is_some_and(|at| Instant::now() >= at);
                if expired {
                    interrupted.set(true);
                }
                expired
            })));
        }

        let context = Context::full(&runtime)?;
        Ok(Self {
            context,
            runtime,
            timeout: config.timeout(),
            deadline,
            interrupted,
        })
    }

    /// Start the time budget for one call into the engine
    fn arm(&self) -> Armed<'_> {
        self.interrupted.set(false);
        self.deadline
            .set(self.timeout.map(|timeout| Instant::now() + timeout));
        Armed(self)
    }

    fn expired(&self) -> bool {
        self.interrupted.get()
            || self
                .deadline
                .get()
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn timeout_error(&self, origin: &ScriptOrigin) -> ScriptError {
        ScriptError::Timeout {
            origin: origin.clone(),
            timeout: self.timeout.unwrap_or_default(),
        }
    }

    /// Turn a caught exception into a [`ScriptError`] of the given kind
    fn failure<'js>(
        &self,
        ctx: &Ctx<'js>,
        origin: &ScriptOrigin,
        error: CaughtError<'js>,
        kind: ErrorKind,
    ) -> ScriptError {
        if self.interrupted.get() {
            return self.timeout_error(origin);
        }
        kind(origin.clone(), describe(ctx, error))
    }
}

fn describe<'js>(ctx: &Ctx<'js>, error: CaughtError<'js>) -> String {
    let value = match error {
        CaughtError::Error(err) => return err.to_string(),
        CaughtError::Exception(exception) => exception.into_object().into_value(),
        CaughtError::Value(value) => value,
    };
    ctx.eval::<Function, _>(DESCRIBE)
        .and_then(|describe| describe.call::<_, String>((value,)))
        .unwrap_or_else(|_| "Uncaught exception".to_string())
}

/// What a started execution produced
enum Started {
    Value(Persistent<Value<'static>>),
    Pending(Persistent<Object<'static>>),
}

enum Progress {
    Pending,
    Resolved(Persistent<Value<'static>>),
    Rejected(String),
}

/// Runs extension scripts in fresh, limited QuickJS engines
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    config: ExecutorConfig,
}

impl ScriptExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `request` with `env` as its only capabilities
    ///
    /// In [`ExecutionMode::Async`] the promise job queue is drained
    /// cooperatively, yielding to the scheduler after every job.
    pub async fn execute(
        &self,
        request: ScriptRequest,
        env: &CapabilityEnvironment,
    ) -> Result<ScriptValue, ScriptError> {
        let ScriptRequest {
            code,
            language,
            mode,
            origin,
        } = request;
        tracing::debug!(
            extension = %origin.extension_id,
            path = origin.file.as_deref().unwrap_or("-"),
            ?language,
            ?mode,
            "Executing script"
        );

        // 1. Strip type syntax
        let code = match language {
            ScriptLanguage::TypeScript => {
                strip_types(&code).map_err(|source| ScriptError::Transpile {
                    origin: origin.clone(),
                    source,
                })?
            }
            ScriptLanguage::JavaScript => code,
        };

        // 2. Fresh engine with limits
        let engine = Rc::new(Engine::new(&self.config).map_err(|err| ScriptError::Engine {
            origin: origin.clone(),
            message: err.to_string(),
        })?);
        let origin = Rc::new(origin);

        // 3. Install capabilities, compile and call the body
        let armed = engine.arm();
        let started = engine.context.with(|ctx| -> Result<Started, ScriptError> {
            let require = install_environment(&ctx, env)
                .catch(&ctx)
                .map_err(|err| engine.failure(&ctx, &origin, err, environment_error))?;

            let compile: Function = ctx
                .eval(COMPILE)
                .catch(&ctx)
                .map_err(|err| engine.failure(&ctx, &origin, err, compile_error))?;
            let function: Function = compile
                .call((code.as_str(), mode == ExecutionMode::Async))
                .catch(&ctx)
                .map_err(|err| engine.failure(&ctx, &origin, err, compile_error))?;

            let result: Value = function
                .call((require,))
                .catch(&ctx)
                .map_err(|err| engine.failure(&ctx, &origin, err, runtime_error))?;

            match mode {
                ExecutionMode::Sync => Ok(Started::Value(Persistent::save(&ctx, result))),
                ExecutionMode::Async => {
                    let driver: Function = ctx
                        .eval(ASYNC_DRIVER)
                        .catch(&ctx)
                        .map_err(|err| engine.failure(&ctx, &origin, err, runtime_error))?;
                    let state: Object = driver
                        .call((result,))
                        .catch(&ctx)
                        .map_err(|err| engine.failure(&ctx, &origin, err, runtime_error))?;
                    Ok(Started::Pending(Persistent::save(&ctx, state)))
                }
            }
        })?;
        drop(armed);

        // 4. Settle the promise, if any
        let value = match started {
            Started::Value(value) => value,
            Started::Pending(state) => settle(&engine, &origin, state).await?,
        };

        ScriptValue::from_persistent(&engine, &origin, value)
    }
}

/// Drive the job queue until the promise behind `state` settles
///
/// Each job runs under a fresh time budget; time spent in other tasks while
/// this one yields is not charged to the script.
async fn settle(
    engine: &Engine,
    origin: &ScriptOrigin,
    state: Persistent<Object<'static>>,
) -> Result<Persistent<Value<'static>>, ScriptError> {
    loop {
        if let Some(value) = step(engine, origin, &state)? {
            return Ok(value);
        }
        tokio::task::yield_now().await;
    }
}

/// Check the promise and run one pending job
fn step(
    engine: &Engine,
    origin: &ScriptOrigin,
    state: &Persistent<Object<'static>>,
) -> Result<Option<Persistent<Value<'static>>>, ScriptError> {
    let _armed = engine.arm();
    let progress = engine.context.with(|ctx| {
        poll_state(&ctx, state)
            .catch(&ctx)
            .map_err(|err| engine.failure(&ctx, origin, err, runtime_error))
    })?;

    match progress {
        Progress::Resolved(value) => return Ok(Some(value)),
        Progress::Rejected(message) => {
            if engine.interrupted.get() {
                return Err(engine.timeout_error(origin));
            }
            return Err(runtime_error(origin.clone(), message));
        }
        Progress::Pending => {}
    }

    match engine.runtime.execute_pending_job() {
        Ok(true) => {}
        Ok(false) => {
            return Err(ScriptError::Stalled {
                origin: origin.clone(),
            })
        }
        Err(job) => {
            if engine.interrupted.get() {
                return Err(engine.timeout_error(origin));
            }
            let message = job.0.with(|ctx| describe(&ctx, CaughtError::Value(ctx.catch())));
            return Err(runtime_error(origin.clone(), message));
        }
    }

    if engine.expired() {
        return Err(engine.timeout_error(origin));
    }
    Ok(None)
}

fn poll_state<'js>(
    ctx: &Ctx<'js>,
    state: &Persistent<Object<'static>>,
) -> rquickjs::Result<Progress> {
    let state = state.clone().restore(ctx)?;
    if !state.get::<_, bool>("done")? {
        return Ok(Progress::Pending);
    }
    if state.get::<_, bool>("ok")? {
        let value: Value = state.get("value")?;
        return Ok(Progress::Resolved(Persistent::save(ctx, value)));
    }
    let error: Value = state.get("error")?;
    Ok(Progress::Rejected(describe(ctx, CaughtError::Value(error))))
}

/// Build `require` over the environment's modules
fn install_environment<'js>(
    ctx: &Ctx<'js>,
    env: &CapabilityEnvironment,
) -> rquickjs::Result<Function<'js>> {
    let shim: Function = ctx.eval(NATIVE_SHIM)?;
    let modules = Object::new(ctx.clone())?;

    for (name, module) in env.modules() {
        let exports = Object::new(ctx.clone())?;
        for (member, capability) in module.members() {
            let value: Value = match capability {
                Capability::Value(value) => ctx.json_parse(value.to_string())?,
                Capability::Function(native) => {
                    let native = Rc::clone(native);
                    let bridge = Function::new(
                        ctx.clone(),
                        move |ctx: Ctx<'js>, args: String| -> rquickjs::Result<String> {
                            call_native(&ctx, &native, &args)
                        },
                    )?;
                    shim.call((bridge,))?
                }
            };
            exports.set(member, value)?;
        }
        modules.set(name, exports)?;
    }

    let factory: Function = ctx.eval(REQUIRE_FACTORY)?;
    factory.call((modules,))
}

fn call_native(ctx: &Ctx<'_>, native: &NativeFn, args: &str) -> rquickjs::Result<String> {
    let args: Vec<serde_json::Value> = serde_json::from_str(args)
        .map_err(|err| Exception::throw_message(ctx, &err.to_string()))?;
    native(&args)
        .map(|value| value.to_string())
        .map_err(|message| Exception::throw_message(ctx, &message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Undefined,
    Null,
    Function,
    Object,
    Primitive,
}

impl ValueKind {
    fn of(value: &Value<'_>) -> Self {
        if value.is_undefined() {
            Self::Undefined
        } else if value.is_null() {
            Self::Null
        } else if value.is_function() {
            Self::Function
        } else if value.is_object() {
            Self::Object
        } else {
            Self::Primitive
        }
    }
}

/// A value produced by a script
///
/// Holds its engine alive; clones share the engine.
#[derive(Clone)]
pub struct ScriptValue {
    // Must drop before the engine it belongs to.
    value: Persistent<Value<'static>>,
    engine: Rc<Engine>,
    origin: Rc<ScriptOrigin>,
    kind: ValueKind,
}

impl ScriptValue {
    fn from_persistent(
        engine: &Rc<Engine>,
        origin: &Rc<ScriptOrigin>,
        value: Persistent<Value<'static>>,
    ) -> Result<Self, ScriptError> {
        let kind = engine.context.with(|ctx| {
            value
                .clone()
                .restore(&ctx)
                .map(|value| ValueKind::of(&value))
                .catch(&ctx)
                .map_err(|err| engine.failure(&ctx, origin, err, conversion_error))
        })?;
        Ok(Self {
            value,
            engine: Rc::clone(engine),
            origin: Rc::clone(origin),
            kind,
        })
    }

    pub fn origin(&self) -> &ScriptOrigin {
        &self.origin
    }

    pub fn is_undefined(&self) -> bool {
        self.kind == ValueKind::Undefined
    }

    pub fn is_null(&self) -> bool {
        self.kind == ValueKind::Null
    }

    /// Objects, arrays and functions
    pub fn is_object(&self) -> bool {
        matches!(self.kind, ValueKind::Object | ValueKind::Function)
    }

    pub fn is_function(&self) -> bool {
        self.kind == ValueKind::Function
    }

    fn with_value<R>(
        &self,
        kind: ErrorKind,
        f: impl for<'js> FnOnce(&Ctx<'js>, Value<'js>) -> rquickjs::Result<R>,
    ) -> Result<R, ScriptError> {
        let _armed = self.engine.arm();
        self.engine.context.with(|ctx| {
            self.value
                .clone()
                .restore(&ctx)
                .and_then(|value| f(&ctx, value))
                .catch(&ctx)
                .map_err(|err| self.engine.failure(&ctx, &self.origin, err, kind))
        })
    }

    /// Own enumerable property names; empty for non-objects
    pub fn keys(&self) -> Result<Vec<String>, ScriptError> {
        self.with_value(conversion_error, |_, value| match value.as_object() {
            Some(object) => object.keys::<String>().collect(),
            None => Ok(Vec::new()),
        })
    }

    /// A property of this value, `None` when missing or undefined
    pub fn get(&self, name: &str) -> Result<Option<ScriptValue>, ScriptError> {
        let member = self.with_value(conversion_error, |ctx, value| {
            let Some(object) = value.as_object() else {
                return Ok(None);
            };
            let member: Value = object.get(name)?;
            if member.is_undefined() {
                return Ok(None);
            }
            Ok(Some(Persistent::save(ctx, member)))
        })?;

        member
            .map(|member| Self::from_persistent(&self.engine, &self.origin, member))
            .transpose()
    }

    /// Every own property as a value
    pub fn entries(&self) -> Result<Vec<(String, ScriptValue)>, ScriptError> {
        let mut entries = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// JSON view of the value; functions and `undefined` become `null`
    pub fn to_json(&self) -> Result<serde_json::Value, ScriptError> {
        let text = self.with_value(conversion_error, |ctx, value| {
            match ctx.json_stringify(value)? {
                Some(text) => text.to_string().map(Some),
                None => Ok(None),
            }
        })?;

        match text {
            Some(text) => serde_json::from_str(&text).map_err(|err| ScriptError::Conversion {
                origin: (*self.origin).clone(),
                message: err.to_string(),
            }),
            None => Ok(serde_json::Value::Null),
        }
    }

    /// Call `this[name](...args)` and return the JSON view of its result
    pub fn call_method(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, ScriptError> {
        let args = serde_json::Value::Array(args.to_vec()).to_string();
        let text = self.with_value(runtime_error, |ctx, value| {
            let call: Function = ctx.eval(CALL_METHOD)?;
            call.call::<_, String>((value, name, args.as_str()))
        })?;

        serde_json::from_str(&text).map_err(|err| ScriptError::Conversion {
            origin: (*self.origin).clone(),
            message: err.to_string(),
        })
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptValue")
            .field("origin", &self.origin)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityBuilder, CapabilityModule};
    use crate::store::UiStore;
    use serde_json::json;
    use vessel_api::DisposableList;

    fn env() -> CapabilityEnvironment {
        CapabilityBuilder::default().build(
            &ExtensionId::new("ext"),
            &DisposableList::new(),
            &UiStore::new(),
            false,
        )
    }

    fn request(code: &str) -> ScriptRequest {
        ScriptRequest::new(code, ScriptOrigin::new(ExtensionId::new("ext"), "scripts/main.js"))
    }

    async fn run(code: &str) -> Result<ScriptValue, ScriptError> {
        ScriptExecutor::default().execute(request(code), &env()).await
    }

    async fn run_async(code: &str) -> Result<ScriptValue, ScriptError> {
        ScriptExecutor::default()
            .execute(request(code).mode(ExecutionMode::Async), &env())
            .await
    }

    #[tokio::test]
    async fn test_sync_returns_object() {
        let value = run("return { name: 'panel', data() { return { count: 1 }; } };")
            .await
            .unwrap();

        assert!(value.is_object());
        assert_eq!(value.keys().unwrap(), vec!["name", "data"]);
        assert_eq!(value.get("name").unwrap().unwrap().to_json().unwrap(), json!("panel"));
        assert!(value.get("data").unwrap().unwrap().is_function());
        assert!(value.get("missing").unwrap().is_none());
        assert_eq!(value.call_method("data", &[]).unwrap(), json!({"count": 1}));
    }

    #[tokio::test]
    async fn test_async_awaits_promises() {
        let value = run_async("const x = await Promise.resolve(41); return x + 1;")
            .await
            .unwrap();
        assert_eq!(value.to_json().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_async_rejection_is_runtime_error() {
        let err = run_async("await null; throw new TypeError('nope');")
            .await
            .unwrap_err();
        match err {
            ScriptError::Runtime { message, origin } => {
                assert_eq!(message, "TypeError: nope");
                assert_eq!(origin.file.as_deref(), Some("scripts/main.js"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_typescript_is_stripped() {
        let value = ScriptExecutor::default()
            .execute(
                request("const n: number = 2;\nreturn (n as number) * 21;")
                    .language(ScriptLanguage::TypeScript),
                &env(),
            )
            .await
            .unwrap();
        assert_eq!(value.to_json().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_typescript_this_parameter_and_non_null_run() {
        let value = ScriptExecutor::default()
            .execute(
                request(
                    "function g(this: any, a: number): number { return a * 2; }\nconst x: number | undefined = 1;\nreturn g.call(null, x! + 20);",
                )
                .language(ScriptLanguage::TypeScript),
                &env(),
            )
            .await
            .unwrap();
        assert_eq!(value.to_json().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_unknown_module_throws() {
        let err = run("require('fs');").await.unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
        assert!(err.to_string().contains("Cannot find module \"fs\""));
    }

    #[tokio::test]
    async fn test_no_ambient_host_globals() {
        let value =
            run("return [typeof process, typeof fetch, typeof window, typeof require].join(',');")
            .await
            .unwrap();
        assert_eq!(value.to_json().unwrap(), json!("undefined,undefined,undefined,function"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_compile_error() {
        let err = run("return {").await.unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_busy_loop_times_out() {
        let executor = ScriptExecutor::new(ExecutorConfig {
            timeout_ms: Some(50),
            ..ExecutorConfig::default()
        });
        let err = executor.execute(request("while (true) {}"), &env()).await.unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_time_budget_excludes_sibling_work() {
        let executor = ScriptExecutor::new(ExecutorConfig {
            timeout_ms: Some(300),
            ..ExecutorConfig::default()
        });
        let env = env();
        let waiter = executor.execute(
            request("for (let i = 0; i < 50; i++) { await null; }\nreturn 'waited';")
                .mode(ExecutionMode::Async),
            &env,
        );
        let busy = executor.execute(
            request(
                "for (let k = 0; k < 4; k++) {
                    const end = Date.now() + 100;
                    while (Date.now() < end) {}
                    await null;
                }
                return 'busy';",
            )
            .mode(ExecutionMode::Async),
            &env,
        );

        let (waiter, busy) = futures::join!(waiter, busy);
        assert_eq!(waiter.unwrap().to_json().unwrap(), json!("waited"));
        assert_eq!(busy.unwrap().to_json().unwrap(), json!("busy"));
    }

    #[tokio::test]
    async fn test_async_slice_times_out() {
        let executor = ScriptExecutor::new(ExecutorConfig {
            timeout_ms: Some(50),
            ..ExecutorConfig::default()
        });
        let err = executor
            .execute(
                request("await null;\nwhile (true) {}").mode(ExecutionMode::Async),
                &env(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_unsettled_promise_stalls() {
        let err = run_async("await new Promise(() => {});").await.unwrap_err();
        assert!(matches!(err, ScriptError::Stalled { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_executions_do_not_share_state() {
        run("globalThis.leak = 1;").await.unwrap();
        let value = run("return typeof leak;").await.unwrap();
        assert_eq!(value.to_json().unwrap(), json!("undefined"));
    }

    #[tokio::test]
    async fn test_capabilities_reach_the_host() {
        let builder = CapabilityBuilder::default();
        let disposables = DisposableList::new();
        let env = builder.build(&ExtensionId::new("ext"), &disposables, &UiStore::new(), false);

        let value = ScriptExecutor::default()
            .execute(
                request(
                    r#"
                    const env = require("@vessel/env");
                    require("@vessel/contributions").register("command", "run", { title: "Run" });
                    return env.extensionId + ":" + env.isGlobal;
                    "#,
                ),
                &env,
            )
            .await
            .unwrap();

        assert_eq!(value.to_json().unwrap(), json!("ext:false"));
        assert_eq!(disposables.len(), 1);
        assert_eq!(
            builder.services().contributions.list(
                &crate::contributions::ContributionScope::Extension(ExtensionId::new("ext")),
                "command"
            ),
            vec![("run".to_string(), json!({"title": "Run"}))]
        );
    }

    #[tokio::test]
    async fn test_native_errors_are_catchable() {
        let mut env = env();
        env.insert_module(
            "host/math",
            CapabilityModule::new().with(
                "fail",
                Capability::function(|_| Err("not today".to_string())),
            ),
        );
        let value = ScriptExecutor::default()
            .execute(
                request("try { require('host/math').fail(); } catch (e) { return e.message; }"),
                &env,
            )
            .await
            .unwrap();
        assert_eq!(value.to_json().unwrap(), json!("not today"));
    }
}
