//! Sandboxed Lua engine.
//!
//! Every invocation gets a fresh Lua state whose script namespace holds
//! only the safe globals listed in [`SAFE_GLOBALS`] plus the capability
//! surface. Nothing survives between invocations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mlua::{
    ChunkMode, Function, HookTriggers, Lua, LuaOptions, StdLib, Table, Thread, Value, VmState,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::api::CapabilitySurface;
use super::context::{Host, InvocationContext};
use crate::command::template::ENTRY_POINT;
use crate::config::EngineConfig;

/// Base-library globals copied into the script namespace.
pub const SAFE_GLOBALS: [&str; 11] = [
    "assert", "error", "ipairs", "next", "pairs", "pcall", "select", "tonumber", "tostring",
    "type", "xpcall",
];

/// Standard libraries copied into the script namespace.
pub const SAFE_LIBRARIES: [&str; 4] = ["string", "table", "math", "utf8"];

/// VM instructions between two deadline checks.
const HOOK_INTERVAL: u32 = 1000;

const TIME_LIMIT_MESSAGE: &str = "script exceeded its time limit";
const INSTRUCTION_LIMIT_MESSAGE: &str = "script exceeded instruction limit";

/// Replacements for `pcall` and `xpcall` that refuse to swallow the
/// error raised once the budget is spent.
const PROTECTED_CALLS: &str = r#"
local pcall, xpcall, error, aborted = ...
local function rethrow(ok, ...)
    if not ok then
        local reason = aborted()
        if reason then
            error(reason, 0)
        end
    end
    return ok, ...
end
return function(f, ...)
    return rethrow(pcall(f, ...))
end, function(f, handler, ...)
    return rethrow(xpcall(f, handler, ...))
end
"#;

/// Resource limits for one invocation.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Wall-clock budget, including time spent awaiting capabilities.
    pub timeout: Duration,
    /// Maximum number of instructions (0 = unlimited).
    pub max_instructions: u64,
    /// Maximum memory in bytes (0 = unlimited).
    pub max_memory: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ResourceLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_instructions: config.max_instructions,
            max_memory: config.max_memory_mb * 1024 * 1024,
        }
    }
}

/// How an invocation ended when it did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The entry point ran to completion.
    Completed,
    /// The script defined no entry point; nothing ran.
    NoEntryPoint,
}

/// Why an invocation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptFault {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("script exceeded its {}s time limit", .0.as_secs_f32())]
    Timeout(Duration),
}

impl ScriptFault {
    fn host(err: mlua::Error) -> Self {
        ScriptFault::Runtime(format!("failed to prepare script: {err}"))
    }
}

/// Deadline and instruction accounting shared by the hooks of one
/// invocation. Once spent, it stays spent.
#[derive(Debug)]
struct Budget {
    deadline: Instant,
    max_instructions: u64,
    executed: AtomicU64,
    timed_out: AtomicBool,
    exhausted: AtomicBool,
}

impl Budget {
    fn new(limits: &ResourceLimits) -> Self {
        Self {
            deadline: Instant::now() + limits.timeout,
            max_instructions: limits.max_instructions,
            executed: AtomicU64::new(0),
            timed_out: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Why the invocation must stop, if it must.
    fn abort_reason(&self) -> Option<&'static str> {
        if self.timed_out.load(Ordering::SeqCst) {
            Some(TIME_LIMIT_MESSAGE)
        } else if self.exhausted.load(Ordering::SeqCst) {
            Some(INSTRUCTION_LIMIT_MESSAGE)
        } else {
            None
        }
    }

    fn tick(&self) -> mlua::Result<VmState> {
        if Instant::now() >= self.deadline {
            self.timed_out.store(true, Ordering::SeqCst);
        }
        let executed = self
            .executed
            .fetch_add(u64::from(HOOK_INTERVAL), Ordering::SeqCst)
            + u64::from(HOOK_INTERVAL);
        if self.max_instructions > 0 && executed > self.max_instructions {
            self.exhausted.store(true, Ordering::SeqCst);
        }
        match self.abort_reason() {
            Some(reason) => Err(mlua::Error::RuntimeError(reason.to_string())),
            None => Ok(VmState::Continue),
        }
    }

    /// Hook `thread` so a compute-bound loop on it is stopped from inside
    /// the VM. Only the most recently guarded thread is checked.
    fn guard(self: &Arc<Self>, thread: &Thread) {
        let budget = Arc::clone(self);
        thread.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
            move |_lua, _debug| budget.tick(),
        );
    }
}

/// Runs wrapped scripts under [`ResourceLimits`].
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    limits: ResourceLimits,
}

impl ScriptEngine {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Compile `source` without running it.
    pub fn check_syntax(&self, name: &str, source: &str) -> Result<(), ScriptFault> {
        let lua = Lua::new_with(StdLib::NONE, LuaOptions::default()).map_err(ScriptFault::host)?;
        lua.load(source)
            .set_name(name)
            .set_mode(ChunkMode::Text)
            .into_function()
            .map(|_| ())
            .map_err(|e| ScriptFault::Compile(e.to_string()))
    }

    /// Run one invocation of a wrapped script.
    ///
    /// The chunk is executed to define the entry point, which is then
    /// called with the snapshot arguments of `context`.
    pub async fn run(
        &self,
        name: &str,
        source: &str,
        host: &Host,
        context: Arc<InvocationContext>,
    ) -> Result<RunOutcome, ScriptFault> {
        let budget = Arc::new(Budget::new(&self.limits));
        let lua = self.create_state().map_err(ScriptFault::host)?;
        let env = sandbox_env(&lua).map_err(ScriptFault::host)?;
        protect_calls(&lua, &env, &budget).map_err(ScriptFault::host)?;
        CapabilitySurface::new(host.clone(), Arc::clone(&context))
            .register(&lua, &env)
            .map_err(ScriptFault::host)?;

        let chunk = lua
            .load(source)
            .set_name(name)
            .set_mode(ChunkMode::Text)
            .set_environment(env.clone())
            .into_function()
            .map_err(|e| ScriptFault::Compile(e.to_string()))?;

        // Both the chunk and the entry point run on their own coroutine,
        // which is where the hook has to live.
        let execution = async {
            let thread = lua.create_thread(chunk)?;
            budget.guard(&thread);
            let _: () = thread.into_async(()).await?;

            let entry: Value = env.raw_get(ENTRY_POINT)?;
            let Value::Function(entry) = entry else {
                return Ok(RunOutcome::NoEntryPoint);
            };
            let args = context.entry_args(&lua)?;
            let thread = lua.create_thread(entry)?;
            budget.guard(&thread);
            let _: () = thread.into_async(args).await?;
            Ok::<_, mlua::Error>(RunOutcome::Completed)
        };

        match tokio::time::timeout(self.limits.timeout, execution).await {
            Ok(Ok(outcome)) => {
                debug!(?outcome, "script finished");
                Ok(outcome)
            }
            Ok(Err(_)) if budget.timed_out.load(Ordering::SeqCst) => {
                Err(ScriptFault::Timeout(self.limits.timeout))
            }
            Ok(Err(_)) if budget.exhausted.load(Ordering::SeqCst) => {
                Err(ScriptFault::Runtime(INSTRUCTION_LIMIT_MESSAGE.to_string()))
            }
            Ok(Err(e)) => Err(ScriptFault::Runtime(e.to_string())),
            Err(_) => Err(ScriptFault::Timeout(self.limits.timeout)),
        }
    }

    fn create_state(&self) -> mlua::Result<Lua> {
        let libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default())?;

        if self.limits.max_memory > 0 {
            lua.set_memory_limit(self.limits.max_memory)?;
        }

        Ok(lua)
    }
}

/// Swap the namespace's `pcall` and `xpcall` for versions that re-raise
/// once `budget` is spent.
fn protect_calls(lua: &Lua, env: &Table, budget: &Arc<Budget>) -> mlua::Result<()> {
    let globals = lua.globals();
    let pcall: Function = globals.raw_get("pcall")?;
    let xpcall: Function = globals.raw_get("xpcall")?;
    let error: Function = globals.raw_get("error")?;
    let budget = Arc::clone(budget);
    let aborted = lua.create_function(move |_, ()| Ok(budget.abort_reason()))?;

    let (pcall, xpcall): (Function, Function) = lua
        .load(PROTECTED_CALLS)
        .set_name("=protected_calls")
        .set_mode(ChunkMode::Text)
        .call((pcall, xpcall, error, aborted))?;
    env.raw_set("pcall", pcall)?;
    env.raw_set("xpcall", xpcall)?;
    Ok(())
}

/// Build the script namespace: safe globals only, no access to the real
/// globals table.
pub fn sandbox_env(lua: &Lua) -> mlua::Result<Table> {
    let globals = lua.globals();
    let env = lua.create_table()?;

    for name in SAFE_GLOBALS.iter().chain(SAFE_LIBRARIES.iter()) {
        let value: Value = globals.raw_get(*name)?;
        env.raw_set(*name, value)?;
    }

    let table: Table = globals.raw_get("table")?;
    let unpack: Value = table.raw_get("unpack")?;
    env.raw_set("unpack", unpack)?;

    trace!("sandbox namespace built");
    Ok(env)
}
