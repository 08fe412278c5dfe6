//! Plugin languages and the bundled Lua implementation.

use crate::apis;
use crate::binder;
use crate::bridge;
use crate::capability::CapabilitySet;
use crate::error::{RuntimeError, RuntimeResult};
use crate::process::{CancellationFlag, ProcessContext, ScriptProcess};
use mlua::{Error as LuaError, HookTriggers, Lua, VmState};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Version of the scripting API contract implemented by this crate.
pub const API_SPEC_VERSION: &str = "1.0";

/// How many VM instructions may run between cancellation checks.
pub const HOOK_INSTRUCTION_INTERVAL: u32 = 1000;

/// A scripting language plugins can be written in.
///
/// Implementations must be safe to call from several threads at once:
/// every `execute` builds a fresh, isolated interpreter state.
pub trait PluginLanguage: Send + Sync {
    /// File extensions handled by this language, without the leading dot.
    fn extensions(&self) -> &[&str];

    /// Language name.
    fn name(&self) -> &str;

    /// API contract version this implementation was built against.
    fn api_version(&self) -> &str;

    /// Prepare a process labelled `label` that runs `script` when started.
    fn execute_as(&self, label: &str, script: &str) -> ScriptProcess;

    /// Prepare a process that runs `script` when started.
    fn execute(&self, script: &str) -> ScriptProcess {
        self.execute_as(self.name(), script)
    }

    /// Read a script file and prepare a process labelled `label` for it.
    fn execute_file_as(&self, label: &str, path: &Path) -> RuntimeResult<ScriptProcess> {
        let script = std::fs::read_to_string(path)?;
        Ok(self.execute_as(label, &script))
    }

    /// Read a script file and prepare a process for it, labelled by the
    /// file name.
    fn execute_file(&self, path: &Path) -> RuntimeResult<ScriptProcess> {
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name().to_string());
        self.execute_file_as(&label, path)
    }
}

/// Lua 5.4 plugin language.
///
/// Capability sets registered here are installed into every script this
/// language runs afterwards.
pub struct LuaLanguage {
    apis: RwLock<Vec<Arc<CapabilitySet>>>,
}

impl LuaLanguage {
    /// Lua with no capability sets registered.
    pub fn new() -> Self {
        Self {
            apis: RwLock::new(Vec::new()),
        }
    }

    /// Lua with the built-in `json` and `log` capability sets.
    pub fn with_standard_apis() -> RuntimeResult<Self> {
        let lua = Self::new();
        lua.register_api(apis::json_api()?);
        lua.register_api(apis::log_api()?);
        Ok(lua)
    }

    /// Register a capability set for subsequently executed scripts.
    pub fn register_api(&self, set: impl Into<Arc<CapabilitySet>>) {
        let set = set.into();
        debug!("Registering Lua API: {}", set.name());
        self.apis
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(set);
    }

    /// Registered capability sets, in registration order.
    pub fn apis(&self) -> Vec<Arc<CapabilitySet>> {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for LuaLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLanguage for LuaLanguage {
    fn extensions(&self) -> &[&str] {
        &["lua", "luaj"]
    }

    fn name(&self) -> &str {
        "Lua"
    }

    fn api_version(&self) -> &str {
        API_SPEC_VERSION
    }

    fn execute_as(&self, label: &str, script: &str) -> ScriptProcess {
        let apis = self.apis();
        let script = script.to_string();
        ScriptProcess::new(label, move |ctx| run_chunk(&script, &apis, ctx))
    }
}

impl std::fmt::Display for LuaLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one chunk in a brand-new Lua state owned by this call.
fn run_chunk(script: &str, apis: &[Arc<CapabilitySet>], ctx: &ProcessContext) -> RuntimeResult<()> {
    let lua = Lua::new();
    install_cancellation_hook(&lua, ctx.cancellation().clone());
    guard_protected_calls(&lua, ctx.cancellation().clone())?;

    let globals = lua.globals();
    for (name, value) in ctx.env() {
        globals.set(name.as_str(), bridge::to_dynamic(&lua, value)?)?;
    }
    for api in apis {
        binder::install(&lua, api)?;
    }

    lua.load(script)
        .set_name(ctx.label())
        .exec()
        .map_err(RuntimeError::from)
}

fn install_cancellation_hook(lua: &Lua, flag: CancellationFlag) {
    let triggers = HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL);
    lua.set_hook(triggers, move |_lua, _debug| {
        if flag.is_cancelled() {
            Err(LuaError::RuntimeError(CANCELLED_MESSAGE.to_string()))
        } else {
            Ok(VmState::Continue)
        }
    });
}

const CANCELLED_MESSAGE: &str = "script cancelled";

/// Rewraps the protected-call primitives so a caught cancellation error is
/// raised again as soon as the protected call returns.
const PROTECTED_CALL_GUARD: &str = r#"
local cancelled, message = ...
local pcall, xpcall, resume = pcall, xpcall, coroutine.resume

local function check(...)
    if cancelled() then
        error(message, 0)
    end
    return ...
end

_G.pcall = function(...) return check(pcall(...)) end
_G.xpcall = function(...) return check(xpcall(...)) end
coroutine.resume = function(...) return check(resume(...)) end
"#;

fn guard_protected_calls(lua: &Lua, flag: CancellationFlag) -> RuntimeResult<()> {
    let cancelled = lua.create_function(move |_, ()| Ok(flag.is_cancelled()))?;
    lua.load(PROTECTED_CALL_GUARD)
        .set_name("=cancellation")
        .call::<()>((cancelled, CANCELLED_MESSAGE))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;

    #[test]
    fn test_metadata() {
        let lua = LuaLanguage::new();
        assert_eq!(lua.name(), "Lua");
        assert_eq!(lua.api_version(), API_SPEC_VERSION);
        assert!(lua.extensions().contains(&"lua"));
        assert!(lua.extensions().contains(&"luaj"));
        assert_eq!(lua.to_string(), "Lua");
    }

    #[test]
    fn test_syntax_error_fails_process() {
        let process = LuaLanguage::new().execute("this is not lua");
        process.start().unwrap();
        assert_eq!(process.wait(), ProcessState::Failed);
    }

    #[test]
    fn test_process_label() {
        let lua = LuaLanguage::new();
        assert_eq!(lua.execute("return 1").label(), "Lua");
        assert_eq!(lua.execute_as("notes@1.0", "return 1").label(), "notes@1.0");
    }

    #[test]
    fn test_protected_calls_still_work() {
        let process = LuaLanguage::new().execute(
            r#"
            local ok, err = pcall(error, "boom", 0)
            assert(not ok and err == "boom")
            local handled = select(2, xpcall(error, function(e) return "handled " .. e end, "x", 0))
            assert(handled == "handled x")
            local co = coroutine.create(function(a) local b = coroutine.yield(a + 1); return b * 2 end)
            assert(select(2, coroutine.resume(co, 1)) == 2)
            assert(select(2, coroutine.resume(co, 5)) == 10)
            "#,
        );
        process.start().unwrap();
        assert_eq!(process.wait(), ProcessState::Completed, "{:?}", process.error());
    }

    #[test]
    fn test_standard_apis_registered_in_order() {
        let lua = LuaLanguage::with_standard_apis().unwrap();
        let names: Vec<String> = lua.apis().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["json", "log"]);
    }
}
