//! Binding capability sets into a Lua state.
//!
//! A bound set is a userdata object. Indexing it yields the constant
//! snapshot taken when it was bound, or a callable that runs overload
//! resolution against the set on every call. Assignment is rejected.

use crate::bridge;
use crate::capability::CapabilitySet;
use crate::value::NativeValue;
use mlua::{
    AnyUserData, Error as LuaError, Function, Lua, MetaMethod, MultiValue, Result as LuaResult,
    Table, UserData, UserDataMethods, Value,
};
use std::sync::Arc;
use tracing::trace;

/// A capability set as seen from Lua.
pub struct BoundCapability {
    set: Arc<CapabilitySet>,
    constants: Vec<(String, NativeValue)>,
}

impl BoundCapability {
    fn new(set: Arc<CapabilitySet>) -> Self {
        let constants = set.snapshot_constants();
        Self { set, constants }
    }

    /// The capability set behind this object.
    pub fn capability_set(&self) -> Arc<CapabilitySet> {
        Arc::clone(&self.set)
    }

    fn constant(&self, name: &str) -> Option<&NativeValue> {
        self.constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl UserData for BoundCapability {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            if let Some(value) = this.constant(&key) {
                return bridge::to_dynamic(lua, value);
            }
            if this.set.has_function(&key) {
                let func = dispatcher(lua, Arc::clone(&this.set), key)?;
                return Ok(Value::Function(func));
            }
            Ok(Value::Nil)
        });

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, _value): (String, Value)| -> LuaResult<()> {
                Err(LuaError::RuntimeError(format!(
                    "cannot assign '{}': capability set '{}' is read-only",
                    key,
                    this.set.name()
                )))
            },
        );

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(this.set.name().to_string())
        });
    }
}

/// Build the Lua function that dispatches calls to one overload group.
fn dispatcher(lua: &Lua, set: Arc<CapabilitySet>, name: String) -> LuaResult<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        trace!(set = set.name(), function = %name, args = args.len(), "capability call");
        let natives: Vec<NativeValue> = args.iter().map(bridge::to_native).collect();
        match set.call(&name, natives) {
            Ok(result) => bridge::to_dynamic(lua, &result),
            Err(err) => Err(LuaError::RuntimeError(err.to_string())),
        }
    })
}

/// Wrap a capability set as a Lua object.
pub fn bind(lua: &Lua, set: &Arc<CapabilitySet>) -> LuaResult<AnyUserData> {
    lua.create_userdata(BoundCapability::new(Arc::clone(set)))
}

/// Bind a capability set and publish it both as a global and in
/// `package.loaded`, so scripts can use it directly or through `require`.
pub fn install(lua: &Lua, set: &Arc<CapabilitySet>) -> LuaResult<()> {
    let bound = bind(lua, set)?;
    let globals = lua.globals();
    globals.set(set.name(), bound.clone())?;

    let package: Value = globals.get("package")?;
    if let Value::Table(package) = package {
        let loaded: Table = package.get("loaded")?;
        loaded.set(set.name(), bound)?;
    }
    Ok(())
}
