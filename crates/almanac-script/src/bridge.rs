//! Coercion between Lua values and [`NativeValue`].
//!
//! Both directions are total: every Lua value maps to some native value
//! (unsupported kinds such as functions and threads become
//! [`NativeValue::Absent`]) and every native value has a Lua form.
//!
//! Rules:
//!
//! - A table whose keys are all numbers is a sequence, ordered by key. One
//!   non-numeric key makes the whole table a map. An empty table is an
//!   empty sequence.
//! - A Lua number with no fractional part becomes an integer.
//! - Strings that are valid UTF-8 become text, anything else bytes. There is
//!   no separate character kind in either direction.
//! - Capability references travel as [`BoundCapability`] userdata and come
//!   back as the same reference.
//!
//! Nested structures are converted recursively with no cycle detection; a
//! self-referencing table recurses until the stack is exhausted.

use crate::binder::{self, BoundCapability};
use crate::value::{NativeMap, NativeValue};
use mlua::{Lua, Result as LuaResult, Table, Value};

/// Convert a Lua value into a native value.
pub fn to_native(value: &Value) -> NativeValue {
    match value {
        Value::Nil => NativeValue::Absent,
        Value::Boolean(b) => NativeValue::Bool(*b),
        Value::Integer(i) => NativeValue::Integer(*i),
        Value::Number(n) => NativeValue::from_number(*n),
        Value::String(s) => {
            let bytes = s.as_bytes().to_vec();
            match String::from_utf8(bytes) {
                Ok(text) => NativeValue::Text(text),
                Err(err) => NativeValue::Bytes(err.into_bytes()),
            }
        }
        Value::Table(table) => table_to_native(table),
        Value::UserData(ud) => match ud.borrow::<BoundCapability>() {
            Ok(bound) => NativeValue::Capability(bound.capability_set()),
            Err(_) => NativeValue::Absent,
        },
        _ => NativeValue::Absent,
    }
}

fn table_to_native(table: &Table) -> NativeValue {
    let mut entries = Vec::new();
    let collected = table.for_each(|key: Value, value: Value| {
        entries.push((key, value));
        Ok(())
    });
    if collected.is_err() {
        return NativeValue::Absent;
    }

    let numeric_key = |key: &Value| match key {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    };

    if entries.iter().all(|(k, _)| numeric_key(k).is_some()) {
        let mut indexed: Vec<(f64, &Value)> = entries
            .iter()
            .filter_map(|(k, v)| numeric_key(k).map(|n| (n, v)))
            .collect();
        indexed.sort_by(|a, b| a.0.total_cmp(&b.0));
        return NativeValue::Sequence(indexed.into_iter().map(|(_, v)| to_native(v)).collect());
    }

    let map: NativeMap = entries
        .iter()
        .map(|(k, v)| (to_native(k), to_native(v)))
        .collect();
    NativeValue::Map(map)
}

/// Convert a native value into a Lua value owned by `lua`.
pub fn to_dynamic(lua: &Lua, value: &NativeValue) -> LuaResult<Value> {
    Ok(match value {
        NativeValue::Absent => Value::Nil,
        NativeValue::Bool(b) => Value::Boolean(*b),
        NativeValue::Integer(i) => Value::Integer(*i),
        NativeValue::Float(n) => Value::Number(*n),
        NativeValue::Text(s) => Value::String(lua.create_string(s)?),
        NativeValue::Bytes(bytes) => Value::String(lua.create_string(bytes)?),
        NativeValue::Sequence(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i as i64 + 1, to_dynamic(lua, item)?)?;
            }
            Value::Table(table)
        }
        NativeValue::Map(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map.iter() {
                // Lua tables cannot hold nil or NaN keys.
                let nan_key = matches!(key, NativeValue::Float(f) if f.is_nan());
                if key.is_absent() || nan_key {
                    continue;
                }
                table.raw_set(to_dynamic(lua, key)?, to_dynamic(lua, item)?)?;
            }
            Value::Table(table)
        }
        NativeValue::Capability(set) => Value::UserData(binder::bind(lua, set)?),
    })
}
