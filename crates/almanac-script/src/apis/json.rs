//! `json` capability set: conversion between script values and JSON text.

use crate::capability::{CapabilitySet, ParamType};
use crate::error::RuntimeResult;
use crate::value::NativeValue;

/// Build the `json` capability set.
///
/// - `json.toJsonString(value)` renders any value as pretty-printed JSON,
///   keeping `null`s.
/// - `json.parseJsonString(text)` parses JSON text into a script value.
pub fn json_api() -> RuntimeResult<CapabilitySet> {
    CapabilitySet::builder("json")
        .function("toJsonString", [ParamType::Any], |args| {
            let value = args.into_iter().next().unwrap_or_default();
            let rendered = serde_json::to_string_pretty(&value.to_json())?;
            Ok(NativeValue::Text(rendered))
        })
        .function("parseJsonString", [ParamType::Text], |args| {
            let text = args.first().and_then(NativeValue::as_str).unwrap_or_default();
            let parsed: serde_json::Value = serde_json::from_str(text)?;
            Ok(NativeValue::from_json(&parsed))
        })
        .build()
}
