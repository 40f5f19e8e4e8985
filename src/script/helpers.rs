//! Pure conversion helpers exposed to scripts.
//!
//! None of these raise: a value that cannot be converted yields the
//! type's default (0, 0.0, "", false or an empty list).

use mlua::{Lua, Result as LuaResult, Table, Value};
use rand::Rng;

/// Helper names registered into every script namespace.
pub const NAMES: [&str; 8] = ["int", "float", "str", "bool", "list", "len", "round", "random"];

fn float_to_int(n: f64) -> i64 {
    if n.is_finite() && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        n.trunc() as i64
    } else {
        0
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(float_to_int))
}

pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Number(n) => float_to_int(*n),
        Value::Boolean(b) => i64::from(*b),
        Value::String(s) => s.to_str().ok().and_then(|s| parse_int(&s)).unwrap_or(0),
        _ => 0,
    }
}

pub fn to_float(value: &Value) -> f64 {
    let n = match value {
        Value::Integer(i) => *i as f64,
        Value::Number(n) => *n,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::String(s) => s
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_nan() {
        0.0
    } else {
        n
    }
}

pub fn to_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{n:.1}"),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

fn table_is_empty(table: &Table) -> bool {
    let table = table.clone();
    let mut pairs = table.pairs::<Value, Value>();
    pairs.next().is_none()
}

pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Boolean(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.as_bytes().is_empty(),
        Value::Table(t) => !table_is_empty(t),
        _ => true,
    }
}

fn table_values(table: &Table) -> Vec<Value> {
    let len = table.raw_len();
    if len > 0 {
        return (1..=len)
            .filter_map(|i| {
                let value: mlua::Result<Value> = table.raw_get(i);
                value.ok()
            })
            .collect();
    }
    let table = table.clone();
    table
        .pairs::<Value, Value>()
        .filter_map(|pair| pair.ok().map(|(_, v)| v))
        .collect()
}

pub fn len_of(value: &Value) -> i64 {
    match value {
        Value::String(s) => s.to_string_lossy().chars().count() as i64,
        Value::Table(t) => table_values(t).len() as i64,
        _ => 0,
    }
}

fn to_list(lua: &Lua, value: &Value) -> LuaResult<Table> {
    match value {
        Value::Table(t) => lua.create_sequence_from(table_values(t)),
        Value::String(s) => {
            let text = s.to_string_lossy().to_string();
            lua.create_sequence_from(text.chars().map(|c| c.to_string()))
        }
        _ => lua.create_table(),
    }
}

fn round_value(value: &Value, digits: &Value) -> Value {
    let n = to_float(value);
    if digits.is_nil() {
        return Value::Integer(float_to_int(n.round()));
    }
    let digits = to_int(digits).clamp(0, 15) as i32;
    let factor = 10f64.powi(digits);
    Value::Number((n * factor).round() / factor)
}

fn random_between(min: &Value, max: &Value) -> i64 {
    let (mut lo, mut hi) = (to_int(min), to_int(max));
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    rand::rng().random_range(lo..=hi)
}

/// Register the helpers into a script namespace.
pub fn register(lua: &Lua, env: &Table) -> LuaResult<()> {
    env.raw_set("int", lua.create_function(|_, v: Value| Ok(to_int(&v)))?)?;
    env.raw_set("float", lua.create_function(|_, v: Value| Ok(to_float(&v)))?)?;
    env.raw_set("str", lua.create_function(|_, v: Value| Ok(to_str(&v)))?)?;
    env.raw_set("bool", lua.create_function(|_, v: Value| Ok(to_bool(&v)))?)?;
    env.raw_set("list", lua.create_function(|lua, v: Value| to_list(lua, &v))?)?;
    env.raw_set("len", lua.create_function(|_, v: Value| Ok(len_of(&v)))?)?;
    env.raw_set(
        "round",
        lua.create_function(|_, (v, digits): (Value, Value)| Ok(round_value(&v, &digits)))?,
    )?;
    env.raw_set(
        "random",
        lua.create_function(|_, (min, max): (Value, Value)| Ok(random_between(&min, &max)))?,
    )?;
    Ok(())
}
