// json_value.rs — JSON encoding of runtime values
//
// Converts between `serde_json::Value` and `sirs_runtime::Value` guided by a
// SIRS type, for `--emit run` arguments and results.
//
// Encoding: integers and floats as JSON numbers (non-finite floats as the
// strings "nan", "inf", "-inf"), `unit` and `none` as null, arrays, slices,
// tuples and sets as arrays, maps as arrays of `[key, value]` pairs, records
// as objects keyed by field name, enum values as `{"variant", "payload"}`,
// union values as `{"member", "value"}` with the member's index.

use serde_json::{json, Value as Json};
use sirs_runtime::ops::FloatTy;
use sirs_runtime::Value;

use crate::typeck::Decls;
use crate::types::Type;

/// Decode `j` as a value of type `ty`. Errors name the JSON path.
pub fn from_json(j: &Json, ty: &Type, decls: &Decls) -> Result<Value, String> {
    decode(j, ty, decls, "")
}

fn decode(j: &Json, ty: &Type, decls: &Decls, path: &str) -> Result<Value, String> {
    let bad = || format!("{}: expected {ty}, found {j}", if path.is_empty() { "/" } else { path });
    let items = |j: &Json| j.as_array().cloned().ok_or_else(bad);
    let each = |xs: &[Json], elem: &Type| -> Result<Vec<Value>, String> {
        xs.iter()
            .enumerate()
            .map(|(i, x)| decode(x, elem, decls, &format!("{path}/{i}")))
            .collect()
    };
    match ty {
        Type::Int(t) => {
            let v = j
                .as_i64()
                .map(i128::from)
                .or_else(|| j.as_u64().map(i128::from))
                .filter(|v| t.fits(*v))
                .ok_or_else(bad)?;
            Ok(Value::Int(t.from_i128(v)))
        }
        Type::Float(t) => {
            let x = match j {
                Json::Number(n) => n.as_f64().ok_or_else(bad)?,
                Json::String(s) => match s.as_str() {
                    "nan" => f64::NAN,
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    _ => return Err(bad()),
                },
                _ => return Err(bad()),
            };
            Ok(Value::Float(if *t == FloatTy::F32 { t.round(x) } else { x }))
        }
        Type::Bool => j.as_bool().map(Value::Bool).ok_or_else(bad),
        Type::Str => j.as_str().map(|s| Value::Str(s.to_string())).ok_or_else(bad),
        Type::Unit => j.is_null().then_some(Value::Unit).ok_or_else(bad),
        Type::Array(elem, len) => {
            let xs = items(j)?;
            if xs.len() as u64 != *len {
                return Err(format!("{path}: expected {len} element(s), found {}", xs.len()));
            }
            Ok(Value::Array(each(&xs, elem)?))
        }
        Type::Slice(elem) => Ok(Value::Array(each(&items(j)?, elem)?)),
        Type::Set(elem) => Ok(Value::Set(each(&items(j)?, elem)?.into_iter().collect())),
        Type::Tuple(ts) => {
            let xs = items(j)?;
            if xs.len() != ts.len() {
                return Err(bad());
            }
            xs.iter()
                .zip(ts)
                .enumerate()
                .map(|(i, (x, t))| decode(x, t, decls, &format!("{path}/{i}")))
                .collect::<Result<_, _>>()
                .map(Value::Tuple)
        }
        Type::Map(k, v) => {
            let mut map = std::collections::BTreeMap::new();
            for (i, pair) in items(j)?.iter().enumerate() {
                match pair.as_array().map(Vec::as_slice) {
                    Some([key, val]) => {
                        let at = format!("{path}/{i}");
                        map.insert(
                            decode(key, k, decls, &format!("{at}/0"))?,
                            decode(val, v, decls, &format!("{at}/1"))?,
                        );
                    }
                    _ => return Err(format!("{path}/{i}: expected a [key, value] pair")),
                }
            }
            Ok(Value::Map(map))
        }
        Type::Optional(inner) => match j {
            Json::Null => Ok(Value::none()),
            other => Ok(Value::some(decode(other, inner, decls, path)?)),
        },
        Type::Union(members) => {
            let member = j.get("member").and_then(Json::as_u64).ok_or_else(bad)?;
            let mt = members.get(member as usize).ok_or_else(bad)?;
            let value = decode(j.get("value").unwrap_or(&Json::Null), mt, decls, &format!("{path}/value"))?;
            Ok(Value::Variant {
                tag: member as u32,
                payload: vec![value],
            })
        }
        Type::Named { .. } => {
            if let Some(fields) = decls.record_fields(ty) {
                let obj = j.as_object().ok_or_else(bad)?;
                let vals = fields
                    .iter()
                    .map(|(name, ft)| {
                        let x = obj.get(name).ok_or_else(|| format!("{path}: missing field '{name}'"))?;
                        decode(x, ft, decls, &format!("{path}/{name}"))
                    })
                    .collect::<Result<_, _>>()?;
                return Ok(Value::Record(vals));
            }
            let variants = decls.enum_variants(ty).ok_or_else(bad)?;
            let name = j.get("variant").and_then(Json::as_str).ok_or_else(bad)?;
            let (tag, (_, payload_tys)) = variants
                .iter()
                .enumerate()
                .find(|(_, (v, _))| v == name)
                .ok_or_else(|| format!("{path}: {ty} has no variant '{name}'"))?;
            let raw = j.get("payload").and_then(Json::as_array).cloned().unwrap_or_default();
            if raw.len() != payload_tys.len() {
                return Err(format!("{path}: variant '{name}' takes {} value(s)", payload_tys.len()));
            }
            let payload = raw
                .iter()
                .zip(payload_tys)
                .enumerate()
                .map(|(i, (x, t))| decode(x, t, decls, &format!("{path}/payload/{i}")))
                .collect::<Result<_, _>>()?;
            Ok(Value::Variant {
                tag: tag as u32,
                payload,
            })
        }
        Type::Param(_) | Type::Dyn(_) => Err(format!("{path}: values of type {ty} cannot be supplied as input")),
    }
}

/// Encode `v`, which has type `ty`.
pub fn to_json(v: &Value, ty: &Type, decls: &Decls) -> Json {
    let elems = |xs: &[Value], t: &Type| Json::Array(xs.iter().map(|x| to_json(x, t, decls)).collect());
    match (ty, v) {
        (_, Value::Unit) => Json::Null,
        (_, Value::Bool(b)) => json!(b),
        (Type::Int(t), Value::Int(i)) if !t.signed() => json!(t.to_i128(*i) as u64),
        (_, Value::Int(i)) => json!(i),
        (_, Value::Float(x)) => float_json(*x),
        (_, Value::Str(s)) => json!(s),
        (Type::Array(t, _) | Type::Slice(t), Value::Array(xs)) => elems(xs, t),
        (Type::Set(t), Value::Set(xs)) => Json::Array(xs.iter().map(|x| to_json(x, t, decls)).collect()),
        (Type::Tuple(ts), Value::Tuple(xs)) => Json::Array(xs.iter().zip(ts).map(|(x, t)| to_json(x, t, decls)).collect()),
        (Type::Map(k, t), Value::Map(m)) => Json::Array(
            m.iter()
                .map(|(key, val)| json!([to_json(key, k, decls), to_json(val, t, decls)]))
                .collect(),
        ),
        (Type::Optional(inner), Value::Variant { tag, payload }) => match (tag, payload.first()) {
            (1, Some(x)) => to_json(x, inner, decls),
            _ => Json::Null,
        },
        (Type::Union(members), Value::Variant { tag, payload }) => {
            let value = match (members.get(*tag as usize), payload.first()) {
                (Some(t), Some(x)) => to_json(x, t, decls),
                (None, Some(x)) => untyped(x),
                _ => Json::Null,
            };
            json!({"member": tag, "value": value})
        }
        (Type::Named { .. }, Value::Record(xs)) => match decls.record_fields(ty) {
            Some(fields) => Json::Object(
                fields
                    .iter()
                    .zip(xs)
                    .map(|((name, t), x)| (name.clone(), to_json(x, t, decls)))
                    .collect(),
            ),
            None => untyped(v),
        },
        (Type::Named { .. }, Value::Variant { tag, payload }) => {
            match decls.enum_variants(ty).and_then(|vs| vs.into_iter().nth(*tag as usize)) {
                Some((name, tys)) => json!({
                    "variant": name,
                    "payload": payload.iter().zip(&tys).map(|(x, t)| to_json(x, t, decls)).collect::<Vec<_>>(),
                }),
                None => untyped(v),
            }
        }
        _ => untyped(v),
    }
}

fn float_json(x: f64) -> Json {
    if x.is_nan() {
        json!("nan")
    } else if x.is_infinite() {
        json!(if x > 0.0 { "inf" } else { "-inf" })
    } else {
        json!(x)
    }
}

/// Encoding without type information, for interface values.
fn untyped(v: &Value) -> Json {
    let all = |xs: &[Value]| Json::Array(xs.iter().map(untyped).collect());
    match v {
        Value::Unit => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(x) => float_json(*x),
        Value::Str(s) => json!(s),
        Value::Array(xs) | Value::Tuple(xs) | Value::Record(xs) => all(xs),
        Value::Variant { tag, payload } => json!({"tag": tag, "payload": all(payload)}),
        Value::Map(m) => Json::Array(m.iter().map(|(k, x)| json!([untyped(k), untyped(x)])).collect()),
        Value::Set(s) => Json::Array(s.iter().map(untyped).collect()),
        Value::Dyn { value, .. } => untyped(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_value;
    use crate::typeck::{check, CheckOptions};
    use sirs_runtime::ops::IntTy;
    use sirs_runtime::Registry;

    fn decls() -> Decls {
        let doc = json!({
            "types": [
                {"name": "P", "record": {"fields": [{"name": "x", "type": "i32"}, {"name": "ok", "type": "bool"}]}},
                {"name": "S", "enum": {"variants": [{"name": "A"}, {"name": "B", "payload": ["f64"]}]}}
            ],
            "functions": []
        });
        let program = parse_value(&doc).program.expect("program");
        check(&program, &Registry::with_builtins(), &CheckOptions::default()).typed.decls
    }

    #[test]
    fn records_and_enums_use_names() {
        let d = decls();
        let p = Type::named("P");
        let v = from_json(&json!({"x": -3, "ok": true}), &p, &d).expect("record");
        assert_eq!(v, Value::Record(vec![Value::Int(-3), Value::Bool(true)]));
        assert_eq!(to_json(&v, &p, &d), json!({"x": -3, "ok": true}));

        let s = Type::named("S");
        let b = from_json(&json!({"variant": "B", "payload": [1.5]}), &s, &d).expect("variant");
        assert_eq!(
            b,
            Value::Variant {
                tag: 1,
                payload: vec![Value::Float(1.5)]
            }
        );
        assert_eq!(to_json(&b, &s, &d), json!({"variant": "B", "payload": [1.5]}));
    }

    #[test]
    fn integers_must_fit() {
        let d = decls();
        let u8t = Type::Int(IntTy::U8);
        assert_eq!(from_json(&json!(255), &u8t, &d), Ok(Value::Int(255)));
        assert!(from_json(&json!(256), &u8t, &d).is_err());
        assert!(from_json(&json!(1.5), &u8t, &d).is_err());
    }

    #[test]
    fn optionals_and_maps() {
        let d = decls();
        let opt = Type::Optional(Box::new(Type::Str));
        assert_eq!(from_json(&Json::Null, &opt, &d), Ok(Value::none()));
        let m = Type::Map(Box::new(Type::Int(IntTy::I64)), Box::new(Type::Bool));
        let v = from_json(&json!([[2, true], [1, false]]), &m, &d).expect("map");
        assert_eq!(to_json(&v, &m, &d), json!([[1, false], [2, true]]));
        let err = from_json(&json!([[1]]), &m, &d).expect_err("bad pair");
        assert!(err.starts_with("/0"), "{err}");
    }
}
