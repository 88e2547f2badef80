//! Pairing untyped values with a signature.
//!
//! [`marshal`] walks the parsed descriptors and the caller's values side by
//! side and produces one [`Arg`] per position. Values in a `v` position have
//! their wire type inferred from the value itself:
//!
//! | value      | inferred |
//! |------------|----------|
//! | bool       | `b` |
//! | string     | `s` |
//! | integer    | `i`, else `u`, else `x` (`t` above `i64::MAX`) |
//! | double     | `d` |
//! | array, map | depends on the [`VariantPolicy`] |
//!
//! Under [`VariantPolicy::Default`] arrays become `av` and maps `a{sv}`, so
//! nested structure and mixed member types survive. Under
//! [`VariantPolicy::Simple`] members share one type: the common inferred
//! type if there is one, otherwise scalar members are stringified.

use std::collections::BTreeMap;

use ndbus_core::{Value, VariantPolicy};

use crate::arg::Arg;
use crate::error::{MarshalError, MarshalResult};
use crate::names::validate_object_path;
use crate::signature::{ScalarCode, TypeDescriptor, parse_signature};

/// Parses `signature` and marshals `values` against it.
pub fn marshal_signature(
    signature: &str,
    values: &[Value],
    policy: VariantPolicy,
) -> MarshalResult<Vec<Arg>> {
    let types = parse_signature(signature)?;
    let args = marshal(&types, values, policy)?;
    tracing::trace!(signature, args = args.len(), ?policy, "Marshaled arguments");
    Ok(args)
}

/// Marshals `values` against already parsed descriptors, one value per
/// descriptor.
pub fn marshal(
    types: &[TypeDescriptor],
    values: &[Value],
    policy: VariantPolicy,
) -> MarshalResult<Vec<Arg>> {
    if types.len() != values.len() {
        return Err(MarshalError::ArgumentMismatch {
            expected: types.len(),
            actual: values.len(),
        });
    }

    let encoder = Encoder { policy };
    types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(index, (ty, value))| encoder.encode(ty, value, &format!("arg{index}")))
        .collect()
}

/// Infers the type a value gets in a `v` position. The result is not
/// wrapped in [`Arg::Variant`].
pub fn infer_variant(value: &Value, policy: VariantPolicy) -> MarshalResult<Arg> {
    Encoder { policy }.infer(value, "value")
}

struct Encoder {
    policy: VariantPolicy,
}

impl Encoder {
    fn encode(&self, ty: &TypeDescriptor, value: &Value, path: &str) -> MarshalResult<Arg> {
        match ty {
            TypeDescriptor::Scalar(code) => encode_scalar(*code, value, path),
            TypeDescriptor::Variant => Ok(Arg::Variant(Box::new(self.infer(value, path)?))),
            TypeDescriptor::Struct(fields) => {
                let Value::Array(items) = value else {
                    return Err(MarshalError::type_mismatch(path, ty.signature(), value.kind()));
                };
                if items.len() != fields.len() {
                    return Err(MarshalError::type_mismatch(
                        path,
                        ty.signature(),
                        format!("array of {} element(s)", items.len()),
                    ));
                }
                let fields = fields
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(i, (field, item))| self.encode(field, item, &format!("{path}.{i}")))
                    .collect::<MarshalResult<_>>()?;
                Ok(Arg::Struct(fields))
            }
            TypeDescriptor::Array(element) => match element.as_ref() {
                TypeDescriptor::DictEntry(key, val) => self.encode_dict(key, val, value, path),
                element => self.encode_array(element, value, path),
            },
            TypeDescriptor::DictEntry(..) => Err(MarshalError::type_mismatch(
                path,
                "array of dict entries",
                "bare dict entry",
            )),
        }
    }

    fn encode_array(
        &self,
        element: &TypeDescriptor,
        value: &Value,
        path: &str,
    ) -> MarshalResult<Arg> {
        let Value::Array(items) = value else {
            return Err(MarshalError::type_mismatch(
                path,
                TypeDescriptor::array(element.clone()).signature(),
                value.kind(),
            ));
        };

        let items = if *element == TypeDescriptor::Variant {
            let members = items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{path}[{i}]"), item));
            self.variant_members(members)?
        } else {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| self.encode(element, item, &format!("{path}[{i}]")))
                .collect::<MarshalResult<_>>()?
        };

        Ok(Arg::Array {
            element: element.clone(),
            items,
        })
    }

    fn encode_dict(
        &self,
        key: &TypeDescriptor,
        val: &TypeDescriptor,
        value: &Value,
        path: &str,
    ) -> MarshalResult<Arg> {
        let Value::Map(map) = value else {
            return Err(MarshalError::type_mismatch(
                path,
                TypeDescriptor::dict(key.clone(), val.clone()).signature(),
                value.kind(),
            ));
        };
        let TypeDescriptor::Scalar(key_code) = key else {
            return Err(MarshalError::type_mismatch(path, "basic key type", key.signature()));
        };

        // distinct texts may parse to one typed key ("1", "01", "+1")
        let mut keys: Vec<Arg> = Vec::with_capacity(map.len());
        for k in map.keys() {
            let typed = encode_key(*key_code, k, path)?;
            if keys.contains(&typed) {
                return Err(MarshalError::type_mismatch(
                    format!("{path}[{k:?}]"),
                    format!("unique {} key", key_code.name()),
                    format!("duplicate key {k:?}"),
                ));
            }
            keys.push(typed);
        }

        let values = if *val == TypeDescriptor::Variant {
            self.variant_members(map.iter().map(|(k, v)| (format!("{path}[{k:?}]"), v)))?
        } else {
            map.iter()
                .map(|(k, v)| self.encode(val, v, &format!("{path}[{k:?}]")))
                .collect::<MarshalResult<_>>()?
        };

        Ok(Arg::Dict {
            key: key.clone(),
            value: val.clone(),
            entries: keys.into_iter().zip(values).collect(),
        })
    }

    /// Members of an `av` or `a{?v}`. Under the simple policy, a mixed set
    /// of scalar members is carried as strings.
    fn variant_members<'v>(
        &self,
        members: impl Iterator<Item = (String, &'v Value)>,
    ) -> MarshalResult<Vec<Arg>> {
        let members: Vec<_> = members.collect();
        let inferred = members
            .iter()
            .map(|(path, value)| self.infer(value, path))
            .collect::<MarshalResult<Vec<_>>>()?;

        let coerce = self.policy == VariantPolicy::Simple
            && !same_type(&inferred)
            && members.iter().all(|(_, value)| value.is_scalar());

        let items = if coerce {
            members.iter().map(|(_, value)| stringify(value)).collect()
        } else {
            inferred
        };
        Ok(items.into_iter().map(|arg| Arg::Variant(Box::new(arg))).collect())
    }

    fn infer(&self, value: &Value, path: &str) -> MarshalResult<Arg> {
        match value {
            Value::Null => Err(MarshalError::unsupported(path, value.kind())),
            Value::Bool(b) => Ok(Arg::Boolean(*b)),
            Value::Int(_) | Value::UInt(_) => Ok(infer_integer(value)),
            Value::Double(d) => Ok(Arg::Double(*d)),
            Value::String(s) => Ok(Arg::String(s.clone())),
            Value::Array(items) => {
                let members = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (format!("{path}[{i}]"), item));
                match self.policy {
                    VariantPolicy::Default => Ok(Arg::Array {
                        element: TypeDescriptor::Variant,
                        items: self.variant_members(members)?,
                    }),
                    VariantPolicy::Simple => {
                        let (element, items) = self.shared_type(members.collect(), path)?;
                        Ok(Arg::Array { element, items })
                    }
                }
            }
            Value::Map(map) => self.infer_map(map, path),
        }
    }

    fn infer_map(&self, map: &BTreeMap<String, Value>, path: &str) -> MarshalResult<Arg> {
        let string = TypeDescriptor::Scalar(ScalarCode::String);
        let keys = map.keys().map(|k| Arg::String(k.clone()));
        let members = map.iter().map(|(k, v)| (format!("{path}[{k:?}]"), v));

        let (value, values) = match self.policy {
            VariantPolicy::Default => (TypeDescriptor::Variant, self.variant_members(members)?),
            VariantPolicy::Simple => self.shared_type(members.collect(), path)?,
        };

        Ok(Arg::Dict {
            key: string,
            value,
            entries: keys.zip(values).collect(),
        })
    }

    /// Finds the one type every member is encoded with under the simple
    /// policy.
    fn shared_type(
        &self,
        members: Vec<(String, &Value)>,
        path: &str,
    ) -> MarshalResult<(TypeDescriptor, Vec<Arg>)> {
        let inferred = members
            .iter()
            .map(|(path, value)| self.infer(value, path))
            .collect::<MarshalResult<Vec<_>>>()?;

        match inferred.first() {
            None => Ok((TypeDescriptor::Scalar(ScalarCode::String), inferred)),
            Some(first) if same_type(&inferred) => Ok((first.descriptor(), inferred)),
            Some(_) if members.iter().all(|(_, value)| value.is_scalar()) => Ok((
                TypeDescriptor::Scalar(ScalarCode::String),
                members.iter().map(|(_, value)| stringify(value)).collect(),
            )),
            Some(_) => Err(MarshalError::unsupported(
                path,
                "container with mixed member types",
            )),
        }
    }
}

fn same_type(args: &[Arg]) -> bool {
    match args.split_first() {
        Some((first, rest)) => {
            let ty = first.descriptor();
            rest.iter().all(|arg| arg.descriptor() == ty)
        }
        None => true,
    }
}

fn stringify(value: &Value) -> Arg {
    Arg::String(value.to_text().unwrap_or_default())
}

fn infer_integer(value: &Value) -> Arg {
    match value.as_i64() {
        Some(i) => match (i32::try_from(i), u32::try_from(i)) {
            (Ok(i), _) => Arg::Int32(i),
            (Err(_), Ok(u)) => Arg::UInt32(u),
            _ => Arg::Int64(i),
        },
        None => Arg::UInt64(value.as_u64().unwrap_or_default()),
    }
}

/// Widens any integer, or a double with no fractional part, for range
/// checks against the target code.
fn whole_number(value: &Value) -> Option<i128> {
    match value {
        Value::Int(i) => Some(i128::from(*i)),
        Value::UInt(u) => Some(i128::from(*u)),
        Value::Double(d) if d.is_finite() && d.fract() == 0.0 => {
            let widest = u64::MAX as f64;
            (*d >= i64::MIN as f64 && *d <= widest).then_some(*d as i128)
        }
        _ => None,
    }
}

fn encode_integer<T: TryFrom<i128>>(code: ScalarCode, value: &Value, path: &str) -> MarshalResult<T> {
    let Some(wide) = whole_number(value) else {
        return Err(MarshalError::type_mismatch(path, code.name(), value.kind()));
    };
    T::try_from(wide).map_err(|_| {
        MarshalError::type_mismatch(path, code.name(), format!("out of range integer {wide}"))
    })
}

fn encode_scalar(code: ScalarCode, value: &Value, path: &str) -> MarshalResult<Arg> {
    let mismatch = || MarshalError::type_mismatch(path, code.name(), value.kind());
    Ok(match code {
        ScalarCode::Byte => Arg::Byte(encode_integer(code, value, path)?),
        ScalarCode::Int16 => Arg::Int16(encode_integer(code, value, path)?),
        ScalarCode::UInt16 => Arg::UInt16(encode_integer(code, value, path)?),
        ScalarCode::Int32 => Arg::Int32(encode_integer(code, value, path)?),
        ScalarCode::UInt32 => Arg::UInt32(encode_integer(code, value, path)?),
        ScalarCode::Int64 => Arg::Int64(encode_integer(code, value, path)?),
        ScalarCode::UInt64 => Arg::UInt64(encode_integer(code, value, path)?),
        ScalarCode::Boolean => Arg::Boolean(value.as_bool().ok_or_else(mismatch)?),
        ScalarCode::Double => Arg::Double(value.as_f64().ok_or_else(mismatch)?),
        ScalarCode::String => Arg::String(value.as_str().ok_or_else(mismatch)?.to_string()),
        ScalarCode::ObjectPath => {
            let path_value = value.as_str().ok_or_else(mismatch)?;
            validate_object_path(path_value).map_err(|e| MarshalError::invalid_value(path, e))?;
            Arg::ObjectPath(path_value.to_string())
        }
        ScalarCode::Signature => {
            let signature = value.as_str().ok_or_else(mismatch)?;
            parse_signature(signature).map_err(|e| MarshalError::invalid_value(path, e))?;
            Arg::Signature(signature.to_string())
        }
    })
}

/// Map keys are always text; non-string key types parse it first.
fn encode_key(code: ScalarCode, key: &str, path: &str) -> MarshalResult<Arg> {
    let key_path = format!("{path}[{key:?}]");
    let parsed = match code {
        ScalarCode::Boolean => key.parse::<bool>().ok().map(Value::Bool),
        ScalarCode::Double => key.parse::<f64>().ok().map(Value::Double),
        ScalarCode::String | ScalarCode::ObjectPath | ScalarCode::Signature => {
            Some(Value::from(key))
        }
        _ => key
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| key.parse::<u64>().map(Value::from))
            .ok(),
    };
    let Some(parsed) = parsed else {
        return Err(MarshalError::type_mismatch(
            key_path,
            code.name(),
            format!("key {key:?}"),
        ));
    };
    encode_scalar(code, &parsed, &key_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::unmarshal;
    use serde_json::json;

    fn values(json: serde_json::Value) -> Vec<Value> {
        match Value::from(json) {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    fn default(signature: &str, args: serde_json::Value) -> MarshalResult<Vec<Arg>> {
        marshal_signature(signature, &values(args), VariantPolicy::Default)
    }

    fn simple(signature: &str, args: serde_json::Value) -> MarshalResult<Vec<Arg>> {
        marshal_signature(signature, &values(args), VariantPolicy::Simple)
    }

    #[test]
    fn string_scenario() {
        let args = default("s", json!(["hello"])).unwrap();
        assert_eq!(args, vec![Arg::String("hello".into())]);
    }

    #[test]
    fn argument_count_must_match() {
        assert_eq!(
            default("si", json!(["only one"])),
            Err(MarshalError::ArgumentMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            default("", json!([1])),
            Err(MarshalError::ArgumentMismatch {
                expected: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn bad_signature_is_reported() {
        assert!(matches!(
            default("a{", json!([{}])),
            Err(MarshalError::Signature(_))
        ));
    }

    #[test]
    fn scalar_shapes() {
        assert!(default("b", json!([true])).is_ok());
        assert_eq!(
            default("b", json!([1])),
            Err(MarshalError::type_mismatch("arg0", "boolean", "integer"))
        );
        assert_eq!(
            default("i", json!([[1]])),
            Err(MarshalError::type_mismatch("arg0", "int32", "array"))
        );
        assert_eq!(
            default("s", json!([5])),
            Err(MarshalError::type_mismatch("arg0", "string", "integer"))
        );
        assert_eq!(default("d", json!([3])).unwrap(), vec![Arg::Double(3.0)]);
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(default("y", json!([255])).unwrap(), vec![Arg::Byte(255)]);
        assert_eq!(
            default("y", json!([256])),
            Err(MarshalError::type_mismatch(
                "arg0",
                "byte",
                "out of range integer 256"
            ))
        );
        assert!(default("q", json!([-1])).is_err());
        assert_eq!(default("n", json!([-32768])).unwrap(), vec![Arg::Int16(-32768)]);
        assert_eq!(
            default("t", json!([u64::MAX])).unwrap(),
            vec![Arg::UInt64(u64::MAX)]
        );
        assert!(default("x", json!([u64::MAX])).is_err());
    }

    #[test]
    fn whole_doubles_fit_integer_codes() {
        assert_eq!(default("i", json!([4.0])).unwrap(), vec![Arg::Int32(4)]);
        assert_eq!(
            default("i", json!([4.5])),
            Err(MarshalError::type_mismatch("arg0", "int32", "double"))
        );
    }

    #[test]
    fn object_paths_and_signatures_are_validated() {
        assert_eq!(
            default("og", json!(["/org/ndbus", "a{sv}"])).unwrap(),
            vec![
                Arg::ObjectPath("/org/ndbus".into()),
                Arg::Signature("a{sv}".into())
            ]
        );
        assert!(matches!(
            default("o", json!(["not/a/path"])),
            Err(MarshalError::InvalidValue { .. })
        ));
        assert!(matches!(
            default("g", json!(["a{"])),
            Err(MarshalError::InvalidValue { .. })
        ));
    }

    #[test]
    fn structs_need_matching_arrays() {
        let args = default("(is)", json!([[1, "a"]])).unwrap();
        assert_eq!(
            args,
            vec![Arg::Struct(vec![Arg::Int32(1), Arg::String("a".into())])]
        );
        assert_eq!(
            default("(is)", json!([[1]])),
            Err(MarshalError::type_mismatch(
                "arg0",
                "(is)",
                "array of 1 element(s)"
            ))
        );
        assert_eq!(
            default("(is)", json!([[1, 2]])),
            Err(MarshalError::type_mismatch("arg0.1", "string", "integer"))
        );
    }

    #[test]
    fn arrays_recurse_with_paths() {
        let args = default("aai", json!([[[1, 2], [3]]])).unwrap();
        assert_eq!(args[0].signature(), "aai");
        assert_eq!(
            default("as", json!([["a", 2]])),
            Err(MarshalError::type_mismatch("arg0[1]", "string", "integer"))
        );
        assert_eq!(
            default("as", json!([{"a": "b"}])),
            Err(MarshalError::type_mismatch("arg0", "as", "map"))
        );
    }

    #[test]
    fn dicts_need_maps() {
        assert_eq!(
            default("a{ss}", json!([["a", "b"]])),
            Err(MarshalError::type_mismatch("arg0", "a{ss}", "array"))
        );
        assert_eq!(
            default("a{si}", json!([{"k": "v"}])),
            Err(MarshalError::type_mismatch("arg0[\"k\"]", "int32", "string"))
        );
    }

    #[test]
    fn dict_keys_parse_under_key_type() {
        let args = default("a{ib}", json!([{"1": true, "-2": false}])).unwrap();
        let Arg::Dict { entries, .. } = &args[0] else {
            panic!("expected dict");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Arg::Int32(-2), Arg::Int32(1)]);

        assert!(default("a{bs}", json!([{"true": "yes"}])).is_ok());
        assert!(default("a{ss}", json!([{"1": "a", "01": "b"}])).is_ok());
        assert_eq!(
            default("a{us}", json!([{"x": "y"}])),
            Err(MarshalError::type_mismatch(
                "arg0[\"x\"]",
                "uint32",
                "key \"x\""
            ))
        );
    }

    #[test]
    fn dict_keys_must_stay_unique_once_typed() {
        assert_eq!(
            default("a{is}", json!([{"1": "a", "01": "b", "+1": "c"}])),
            Err(MarshalError::type_mismatch(
                "arg0[\"01\"]",
                "unique int32 key",
                "duplicate key \"01\""
            ))
        );
        let err = default("a{ds}", json!([{"1": "a", "1.0": "b"}])).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @r#"type mismatch at arg0["1.0"]: expected unique double key, got duplicate key "1.0""#
        );
    }

    #[test]
    fn variant_inference_for_scalars() {
        let policy = VariantPolicy::Default;
        let inferred = |value: Value| infer_variant(&value, policy).unwrap().signature();
        assert_eq!(inferred(Value::Bool(true)), "b");
        assert_eq!(inferred(Value::from("x")), "s");
        assert_eq!(inferred(Value::Int(-5)), "i");
        assert_eq!(inferred(Value::Int(i64::from(i32::MAX) + 1)), "u");
        assert_eq!(inferred(Value::Int(i64::from(u32::MAX) + 1)), "x");
        assert_eq!(inferred(Value::Int(i64::MIN)), "x");
        assert_eq!(inferred(Value::UInt(u64::MAX)), "t");
        assert_eq!(inferred(Value::Double(1.5)), "d");
        assert_eq!(
            infer_variant(&Value::Null, policy),
            Err(MarshalError::unsupported("value", "null"))
        );
    }

    #[test]
    fn default_policy_preserves_member_types() {
        let args = default("a{sv}", json!([{"a": 1, "b": "x"}])).unwrap();
        assert_eq!(
            args,
            vec![Arg::Dict {
                key: TypeDescriptor::Scalar(ScalarCode::String),
                value: TypeDescriptor::Variant,
                entries: vec![
                    (
                        Arg::String("a".into()),
                        Arg::Variant(Box::new(Arg::Int32(1)))
                    ),
                    (
                        Arg::String("b".into()),
                        Arg::Variant(Box::new(Arg::String("x".into())))
                    ),
                ],
            }]
        );
    }

    #[test]
    fn simple_policy_coerces_mixed_members() {
        let args = simple("a{sv}", json!([{"a": 1, "b": "x"}])).unwrap();
        assert_eq!(
            args,
            vec![Arg::Dict {
                key: TypeDescriptor::Scalar(ScalarCode::String),
                value: TypeDescriptor::Variant,
                entries: vec![
                    (
                        Arg::String("a".into()),
                        Arg::Variant(Box::new(Arg::String("1".into())))
                    ),
                    (
                        Arg::String("b".into()),
                        Arg::Variant(Box::new(Arg::String("x".into())))
                    ),
                ],
            }]
        );
    }

    #[test]
    fn policies_are_deterministic_and_differ() {
        let value = json!([{"n": 1, "s": "x", "b": true, "d": 0.5}]);
        assert_eq!(default("a{sv}", value.clone()), default("a{sv}", value.clone()));
        assert_eq!(simple("a{sv}", value.clone()), simple("a{sv}", value.clone()));
        assert_ne!(default("a{sv}", value.clone()), simple("a{sv}", value));
    }

    #[test]
    fn simple_policy_keeps_uniform_members() {
        let value = json!([{"a": 1, "b": 2}]);
        assert_eq!(default("a{sv}", value.clone()), simple("a{sv}", value));
    }

    #[test]
    fn inferred_containers_by_policy() {
        let nested = json!([[1, "x"]]);
        assert_eq!(default("v", nested.clone()).unwrap()[0].variant_signature().as_deref(), Some("av"));
        let simple_args = simple("v", nested).unwrap();
        assert_eq!(simple_args[0].variant_signature().as_deref(), Some("as"));
        assert_eq!(
            unmarshal(simple_args),
            vec![Value::Array(vec![Value::from("1"), Value::from("x")])]
        );

        let map = json!([{"a": 1, "b": 2}]);
        assert_eq!(default("v", map.clone()).unwrap()[0].variant_signature().as_deref(), Some("a{sv}"));
        assert_eq!(simple("v", map).unwrap()[0].variant_signature().as_deref(), Some("a{si}"));

        assert_eq!(simple("v", json!([[]])).unwrap()[0].variant_signature().as_deref(), Some("as"));
    }

    #[test]
    fn simple_policy_rejects_mixed_inferred_containers() {
        assert!(matches!(
            simple("v", json!([[1, [2]]])),
            Err(MarshalError::UnsupportedValue { .. })
        ));
        // explicit variant members stay variants
        let args = simple("av", json!([[1, [2]]])).unwrap();
        let Arg::Array { items, .. } = &args[0] else {
            panic!("expected array");
        };
        assert_eq!(items[0].variant_signature().as_deref(), Some("i"));
        assert_eq!(items[1].variant_signature().as_deref(), Some("ai"));
    }

    #[test]
    fn round_trip_all_codes() {
        let cases = [
            ("y", json!(200)),
            ("b", json!(false)),
            ("n", json!(-300)),
            ("q", json!(60000)),
            ("i", json!(-70000)),
            ("u", json!(4_000_000_000u32)),
            ("x", json!(-9_000_000_000i64)),
            ("t", json!(u64::MAX)),
            ("d", json!(2.25)),
            ("s", json!("text")),
            ("o", json!("/org/ndbus/test")),
            ("g", json!("a{sv}")),
            ("v", json!({"k": [1, 2]})),
            ("ai", json!([1, 2, 3])),
            ("(sb)", json!(["s", true])),
            ("a{sv}", json!({"a": 1, "b": "x", "c": [true]})),
            ("a{ia(sd)}", json!({"1": [["p", 1.5]]})),
        ];
        for (signature, value) in cases {
            let original = Value::from(value);
            for policy in [VariantPolicy::Default, VariantPolicy::Simple] {
                if policy == VariantPolicy::Simple && signature == "a{sv}" {
                    continue;
                }
                let args = marshal_signature(signature, std::slice::from_ref(&original), policy)
                    .unwrap_or_else(|e| panic!("{signature}: {e}"));
                assert_eq!(unmarshal(args), vec![original.clone()], "{signature} {policy:?}");
            }
        }
    }

    #[test]
    fn error_messages() {
        let err = default("a{si}", json!([{"k": "v"}])).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"type mismatch at arg0["k"]: expected int32, got string"#);
    }
}
