//! Type-signature parsing.
//!
//! A signature is a compact string of type codes, one complete type per
//! argument:
//!
//! ```text
//! y b n q i u x t d s o g   basic types
//! v                         variant
//! aT                        array of T
//! (T...)                    struct
//! a{KV}                     dict (array of dict entries, K basic)
//! ```
//!
//! [`parse_signature`] turns the string into one [`TypeDescriptor`] per
//! argument position. It is a pure function; descriptors are built fresh
//! for every call.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::SignatureError;

/// Longest signature the bus accepts.
pub const MAX_SIGNATURE_LENGTH: usize = 255;
/// Deepest array nesting the bus accepts.
pub const MAX_ARRAY_DEPTH: usize = 32;
/// Deepest struct / dict-entry nesting the bus accepts.
pub const MAX_STRUCT_DEPTH: usize = 32;

/// A basic (non-container) type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarCode {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
}

impl ScalarCode {
    pub fn from_char(code: char) -> Option<Self> {
        Some(match code {
            'y' => Self::Byte,
            'b' => Self::Boolean,
            'n' => Self::Int16,
            'q' => Self::UInt16,
            'i' => Self::Int32,
            'u' => Self::UInt32,
            'x' => Self::Int64,
            't' => Self::UInt64,
            'd' => Self::Double,
            's' => Self::String,
            'o' => Self::ObjectPath,
            'g' => Self::Signature,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Byte => 'y',
            Self::Boolean => 'b',
            Self::Int16 => 'n',
            Self::UInt16 => 'q',
            Self::Int32 => 'i',
            Self::UInt32 => 'u',
            Self::Int64 => 'x',
            Self::UInt64 => 't',
            Self::Double => 'd',
            Self::String => 's',
            Self::ObjectPath => 'o',
            Self::Signature => 'g',
        }
    }

    /// Human readable type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Boolean => "boolean",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Double => "double",
            Self::String => "string",
            Self::ObjectPath => "object path",
            Self::Signature => "signature",
        }
    }

    /// Returns true for the codes carried as text on the wire.
    pub fn is_string_like(self) -> bool {
        matches!(self, Self::String | Self::ObjectPath | Self::Signature)
    }
}

/// One complete type parsed from a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Scalar(ScalarCode),
    Array(Box<TypeDescriptor>),
    Struct(Vec<TypeDescriptor>),
    /// Only valid as the element type of an array.
    DictEntry(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Variant,
}

impl TypeDescriptor {
    pub fn array(element: TypeDescriptor) -> Self {
        Self::Array(Box::new(element))
    }

    /// Shorthand for `a{KV}`.
    pub fn dict(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::array(Self::DictEntry(Box::new(key), Box::new(value)))
    }

    /// Basic types may be used as dict keys.
    pub fn is_basic(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// For `a{KV}`, returns the key and value descriptors.
    pub fn dict_types(&self) -> Option<(&TypeDescriptor, &TypeDescriptor)> {
        match self {
            Self::Array(element) => match element.as_ref() {
                Self::DictEntry(key, value) => Some((key, value)),
                _ => None,
            },
            _ => None,
        }
    }

    /// The signature string of this single type.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(code) => write!(f, "{}", code.as_char()),
            Self::Array(element) => write!(f, "a{element}"),
            Self::Struct(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
            Self::DictEntry(key, value) => write!(f, "{{{key}{value}}}"),
            Self::Variant => f.write_str("v"),
        }
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parses a signature into one descriptor per top-level type.
///
/// The empty signature is valid and yields no descriptors.
pub fn parse_signature(signature: &str) -> Result<Vec<TypeDescriptor>, SignatureError> {
    if signature.len() > MAX_SIGNATURE_LENGTH {
        return Err(SignatureError::TooLong {
            len: signature.len(),
            max: MAX_SIGNATURE_LENGTH,
        });
    }

    let mut parser = Parser::new(signature);
    let mut types = Vec::new();
    while !parser.at_end() {
        types.push(parser.parse_type(false)?);
    }
    Ok(types)
}

/// Renders descriptors back into a signature string.
pub fn render_signature(types: &[TypeDescriptor]) -> String {
    types.iter().map(ToString::to_string).collect()
}

struct Parser<'a> {
    signature: &'a str,
    pos: usize,
    array_depth: usize,
    struct_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(signature: &'a str) -> Self {
        Self {
            signature,
            pos: 0,
            array_depth: 0,
            struct_depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.signature.len()
    }

    fn peek(&self) -> Option<char> {
        self.signature[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Parses one complete type. `array_element` is true right after `a`.
    fn parse_type(&mut self, array_element: bool) -> Result<TypeDescriptor, SignatureError> {
        let offset = self.pos;
        let Some(code) = self.bump() else {
            return Err(SignatureError::MissingArrayElement {
                offset: offset.saturating_sub(1),
            });
        };

        match code {
            'a' => {
                if self.at_end() || matches!(self.peek(), Some(')' | '}')) {
                    return Err(SignatureError::MissingArrayElement { offset });
                }
                self.array_depth += 1;
                if self.array_depth > MAX_ARRAY_DEPTH {
                    return Err(SignatureError::TooDeep {
                        container: "array",
                        offset,
                        max: MAX_ARRAY_DEPTH,
                    });
                }
                let element = self.parse_type(true)?;
                self.array_depth -= 1;
                Ok(TypeDescriptor::array(element))
            }
            '(' => {
                let fields = self.parse_fields('(', ')', offset)?;
                if fields.is_empty() {
                    return Err(SignatureError::EmptyStruct { offset });
                }
                Ok(TypeDescriptor::Struct(fields))
            }
            '{' => {
                if !array_element {
                    return Err(SignatureError::DictEntryOutsideArray { offset });
                }
                let mut fields = self.parse_fields('{', '}', offset)?;
                if fields.len() != 2 {
                    return Err(SignatureError::DictEntryArity {
                        offset,
                        found: fields.len(),
                    });
                }
                let value = fields.pop().unwrap_or(TypeDescriptor::Variant);
                let key = fields.pop().unwrap_or(TypeDescriptor::Variant);
                if !key.is_basic() {
                    return Err(SignatureError::DictKeyNotBasic {
                        offset,
                        found: key.signature(),
                    });
                }
                Ok(TypeDescriptor::DictEntry(Box::new(key), Box::new(value)))
            }
            ')' | '}' => Err(SignatureError::Unbalanced {
                bracket: code,
                offset,
            }),
            'v' => Ok(TypeDescriptor::Variant),
            other => ScalarCode::from_char(other)
                .map(TypeDescriptor::Scalar)
                .ok_or(SignatureError::UnknownCode {
                    code: other,
                    offset,
                }),
        }
    }

    /// Parses the member types of a struct or dict entry up to `close`.
    fn parse_fields(
        &mut self,
        open: char,
        close: char,
        offset: usize,
    ) -> Result<Vec<TypeDescriptor>, SignatureError> {
        self.struct_depth += 1;
        if self.struct_depth > MAX_STRUCT_DEPTH {
            return Err(SignatureError::TooDeep {
                container: "struct",
                offset,
                max: MAX_STRUCT_DEPTH,
            });
        }

        let mut fields = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SignatureError::Unbalanced {
                        bracket: open,
                        offset,
                    });
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(_) => fields.push(self.parse_type(false)?),
            }
        }

        self.struct_depth -= 1;
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(code: char) -> TypeDescriptor {
        TypeDescriptor::Scalar(ScalarCode::from_char(code).unwrap())
    }

    #[test]
    fn empty_signature_has_no_types() {
        assert_eq!(parse_signature(""), Ok(vec![]));
    }

    #[test]
    fn scalars_one_per_position() {
        let types = parse_signature("ybnqiuxtdsog").unwrap();
        assert_eq!(types.len(), 12);
        assert_eq!(types[0], scalar('y'));
        assert_eq!(types[11], scalar('g'));
    }

    #[test]
    fn signal_test_signature() {
        let types = parse_signature("sviasa{sv}").unwrap();
        assert_eq!(
            types,
            vec![
                scalar('s'),
                TypeDescriptor::Variant,
                scalar('i'),
                TypeDescriptor::array(scalar('s')),
                TypeDescriptor::dict(scalar('s'), TypeDescriptor::Variant),
            ]
        );
    }

    #[test]
    fn nested_containers() {
        let types = parse_signature("a(sa{oav})").unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(
            types[0],
            TypeDescriptor::array(TypeDescriptor::Struct(vec![
                scalar('s'),
                TypeDescriptor::dict(scalar('o'), TypeDescriptor::array(TypeDescriptor::Variant)),
            ]))
        );
    }

    #[test]
    fn render_roundtrips() {
        for sig in ["", "s", "a{sv}", "(ii)a(yv)", "aa{ta(dd)}", "sviasa{sv}"] {
            assert_eq!(render_signature(&parse_signature(sig).unwrap()), sig);
        }
    }

    #[test]
    fn unknown_code() {
        assert_eq!(
            parse_signature("sz"),
            Err(SignatureError::UnknownCode {
                code: 'z',
                offset: 1
            })
        );
    }

    #[test]
    fn dict_entry_outside_array() {
        assert_eq!(
            parse_signature("{sv}"),
            Err(SignatureError::DictEntryOutsideArray { offset: 0 })
        );
        assert_eq!(
            parse_signature("(a{sv}{sv})"),
            Err(SignatureError::DictEntryOutsideArray { offset: 6 })
        );
    }

    #[test]
    fn unbalanced_brackets() {
        assert_eq!(
            parse_signature("(ii"),
            Err(SignatureError::Unbalanced {
                bracket: '(',
                offset: 0
            })
        );
        assert_eq!(
            parse_signature("ii)"),
            Err(SignatureError::Unbalanced {
                bracket: ')',
                offset: 2
            })
        );
        assert!(matches!(
            parse_signature("a{sv"),
            Err(SignatureError::Unbalanced { bracket: '{', .. })
        ));
    }

    #[test]
    fn dict_entry_arity() {
        assert_eq!(
            parse_signature("a{s}"),
            Err(SignatureError::DictEntryArity {
                offset: 1,
                found: 1
            })
        );
        assert_eq!(
            parse_signature("a{sii}"),
            Err(SignatureError::DictEntryArity {
                offset: 1,
                found: 3
            })
        );
    }

    #[test]
    fn dict_key_must_be_basic() {
        assert!(matches!(
            parse_signature("a{vs}"),
            Err(SignatureError::DictKeyNotBasic { .. })
        ));
        assert!(matches!(
            parse_signature("a{(i)s}"),
            Err(SignatureError::DictKeyNotBasic { .. })
        ));
    }

    #[test]
    fn array_needs_element() {
        assert_eq!(
            parse_signature("a"),
            Err(SignatureError::MissingArrayElement { offset: 0 })
        );
        assert_eq!(
            parse_signature("(ia)"),
            Err(SignatureError::MissingArrayElement { offset: 2 })
        );
    }

    #[test]
    fn empty_struct_rejected() {
        assert_eq!(
            parse_signature("()"),
            Err(SignatureError::EmptyStruct { offset: 0 })
        );
    }

    #[test]
    fn limits() {
        let long = "s".repeat(MAX_SIGNATURE_LENGTH + 1);
        assert!(matches!(
            parse_signature(&long),
            Err(SignatureError::TooLong { .. })
        ));

        let deep_ok = format!("{}i", "a".repeat(MAX_ARRAY_DEPTH));
        assert!(parse_signature(&deep_ok).is_ok());
        let too_deep = format!("{}i", "a".repeat(MAX_ARRAY_DEPTH + 1));
        assert!(matches!(
            parse_signature(&too_deep),
            Err(SignatureError::TooDeep {
                container: "array",
                ..
            })
        ));

        let structs = format!("{}i{}", "(".repeat(33), ")".repeat(33));
        assert!(matches!(
            parse_signature(&structs),
            Err(SignatureError::TooDeep {
                container: "struct",
                ..
            })
        ));
    }

    #[test]
    fn pure_function() {
        let first = parse_signature("a{sv}as").unwrap();
        let second = parse_signature("a{sv}as").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn descriptor_serializes_as_signature() {
        let types = parse_signature("a{sv}").unwrap();
        insta::assert_snapshot!(serde_json::to_string(&types).unwrap(), @r#"["a{sv}"]"#);
    }
}
