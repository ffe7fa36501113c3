//! Route template compilation.
//!
//! # Responsibilities
//! - Normalize a declared template (strip surrounding `/`)
//! - Resolve `{Name}` tokens against the input type's scalar properties
//! - Build an anchored matcher and an ordered list of parameter bindings
//! - Convert raw path segments to scalar JSON values at dispatch time
//!
//! # Design Decisions
//! - Token names resolve case-insensitively; the property's own spelling is kept
//! - Composite properties can never be bound from a path
//! - A parameter matches exactly one path segment (`[^/]*`)
//! - Parameterized matchers are case-sensitive; only literal routes ignore case
//! - Overlapping templates are not detected here; the route table orders them

use std::fmt;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while compiling or registering routes. Fatal at startup.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route given: {0:?}")]
    EmptyRoute(String),

    #[error("Route parameter {token} defined but no property found on {input}. Route='{route}'")]
    UnknownParameter {
        token: String,
        input: String,
        route: String,
    },

    #[error("Route parameter {token} defined but {kind} is not a primitive type. Route='{route}'")]
    NonScalarParameter {
        token: String,
        kind: ScalarKind,
        route: String,
    },

    #[error("Route parameter {token} appears more than once. Route='{route}'")]
    DuplicateParameter { token: String, route: String },

    #[error("Route already registered: {0}")]
    DuplicateRoute(String),

    #[error("No HTTP methods accepted by route {0}")]
    NoMethods(String),

    #[error("Failed to compile pattern for route {route}: {source}")]
    Pattern {
        route: String,
        #[source]
        source: regex::Error,
    },
}

/// Type of a bindable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    /// Composite (struct, map, sequence). Never bindable from a path.
    Object,
}

impl ScalarKind {
    pub fn is_scalar(self) -> bool {
        self != ScalarKind::Object
    }

    /// Convert a raw path segment into a JSON value of this kind.
    pub fn convert(self, raw: &str) -> Result<Value, ConversionError> {
        let fail = || ConversionError {
            kind: self,
            value: raw.to_string(),
        };

        fn int<T>(raw: &str) -> Option<Value>
        where
            T: std::str::FromStr + Into<Value>,
        {
            raw.trim().parse::<T>().ok().map(Into::into)
        }

        let value = match self {
            ScalarKind::Bool => {
                let raw = raw.trim();
                if raw.eq_ignore_ascii_case("true") {
                    Some(Value::Bool(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            ScalarKind::Char => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Value::String(c.to_string())),
                    _ => None,
                }
            }
            ScalarKind::I8 => int::<i8>(raw),
            ScalarKind::I16 => int::<i16>(raw),
            ScalarKind::I32 => int::<i32>(raw),
            ScalarKind::I64 => int::<i64>(raw),
            ScalarKind::U8 => int::<u8>(raw),
            ScalarKind::U16 => int::<u16>(raw),
            ScalarKind::U32 => int::<u32>(raw),
            ScalarKind::U64 => int::<u64>(raw),
            ScalarKind::F32 => raw
                .trim()
                .parse::<f32>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f64::from(f)))
                .map(Value::Number),
            ScalarKind::F64 => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ScalarKind::String => Some(Value::String(raw.to_string())),
            ScalarKind::Object => None,
        };

        value.ok_or_else(fail)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::String => "string",
            ScalarKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A raw path segment that does not fit the target kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{value}' is not a valid {kind}")]
pub struct ConversionError {
    pub kind: ScalarKind,
    pub value: String,
}

/// A writable property of an input type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub kind: ScalarKind,
}

impl Property {
    pub const fn new(name: &'static str, kind: ScalarKind) -> Self {
        Self { name, kind }
    }
}

/// Binding of one `{token}` to an input property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBinding {
    /// The segment as written, e.g. `{Id}`.
    pub token: String,
    /// Target property name as declared on the input type.
    pub property: &'static str,
    pub kind: ScalarKind,
    /// Position of the token in the segment array.
    pub index: usize,
}

/// Strip surrounding slashes from a path or template.
pub fn normalize_route(path: &str) -> &str {
    path.trim_matches('/')
}

fn parameter_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    raw: String,
    route: String,
    bindings: Vec<ParamBinding>,
    matcher: Option<Regex>,
}

impl RouteTemplate {
    /// Compile a template against the input type's properties.
    ///
    /// `input` is the input type's name and writable properties; `None` when
    /// the action takes no input, in which case any token is an error.
    pub fn compile(template: &str, input: Option<(&str, &[Property])>) -> Result<Self, RouteError> {
        if template.trim().is_empty() {
            return Err(RouteError::EmptyRoute(template.to_string()));
        }

        let route = normalize_route(template).to_string();
        let segments: Vec<&str> = route.split('/').collect();
        let no_properties: &[Property] = &[];
        let (input_name, properties) = input.unwrap_or(("NO INPUT TYPE", no_properties));

        let mut bindings: Vec<ParamBinding> = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let Some(name) = parameter_name(segment) else {
                continue;
            };

            let property = properties
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| RouteError::UnknownParameter {
                    token: segment.to_string(),
                    input: input_name.to_string(),
                    route: route.clone(),
                })?;

            if !property.kind.is_scalar() {
                return Err(RouteError::NonScalarParameter {
                    token: segment.to_string(),
                    kind: property.kind,
                    route: route.clone(),
                });
            }

            if bindings.iter().any(|b| b.property == property.name) {
                return Err(RouteError::DuplicateParameter {
                    token: segment.to_string(),
                    route: route.clone(),
                });
            }

            bindings.push(ParamBinding {
                token: segment.to_string(),
                property: property.name,
                kind: property.kind,
                index,
            });
        }

        let matcher = if bindings.is_empty() {
            None
        } else {
            let pattern = segments
                .iter()
                .enumerate()
                .map(|(i, segment)| {
                    if bindings.iter().any(|b| b.index == i) {
                        "[^/]*".to_string()
                    } else {
                        regex::escape(segment)
                    }
                })
                .collect::<Vec<_>>()
                .join("/");

            let regex = Regex::new(&format!("^{}$", pattern)).map_err(|source| RouteError::Pattern {
                route: route.clone(),
                source,
            })?;
            Some(regex)
        };

        Ok(Self {
            raw: template.to_string(),
            route,
            bindings,
            matcher,
        })
    }

    /// Template as declared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Normalized template, used as the literal match key.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn is_parameterized(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn bindings(&self) -> &[ParamBinding] {
        &self.bindings
    }

    /// Whether a normalized path matches this template.
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(path),
            None => self.route.eq_ignore_ascii_case(path),
        }
    }

    /// Raw values for each binding, in binding order. `None` if the path
    /// does not match.
    pub fn extract(&self, path: &str) -> Option<Vec<String>> {
        if !self.matches(path) {
            return None;
        }
        let segments: Vec<&str> = path.split('/').collect();
        self.bindings
            .iter()
            .map(|b| segments.get(b.index).map(|s| s.to_string()))
            .collect()
    }
}
