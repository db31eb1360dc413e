//! External-call handler registry.
//!
//! The tracer cannot see into library code. When a call crosses the trace
//! boundary, the registry decides what the call did to its arguments:
//! a matching handler declares the effects; otherwise the default rule
//! (mutate every positional argument) applies.
//!
//! Handlers are declared in a small line-oriented configuration language
//! and matched by exact `(module, qualname)`, by containing module, or by
//! receiver type for method calls.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// One formal slot a handler effect can name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRef {
    /// The method receiver (`self`).
    Receiver,
    /// Positional argument by index.
    Positional(usize),
    /// Keyword argument by name.
    Keyword(String),
    /// The call's return value.
    Return,
}

/// Declared effect of an external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Bump `defined_at` of the named slot's symbol.
    Mutate(ParamRef),
    /// The two slots refer to the same underlying value afterwards.
    Alias(ParamRef, ParamRef),
    /// Create a namespace entry under `owner` named `name`.
    UpsertUnder { owner: ParamRef, name: String },
    /// The call is known to touch nothing.
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandlerSpec {
    pub effects: Vec<Effect>,
}

impl HandlerSpec {
    pub fn noop() -> Self {
        Self {
            effects: vec![Effect::NoOp],
        }
    }

    /// The fallback when nothing matches: mutate all positional arguments.
    pub fn mutate_all_positional(argc: usize) -> Self {
        Self {
            effects: (0..argc).map(|i| Effect::Mutate(ParamRef::Positional(i))).collect(),
        }
    }
}

/// What the tracer knows about a call that crossed the trace boundary.
#[derive(Debug, Clone, Default)]
pub struct CallSignature {
    pub module: Option<String>,
    pub qualname: Option<String>,
    /// Type name of the receiver for bound-method calls.
    pub receiver_type: Option<String>,
    /// Method name for bound-method calls.
    pub method: Option<String>,
}

#[derive(Debug, Error)]
pub enum HandlerConfigError {
    #[error("line {line}: expected `key -> effects`, got {text:?}")]
    MissingArrow { line: usize, text: String },
    #[error("line {line}: unknown effect {text:?}")]
    UnknownEffect { line: usize, text: String },
    #[error("line {line}: bad parameter reference {text:?}")]
    BadParamRef { line: usize, text: String },
}

/// Registry of declared call effects, owned by the engine.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    exact: FxHashMap<(String, String), HandlerSpec>,
    by_module: FxHashMap<String, HandlerSpec>,
    by_receiver: FxHashMap<(String, String), HandlerSpec>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the compiled-in table for host stdlib
    /// containers and common libraries.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (key, spec) in BUILTIN_TABLE.iter() {
            registry.insert(key.clone(), spec.clone());
        }
        registry
    }

    /// Merge entries from a configuration string (see the module docs for
    /// the format).
    pub fn load_config(&mut self, text: &str) -> Result<usize, HandlerConfigError> {
        let entries = parse_config(text)?;
        let count = entries.len();
        for (key, spec) in entries {
            self.insert(key, spec);
        }
        Ok(count)
    }

    pub fn register_exact(&mut self, module: &str, qualname: &str, spec: HandlerSpec) {
        self.exact
            .insert((module.to_string(), qualname.to_string()), spec);
    }

    pub fn register_module(&mut self, module: &str, spec: HandlerSpec) {
        self.by_module.insert(module.to_string(), spec);
    }

    pub fn register_receiver(&mut self, type_name: &str, method: &str, spec: HandlerSpec) {
        self.by_receiver
            .insert((type_name.to_string(), method.to_string()), spec);
    }

    fn insert(&mut self, key: HandlerKey, spec: HandlerSpec) {
        match key {
            HandlerKey::Exact { module, qualname } => {
                self.exact.insert((module, qualname), spec);
            }
            HandlerKey::Module(module) => {
                self.by_module.insert(module, spec);
            }
            HandlerKey::Receiver { type_name, method } => {
                self.by_receiver.insert((type_name, method), spec);
            }
        }
    }

    /// Most specific match wins: exact, then receiver type, then module.
    pub fn resolve(&self, sig: &CallSignature) -> Option<&HandlerSpec> {
        if let (Some(module), Some(qualname)) = (&sig.module, &sig.qualname) {
            if let Some(spec) = self.exact.get(&(module.clone(), qualname.clone())) {
                return Some(spec);
            }
        }
        if let (Some(ty), Some(method)) = (&sig.receiver_type, &sig.method) {
            if let Some(spec) = self.by_receiver.get(&(ty.clone(), method.clone())) {
                return Some(spec);
            }
        }
        if let Some(module) = &sig.module {
            if let Some(spec) = self.by_module.get(module) {
                return Some(spec);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.by_module.len() + self.by_receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandlerKey {
    Exact { module: String, qualname: String },
    Module(String),
    Receiver { type_name: String, method: String },
}

/// Compiled-in defaults, parsed once.
static BUILTIN_TABLE: Lazy<Vec<(HandlerKey, HandlerSpec)>> =
    Lazy::new(|| parse_config(BUILTIN_CONFIG).expect("builtin handler table parses"));

/// The default table. `Type.method` keys match on receiver type,
/// `module::qualname` keys match exactly, `module::*` matches the whole
/// module.
const BUILTIN_CONFIG: &str = r#"
# mutating container methods
list.append -> mutate(self)
list.extend -> mutate(self)
list.insert -> mutate(self)
list.remove -> mutate(self)
list.pop -> mutate(self)
list.clear -> mutate(self)
list.sort -> mutate(self)
list.reverse -> mutate(self)
dict.update -> mutate(self)
dict.setdefault -> mutate(self)
dict.pop -> mutate(self)
dict.popitem -> mutate(self)
dict.clear -> mutate(self)
set.add -> mutate(self)
set.update -> mutate(self)
set.discard -> mutate(self)
set.remove -> mutate(self)
set.pop -> mutate(self)
set.clear -> mutate(self)

# reads disguised as calls
list.count -> noop
list.index -> noop
list.copy -> noop
dict.get -> noop
dict.keys -> noop
dict.values -> noop
dict.items -> noop
dict.copy -> noop

# stdlib
builtins::sorted -> noop
builtins::len -> noop
builtins::print -> noop
builtins::repr -> noop
builtins::setattr -> mutate(0)
builtins::delattr -> mutate(0)
random::seed -> noop
random::shuffle -> mutate(0)
logging::* -> noop
weakref::proxy -> alias(ret, 0)
"#;

fn parse_config(text: &str) -> Result<Vec<(HandlerKey, HandlerSpec)>, HandlerConfigError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key_text, effects_text) =
            trimmed
                .split_once("->")
                .ok_or_else(|| HandlerConfigError::MissingArrow {
                    line,
                    text: trimmed.to_string(),
                })?;
        let key = parse_key(key_text.trim());
        let mut effects = Vec::new();
        for part in split_effects(effects_text.trim()) {
            effects.push(parse_effect(part.trim(), line)?);
        }
        out.push((key, HandlerSpec { effects }));
    }
    Ok(out)
}

fn parse_key(text: &str) -> HandlerKey {
    if let Some((module, qualname)) = text.split_once("::") {
        if qualname == "*" {
            return HandlerKey::Module(module.to_string());
        }
        return HandlerKey::Exact {
            module: module.to_string(),
            qualname: qualname.to_string(),
        };
    }
    if let Some((type_name, method)) = text.split_once('.') {
        return HandlerKey::Receiver {
            type_name: type_name.to_string(),
            method: method.to_string(),
        };
    }
    HandlerKey::Module(text.to_string())
}

/// Split on top-level commas (commas inside parentheses separate effect
/// arguments, not effects).
fn split_effects(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_effect(text: &str, line: usize) -> Result<Effect, HandlerConfigError> {
    if text == "noop" {
        return Ok(Effect::NoOp);
    }
    let (name, rest) = match text.split_once('(') {
        Some((name, rest)) if rest.ends_with(')') => (name, &rest[..rest.len() - 1]),
        _ => {
            return Err(HandlerConfigError::UnknownEffect {
                line,
                text: text.to_string(),
            });
        }
    };
    let args: Vec<&str> = rest.split(',').map(str::trim).collect();
    match (name, args.as_slice()) {
        ("mutate", [arg]) => Ok(Effect::Mutate(parse_param(arg, line)?)),
        ("alias", [a, b]) => Ok(Effect::Alias(parse_param(a, line)?, parse_param(b, line)?)),
        ("upsert", [owner, name]) => Ok(Effect::UpsertUnder {
            owner: parse_param(owner, line)?,
            name: (*name).to_string(),
        }),
        _ => Err(HandlerConfigError::UnknownEffect {
            line,
            text: text.to_string(),
        }),
    }
}

fn parse_param(text: &str, line: usize) -> Result<ParamRef, HandlerConfigError> {
    match text {
        "self" => Ok(ParamRef::Receiver),
        "ret" => Ok(ParamRef::Return),
        _ => {
            if let Some(kw) = text.strip_prefix("kw:") {
                return Ok(ParamRef::Keyword(kw.to_string()));
            }
            text.parse::<usize>()
                .map(ParamRef::Positional)
                .map_err(|_| HandlerConfigError::BadParamRef {
                    line,
                    text: text.to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_sig(ty: &str, method: &str) -> CallSignature {
        CallSignature {
            receiver_type: Some(ty.to_string()),
            method: Some(method.to_string()),
            ..CallSignature::default()
        }
    }

    #[test]
    fn test_builtin_table_loads() {
        let registry = HandlerRegistry::with_defaults();
        assert!(!registry.is_empty());
        let spec = registry.resolve(&method_sig("list", "append")).unwrap();
        assert_eq!(spec.effects, vec![Effect::Mutate(ParamRef::Receiver)]);
    }

    #[test]
    fn test_exact_beats_receiver_and_module() {
        let mut registry = HandlerRegistry::new();
        registry.register_module("pd", HandlerSpec::noop());
        registry.register_receiver("DataFrame", "drop", HandlerSpec::noop());
        registry.register_exact(
            "pd",
            "DataFrame.drop",
            HandlerSpec {
                effects: vec![Effect::Mutate(ParamRef::Receiver)],
            },
        );
        let sig = CallSignature {
            module: Some("pd".into()),
            qualname: Some("DataFrame.drop".into()),
            receiver_type: Some("DataFrame".into()),
            method: Some("drop".into()),
        };
        let spec = registry.resolve(&sig).unwrap();
        assert_eq!(spec.effects, vec![Effect::Mutate(ParamRef::Receiver)]);
    }

    #[test]
    fn test_module_wildcard() {
        let registry = HandlerRegistry::with_defaults();
        let sig = CallSignature {
            module: Some("logging".into()),
            qualname: Some("info".into()),
            ..CallSignature::default()
        };
        assert_eq!(registry.resolve(&sig).unwrap(), &HandlerSpec::noop());
    }

    #[test]
    fn test_unmatched_falls_back_to_none() {
        let registry = HandlerRegistry::with_defaults();
        let sig = CallSignature {
            module: Some("scipy".into()),
            qualname: Some("optimize.minimize".into()),
            ..CallSignature::default()
        };
        assert!(registry.resolve(&sig).is_none());
    }

    #[test]
    fn test_config_parse_effects() {
        let mut registry = HandlerRegistry::new();
        let n = registry
            .load_config("mylib::attach -> alias(ret, 0), mutate(1)\nT.poke -> mutate(self)")
            .unwrap();
        assert_eq!(n, 2);
        let sig = CallSignature {
            module: Some("mylib".into()),
            qualname: Some("attach".into()),
            ..CallSignature::default()
        };
        let spec = registry.resolve(&sig).unwrap();
        assert_eq!(
            spec.effects,
            vec![
                Effect::Alias(ParamRef::Return, ParamRef::Positional(0)),
                Effect::Mutate(ParamRef::Positional(1)),
            ]
        );
    }

    #[test]
    fn test_config_parse_errors() {
        let mut registry = HandlerRegistry::new();
        assert!(matches!(
            registry.load_config("list.append mutate(self)"),
            Err(HandlerConfigError::MissingArrow { line: 1, .. })
        ));
        assert!(matches!(
            registry.load_config("x::y -> explode(self)"),
            Err(HandlerConfigError::UnknownEffect { .. })
        ));
        assert!(matches!(
            registry.load_config("x::y -> mutate(banana)"),
            Err(HandlerConfigError::BadParamRef { .. })
        ));
    }

    #[test]
    fn test_default_rule_shape() {
        let spec = HandlerSpec::mutate_all_positional(2);
        assert_eq!(
            spec.effects,
            vec![
                Effect::Mutate(ParamRef::Positional(0)),
                Effect::Mutate(ParamRef::Positional(1)),
            ]
        );
    }
}
