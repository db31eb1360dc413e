use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of an entry inside a value's namespace.
///
/// Attributes and string subscripts are distinct keys: `obj.x` and
/// `obj["x"]` resolve to different symbols.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NsKey {
    Attr(String),
    Int(i64),
    Str(String),
    Tuple(Vec<NsKey>),
}

impl NsKey {
    pub fn attr<S: Into<String>>(name: S) -> Self {
        NsKey::Attr(name.into())
    }

    #[inline]
    pub fn is_attr(&self) -> bool {
        matches!(self, NsKey::Attr(_))
    }
}

impl fmt::Display for NsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NsKey::Attr(name) => write!(f, ".{name}"),
            NsKey::Int(i) => write!(f, "[{i}]"),
            NsKey::Str(s) => write!(f, "[{s:?}]"),
            NsKey::Tuple(parts) => {
                f.write_str("[(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")]")
            }
        }
    }
}

/// A reference descriptor: a root name plus an attribute/subscript path.
///
/// `a.b[0]` is `RefPath { root: "a", path: [Attr("b"), Int(0)] }`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPath {
    pub root: String,
    pub path: Vec<NsKey>,
}

impl RefPath {
    pub fn name<S: Into<String>>(root: S) -> Self {
        Self {
            root: root.into(),
            path: Vec::new(),
        }
    }

    pub fn with_path<S: Into<String>>(root: S, path: Vec<NsKey>) -> Self {
        Self {
            root: root.into(),
            path,
        }
    }

    /// Descriptor for the bare root name, dropping the access path.
    pub fn root_only(&self) -> RefPath {
        RefPath::name(self.root.clone())
    }

    #[inline]
    pub fn is_bare(&self) -> bool {
        self.path.is_empty()
    }

    pub fn child(mut self, key: NsKey) -> RefPath {
        self.path.push(key);
        self
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for seg in &self.path {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}
