//! Capability registry: the static catalogue of callable names.
//!
//! Every tool or built-in function a script may call is declared here with
//! its signature and side-effect class. The registry is populated once,
//! from code or from a TOML/JSON table, and is read-only afterwards; it is
//! shared across sessions behind an `Arc`.
//!
//! ```toml
//! [[capability]]
//! name = "read_files"
//! effect = "io"
//! description = "Read files and return a dict of path to content"
//! params = [{ name = "paths", shape = "list" }]
//! ```

mod standard;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side-effect class of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Pure,
    Io,
    Stateful,
}

impl SideEffect {
    /// Whether calls should be reported and their results recorded.
    pub fn is_effectful(self) -> bool {
        !matches!(self, SideEffect::Pure)
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Pure => write!(f, "pure"),
            SideEffect::Io => write!(f, "io"),
            SideEffect::Stateful => write!(f, "stateful"),
        }
    }
}

/// The allowed shape of one argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgShape {
    #[default]
    Any,
    Str,
    Int,
    /// int or float
    Number,
    Bool,
    List,
    Dict,
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgShape::Any => write!(f, "any"),
            ArgShape::Str => write!(f, "str"),
            ArgShape::Int => write!(f, "int"),
            ArgShape::Number => write!(f, "number"),
            ArgShape::Bool => write!(f, "bool"),
            ArgShape::List => write!(f, "list"),
            ArgShape::Dict => write!(f, "dict"),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub shape: ArgShape,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Can only be passed by keyword, e.g. `print(..., end="")`.
    #[serde(default)]
    pub keyword_only: bool,
}

fn default_required() -> bool {
    true
}

/// Signature of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Accepts any number of extra positional arguments.
    #[serde(default)]
    pub variadic: bool,
    pub effect: SideEffect,
    /// Explicitly forbidden; any use is fatal at validation time.
    #[serde(default)]
    pub disallowed: bool,
    /// Ends the agent turn.
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub description: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, effect: SideEffect) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            variadic: false,
            effect,
            disallowed: false,
            terminal: false,
            description: String::new(),
        }
    }

    /// A name scripts may never use.
    pub fn forbidden(name: impl Into<String>) -> Self {
        Self {
            disallowed: true,
            ..Self::new(name, SideEffect::Stateful)
        }
    }

    pub fn param(mut self, name: impl Into<String>, shape: ArgShape) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            shape,
            required: true,
            keyword_only: false,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, shape: ArgShape) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            shape,
            required: false,
            keyword_only: false,
        });
        self
    }

    pub fn keyword(mut self, name: impl Into<String>, shape: ArgShape) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            shape,
            required: false,
            keyword_only: true,
        });
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Fewest positional arguments a call must supply.
    pub fn min_args(&self) -> usize {
        self.positional().filter(|p| p.required).count()
    }

    /// Most positional arguments a call may supply, `None` when variadic.
    pub fn max_args(&self) -> Option<usize> {
        if self.variadic {
            None
        } else {
            Some(self.positional().count())
        }
    }

    /// Parameters that may be passed positionally, in order.
    pub fn positional(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| !p.keyword_only)
    }

    pub fn param_named(&self, name: &str) -> Option<(usize, &ParamSpec)> {
        self.params.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// Human-readable arity, e.g. `1`, `1 to 2`, `at least 1`.
    pub fn arity_text(&self) -> String {
        match (self.min_args(), self.max_args()) {
            (min, None) => format!("at least {min}"),
            (min, Some(max)) if min == max => min.to_string(),
            (min, Some(max)) => format!("{min} to {max}"),
        }
    }
}

/// Errors raised while loading a capability table.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read capability table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML capability table: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON capability table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("capability `{0}` is declared more than once")]
    Duplicate(String),
    #[error("capability `{name}`: required parameter `{param}` follows an optional one")]
    ParamOrder { name: String, param: String },
}

/// The declarative table a registry is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityTable {
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<Signature>,
}

impl CapabilityTable {
    /// Load a table, choosing JSON for `.json` files and TOML otherwise.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&text)
        } else {
            Self::from_toml(&text)
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, RegistryError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Read-only lookup of capability signatures.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Signature>,
}

impl CapabilityRegistry {
    /// Build a registry, rejecting duplicate names and misordered params.
    pub fn from_table(table: CapabilityTable) -> Result<Self, RegistryError> {
        let mut entries = BTreeMap::new();
        for signature in table.capabilities {
            let mut seen_optional = false;
            for param in signature.positional() {
                if param.required && seen_optional {
                    return Err(RegistryError::ParamOrder {
                        name: signature.name.clone(),
                        param: param.name.clone(),
                    });
                }
                seen_optional |= !param.required;
            }
            if entries.contains_key(&signature.name) {
                return Err(RegistryError::Duplicate(signature.name));
            }
            entries.insert(signature.name.clone(), signature);
        }
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        Self::from_table(CapabilityTable::from_path(path)?)
    }

    /// The built-in table matching the sandbox's built-in capabilities.
    pub fn standard() -> Self {
        let entries = standard::table()
            .into_iter()
            .map(|signature| (signature.name.clone(), signature))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> Option<&Signature> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_disallowed(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|sig| sig.disallowed)
    }

    /// Whether any capability ends the turn.
    pub fn has_terminal(&self) -> bool {
        self.entries.values().any(|sig| sig.terminal && !sig.disallowed)
    }

    /// Signatures in name order.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.entries.values()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the usable capabilities as Python-style stubs for a prompt.
    pub fn render_catalogue(&self) -> String {
        let mut out = String::new();
        for sig in self.signatures().filter(|sig| !sig.disallowed) {
            let mut params: Vec<String> = sig
                .params
                .iter()
                .map(|p| {
                    let shape = match p.shape {
                        ArgShape::Any => String::new(),
                        shape => format!(": {shape}"),
                    };
                    let default = if p.required { "" } else { " = None" };
                    format!("{}{shape}{default}", p.name)
                })
                .collect();
            if sig.variadic {
                params.insert(sig.positional().count(), "*args".to_string());
            }
            out.push_str(&format!("def {}({}):", sig.name, params.join(", ")));
            if !sig.description.is_empty() {
                out.push_str(&format!("  # {}", sig.description));
            }
            out.push_str(&format!("  [{}]\n", sig.effect));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_core_functions() {
        let registry = CapabilityRegistry::standard();
        assert!(registry.contains("print"));
        assert!(registry.contains("respond"));
        assert!(registry.is_disallowed("eval"));
        assert!(registry.is_disallowed("__import__"));
        assert!(!registry.is_disallowed("len"));
        assert!(registry.has_terminal());
    }

    #[test]
    fn arity_bounds() {
        let sig = Signature::new("f", SideEffect::Pure)
            .param("a", ArgShape::Any)
            .optional("b", ArgShape::Int);
        assert_eq!(sig.min_args(), 1);
        assert_eq!(sig.max_args(), Some(2));
        assert_eq!(sig.arity_text(), "1 to 2");

        let print = Signature::new("print", SideEffect::Io).variadic();
        assert_eq!(print.max_args(), None);
        assert_eq!(print.arity_text(), "at least 0");
    }

    #[test]
    fn load_toml_table() {
        let table = CapabilityTable::from_toml(
            r#"
            [[capability]]
            name = "search"
            effect = "io"
            description = "Search the web"
            params = [{ name = "query", shape = "str" }, { name = "limit", shape = "int", required = false }]

            [[capability]]
            name = "eval"
            effect = "stateful"
            disallowed = true
            "#,
        )
        .expect("valid table");
        let registry = CapabilityRegistry::from_table(table).expect("registry");
        let search = registry.lookup("search").expect("search");
        assert_eq!(search.effect, SideEffect::Io);
        assert_eq!(search.params[0].shape, ArgShape::Str);
        assert!(!search.params[1].required);
        assert!(registry.is_disallowed("eval"));
    }

    #[test]
    fn load_json_table() {
        let table = CapabilityTable::from_json(
            r#"{"capability": [{"name": "ping", "effect": "pure"}]}"#,
        )
        .expect("valid table");
        assert_eq!(table.capabilities.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let table = CapabilityTable {
            capabilities: vec![
                Signature::new("x", SideEffect::Pure),
                Signature::new("x", SideEffect::Io),
            ],
        };
        assert!(matches!(
            CapabilityRegistry::from_table(table),
            Err(RegistryError::Duplicate(name)) if name == "x"
        ));
    }

    #[test]
    fn required_after_optional_is_rejected() {
        let table = CapabilityTable {
            capabilities: vec![
                Signature::new("f", SideEffect::Pure)
                    .optional("a", ArgShape::Any)
                    .param("b", ArgShape::Any),
            ],
        };
        assert!(matches!(
            CapabilityRegistry::from_table(table),
            Err(RegistryError::ParamOrder { .. })
        ));
    }

    #[test]
    fn catalogue_skips_disallowed() {
        let catalogue = CapabilityRegistry::standard().render_catalogue();
        assert!(catalogue.contains("def read_files(paths: list):"));
        assert!(!catalogue.contains("def eval"));
    }
}
