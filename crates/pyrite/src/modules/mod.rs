//! Importable modules.
//!
//! Two kinds exist: the bundled builtin modules (created on demand, one per
//! Ctx) and host-registered modules supplied through [`CtxOptions::modules`]
//! as either a literal namespace or a lazy provider.
//!
//! [`CtxOptions::modules`]: crate::CtxOptions

pub(crate) mod json_mod;
pub(crate) mod math;
pub(crate) mod os_mod;
pub(crate) mod random_mod;
pub(crate) mod re_mod;
pub(crate) mod time_mod;
pub(crate) mod web;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    object::Object,
    value::{AttrTable, NativeFunction, NativeImpl, Value},
};

/// Host-registered positional-only callable.
pub type HostFunction = Arc<dyn Fn(&[Object]) -> Result<Object, String> + Send + Sync>;
/// Host-registered keyword-aware callable.
pub type HostKwFunction =
    Arc<dyn Fn(&[Object], &[(String, Object)]) -> Result<Object, String> + Send + Sync>;

/// One entry of a host module namespace.
#[derive(Clone)]
pub enum ModuleEntry {
    /// A plain data value.
    Value(Object),
    /// A positional-only native callable.
    Func(HostFunction),
    /// A keyword-aware native callable.
    KwFunc(HostKwFunction),
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
            Self::KwFunc(_) => f.write_str("KwFunc(..)"),
        }
    }
}

/// A literal module namespace built by the host.
#[derive(Debug, Clone, Default)]
pub struct ModuleNamespace {
    pub(crate) entries: IndexMap<String, ModuleEntry>,
}

impl ModuleNamespace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: Object) -> Self {
        self.entries.insert(name.into(), ModuleEntry::Value(value));
        self
    }

    pub fn func(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Object]) -> Result<Object, String> + Send + Sync + 'static,
    ) -> Self {
        self.entries.insert(name.into(), ModuleEntry::Func(Arc::new(f)));
        self
    }

    pub fn kw_func(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Object], &[(String, Object)]) -> Result<Object, String> + Send + Sync + 'static,
    ) -> Self {
        self.entries.insert(name.into(), ModuleEntry::KwFunc(Arc::new(f)));
        self
    }
}

/// A registered module: a literal namespace or a lazy provider evaluated on
/// first import.
#[derive(Clone)]
pub enum ModuleDef {
    Namespace(ModuleNamespace),
    Provider(Arc<dyn Fn() -> ModuleNamespace + Send + Sync>),
}

impl std::fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace(ns) => f.debug_tuple("Namespace").field(ns).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// The bundled builtin modules.
pub(crate) const BUILTIN_MODULES: &[&str] = &["math", "json", "random", "time", "re", "os", "web"];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTIN_MODULES.contains(&name)
}

/// Common synonym imports mapped to the registered equivalent.
pub(crate) fn suggest(name: &str) -> Option<&'static str> {
    Some(match name {
        "fastapi" | "flask" | "starlette" | "django" | "aiohttp" | "bottle" => "web",
        "simplejson" | "ujson" | "orjson" => "json",
        "numpy" | "cmath" => "math",
        "regex" | "re2" => "re",
        "datetime" | "arrow" | "pendulum" => "time",
        "secrets" => "random",
        "pathlib" | "shutil" | "io" => "os",
        _ => return None,
    })
}

/// Builds a builtin module's namespace.
pub(crate) fn builtin_namespace(ev: &mut Evaluator, name: &str) -> RunResult<AttrTable> {
    match name {
        "math" => Ok(math::namespace()),
        "json" => Ok(json_mod::namespace()),
        "random" => Ok(random_mod::namespace()),
        "time" => Ok(time_mod::namespace()),
        "re" => Ok(re_mod::namespace()),
        "os" => Ok(os_mod::namespace(ev)),
        "web" => web::namespace(ev),
        _ => Err(RunError::runtime_error(format!("unknown builtin module '{name}'"))),
    }
}

/// Converts a host module definition into a live namespace.
pub(crate) fn host_namespace(ev: &mut Evaluator, def: &ModuleDef) -> RunResult<AttrTable> {
    let namespace = match def {
        ModuleDef::Namespace(ns) => ns.clone(),
        ModuleDef::Provider(provider) => provider(),
    };
    let mut table = AttrTable::default();
    for (name, entry) in &namespace.entries {
        let value = match entry {
            ModuleEntry::Value(object) => ev.from_object(object)?,
            ModuleEntry::Func(f) => Value::Native(Arc::new(NativeFunction {
                name: Arc::from(name.as_str()),
                imp: NativeImpl::Host(f.clone()),
            })),
            ModuleEntry::KwFunc(f) => Value::Native(Arc::new(NativeFunction {
                name: Arc::from(name.as_str()),
                imp: NativeImpl::HostKw(f.clone()),
            })),
        };
        table.insert(Arc::from(name.as_str()), value);
    }
    Ok(table)
}

/// Convenience for builtin modules: a positional native function entry.
pub(crate) fn native(
    name: &'static str,
    f: fn(&mut Evaluator, Vec<Value>) -> RunResult<Value>,
) -> (Arc<str>, Value) {
    (
        Arc::from(name),
        Value::Native(Arc::new(NativeFunction {
            name: Arc::from(name),
            imp: NativeImpl::Fixed(f),
        })),
    )
}

/// Convenience for builtin modules: a keyword-aware native function entry.
pub(crate) fn native_kw(
    name: &'static str,
    f: fn(&mut Evaluator, Vec<Value>, Vec<(String, Value)>) -> RunResult<Value>,
) -> (Arc<str>, Value) {
    (
        Arc::from(name),
        Value::Native(Arc::new(NativeFunction {
            name: Arc::from(name),
            imp: NativeImpl::Kw(f),
        })),
    )
}
