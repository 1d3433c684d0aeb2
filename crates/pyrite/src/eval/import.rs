//! Import machinery: builtin modules, the host registry, error suggestions.

use std::sync::{Arc, Mutex};

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    modules,
    value::{ModuleValue, Value},
};

impl Evaluator {
    /// Imports a module by name: cache, builtin set, host registry, in that
    /// order. Unknown modules get an `ImportError` that enumerates every
    /// registered name and maps common synonyms.
    pub(crate) fn import_module(&mut self, name: &str, line: u32) -> RunResult<Value> {
        if let Some(cached) = {
            let cache = crate::value::plock(&self.ctx.inner.loaded_modules);
            cache.get(name).cloned()
        } {
            return Ok(cached);
        }

        let namespace = if modules::is_builtin(name) {
            Some(modules::builtin_namespace(self, name)?)
        } else if let Some(def) = self.ctx.inner.registry.get(name).cloned() {
            Some(modules::host_namespace(self, &def)?)
        } else {
            None
        };

        let Some(namespace) = namespace else {
            return Err(self.unknown_module_error(name).into_with_line(line));
        };

        let module = Value::Module(Arc::new(ModuleValue {
            name: Arc::from(name),
            namespace: Mutex::new(namespace),
        }));
        crate::value::plock(&self.ctx.inner.loaded_modules).insert(Arc::from(name), module.clone());
        Ok(module)
    }

    fn unknown_module_error(&self, name: &str) -> RunError {
        let mut registered: Vec<String> = modules::BUILTIN_MODULES.iter().map(|s| (*s).to_owned()).collect();
        registered.extend(self.ctx.inner.registry.keys().cloned());
        registered.sort();
        let mut message = format!(
            "No module named '{name}'. Registered modules: {}",
            registered.join(", ")
        );
        if let Some(suggestion) = modules::suggest(name) {
            if registered.iter().any(|m| m == suggestion) || modules::is_builtin(suggestion) {
                message.push_str(&format!("; did you mean '{suggestion}'?"));
            }
        }
        RunError::raise(ExcType::ModuleNotFoundError, message)
    }
}
