//! Environment frames.
//!
//! An environment is a linked chain of frames: module -> class body ->
//! function -> nested function/lambda/comprehension. Closures hold an `Arc`
//! to their defining frame, so `nonlocal` mutations are visible to sibling
//! closures and to the defining frame.

use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};

use crate::value::{Value, plock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Module,
    Function,
    Class,
    Comprehension,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub parent: Option<Arc<Frame>>,
    vars: Mutex<AHashMap<Arc<str>, Value>>,
    /// Names declared `global` in this frame.
    globals_decl: Mutex<AHashSet<Arc<str>>>,
    /// Names declared `nonlocal` in this frame.
    nonlocals_decl: Mutex<AHashSet<Arc<str>>>,
}

impl Frame {
    pub(crate) fn module() -> Arc<Self> {
        Arc::new(Self {
            kind: FrameKind::Module,
            parent: None,
            vars: Mutex::new(AHashMap::new()),
            globals_decl: Mutex::new(AHashSet::new()),
            nonlocals_decl: Mutex::new(AHashSet::new()),
        })
    }

    pub(crate) fn child(parent: &Arc<Self>, kind: FrameKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            parent: Some(parent.clone()),
            vars: Mutex::new(AHashMap::new()),
            globals_decl: Mutex::new(AHashSet::new()),
            nonlocals_decl: Mutex::new(AHashSet::new()),
        })
    }

    pub(crate) fn get_local(&self, name: &str) -> Option<Value> {
        plock(&self.vars).get(name).cloned()
    }

    pub(crate) fn set_local(&self, name: Arc<str>, value: Value) {
        plock(&self.vars).insert(name, value);
    }

    pub(crate) fn delete_local(&self, name: &str) -> bool {
        plock(&self.vars).remove(name).is_some()
    }

    pub(crate) fn has_local(&self, name: &str) -> bool {
        plock(&self.vars).contains_key(name)
    }

    /// Snapshot of the frame's bindings (used to build class attr tables and
    /// to extract the module namespace).
    pub(crate) fn bindings(&self) -> Vec<(Arc<str>, Value)> {
        plock(&self.vars).iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub(crate) fn declare_global(&self, name: Arc<str>) {
        plock(&self.globals_decl).insert(name);
    }

    pub(crate) fn declare_nonlocal(&self, name: Arc<str>) {
        plock(&self.nonlocals_decl).insert(name);
    }

    pub(crate) fn is_declared_global(&self, name: &str) -> bool {
        plock(&self.globals_decl).contains(name)
    }

    pub(crate) fn is_declared_nonlocal(&self, name: &str) -> bool {
        plock(&self.nonlocals_decl).contains(name)
    }

    /// The module frame at the root of this chain.
    pub(crate) fn module_frame(self: &Arc<Self>) -> Arc<Self> {
        let mut frame = self.clone();
        while let Some(parent) = &frame.parent {
            let parent = parent.clone();
            frame = parent;
        }
        frame
    }

    /// The frame a nested definition should close over: class frames are not
    /// visible to the functions defined inside them.
    pub(crate) fn closure_base(self: &Arc<Self>) -> Arc<Self> {
        let mut frame = self.clone();
        while frame.kind == FrameKind::Class {
            match &frame.parent {
                Some(parent) => {
                    let parent = parent.clone();
                    frame = parent;
                }
                None => break,
            }
        }
        frame
    }

    /// Resolves a name: this frame, then enclosing frames (skipping class
    /// frames, which are invisible to nested scopes).
    pub(crate) fn lookup(self: &Arc<Self>, name: &str) -> Option<Value> {
        if let Some(v) = self.get_local(name) {
            return Some(v);
        }
        let mut frame = self.parent.clone();
        while let Some(f) = frame {
            if f.kind != FrameKind::Class {
                if let Some(v) = f.get_local(name) {
                    return Some(v);
                }
            }
            frame = f.parent.clone();
        }
        None
    }

    /// Finds the nearest enclosing non-module, non-class frame that already
    /// defines `name` (the `nonlocal` binding target).
    pub(crate) fn nonlocal_target(self: &Arc<Self>, name: &str) -> Option<Arc<Self>> {
        let mut frame = self.parent.clone();
        while let Some(f) = frame {
            match f.kind {
                FrameKind::Module => return None,
                FrameKind::Class => {}
                _ => {
                    if f.has_local(name) {
                        return Some(f.clone());
                    }
                }
            }
            frame = f.parent.clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_skips_class_frames() {
        let module = Frame::module();
        module.set_local(Arc::from("x"), Value::Int(1));
        let class_frame = Frame::child(&module, FrameKind::Class);
        class_frame.set_local(Arc::from("x"), Value::Int(2));
        let method_frame = Frame::child(&class_frame, FrameKind::Function);
        let found = method_frame.lookup("x");
        assert!(matches!(found, Some(Value::Int(1))));
    }

    #[test]
    fn nonlocal_target_finds_enclosing_function() {
        let module = Frame::module();
        let outer = Frame::child(&module, FrameKind::Function);
        outer.set_local(Arc::from("count"), Value::Int(0));
        let inner = Frame::child(&outer, FrameKind::Function);
        let target = inner.nonlocal_target("count").unwrap();
        assert!(Arc::ptr_eq(&target, &outer));
        assert!(inner.nonlocal_target("missing").is_none());
    }
}
