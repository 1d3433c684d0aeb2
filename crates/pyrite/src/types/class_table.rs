//! Prebuilt class objects and C3 linearisation.
//!
//! Builtin types (`int`, `str`, ...) and exception types are real class
//! values so `type()`, `isinstance()` and `except` clauses treat them
//! uniformly with user-defined classes. The table is built per-Ctx: class
//! identity is stable within one evaluation, and nothing leaks across runs.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    exceptions::{ExcType, RunError, RunResult},
    value::{AttrTable, ClassKind, ClassValue, NativeFunction, NativeImpl, TypeTag, Value, plock},
};

/// Prebuilt classes: `object`, the builtin value types, and the exception
/// hierarchy.
#[derive(Debug)]
pub(crate) struct ClassTable {
    pub object: Arc<ClassValue>,
    types: AHashMap<TypeTag, Arc<ClassValue>>,
    excs: AHashMap<ExcType, Arc<ClassValue>>,
}

impl ClassTable {
    pub(crate) fn build() -> Self {
        let object = Arc::new(ClassValue {
            name: Arc::from("object"),
            bases: Vec::new(),
            mro: Vec::new(),
            attrs: Mutex::new(AttrTable::default()),
            kind: ClassKind::Object,
            annotations: Vec::new(),
        });

        let mut types = AHashMap::new();
        let int_class = make_type(TypeTag::Int, &object, &[]);
        for tag in [
            TypeTag::Float,
            TypeTag::Str,
            TypeTag::List,
            TypeTag::Dict,
            TypeTag::Set,
            TypeTag::Tuple,
            TypeTag::Range,
            TypeTag::Type,
        ] {
            types.insert(tag, make_type(tag, &object, &[]));
        }
        // bool subclasses int, so isinstance(True, int) holds
        let bool_class = make_type(TypeTag::Bool, &object, std::slice::from_ref(&int_class));
        types.insert(TypeTag::Bool, bool_class);
        types.insert(TypeTag::Int, int_class);

        let mut excs: AHashMap<ExcType, Arc<ClassValue>> = AHashMap::new();
        for &exc_type in ExcType::ALL {
            let base = match exc_type.base() {
                Some(base_type) => excs
                    .get(&base_type)
                    .cloned()
                    .unwrap_or_else(|| object.clone()),
                None => object.clone(),
            };
            let mut mro = vec![base.clone()];
            mro.extend(base.mro.iter().cloned());
            let mut attrs = AttrTable::default();
            attrs.insert(
                Arc::from("__init__"),
                Value::Native(Arc::new(NativeFunction {
                    name: Arc::from("__init__"),
                    imp: NativeImpl::Fixed(exception_init),
                })),
            );
            let class = Arc::new(ClassValue {
                name: Arc::from(exc_type.to_string()),
                bases: vec![base],
                mro,
                attrs: Mutex::new(attrs),
                kind: ClassKind::Exc(exc_type),
                annotations: Vec::new(),
            });
            excs.insert(exc_type, class);
        }

        Self { object, types, excs }
    }

    pub(crate) fn type_class(&self, tag: TypeTag) -> Arc<ClassValue> {
        self.types
            .get(&tag)
            .cloned()
            .unwrap_or_else(|| self.object.clone())
    }

    pub(crate) fn exc_class(&self, exc_type: ExcType) -> Arc<ClassValue> {
        self.excs
            .get(&exc_type)
            .cloned()
            .unwrap_or_else(|| self.object.clone())
    }

    /// Resolves a builtin class name (`int`, `ValueError`, `object`, ...).
    pub(crate) fn lookup_name(&self, name: &str) -> Option<Value> {
        if name == "object" {
            return Some(Value::Class(self.object.clone()));
        }
        for (tag, class) in &self.types {
            if tag.name() == name {
                return Some(Value::Class(class.clone()));
            }
        }
        if let Ok(exc_type) = name.parse::<ExcType>() {
            if let Some(class) = self.excs.get(&exc_type) {
                return Some(Value::Class(class.clone()));
            }
        }
        None
    }

    /// The class of an arbitrary value, for `type()`/`isinstance()`.
    pub(crate) fn class_of(&self, value: &Value) -> Arc<ClassValue> {
        match value {
            Value::Bool(_) => self.type_class(TypeTag::Bool),
            Value::Int(_) | Value::BigInt(_) => self.type_class(TypeTag::Int),
            Value::Float(_) => self.type_class(TypeTag::Float),
            Value::Str(_) => self.type_class(TypeTag::Str),
            Value::List(_) => self.type_class(TypeTag::List),
            Value::Dict(_) => self.type_class(TypeTag::Dict),
            Value::Set(_) => self.type_class(TypeTag::Set),
            Value::Tuple(_) => self.type_class(TypeTag::Tuple),
            Value::Range(_) => self.type_class(TypeTag::Range),
            Value::Class(_) => self.type_class(TypeTag::Type),
            Value::Instance(inst) => inst.class.clone(),
            _ => self.object.clone(),
        }
    }
}

fn make_type(tag: TypeTag, object: &Arc<ClassValue>, extra_bases: &[Arc<ClassValue>]) -> Arc<ClassValue> {
    let mut bases: Vec<Arc<ClassValue>> = extra_bases.to_vec();
    if bases.is_empty() {
        bases.push(object.clone());
    }
    let mut mro = bases.clone();
    if !mro.iter().any(|c| Arc::ptr_eq(c, object)) {
        mro.push(object.clone());
    }
    Arc::new(ClassValue {
        name: Arc::from(tag.name()),
        bases,
        mro,
        attrs: Mutex::new(AttrTable::default()),
        kind: ClassKind::Type(tag),
        annotations: Vec::new(),
    })
}

/// `__init__` shared by all builtin exception classes: stores the argument
/// tuple on the instance as `args`.
fn exception_init(_ev: &mut crate::eval::Evaluator, mut args: Vec<Value>) -> RunResult<Value> {
    if args.is_empty() {
        return Err(RunError::type_error("__init__ requires an exception instance"));
    }
    let instance = args.remove(0);
    let Value::Instance(inst) = &instance else {
        return Err(RunError::type_error("__init__ requires an exception instance"));
    };
    plock(&inst.attrs).insert(Arc::from("args"), Value::tuple(args));
    Ok(Value::None)
}

/// Maximum length of a computed MRO; guards against diamond explosions.
pub(crate) const MAX_MRO_LENGTH: usize = 2600;

/// C3 linearisation of a class's bases.
///
/// Returns the ancestor order (the new class itself excluded). Fails when the
/// base order is inconsistent (no valid linearisation exists).
pub(crate) fn c3_linearise(bases: &[Arc<ClassValue>]) -> Result<Vec<Arc<ClassValue>>, String> {
    // sequences to merge: each base's own linearisation, then the base list
    let mut sequences: Vec<Vec<Arc<ClassValue>>> = Vec::with_capacity(bases.len() + 1);
    for base in bases {
        let mut seq = vec![base.clone()];
        seq.extend(base.mro.iter().cloned());
        sequences.push(seq);
    }
    sequences.push(bases.to_vec());

    let mut result = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        if result.len() > MAX_MRO_LENGTH {
            return Err("inheritance hierarchy is too deep".to_owned());
        }
        // find a head that appears in no other sequence's tail
        let mut chosen: Option<Arc<ClassValue>> = None;
        'candidates: for seq in &sequences {
            let head = &seq[0];
            for other in &sequences {
                if other[1..].iter().any(|c| Arc::ptr_eq(c, head)) {
                    continue 'candidates;
                }
            }
            chosen = Some(head.clone());
            break;
        }
        let Some(head) = chosen else {
            return Err("cannot create a consistent method resolution order (MRO) for bases".to_owned());
        };
        result.push(head.clone());
        for seq in &mut sequences {
            seq.retain(|c| !Arc::ptr_eq(c, &head));
        }
    }
}

/// Builds a user class value with its MRO computed at definition time.
pub(crate) fn new_user_class(
    name: Arc<str>,
    bases: Vec<Arc<ClassValue>>,
    attrs: IndexMap<Arc<str>, Value>,
    annotations: Vec<(Arc<str>, Arc<str>)>,
    object: &Arc<ClassValue>,
) -> Result<Arc<ClassValue>, String> {
    let effective_bases = if bases.is_empty() { vec![object.clone()] } else { bases };
    let mro = c3_linearise(&effective_bases)?;
    Ok(Arc::new(ClassValue {
        name,
        bases: effective_bases,
        mro,
        attrs: Mutex::new(attrs),
        kind: ClassKind::User,
        annotations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_mro_is_c3() {
        let table = ClassTable::build();
        let a = new_user_class(Arc::from("A"), vec![], IndexMap::default(), vec![], &table.object).unwrap();
        let b = new_user_class(Arc::from("B"), vec![a.clone()], IndexMap::default(), vec![], &table.object).unwrap();
        let c = new_user_class(Arc::from("C"), vec![a.clone()], IndexMap::default(), vec![], &table.object).unwrap();
        let d = new_user_class(
            Arc::from("D"),
            vec![b.clone(), c.clone()],
            IndexMap::default(),
            vec![],
            &table.object,
        )
        .unwrap();
        let names: Vec<&str> = d.mro.iter().map(|c| &*c.name).collect();
        assert_eq!(names, vec!["B", "C", "A", "object"]);
    }

    #[test]
    fn inconsistent_mro_rejected() {
        let table = ClassTable::build();
        let a = new_user_class(Arc::from("A"), vec![], IndexMap::default(), vec![], &table.object).unwrap();
        let b = new_user_class(Arc::from("B"), vec![a.clone()], IndexMap::default(), vec![], &table.object).unwrap();
        // class C(A, B) is inconsistent: A precedes B locally but B's MRO puts A after B
        let result = new_user_class(
            Arc::from("C"),
            vec![a, b],
            IndexMap::default(),
            vec![],
            &table.object,
        );
        assert!(result.is_err());
    }

    #[test]
    fn bool_subclasses_int() {
        let table = ClassTable::build();
        let bool_class = table.type_class(TypeTag::Bool);
        let int_class = table.type_class(TypeTag::Int);
        assert!(bool_class.is_subclass(&int_class));
        assert!(!int_class.is_subclass(&bool_class));
    }

    #[test]
    fn exception_hierarchy_classes() {
        let table = ClassTable::build();
        let fnf = table.exc_class(ExcType::FileNotFoundError);
        let io = table.exc_class(ExcType::IOError);
        let exc = table.exc_class(ExcType::Exception);
        assert!(fnf.is_subclass(&io));
        assert!(fnf.is_subclass(&exc));
        assert!(!io.is_subclass(&fnf));
    }
}
