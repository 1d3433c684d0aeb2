//! Runtime value model.
//!
//! Values are cheap-to-clone tagged variants: immediates are stored inline and
//! containers share their payload behind `Arc` (with a `Mutex` where mutation
//! is allowed) so generator producer threads can see the same objects as their
//! consumer. `Int` keeps an i64 fast path and promotes to `BigInt` on
//! overflow.
//!
//! Operations that may need dunder dispatch (repr, ==, ordering on instances)
//! live in the evaluator; this module implements the native semantics only.

use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use ahash::AHashSet;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    builtins::Builtin,
    exceptions::{ExcType, RunError, RunResult},
    expressions::{BinOp, Params, StmtLoc},
    generator::GeneratorValue,
    types::iter::IterState,
    env::Frame,
};

/// Locks a mutex, recovering from poisoning (a panicking producer thread must
/// not wedge the whole evaluation).
pub(crate) fn plock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Modulus used for numeric hashing (2^61 - 1, matching CPython) so that
/// `hash(1) == hash(1.0) == hash(True)`.
const HASH_MODULUS: u64 = (1 << 61) - 1;

pub(crate) type DictData = IndexMap<Key, Value, ahash::RandomState>;
pub(crate) type SetData = indexmap::IndexSet<Key, ahash::RandomState>;
pub(crate) type AttrTable = IndexMap<Arc<str>, Value>;

/// Primary runtime value.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    BigInt(Arc<BigInt>),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Mutex<Vec<Value>>>),
    Tuple(Arc<[Value]>),
    Dict(Arc<Mutex<DictData>>),
    Set(Arc<Mutex<SetData>>),
    Range(Arc<RangeValue>),
    Function(Arc<FunctionValue>),
    Builtin(Builtin),
    Native(Arc<NativeFunction>),
    /// A native method already bound to its receiver (str/list/dict/... methods).
    NativeMethod(Arc<NativeMethod>),
    BoundMethod(Arc<BoundMethod>),
    Class(Arc<ClassValue>),
    Instance(Arc<InstanceValue>),
    Generator(Arc<GeneratorValue>),
    Iterator(Arc<Mutex<IterState>>),
    Module(Arc<ModuleValue>),
    File(Arc<Mutex<FileHandle>>),
    /// Proxy produced by `super()`.
    Super(Arc<SuperValue>),
}

/// Lazy integer range with O(1) len/contains/index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RangeValue {
    pub start: i64,
    pub stop: i64,
    /// Never zero.
    pub step: i64,
}

impl RangeValue {
    pub(crate) fn len(&self) -> i64 {
        if self.step > 0 {
            if self.stop > self.start {
                (self.stop - self.start + self.step - 1) / self.step
            } else {
                0
            }
        } else if self.start > self.stop {
            (self.start - self.stop - self.step - 1) / -self.step
        } else {
            0
        }
    }

    /// Element at index `i` (already bounds-checked by the caller).
    pub(crate) fn get(&self, i: i64) -> i64 {
        self.start + i * self.step
    }

    pub(crate) fn contains(&self, v: i64) -> bool {
        if self.step > 0 {
            v >= self.start && v < self.stop && (v - self.start) % self.step == 0
        } else {
            v <= self.start && v > self.stop && (self.start - v) % (-self.step) == 0
        }
    }
}

/// A user-defined function (also backs lambdas and generator functions).
#[derive(Debug)]
pub(crate) struct FunctionValue {
    pub name: Arc<str>,
    pub params: Arc<Params>,
    pub body: Arc<[StmtLoc]>,
    /// Names assigned in the body; read-before-write of one of these raises
    /// `UnboundLocalError` instead of falling through to enclosing scopes.
    pub assigned: Arc<AHashSet<Arc<str>>>,
    /// The defining frame; closures resolve free names through it.
    pub closure: Arc<Frame>,
    /// Defaults evaluated at definition time, keyed by parameter name.
    pub defaults: Vec<(Arc<str>, Value)>,
    pub is_generator: bool,
    /// Parameter annotations (opaque strings), used by the request dispatcher.
    pub annotations: Vec<(Arc<str>, Arc<str>)>,
    /// Class this function was defined in, when it is a method; drives
    /// zero-argument `super()`.
    pub defining_class: Mutex<Option<Weak<ClassValue>>>,
}

/// A native (host) callable: positional-only or keyword-aware.
pub(crate) struct NativeFunction {
    pub name: Arc<str>,
    pub imp: NativeImpl,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

type FixedFn = fn(&mut crate::eval::Evaluator, Vec<Value>) -> RunResult<Value>;
type KwFn = fn(&mut crate::eval::Evaluator, Vec<Value>, Vec<(String, Value)>) -> RunResult<Value>;

pub(crate) enum NativeImpl {
    Fixed(FixedFn),
    Kw(KwFn),
    Host(crate::modules::HostFunction),
    HostKw(crate::modules::HostKwFunction),
}

/// A native method bound to a receiver (e.g. `"a,b".split`).
pub(crate) struct NativeMethod {
    pub name: Arc<str>,
    pub recv: Value,
    pub imp: MethodFn,
}

pub(crate) type MethodFn =
    fn(&mut crate::eval::Evaluator, &Value, Vec<Value>, Vec<(String, Value)>) -> RunResult<Value>;

impl std::fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeMethod").field("name", &self.name).finish()
    }
}

/// A user function bound to an instance (`self` prepended on call).
#[derive(Debug)]
pub(crate) struct BoundMethod {
    pub recv: Value,
    pub func: Value,
}

/// What a class fundamentally is: a plain user class, the `object` root, a
/// builtin type (`int`, `str`, ...) doubling as constructor, or a builtin
/// exception type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassKind {
    User,
    Object,
    Type(TypeTag),
    Exc(ExcType),
}

/// Tags for the builtin value types exposed as classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TypeTag {
    Int,
    Float,
    Bool,
    Str,
    List,
    Dict,
    Set,
    Tuple,
    Range,
    Type,
}

impl TypeTag {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Tuple => "tuple",
            Self::Range => "range",
            Self::Type => "type",
        }
    }
}

/// A class object. The MRO is computed once, at definition time (C3
/// linearisation), and stored as the ancestor list excluding the class
/// itself — storing self would create an unreclaimable `Arc` cycle.
#[derive(Debug)]
pub(crate) struct ClassValue {
    pub name: Arc<str>,
    pub bases: Vec<Arc<ClassValue>>,
    /// Linearised ancestors in resolution order, self excluded.
    pub mro: Vec<Arc<ClassValue>>,
    pub attrs: Mutex<AttrTable>,
    pub kind: ClassKind,
    /// Class-body `name: annotation` declarations without values, in order.
    /// Used for pydantic-style request-body binding.
    pub annotations: Vec<(Arc<str>, Arc<str>)>,
}

impl ClassValue {
    /// Looks up an attribute: own table first, then the MRO.
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = plock(&self.attrs).get(name) {
            return Some(v.clone());
        }
        for cls in &self.mro {
            if let Some(v) = plock(&cls.attrs).get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    /// The builtin exception type backing this class, walking the MRO.
    pub(crate) fn exc_type(&self) -> Option<ExcType> {
        if let ClassKind::Exc(t) = self.kind {
            return Some(t);
        }
        for cls in &self.mro {
            if let ClassKind::Exc(t) = cls.kind {
                return Some(t);
            }
        }
        None
    }

    pub(crate) fn type_tag(&self) -> Option<TypeTag> {
        if let ClassKind::Type(t) = self.kind {
            return Some(t);
        }
        for cls in &self.mro {
            if let ClassKind::Type(t) = cls.kind {
                return Some(t);
            }
        }
        None
    }

    /// True when `self` is `target` or inherits from it.
    pub(crate) fn is_subclass(self: &Arc<Self>, target: &Arc<Self>) -> bool {
        if Arc::ptr_eq(self, target) {
            return true;
        }
        if self.mro.iter().any(|c| Arc::ptr_eq(c, target)) {
            return true;
        }
        // builtin exception hierarchy also matches by ExcType relation
        if let (Some(mine), ClassKind::Exc(theirs)) = (self.exc_type(), target.kind) {
            return mine.is_subclass_of(theirs);
        }
        false
    }
}

/// An instance: class pointer plus attribute table.
#[derive(Debug)]
pub(crate) struct InstanceValue {
    pub class: Arc<ClassValue>,
    pub attrs: Mutex<AttrTable>,
}

/// An imported module namespace.
#[derive(Debug)]
pub(crate) struct ModuleValue {
    pub name: Arc<str>,
    pub namespace: Mutex<AttrTable>,
}

/// The proxy created by `super()`: attribute lookups continue in the MRO of
/// the instance's class *after* the declaring class.
#[derive(Debug)]
pub(crate) struct SuperValue {
    pub class: Arc<ClassValue>,
    pub instance: Value,
}

/// A file object returned by `open()`.
#[derive(Debug)]
pub(crate) struct FileHandle {
    pub path: String,
    pub mode: FileMode,
    pub closed: bool,
    /// Full contents at open time (read modes); consumed by read()/iteration.
    pub contents: String,
    /// Read cursor in bytes.
    pub cursor: usize,
    /// Pending writes flushed on close/write (write modes buffer locally).
    pub buffer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMode {
    Read,
    Write,
    Append,
}

impl Value {
    pub(crate) fn str(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub(crate) fn list(items: Vec<Self>) -> Self {
        Self::List(Arc::new(Mutex::new(items)))
    }

    pub(crate) fn dict(data: DictData) -> Self {
        Self::Dict(Arc::new(Mutex::new(data)))
    }

    pub(crate) fn set(data: SetData) -> Self {
        Self::Set(Arc::new(Mutex::new(data)))
    }

    pub(crate) fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items.into())
    }

    /// Normalises a `BigInt` result back to the i64 fast path when possible.
    pub(crate) fn from_bigint(value: BigInt) -> Self {
        match value.to_i64() {
            Some(small) => Self::Int(small),
            None => Self::BigInt(Arc::new(value)),
        }
    }

    /// The value's type name as shown in error messages.
    pub(crate) fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) | Self::BigInt(_) => "int".to_owned(),
            Self::Float(_) => "float".to_owned(),
            Self::Str(_) => "str".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Tuple(_) => "tuple".to_owned(),
            Self::Dict(_) => "dict".to_owned(),
            Self::Set(_) => "set".to_owned(),
            Self::Range(_) => "range".to_owned(),
            Self::Function(_) | Self::BoundMethod(_) => "function".to_owned(),
            Self::Builtin(_) | Self::Native(_) | Self::NativeMethod(_) => "builtin_function_or_method".to_owned(),
            Self::Class(_) => "type".to_owned(),
            Self::Instance(inst) => inst.class.name.to_string(),
            Self::Generator(_) => "generator".to_owned(),
            Self::Iterator(_) => "iterator".to_owned(),
            Self::Module(_) => "module".to_owned(),
            Self::File(_) => "file".to_owned(),
            Self::Super(_) => "super".to_owned(),
        }
    }

    /// Native truthiness. Instances consult `__bool__`/`__len__` one level up
    /// in the evaluator; everything else is decided here.
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::BigInt(b) => !b.is_zero(),
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !plock(l).is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::Dict(d) => !plock(d).is_empty(),
            Self::Set(s) => !plock(s).is_empty(),
            Self::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    /// Converts to i64 when the value is integer-like (bool counts).
    pub(crate) fn as_index(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            Self::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    /// Identity comparison (`is` operator).
    pub(crate) fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Arc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Arc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Arc::ptr_eq(a, b),
            (Self::Range(a), Self::Range(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Arc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Arc::ptr_eq(a, b),
            (Self::Generator(a), Self::Generator(b)) => Arc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

// ---- equality ---------------------------------------------------------------

/// Structural equality with source-language numeric semantics.
///
/// Cycles are broken with a visited set of pointer pairs: a revisited pair is
/// assumed equal, which matches the fixed-point behaviour required for
/// self-referential containers.
pub(crate) fn py_eq(a: &Value, b: &Value) -> bool {
    let mut visited = AHashSet::new();
    py_eq_inner(a, b, &mut visited)
}

fn container_ids(a: &Value, b: &Value) -> Option<(usize, usize)> {
    let id = |v: &Value| -> Option<usize> {
        Some(match v {
            Value::List(l) => Arc::as_ptr(l) as usize,
            Value::Dict(d) => Arc::as_ptr(d) as usize,
            Value::Set(s) => Arc::as_ptr(s) as usize,
            Value::Tuple(t) => t.as_ptr() as usize,
            _ => return None,
        })
    };
    Some((id(a)?, id(b)?))
}

fn py_eq_inner(a: &Value, b: &Value, visited: &mut AHashSet<(usize, usize)>) -> bool {
    if let Some(pair) = container_ids(a, b) {
        if pair.0 == pair.1 {
            return true;
        }
        if !visited.insert(pair) {
            return true;
        }
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let xs = plock(x).clone();
            let ys = plock(y).clone();
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(a, b)| py_eq_inner(a, b, visited))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| py_eq_inner(a, b, visited))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let xs = plock(x).clone();
            let ys = plock(y).clone();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, v)| ys.get(k).is_some_and(|w| py_eq_inner(v, w, visited)))
        }
        (Value::Set(x), Value::Set(y)) => {
            let xs = plock(x).clone();
            let ys = plock(y).clone();
            xs.len() == ys.len() && xs.iter().all(|k| ys.contains(k))
        }
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Arc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Arc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Generator(x), Value::Generator(y)) => Arc::ptr_eq(x, y),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => num_eq(&x, &y),
            _ => false,
        },
    }
}

// ---- ordering ---------------------------------------------------------------

/// Native ordering. `Ok(None)` means the kinds are not comparable; the caller
/// raises the `TypeError` (it knows the operator being applied).
pub(crate) fn py_cmp(a: &Value, b: &Value) -> RunResult<Option<Ordering>> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let xs = plock(x).clone();
            let ys = plock(y).clone();
            seq_cmp(&xs, &ys)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y),
        (Value::Set(x), Value::Set(y)) => {
            // partial order by subset relation
            let xs = plock(x).clone();
            let ys = plock(y).clone();
            let le = xs.iter().all(|k| ys.contains(k));
            let ge = ys.iter().all(|k| xs.contains(k));
            Ok(match (le, ge) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Less),
                (false, true) => Some(Ordering::Greater),
                (false, false) => None,
            })
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => Ok(num_cmp(&x, &y)),
            _ => Ok(None),
        },
    }
}

fn seq_cmp(xs: &[Value], ys: &[Value]) -> RunResult<Option<Ordering>> {
    for (a, b) in xs.iter().zip(ys.iter()) {
        if py_eq(a, b) {
            continue;
        }
        return py_cmp(a, b);
    }
    Ok(Some(xs.len().cmp(&ys.len())))
}

// ---- hashing ----------------------------------------------------------------

/// A hashable dict/set key: the value plus its precomputed hash.
#[derive(Debug, Clone)]
pub(crate) struct Key {
    pub value: Value,
    hash: u64,
}

impl Key {
    /// Wraps a value, failing with `TypeError: unhashable type` for mutable
    /// containers and instances.
    pub(crate) fn new(value: Value) -> RunResult<Self> {
        let hash = py_hash(&value)?;
        Ok(Self { value, hash })
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && py_eq(&self.value, &other.value)
    }
}

impl Eq for Key {}

/// Hashes a value per source-language rules; numeric values that compare equal
/// hash equal across int/float/bool.
pub(crate) fn py_hash(value: &Value) -> RunResult<u64> {
    match value {
        Value::None => Ok(0x23d4_19fc),
        Value::Bool(b) => Ok(u64::from(*b)),
        Value::Int(i) => Ok(hash_i64(*i)),
        Value::BigInt(b) => Ok(hash_bigint(b)),
        Value::Float(f) => Ok(hash_float(*f)),
        Value::Str(s) => {
            let mut hasher = ahash::AHasher::default();
            s.hash(&mut hasher);
            Ok(hasher.finish())
        }
        Value::Tuple(items) => {
            let mut acc: u64 = 0x345678;
            for item in items.iter() {
                let h = py_hash(item)?;
                acc = acc.wrapping_mul(1_000_003) ^ h;
            }
            Ok(acc ^ items.len() as u64)
        }
        Value::Range(r) => {
            let mut hasher = ahash::AHasher::default();
            (r.start, r.stop, r.step).hash(&mut hasher);
            Ok(hasher.finish())
        }
        Value::Class(c) => Ok(Arc::as_ptr(c) as u64),
        Value::Function(f) => Ok(Arc::as_ptr(f) as u64),
        Value::BoundMethod(m) => Ok(Arc::as_ptr(m) as u64),
        Value::Builtin(b) => {
            let mut hasher = ahash::AHasher::default();
            b.hash(&mut hasher);
            Ok(hasher.finish())
        }
        other => Err(RunError::raise(
            ExcType::TypeError,
            format!("unhashable type: '{}'", other.type_name()),
        )),
    }
}

fn hash_i64(i: i64) -> u64 {
    let negative = i < 0;
    let magnitude = i.unsigned_abs() % HASH_MODULUS;
    if negative { HASH_MODULUS - magnitude } else { magnitude }
}

fn hash_bigint(b: &BigInt) -> u64 {
    let modulus = BigInt::from(HASH_MODULUS);
    let rem = b.abs().mod_floor(&modulus).to_u64().unwrap_or(0);
    if b.is_negative() { HASH_MODULUS - rem } else { rem }
}

fn hash_float(f: f64) -> u64 {
    if f.is_nan() {
        return 0x7ff8_0000;
    }
    if f.is_infinite() {
        return if f > 0.0 { 314_159 } else { HASH_MODULUS - 314_159 };
    }
    if f.fract() == 0.0 && f.abs() < 9e18 {
        return hash_i64(f as i64);
    }
    // non-integral floats never equal ints, so bit-hashing keeps consistency
    let mut hasher = ahash::AHasher::default();
    f.to_bits().hash(&mut hasher);
    hasher.finish()
}

// ---- the numeric tower -------------------------------------------------------

/// Unified numeric view for arithmetic.
pub(crate) enum Num {
    Int(i64),
    Big(BigInt),
    Float(f64),
}

pub(crate) fn as_number(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::BigInt(b) => Some(Num::Big((**b).clone())),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn num_eq(a: &Num, b: &Num) -> bool {
    num_cmp(a, b) == Some(Ordering::Equal)
}

fn num_cmp(a: &Num, b: &Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(y)),
        (Num::Big(x), Num::Big(y)) => Some(x.cmp(y)),
        (Num::Int(x), Num::Big(y)) => Some(BigInt::from(*x).cmp(y)),
        (Num::Big(x), Num::Int(y)) => Some(x.cmp(&BigInt::from(*y))),
        (Num::Float(x), Num::Float(y)) => x.partial_cmp(y),
        (Num::Int(x), Num::Float(y)) => (*x as f64).partial_cmp(y),
        (Num::Float(x), Num::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Num::Big(x), Num::Float(y)) => x.to_f64().unwrap_or(f64::INFINITY * x.signum().to_f64().unwrap_or(1.0)).partial_cmp(y),
        (Num::Float(x), Num::Big(y)) => x.partial_cmp(&y.to_f64().unwrap_or(f64::INFINITY * y.signum().to_f64().unwrap_or(1.0))),
    }
}

fn num_to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Big(b) => b.to_f64().unwrap_or(f64::INFINITY),
        Num::Float(f) => *f,
    }
}

fn num_to_big(n: &Num) -> Option<BigInt> {
    match n {
        Num::Int(i) => Some(BigInt::from(*i)),
        Num::Big(b) => Some(b.clone()),
        Num::Float(_) => None,
    }
}

/// Estimated result size (bytes) above which operations pre-emptively reject
/// instead of allocating.
const LARGE_RESULT_THRESHOLD: usize = 100_000;

/// Applies a binary operator to two native values.
///
/// Instances are handled a level up via dunder dispatch; reaching here with an
/// unsupported pairing produces the canonical `TypeError`.
pub(crate) fn binary_op(op: BinOp, a: &Value, b: &Value) -> RunResult<Value> {
    // sequence/str concatenation and repetition
    match op {
        BinOp::Add => match (a, b) {
            (Value::Str(x), Value::Str(y)) => {
                let mut s = x.to_string();
                s.push_str(y);
                return Ok(Value::str(s));
            }
            (Value::List(x), Value::List(y)) => {
                let mut items = plock(x).clone();
                items.extend(plock(y).iter().cloned());
                return Ok(Value::list(items));
            }
            (Value::Tuple(x), Value::Tuple(y)) => {
                let mut items = x.to_vec();
                items.extend(y.iter().cloned());
                return Ok(Value::tuple(items));
            }
            _ => {}
        },
        BinOp::Mul => {
            if let Some(result) = repeat_sequence(a, b)? {
                return Ok(result);
            }
        }
        BinOp::Mod => {
            // printf-style string formatting is deliberately absent; strings
            // report the usual unsupported-operand error below
        }
        BinOp::BitOr | BinOp::BitAnd | BinOp::BitXor => {
            if let (Value::Set(x), Value::Set(y)) = (a, b) {
                let xs = plock(x).clone();
                let ys = plock(y).clone();
                let data: SetData = match op {
                    BinOp::BitOr => xs.union(&ys).cloned().collect(),
                    BinOp::BitAnd => xs.intersection(&ys).cloned().collect(),
                    _ => xs.symmetric_difference(&ys).cloned().collect(),
                };
                return Ok(Value::set(data));
            }
        }
        BinOp::Sub => {
            if let (Value::Set(x), Value::Set(y)) = (a, b) {
                let xs = plock(x).clone();
                let ys = plock(y).clone();
                let data: SetData = xs.difference(&ys).cloned().collect();
                return Ok(Value::set(data));
            }
        }
        _ => {}
    }

    let (Some(x), Some(y)) = (as_number(a), as_number(b)) else {
        return Err(RunError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )));
    };

    // bitwise and shifts: integers only
    if matches!(
        op,
        BinOp::BitOr | BinOp::BitAnd | BinOp::BitXor | BinOp::Shl | BinOp::Shr
    ) {
        let (Some(bx), Some(by)) = (num_to_big(&x), num_to_big(&y)) else {
            return Err(RunError::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                a.type_name(),
                b.type_name()
            )));
        };
        return int_bitop(op, bx, by);
    }

    let any_float = matches!(x, Num::Float(_)) || matches!(y, Num::Float(_));
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            if any_float {
                let (fx, fy) = (num_to_f64(&x), num_to_f64(&y));
                let r = match op {
                    BinOp::Add => fx + fy,
                    BinOp::Sub => fx - fy,
                    _ => fx * fy,
                };
                return Ok(Value::Float(r));
            }
            if let (Num::Int(ix), Num::Int(iy)) = (&x, &y) {
                let checked = match op {
                    BinOp::Add => ix.checked_add(*iy),
                    BinOp::Sub => ix.checked_sub(*iy),
                    _ => ix.checked_mul(*iy),
                };
                if let Some(r) = checked {
                    return Ok(Value::Int(r));
                }
            }
            let (bx, by) = (num_to_big(&x).unwrap_or_default(), num_to_big(&y).unwrap_or_default());
            let r = match op {
                BinOp::Add => bx + by,
                BinOp::Sub => bx - by,
                _ => bx * by,
            };
            Ok(Value::from_bigint(r))
        }
        BinOp::Div => {
            let fy = num_to_f64(&y);
            if fy == 0.0 && !any_float {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "division by zero"));
            }
            if any_float && fy == 0.0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "float division by zero"));
            }
            Ok(Value::Float(num_to_f64(&x) / fy))
        }
        BinOp::FloorDiv | BinOp::Mod => {
            if any_float {
                let (fx, fy) = (num_to_f64(&x), num_to_f64(&y));
                if fy == 0.0 {
                    return Err(RunError::raise(
                        ExcType::ZeroDivisionError,
                        if op == BinOp::FloorDiv {
                            "float floor division by zero"
                        } else {
                            "float modulo"
                        },
                    ));
                }
                let r = if op == BinOp::FloorDiv {
                    (fx / fy).floor()
                } else {
                    fx - fy * (fx / fy).floor()
                };
                return Ok(Value::Float(r));
            }
            let (bx, by) = (num_to_big(&x).unwrap_or_default(), num_to_big(&y).unwrap_or_default());
            if by.is_zero() {
                return Err(RunError::raise(
                    ExcType::ZeroDivisionError,
                    if op == BinOp::FloorDiv {
                        "integer division or modulo by zero"
                    } else {
                        "integer modulo by zero"
                    },
                ));
            }
            let r = if op == BinOp::FloorDiv {
                bx.div_floor(&by)
            } else {
                bx.mod_floor(&by)
            };
            Ok(Value::from_bigint(r))
        }
        BinOp::Pow => int_pow(&x, &y),
        _ => unreachable!("bit operators handled above"),
    }
}

fn int_bitop(op: BinOp, x: BigInt, y: BigInt) -> RunResult<Value> {
    match op {
        BinOp::BitOr => Ok(Value::from_bigint(x | y)),
        BinOp::BitAnd => Ok(Value::from_bigint(x & y)),
        BinOp::BitXor => Ok(Value::from_bigint(x ^ y)),
        BinOp::Shl | BinOp::Shr => {
            let Some(shift) = y.to_i64() else {
                return Err(RunError::raise(ExcType::OverflowError, "shift count too large"));
            };
            if shift < 0 {
                return Err(RunError::value_error("negative shift count"));
            }
            if op == BinOp::Shl && shift as usize > LARGE_RESULT_THRESHOLD * 8 {
                return Err(RunError::raise(ExcType::OverflowError, "shift count too large"));
            }
            let shift = shift as usize;
            Ok(Value::from_bigint(if op == BinOp::Shl { x << shift } else { x >> shift }))
        }
        _ => unreachable!(),
    }
}

/// Exponentiation. Integer bases with non-negative integer exponents stay
/// exact up to the large-result guard, past which the computation degrades to
/// float (raising `OverflowError` only on float overflow to infinity).
fn int_pow(x: &Num, y: &Num) -> RunResult<Value> {
    if let (Some(bx), Some(by)) = (num_to_big(x), num_to_big(y)) {
        if by.is_negative() {
            let base = bx.to_f64().unwrap_or(f64::INFINITY);
            if base == 0.0 {
                return Err(RunError::raise(
                    ExcType::ZeroDivisionError,
                    "0.0 cannot be raised to a negative power",
                ));
            }
            let exp = by.to_f64().unwrap_or(f64::NEG_INFINITY);
            return Ok(Value::Float(base.powf(exp)));
        }
        let estimated_bits = bx.bits().saturating_mul(by.to_u64().unwrap_or(u64::MAX));
        if estimated_bits > (LARGE_RESULT_THRESHOLD as u64) * 8 {
            let r = bx.to_f64().unwrap_or(f64::INFINITY).powf(by.to_f64().unwrap_or(f64::INFINITY));
            if r.is_infinite() {
                return Err(RunError::raise(
                    ExcType::OverflowError,
                    "result too large to represent",
                ));
            }
            return Ok(Value::Float(r));
        }
        let Some(exp) = by.to_u32() else {
            return Err(RunError::raise(ExcType::OverflowError, "exponent too large"));
        };
        return Ok(Value::from_bigint(bx.pow(exp)));
    }
    let (fx, fy) = (num_to_f64(x), num_to_f64(y));
    if fx == 0.0 && fy < 0.0 {
        return Err(RunError::raise(
            ExcType::ZeroDivisionError,
            "0.0 cannot be raised to a negative power",
        ));
    }
    Ok(Value::Float(fx.powf(fy)))
}

/// `seq * n` / `n * seq` repetition; negative counts produce the empty value.
fn repeat_sequence(a: &Value, b: &Value) -> RunResult<Option<Value>> {
    let (seq, count) = match (a, b) {
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), _) if b.as_index().is_some() => {
            (a, b.as_index().unwrap_or(0))
        }
        (_, Value::Str(_) | Value::List(_) | Value::Tuple(_)) if a.as_index().is_some() => {
            (b, a.as_index().unwrap_or(0))
        }
        _ => return Ok(None),
    };
    let count = count.max(0) as usize;
    match seq {
        Value::Str(s) => {
            if s.len().saturating_mul(count) > LARGE_RESULT_THRESHOLD * 10 {
                return Err(RunError::raise(ExcType::OverflowError, "repeated string is too large"));
            }
            Ok(Some(Value::str(s.repeat(count))))
        }
        Value::List(l) => {
            let items = plock(l).clone();
            if items.len().saturating_mul(count) > LARGE_RESULT_THRESHOLD * 10 {
                return Err(RunError::raise(ExcType::OverflowError, "repeated list is too large"));
            }
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Some(Value::list(out)))
        }
        Value::Tuple(t) => {
            let mut out = Vec::with_capacity(t.len() * count);
            for _ in 0..count {
                out.extend(t.iter().cloned());
            }
            Ok(Some(Value::tuple(out)))
        }
        _ => Ok(None),
    }
}

// ---- primitive repr helpers --------------------------------------------------

/// Formats a float the way `repr()` does (`1.0`, `inf`, `1e+16`).
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_owned() } else { "-inf".to_owned() };
    }
    let mut buffer = ryu::Buffer::new();
    let printed = buffer.format(f);
    match printed.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("+", exp),
            };
            let digits = if digits.len() < 2 {
                format!("0{digits}")
            } else {
                digits.to_owned()
            };
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            format!("{mantissa}e{sign}{digits}")
        }
        None => printed.to_owned(),
    }
}

/// Quotes and escapes a string the way `repr()` does: single quotes unless the
/// content contains one (and no double quote).
pub(crate) fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Renders an int value (either representation).
pub(crate) fn int_repr(value: &Value) -> Option<String> {
    match value {
        Value::Int(i) => Some(i.to_string()),
        Value::BigInt(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_bool_equality() {
        assert!(py_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(!py_eq(&Value::Int(1), &Value::Int(2)));
        assert!(py_eq(
            &Value::BigInt(Arc::new(BigInt::from(5))),
            &Value::Int(5)
        ));
    }

    #[test]
    fn hash_consistency_across_numeric_kinds() {
        assert_eq!(py_hash(&Value::Int(1)).unwrap(), py_hash(&Value::Float(1.0)).unwrap());
        assert_eq!(py_hash(&Value::Bool(true)).unwrap(), py_hash(&Value::Int(1)).unwrap());
        assert_eq!(
            py_hash(&Value::Int(7)).unwrap(),
            py_hash(&Value::BigInt(Arc::new(BigInt::from(7)))).unwrap()
        );
    }

    #[test]
    fn unhashable_types() {
        assert!(py_hash(&Value::list(vec![])).is_err());
        assert!(py_hash(&Value::dict(DictData::default())).is_err());
        assert!(py_hash(&Value::set(SetData::default())).is_err());
    }

    #[test]
    fn floor_division_and_modulo_identity() {
        for a in [-7i64, -3, -1, 0, 1, 3, 7, 100] {
            for b in [-4i64, -3, -1, 1, 3, 4] {
                let q = binary_op(BinOp::FloorDiv, &Value::Int(a), &Value::Int(b)).unwrap();
                let r = binary_op(BinOp::Mod, &Value::Int(a), &Value::Int(b)).unwrap();
                let (Value::Int(q), Value::Int(r)) = (q, r) else { panic!() };
                assert_eq!(q * b + r, a, "identity failed for {a} // {b}");
                assert!(r == 0 || (r > 0) == (b > 0), "sign of {a} % {b} = {r}");
            }
        }
    }

    #[test]
    fn int_overflow_promotes() {
        let r = binary_op(BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).unwrap();
        assert!(matches!(r, Value::BigInt(_)));
    }

    #[test]
    fn division_produces_float() {
        let r = binary_op(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert!(matches!(r, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn zero_division() {
        assert!(binary_op(BinOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(binary_op(BinOp::Mod, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn string_repetition() {
        let r = binary_op(BinOp::Mul, &Value::str("ab"), &Value::Int(3)).unwrap();
        assert!(matches!(r, Value::Str(s) if &*s == "ababab"));
        let r = binary_op(BinOp::Mul, &Value::str("ab"), &Value::Int(-2)).unwrap();
        assert!(matches!(r, Value::Str(s) if s.is_empty()));
    }

    #[test]
    fn none_plus_anything_is_type_error() {
        let err = binary_op(BinOp::Add, &Value::None, &Value::Int(1)).unwrap_err();
        let RunError::Raise(raised) = err else { panic!() };
        assert_eq!(raised.type_name, "TypeError");
        assert!(raised.message.contains("NoneType"));
    }

    #[test]
    fn range_ops() {
        let r = RangeValue {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert_eq!(r.len(), 4);
        assert!(r.contains(9));
        assert!(!r.contains(10));
        assert!(!r.contains(2));
        let down = RangeValue {
            start: 10,
            stop: 0,
            step: -2,
        };
        assert_eq!(down.len(), 5);
        assert!(down.contains(10));
        assert!(down.contains(2));
        assert!(!down.contains(0));
    }

    #[test]
    fn float_repr_forms() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(3.5), "3.5");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(f64::NAN), "nan");
    }

    #[test]
    fn str_repr_quoting() {
        assert_eq!(str_repr("ab"), "'ab'");
        assert_eq!(str_repr("a'b"), "\"a'b\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
    }

    #[test]
    fn cyclic_list_equality_terminates() {
        let a = Value::list(vec![Value::Int(1)]);
        if let Value::List(inner) = &a {
            let clone = a.clone();
            plock(inner).push(clone);
        }
        let b = Value::list(vec![Value::Int(1)]);
        if let Value::List(inner) = &b {
            let clone = b.clone();
            plock(inner).push(clone);
        }
        assert!(py_eq(&a, &b));
    }
}
