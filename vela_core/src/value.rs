//! NaN-boxed runtime values and the atomic cells that hold them.
//!
//! A [`Value`] is a `Copy` 64-bit word. Doubles are stored as their own bit
//! patterns; everything else lives in the quiet-NaN space under a 3-bit tag
//! with a 47-bit payload. Heap-like values (strings, modules, types,
//! functions) are represented by interned or registered ids, so the whole
//! value fits in the word and global slots can be read and written with
//! plain atomics.
//!
//! Layout of a boxed word:
//!
//! ```text
//! 63           50 49  47 46                     0
//! ┌──────────────┬──────┬───────────────────────┐
//! │ 0x7ffc (qNaN)│ tag  │ payload (47 bits)     │
//! └──────────────┴──────┴───────────────────────┘
//! ```

use crate::intern::Symbol;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;

// =============================================================================
// Encoding
// =============================================================================

/// All boxed values carry this quiet-NaN prefix. Real doubles (including the
/// canonical NaN) never have bit 50 set together with an all-ones exponent.
const QNAN: u64 = 0x7ffc_0000_0000_0000;
/// Canonical NaN bit pattern stored for any `f64::NAN` input.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

const TAG_SHIFT: u32 = 47;
const TAG_MASK: u64 = 0x7 << TAG_SHIFT;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;

/// Tag 0 is reserved so that `QNAN` itself is never a live value; the atomic
/// cells use it as their vacant sentinel.
const TAG_INT: u64 = 1;
const TAG_BOOL: u64 = 2;
const TAG_NOTHING: u64 = 3;
const TAG_STR: u64 = 4;
const TAG_MODULE: u64 = 5;
const TAG_TYPE: u64 = 6;
const TAG_FUNC: u64 = 7;

/// Smallest/largest integers representable in the 47-bit payload.
pub const MIN_INT: i64 = -(1 << 46);
pub const MAX_INT: i64 = (1 << 46) - 1;

#[inline]
const fn boxed(tag: u64, payload: u64) -> u64 {
    QNAN | (tag << TAG_SHIFT) | (payload & PAYLOAD_MASK)
}

// =============================================================================
// Handles
// =============================================================================

/// Stable handle to a module in the runtime's module registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Type tag of a value. There is no subtype lattice; conformance of a value
/// to a declared global type is tag equality, with [`TypeId::ANY`] accepting
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// The universal type; every value conforms to it.
    pub const ANY: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const FLOAT: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    pub const STR: TypeId = TypeId(5);
    pub const NOTHING: TypeId = TypeId(6);
    pub const MODULE: TypeId = TypeId(7);
    pub const TYPE: TypeId = TypeId(8);
    pub const FUNC: TypeId = TypeId(9);

    /// First id handed out for user-defined types.
    pub const FIRST_USER_TYPE: u32 = 256;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER_TYPE
    }

    /// Printable name of the type tag.
    pub fn name(self) -> String {
        match self {
            TypeId::ANY => "Any".to_owned(),
            TypeId::INT => "Int".to_owned(),
            TypeId::FLOAT => "Float".to_owned(),
            TypeId::BOOL => "Bool".to_owned(),
            TypeId::STR => "Str".to_owned(),
            TypeId::NOTHING => "Nothing".to_owned(),
            TypeId::MODULE => "Module".to_owned(),
            TypeId::TYPE => "Type".to_owned(),
            TypeId::FUNC => "Func".to_owned(),
            other => format!("Type#{}", other.0),
        }
    }
}

/// Handle to an entry in the process-global function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// What the function registry remembers about a function value: enough to
/// name it in diagnostics, nothing more.
#[derive(Debug, Clone, Copy)]
pub struct FuncInfo {
    pub name: Symbol,
    /// Name of the defining module, if known. `None` suppresses the module
    /// qualifier when the function is shown.
    pub module_name: Option<Symbol>,
}

static FUNCS: OnceLock<RwLock<Vec<FuncInfo>>> = OnceLock::new();

fn funcs() -> &'static RwLock<Vec<FuncInfo>> {
    FUNCS.get_or_init(|| RwLock::new(Vec::new()))
}

/// Register a function value, returning its stable handle.
pub fn register_func(name: Symbol, module_name: Option<Symbol>) -> FuncId {
    let mut table = funcs().write();
    table.push(FuncInfo { name, module_name });
    FuncId((table.len() - 1) as u32)
}

/// Look up a registered function's info.
pub fn func_info(f: FuncId) -> FuncInfo {
    funcs().read()[f.0 as usize]
}

// =============================================================================
// Value
// =============================================================================

/// Discriminant of a [`Value`], the single "value inspection" capability the
/// binding subsystem needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Nothing,
    Str,
    Module,
    Type,
    Func,
}

/// A NaN-boxed runtime value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Value(u64);

impl Value {
    /// Box a double. NaNs are canonicalized so they never collide with the
    /// boxed-value space.
    #[inline]
    pub fn float(f: f64) -> Value {
        if f.is_nan() {
            Value(CANONICAL_NAN)
        } else {
            Value(f.to_bits())
        }
    }

    /// Box an integer. Returns `None` when the value does not fit the 47-bit
    /// payload.
    #[inline]
    pub fn int(i: i64) -> Option<Value> {
        if (MIN_INT..=MAX_INT).contains(&i) {
            Some(Value(boxed(TAG_INT, i as u64)))
        } else {
            None
        }
    }

    #[inline]
    pub fn bool(b: bool) -> Value {
        Value(boxed(TAG_BOOL, b as u64))
    }

    /// The unit value `nothing`.
    #[inline]
    pub const fn nothing() -> Value {
        Value(boxed(TAG_NOTHING, 0))
    }

    #[inline]
    pub fn string(s: Symbol) -> Value {
        Value(boxed(TAG_STR, s.raw() as u64))
    }

    #[inline]
    pub fn module(m: ModuleId) -> Value {
        Value(boxed(TAG_MODULE, m.raw() as u64))
    }

    /// A first-class type tag.
    #[inline]
    pub fn type_obj(t: TypeId) -> Value {
        Value(boxed(TAG_TYPE, t.raw() as u64))
    }

    #[inline]
    pub fn func(f: FuncId) -> Value {
        Value(boxed(TAG_FUNC, f.raw() as u64))
    }

    #[inline]
    fn is_boxed(self) -> bool {
        (self.0 & QNAN) == QNAN
    }

    #[inline]
    fn tag(self) -> u64 {
        (self.0 & TAG_MASK) >> TAG_SHIFT
    }

    #[inline]
    fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    pub fn kind(self) -> ValueKind {
        if !self.is_boxed() {
            return ValueKind::Float;
        }
        match self.tag() {
            TAG_INT => ValueKind::Int,
            TAG_BOOL => ValueKind::Bool,
            TAG_NOTHING => ValueKind::Nothing,
            TAG_STR => ValueKind::Str,
            TAG_MODULE => ValueKind::Module,
            TAG_TYPE => ValueKind::Type,
            TAG_FUNC => ValueKind::Func,
            _ => unreachable!("reserved value tag"),
        }
    }

    /// `typeof` — the type tag of this value.
    pub fn type_id(self) -> TypeId {
        match self.kind() {
            ValueKind::Float => TypeId::FLOAT,
            ValueKind::Int => TypeId::INT,
            ValueKind::Bool => TypeId::BOOL,
            ValueKind::Nothing => TypeId::NOTHING,
            ValueKind::Str => TypeId::STR,
            ValueKind::Module => TypeId::MODULE,
            ValueKind::Type => TypeId::TYPE,
            ValueKind::Func => TypeId::FUNC,
        }
    }

    #[inline]
    pub fn as_float(self) -> Option<f64> {
        (!self.is_boxed()).then(|| f64::from_bits(self.0))
    }

    #[inline]
    pub fn as_int(self) -> Option<i64> {
        (self.is_boxed() && self.tag() == TAG_INT)
            .then(|| ((self.payload() << (64 - TAG_SHIFT)) as i64) >> (64 - TAG_SHIFT))
    }

    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        (self.is_boxed() && self.tag() == TAG_BOOL).then(|| self.payload() != 0)
    }

    #[inline]
    pub fn as_str(self) -> Option<Symbol> {
        (self.is_boxed() && self.tag() == TAG_STR)
            .then(|| crate::intern::intern_raw(self.payload() as u32))
    }

    #[inline]
    pub fn as_module(self) -> Option<ModuleId> {
        (self.is_boxed() && self.tag() == TAG_MODULE)
            .then(|| ModuleId::from_raw(self.payload() as u32))
    }

    #[inline]
    pub fn as_type(self) -> Option<TypeId> {
        (self.is_boxed() && self.tag() == TAG_TYPE)
            .then(|| TypeId::from_raw(self.payload() as u32))
    }

    #[inline]
    pub fn as_func(self) -> Option<FuncId> {
        (self.is_boxed() && self.tag() == TAG_FUNC).then(|| FuncId(self.payload() as u32))
    }

    #[inline]
    pub fn is_nothing(self) -> bool {
        self.is_boxed() && self.tag() == TAG_NOTHING
    }

    #[inline]
    pub fn is_type(self) -> bool {
        self.is_boxed() && self.tag() == TAG_TYPE
    }

    #[inline]
    pub fn is_module(self) -> bool {
        self.is_boxed() && self.tag() == TAG_MODULE
    }

    #[inline]
    pub fn is_func(self) -> bool {
        self.is_boxed() && self.tag() == TAG_FUNC
    }

    /// Identity equality: bitwise for numbers, handle identity for the rest.
    #[inline]
    pub fn egal(self, other: Value) -> bool {
        self.0 == other.0
    }

    #[inline]
    pub(crate) const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_bits(bits: u64) -> Value {
        Value(bits)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ValueKind::Float => write!(f, "Float({})", f64::from_bits(self.0)),
            ValueKind::Int => write!(f, "Int({})", self.as_int().unwrap()),
            ValueKind::Bool => write!(f, "Bool({})", self.payload() != 0),
            ValueKind::Nothing => write!(f, "Nothing"),
            ValueKind::Str => write!(f, "Str({:?})", self.as_str().unwrap().text()),
            ValueKind::Module => write!(f, "Module(#{})", self.payload()),
            ValueKind::Type => write!(f, "Type({})", TypeId::from_raw(self.payload() as u32).name()),
            ValueKind::Func => write!(f, "Func(#{})", self.payload()),
        }
    }
}

// =============================================================================
// Atomic cells
// =============================================================================

/// Cell-internal sentinel meaning "no value". Tag 0 is reserved, so this bit
/// pattern is never produced by any `Value` constructor.
const VACANT: u64 = QNAN;

/// Lock-free slot holding an optional [`Value`].
///
/// Readers never take a lock; first initialization is a CAS so concurrent
/// initializers agree on a single winner.
#[derive(Debug)]
pub struct ValueCell(AtomicU64);

impl ValueCell {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(VACANT))
    }

    #[inline]
    pub fn load(&self) -> Option<Value> {
        let bits = self.0.load(Ordering::Acquire);
        (bits != VACANT).then(|| Value::from_bits(bits))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != VACANT
    }

    /// Publish `v` unconditionally.
    #[inline]
    pub fn store_release(&self, v: Value) {
        self.0.store(v.to_bits(), Ordering::Release);
    }

    /// CAS the cell from vacant to `v`. Returns whether this call won.
    #[inline]
    pub fn init(&self, v: Value) -> bool {
        self.0
            .compare_exchange(VACANT, v.to_bits(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for ValueCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot holding an optional declared type constraint.
#[derive(Debug)]
pub struct TypeCell(AtomicU32);

/// Raw sentinel for "no constraint declared yet".
const TYPE_UNSET: u32 = 0;

impl TypeCell {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU32::new(TYPE_UNSET))
    }

    #[inline]
    pub fn load(&self) -> Option<TypeId> {
        let raw = self.0.load(Ordering::Acquire);
        (raw != TYPE_UNSET).then(|| TypeId::from_raw(raw))
    }

    /// CAS the constraint from unset to [`TypeId::ANY`]. Returns the
    /// previously declared constraint when one was already in place.
    #[inline]
    pub fn init_any(&self) -> Option<TypeId> {
        match self.0.compare_exchange(
            TYPE_UNSET,
            TypeId::ANY.raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => None,
            Err(prev) => Some(TypeId::from_raw(prev)),
        }
    }

    /// CAS the constraint from unset to `t`. On failure returns the
    /// constraint already in place.
    #[inline]
    pub fn init(&self, t: TypeId) -> Result<(), TypeId> {
        self.0
            .compare_exchange(TYPE_UNSET, t.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(TypeId::from_raw)
    }
}

impl Default for TypeCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
