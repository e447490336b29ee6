//! A small MLIR-like SSA IR. Functions own a flat value table and a body
//! block; operations may carry nested single-block regions (used by `fir.if`).
//! Operations are identified by their textual name (`fir.store`,
//! `arm_sve.sdot`, ...) which is what conversion targets and rewrite patterns
//! key on.

use std::{collections::BTreeMap, rc::Rc};

use strum::Display;

use crate::{
    backend::arm_sve::{SveIntrinsic, SveOp},
    index::{IndexVec, simple_index},
    intern::InternedSymbol,
    middle::ty::Type,
};

pub mod builder;
pub mod pretty_print;

simple_index! {
    /// Identifies an SSA value within a function
    pub struct ValueId;
}

/// A source position attached to every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const UNKNOWN: Self = Self { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            write!(f, "loc(unknown)")
        } else {
            write!(f, "loc({}:{})", self.line, self.column)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub origin: ValueOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Argument(usize),
    OperationResult,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: InternedSymbol,
    pub inputs: Vec<Type>,
    pub results: Vec<Type>,
    pub arguments: Vec<ValueId>,
    pub values: IndexVec<ValueId, Value>,
    pub body: Block,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attributes: BTreeMap<&'static str, Attribute>,
    pub regions: Vec<Block>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Int(i64),
    Bool(bool),
    /// A zero (or all-false) splat of the result type
    Zero,
    Symbol(InternedSymbol),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CmpIPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /* arith */
    Constant(Attribute),
    CmpI(CmpIPredicate),
    Select,
    DivSI,
    IndexCast,

    /* fir */
    /// Stack allocation of `in_type`, result is a `!fir.ref<in_type>`
    Alloca { in_type: Type },
    Load,
    /// operands: value, address
    Store,
    Convert,
    /// operands: base address, field/element offsets
    Coordinate,
    AddressOf { symbol: InternedSymbol },
    IsPresent,
    /// The descriptor of an absent optional (a null descriptor handle)
    Absent,
    ZeroBits,
    BoxAddr,
    /// operands: box, dimension. results: lower bound, extent, stride
    BoxDims,
    BoxEleSize,
    /// operands: address, optional shape, length parameters
    Embox,
    /// operands: box, optional shift
    Rebox,
    Shape,
    ShapeShift,
    Shift,
    /// operands: address, length
    EmboxChar,
    /// results: address, length
    UnboxChar,
    /// operands: condition. regions: then, else
    If,
    Call { callee: InternedSymbol },
    Return,

    /* hlfir / omp */
    Declare { uniq_name: InternedSymbol, host_assoc: bool },
    ThreadPrivate,

    /* vector */
    VectorExtract { position: Rc<[i64]> },
    /// operands: value, destination
    VectorInsert { position: Rc<[i64]> },
    VectorCreateMask,
    VectorStep,
    VectorBroadcast,

    /* llvm */
    LlvmZero,

    /* arm_sve */
    Sve(SveOp),
    SveIntr(SveIntrinsic),
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Constant(_) => "arith.constant",
            OpKind::CmpI(_) => "arith.cmpi",
            OpKind::Select => "arith.select",
            OpKind::DivSI => "arith.divsi",
            OpKind::IndexCast => "arith.index_cast",
            OpKind::Alloca { .. } => "fir.alloca",
            OpKind::Load => "fir.load",
            OpKind::Store => "fir.store",
            OpKind::Convert => "fir.convert",
            OpKind::Coordinate => "fir.coordinate_of",
            OpKind::AddressOf { .. } => "fir.address_of",
            OpKind::IsPresent => "fir.is_present",
            OpKind::Absent => "fir.absent",
            OpKind::ZeroBits => "fir.zero_bits",
            OpKind::BoxAddr => "fir.box_addr",
            OpKind::BoxDims => "fir.box_dims",
            OpKind::BoxEleSize => "fir.box_elesize",
            OpKind::Embox => "fir.embox",
            OpKind::Rebox => "fir.rebox",
            OpKind::Shape => "fir.shape",
            OpKind::ShapeShift => "fir.shape_shift",
            OpKind::Shift => "fir.shift",
            OpKind::EmboxChar => "fir.emboxchar",
            OpKind::UnboxChar => "fir.unboxchar",
            OpKind::If => "fir.if",
            OpKind::Call { .. } => "fir.call",
            OpKind::Return => "func.return",
            OpKind::Declare { .. } => "hlfir.declare",
            OpKind::ThreadPrivate => "omp.threadprivate",
            OpKind::VectorExtract { .. } => "vector.extract",
            OpKind::VectorInsert { .. } => "vector.insert",
            OpKind::VectorCreateMask => "vector.create_mask",
            OpKind::VectorStep => "vector.step",
            OpKind::VectorBroadcast => "vector.broadcast",
            OpKind::LlvmZero => "llvm.mlir.zero",
            OpKind::Sve(op) => (*op).into(),
            OpKind::SveIntr(intrinsic) => (*intrinsic).into(),
        }
    }
}

impl Operation {
    pub fn new(kind: OpKind, location: Location) -> Self {
        Self {
            kind,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: Vec::new(),
            location,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The single result of this operation
    pub fn result(&self) -> ValueId {
        assert_eq!(
            self.results.len(),
            1,
            "'{}' does not have exactly one result",
            self.name()
        );
        self.results[0]
    }

    /// Visits this operation and every operation nested in its regions
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Operation)) {
        f(self);
        for region in &self.regions {
            region.walk(f);
        }
    }
}

impl Block {
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Operation)) {
        for operation in &self.operations {
            operation.walk(f);
        }
    }
}

impl Function {
    /// Creates an empty function with one argument value per input type
    pub fn new(
        name: InternedSymbol,
        inputs: impl IntoIterator<Item = Type>,
        results: impl IntoIterator<Item = Type>,
    ) -> Self {
        let inputs = inputs.into_iter().collect::<Vec<_>>();
        let mut values = IndexVec::new();

        let arguments = inputs
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                values.push(Value {
                    ty: ty.clone(),
                    origin: ValueOrigin::Argument(i),
                })
            })
            .collect();

        Self {
            name,
            inputs,
            results: results.into_iter().collect(),
            arguments,
            values,
            body: Block::default(),
        }
    }

    pub fn function_type(&self) -> Type {
        Type::function(self.inputs.iter().cloned(), self.results.iter().cloned())
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.values.push(Value {
            ty,
            origin: ValueOrigin::OperationResult,
        })
    }

    pub fn value_type(&self, value: ValueId) -> &Type {
        &self.values[value].ty
    }

    pub fn walk<'a>(&'a self, mut f: impl FnMut(&'a Operation)) {
        self.body.walk(&mut f);
    }

    /// Every operation (including nested ones) with the given name, in
    /// program order
    pub fn operations_named(&self, name: &str) -> Vec<&Operation> {
        let mut found = Vec::new();
        self.walk(|op| {
            if op.name() == name {
                found.push(op);
            }
        });
        found
    }

    /// Finds the operation defining `value`, if it is not an argument
    pub fn defining_operation(&self, value: ValueId) -> Option<&Operation> {
        let mut found = None;
        self.walk(|op| {
            if found.is_none() && op.results.contains(&value) {
                found = Some(op);
            }
        });
        found
    }
}
