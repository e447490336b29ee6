use std::rc::Rc;

use colored::Colorize;
use itertools::Itertools;
use strum::Display;

use crate::intern::InternedSymbol;

/// Thin pointer to an immutable type kind. Equality is structural, so two
/// independently built `!fir.ref<i32>` compare equal. [`Type::ptr_eq`] can be
/// used to check that two handles are the very same allocation (for example
/// to observe memoization).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>);

/// Extent of one array dimension, `None` when only known at runtime
pub type Extent = Option<i64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// none
    None,
    /// i1, i8, i32, ...
    Integer(u32),
    /// index
    Index,
    /// f32, f64
    Float(FloatKind),
    /// !fir.logical<4>
    Logical(u8),
    /// !fir.char<1,10>, !fir.char<1,?>
    Character { kind: u8, length: Option<i64> },
    /// !fir.type<name>
    ///
    /// A derived type, identified by name only
    Record(InternedSymbol),
    /// !fir.array<10x?xf32>, !fir.array<*:f32>
    ///
    /// An in-memory array. A missing shape means assumed-rank.
    Sequence {
        shape: Option<Rc<[Extent]>>,
        element: Type,
    },
    /// !fir.ref<T>
    Reference(Type),
    /// !fir.ptr<T>
    Pointer(Type),
    /// !fir.heap<T>
    Heap(Type),
    /// !fir.llvm_ptr<T>
    ///
    /// Raw pointer used where a reference to a reference is not allowed
    LlvmPointer(Type),
    /// !fir.box<T>
    ///
    /// A descriptor carrying a base address, bounds and element size
    Box(Type),
    /// !fir.class<T>
    ///
    /// A descriptor that also carries a dynamic type tag
    Class(Type),
    /// !fir.boxchar<1>
    ///
    /// An (address, length) pair for character scalars
    BoxChar(u8),
    /// !fir.boxproc<() -> ()>
    BoxProc(Type),
    /// (i32, f32) -> ()
    Function {
        inputs: Rc<[Type]>,
        results: Rc<[Type]>,
    },
    /// tuple<!fir.ref<i32>, !fir.box<!fir.array<?xf32>>>
    Tuple(Rc<[Type]>),
    /// !fir.shape<2>
    Shape(usize),
    /// !fir.shapeshift<2>
    ShapeShift(usize),
    /// !fir.shift<2>
    Shift(usize),
    /// vector<2x[4]xi1>
    Vector(VectorType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FloatKind {
    F32,
    F64,
}

/// A (possibly scalable) n-D vector type. Scalable dimensions hold their base
/// size, the runtime size is a hardware defined multiple of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub shape: Rc<[i64]>,
    pub scalable_dims: Rc<[bool]>,
    pub element: Type,
}

impl VectorType {
    pub fn new(shape: &[i64], scalable_dims: &[bool], element: Type) -> Self {
        assert_eq!(
            shape.len(),
            scalable_dims.len(),
            "each vector dimension needs a scalability flag"
        );

        Self {
            shape: shape.into(),
            scalable_dims: scalable_dims.into(),
            element,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dim_size(&self, dim: usize) -> i64 {
        self.shape[dim]
    }

    /// True if any dimension is scalable
    pub fn is_scalable(&self) -> bool {
        self.scalable_dims.iter().any(|s| *s)
    }

    /// Returns a copy of this type with dimension `dim` resized
    pub fn with_dim_size(&self, dim: usize, size: i64) -> Self {
        let mut shape = self.shape.to_vec();
        shape[dim] = size;

        Self {
            shape: shape.into(),
            scalable_dims: self.scalable_dims.clone(),
            element: self.element.clone(),
        }
    }

    /// The type of the sub-vector addressed by a position of `count` leading
    /// indices
    pub fn drop_leading_dims(&self, count: usize) -> Self {
        Self {
            shape: self.shape[count..].into(),
            scalable_dims: self.scalable_dims[count..].into(),
            element: self.element.clone(),
        }
    }

    pub fn with_element(&self, element: Type) -> Self {
        Self {
            shape: self.shape.clone(),
            scalable_dims: self.scalable_dims.clone(),
            element,
        }
    }
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn ptr_eq(&self, other: &Type) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    pub fn none() -> Self {
        Self::new(TypeKind::None)
    }

    pub fn integer(width: u32) -> Self {
        Self::new(TypeKind::Integer(width))
    }

    pub fn i1() -> Self {
        Self::integer(1)
    }

    pub fn i32() -> Self {
        Self::integer(32)
    }

    pub fn i64() -> Self {
        Self::integer(64)
    }

    pub fn index() -> Self {
        Self::new(TypeKind::Index)
    }

    pub fn float(kind: FloatKind) -> Self {
        Self::new(TypeKind::Float(kind))
    }

    pub fn logical(kind: u8) -> Self {
        Self::new(TypeKind::Logical(kind))
    }

    pub fn character(kind: u8, length: Option<i64>) -> Self {
        Self::new(TypeKind::Character { kind, length })
    }

    pub fn record(name: InternedSymbol) -> Self {
        Self::new(TypeKind::Record(name))
    }

    pub fn sequence(shape: &[Extent], element: Type) -> Self {
        Self::new(TypeKind::Sequence {
            shape: Some(shape.into()),
            element,
        })
    }

    pub fn assumed_rank_sequence(element: Type) -> Self {
        Self::new(TypeKind::Sequence {
            shape: None,
            element,
        })
    }

    pub fn reference(ty: Type) -> Self {
        Self::new(TypeKind::Reference(ty))
    }

    pub fn pointer(ty: Type) -> Self {
        Self::new(TypeKind::Pointer(ty))
    }

    pub fn heap(ty: Type) -> Self {
        Self::new(TypeKind::Heap(ty))
    }

    pub fn llvm_pointer(ty: Type) -> Self {
        Self::new(TypeKind::LlvmPointer(ty))
    }

    pub fn boxed(ty: Type) -> Self {
        Self::new(TypeKind::Box(ty))
    }

    pub fn class(ty: Type) -> Self {
        Self::new(TypeKind::Class(ty))
    }

    pub fn box_char(kind: u8) -> Self {
        Self::new(TypeKind::BoxChar(kind))
    }

    pub fn box_proc(function_type: Type) -> Self {
        Self::new(TypeKind::BoxProc(function_type))
    }

    pub fn function(
        inputs: impl IntoIterator<Item = Type>,
        results: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self::new(TypeKind::Function {
            inputs: inputs.into_iter().collect(),
            results: results.into_iter().collect(),
        })
    }

    pub fn tuple(members: impl IntoIterator<Item = Type>) -> Self {
        Self::new(TypeKind::Tuple(members.into_iter().collect()))
    }

    pub fn shape(rank: usize) -> Self {
        Self::new(TypeKind::Shape(rank))
    }

    pub fn shape_shift(rank: usize) -> Self {
        Self::new(TypeKind::ShapeShift(rank))
    }

    pub fn shift(rank: usize) -> Self {
        Self::new(TypeKind::Shift(rank))
    }

    pub fn vector(vector: VectorType) -> Self {
        Self::new(TypeKind::Vector(vector))
    }

    /// Returns the pointee type if this is any kind of address type
    pub fn dyn_cast_ptr_ele_ty(&self) -> Option<Type> {
        match self.kind() {
            TypeKind::Reference(ty)
            | TypeKind::Pointer(ty)
            | TypeKind::Heap(ty)
            | TypeKind::LlvmPointer(ty) => Some(ty.clone()),
            _ => None,
        }
    }

    /// `!fir.ref`, `!fir.ptr`, `!fir.heap` or `!fir.llvm_ptr`
    pub fn is_ref_like(&self) -> bool {
        self.dyn_cast_ptr_ele_ty().is_some()
    }

    /// Exactly `!fir.ref`
    pub fn is_reference(&self) -> bool {
        matches!(self.kind(), TypeKind::Reference(_))
    }

    pub fn is_box_like(&self) -> bool {
        matches!(self.kind(), TypeKind::Box(_) | TypeKind::Class(_))
    }

    pub fn is_integer_like(&self) -> bool {
        matches!(self.kind(), TypeKind::Integer(_) | TypeKind::Index)
    }

    /// The type wrapped by a `!fir.box` or `!fir.class`
    pub fn box_element_type(&self) -> Option<Type> {
        match self.kind() {
            TypeKind::Box(ty) | TypeKind::Class(ty) => Some(ty.clone()),
            _ => None,
        }
    }

    /// Strips `!fir.ref`/`!fir.ptr`/`!fir.heap` and boxes, then sequences, to
    /// reach the scalar element type.
    pub fn unwrap_element_type(&self) -> Type {
        match self.kind() {
            TypeKind::Reference(ty)
            | TypeKind::Pointer(ty)
            | TypeKind::Heap(ty)
            | TypeKind::LlvmPointer(ty)
            | TypeKind::Box(ty)
            | TypeKind::Class(ty) => ty.unwrap_element_type(),
            TypeKind::Sequence { element, .. } => element.unwrap_element_type(),
            _ => self.clone(),
        }
    }

    /// Rank of the array reachable through addresses and boxes, 0 for scalars
    /// and `None` for assumed-rank arrays
    pub fn rank(&self) -> Option<usize> {
        match self.kind() {
            TypeKind::Reference(ty)
            | TypeKind::Pointer(ty)
            | TypeKind::Heap(ty)
            | TypeKind::LlvmPointer(ty)
            | TypeKind::Box(ty)
            | TypeKind::Class(ty) => ty.rank(),
            TypeKind::Sequence { shape, .. } => shape.as_ref().map(|s| s.len()),
            _ => Some(0),
        }
    }

    pub fn as_vector(&self) -> Option<&VectorType> {
        match self.kind() {
            TypeKind::Vector(vector) => Some(vector),
            _ => None,
        }
    }

    pub fn tuple_members(&self) -> Option<&[Type]> {
        match self.kind() {
            TypeKind::Tuple(members) => Some(members),
            _ => None,
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

fn format_extent(extent: &Extent) -> String {
    match extent {
        Some(extent) => extent.to_string(),
        None => "?".to_string(),
    }
}

impl core::fmt::Display for VectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vector<")?;
        for (size, scalable) in self.shape.iter().zip(self.scalable_dims.iter()) {
            if *scalable {
                write!(f, "[{size}]x")?;
            } else {
                write!(f, "{size}x")?;
            }
        }
        write!(f, "{}>", self.element)
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Integer(width) => write!(f, "i{width}"),
            Self::Index => write!(f, "index"),
            Self::Float(kind) => write!(f, "{kind}"),
            Self::Logical(kind) => write!(f, "!fir.logical<{kind}>"),
            Self::Character { kind, length } => match length {
                Some(length) => write!(f, "!fir.char<{kind},{length}>"),
                None => write!(f, "!fir.char<{kind},?>"),
            },
            Self::Record(name) => write!(f, "!fir.type<{name}>"),
            Self::Sequence { shape, element } => match shape {
                Some(shape) => write!(
                    f,
                    "!fir.array<{}x{element}>",
                    shape.iter().map(format_extent).join("x")
                ),
                None => write!(f, "!fir.array<*:{element}>"),
            },
            Self::Reference(ty) => write!(f, "!fir.ref<{ty}>"),
            Self::Pointer(ty) => write!(f, "!fir.ptr<{ty}>"),
            Self::Heap(ty) => write!(f, "!fir.heap<{ty}>"),
            Self::LlvmPointer(ty) => write!(f, "!fir.llvm_ptr<{ty}>"),
            Self::Box(ty) => write!(f, "!fir.box<{ty}>"),
            Self::Class(ty) => write!(f, "!fir.class<{ty}>"),
            Self::BoxChar(kind) => write!(f, "!fir.boxchar<{kind}>"),
            Self::BoxProc(ty) => write!(f, "!fir.boxproc<{ty}>"),
            Self::Function { inputs, results } => {
                write!(f, "({}) -> ", inputs.iter().join(", "))?;
                if results.len() == 1 {
                    write!(f, "{}", results[0])
                } else {
                    write!(f, "({})", results.iter().join(", "))
                }
            }
            Self::Tuple(members) => write!(f, "tuple<{}>", members.iter().join(", ")),
            Self::Shape(rank) => write!(f, "!fir.shape<{rank}>"),
            Self::ShapeShift(rank) => write!(f, "!fir.shapeshift<{rank}>"),
            Self::Shift(rank) => write!(f, "!fir.shift<{rank}>"),
            Self::Vector(vector) => write!(f, "{vector}"),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", **self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_fir_types() {
        let array = Type::sequence(&[None], Type::float(FloatKind::F32));

        assert_eq!(Type::reference(Type::i32()).to_string(), "!fir.ref<i32>");
        assert_eq!(
            Type::boxed(array.clone()).to_string(),
            "!fir.box<!fir.array<?xf32>>"
        );
        assert_eq!(
            Type::tuple([Type::reference(Type::i32()), Type::boxed(array)]).to_string(),
            "tuple<!fir.ref<i32>, !fir.box<!fir.array<?xf32>>>"
        );
        assert_eq!(
            Type::assumed_rank_sequence(Type::i32()).to_string(),
            "!fir.array<*:i32>"
        );
        assert_eq!(
            Type::box_proc(Type::function([], [])).to_string(),
            "!fir.boxproc<() -> ()>"
        );
    }

    #[test]
    fn displays_scalable_vectors() {
        let ty = VectorType::new(&[2, 4], &[false, true], Type::i1());

        assert_eq!(ty.to_string(), "vector<2x[4]xi1>");
        assert_eq!(ty.drop_leading_dims(1).to_string(), "vector<[4]xi1>");
        assert_eq!(ty.with_dim_size(1, 16).to_string(), "vector<2x[16]xi1>");
    }

    #[test]
    fn address_types_expose_their_pointee() {
        let ptr = Type::llvm_pointer(Type::reference(Type::i32()));

        assert_eq!(ptr.dyn_cast_ptr_ele_ty(), Some(Type::reference(Type::i32())));
        assert!(Type::reference(Type::i32()).is_reference());
        assert!(!ptr.is_reference());
        assert_eq!(Type::i32().dyn_cast_ptr_ele_ty(), None);
    }
}
