use crate::middle::{
    ir::{Attribute, Block, CmpIPredicate, Function, Location, OpKind, Operation, ValueId},
    ty::{Type, TypeKind},
};

/// Creates operations at the end of a function body, or at the end of the
/// innermost region currently being built (see [`FirOpBuilder::gen_if_then_else`]).
pub struct FirOpBuilder<'f> {
    function: &'f mut Function,
    /// Operations of regions under construction. When empty, operations are
    /// appended to the function body directly.
    region_stack: Vec<Vec<Operation>>,
}

impl<'f> FirOpBuilder<'f> {
    pub fn new(function: &'f mut Function) -> Self {
        Self {
            function,
            region_stack: Vec::new(),
        }
    }

    pub fn function(&self) -> &Function {
        &*self.function
    }

    pub fn function_mut(&mut self) -> &mut Function {
        &mut *self.function
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.function.value_type(value).clone()
    }

    /// Starts collecting operations into a new region. Must be balanced by a
    /// call to [`Self::pop_region`].
    pub fn push_region(&mut self) {
        self.region_stack.push(Vec::new());
    }

    pub fn pop_region(&mut self) -> Vec<Operation> {
        self.region_stack
            .pop()
            .expect("pop_region called without a matching push_region")
    }

    fn insert(&mut self, operation: Operation) {
        match self.region_stack.last_mut() {
            Some(region) => region.push(operation),
            None => self.function.body.operations.push(operation),
        }
    }

    /// Creates an operation and its result values, inserting it at the
    /// current insertion point
    pub fn create(
        &mut self,
        location: Location,
        kind: OpKind,
        operands: impl IntoIterator<Item = ValueId>,
        result_types: impl IntoIterator<Item = Type>,
    ) -> Vec<ValueId> {
        self.create_with_attributes(location, kind, operands, result_types, [])
    }

    pub fn create_with_attributes(
        &mut self,
        location: Location,
        kind: OpKind,
        operands: impl IntoIterator<Item = ValueId>,
        result_types: impl IntoIterator<Item = Type>,
        attributes: impl IntoIterator<Item = (&'static str, Attribute)>,
    ) -> Vec<ValueId> {
        let results = result_types
            .into_iter()
            .map(|ty| self.function.new_value(ty))
            .collect::<Vec<_>>();

        let mut operation = Operation::new(kind, location);
        operation.operands = operands.into_iter().collect();
        operation.results = results.clone();
        operation.attributes = attributes.into_iter().collect();

        self.insert(operation);

        results
    }

    /// Like [`Self::create`] for operations with exactly one result
    pub fn create_one(
        &mut self,
        location: Location,
        kind: OpKind,
        operands: impl IntoIterator<Item = ValueId>,
        result_type: Type,
    ) -> ValueId {
        self.create(location, kind, operands, [result_type])[0]
    }

    pub fn create_integer_constant(&mut self, location: Location, ty: Type, value: i64) -> ValueId {
        debug_assert!(ty.is_integer_like(), "integer constant of type {ty}");
        self.create_one(location, OpKind::Constant(Attribute::Int(value)), [], ty)
    }

    pub fn create_zero_constant(&mut self, location: Location, ty: Type) -> ValueId {
        self.create_one(location, OpKind::Constant(Attribute::Zero), [], ty)
    }

    /// Converts `value` to `to`, or returns it untouched when it already has
    /// that type
    pub fn create_convert(&mut self, location: Location, to: Type, value: ValueId) -> ValueId {
        if *self.function.value_type(value) == to {
            return value;
        }

        self.create_one(location, OpKind::Convert, [value], to)
    }

    pub fn create_alloca(&mut self, location: Location, in_type: Type) -> ValueId {
        let result_type = Type::reference(in_type.clone());
        self.create_one(location, OpKind::Alloca { in_type }, [], result_type)
    }

    pub fn create_load(&mut self, location: Location, address: ValueId) -> ValueId {
        let address_type = self.value_type(address);
        let loaded = address_type
            .dyn_cast_ptr_ele_ty()
            .unwrap_or_else(|| panic!("cannot load from non address type {address_type}"));

        self.create_one(location, OpKind::Load, [address], loaded)
    }

    pub fn create_store(&mut self, location: Location, value: ValueId, address: ValueId) {
        debug_assert!(
            self.function.value_type(address).is_ref_like(),
            "store destination must be an address"
        );
        self.create(location, OpKind::Store, [value, address], []);
    }

    pub fn create_coordinate(
        &mut self,
        location: Location,
        result_type: Type,
        base: ValueId,
        offset: ValueId,
    ) -> ValueId {
        self.create_one(location, OpKind::Coordinate, [base, offset], result_type)
    }

    pub fn create_select(
        &mut self,
        location: Location,
        condition: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    ) -> ValueId {
        let ty = self.value_type(on_true);
        self.create_one(location, OpKind::Select, [condition, on_true, on_false], ty)
    }

    pub fn create_is_present(&mut self, location: Location, value: ValueId) -> ValueId {
        self.create_one(location, OpKind::IsPresent, [value], Type::i1())
    }

    pub fn create_absent(&mut self, location: Location, ty: Type) -> ValueId {
        self.create_one(location, OpKind::Absent, [], ty)
    }

    /// Address of the data described by a box
    pub fn create_box_addr(&mut self, location: Location, boxed: ValueId) -> ValueId {
        let box_type = self.value_type(boxed);
        let element = box_type
            .box_element_type()
            .unwrap_or_else(|| panic!("box_addr on non box type {box_type}"));
        let address_type = if element.is_ref_like() {
            element
        } else {
            Type::reference(element)
        };

        self.create_one(location, OpKind::BoxAddr, [boxed], address_type)
    }

    /// Returns the (lower bound, extent, stride) triple of a box dimension
    pub fn create_box_dims(
        &mut self,
        location: Location,
        boxed: ValueId,
        dimension: ValueId,
    ) -> (ValueId, ValueId, ValueId) {
        let results = self.create(
            location,
            OpKind::BoxDims,
            [boxed, dimension],
            [Type::index(), Type::index(), Type::index()],
        );
        (results[0], results[1], results[2])
    }

    /// Emits `addr != null` as an `i1`
    pub fn gen_is_not_null_addr(&mut self, location: Location, address: ValueId) -> ValueId {
        let as_int = self.create_convert(location, Type::i64(), address);
        let zero = self.create_integer_constant(location, Type::i64(), 0);
        self.create_one(
            location,
            OpKind::CmpI(CmpIPredicate::Ne),
            [as_int, zero],
            Type::i1(),
        )
    }

    /// Starts building a `fir.if` on `condition`
    pub fn gen_if_then_else<'b>(
        &'b mut self,
        location: Location,
        condition: ValueId,
    ) -> IfBuilder<'b, 'f> {
        debug_assert_eq!(
            *self.function.value_type(condition).kind(),
            TypeKind::Integer(1),
            "if condition must be an i1"
        );

        IfBuilder {
            builder: self,
            location,
            condition,
            then_region: Block::default(),
            else_region: Block::default(),
        }
    }
}

/// Builder for the two regions of a `fir.if`. The operation is only inserted
/// once [`IfBuilder::end`] is called.
pub struct IfBuilder<'b, 'f> {
    builder: &'b mut FirOpBuilder<'f>,
    location: Location,
    condition: ValueId,
    then_region: Block,
    else_region: Block,
}

impl<'b, 'f> IfBuilder<'b, 'f> {
    pub fn gen_then(mut self, body: impl FnOnce(&mut FirOpBuilder<'f>)) -> Self {
        self.builder.push_region();
        body(self.builder);
        self.then_region.operations = self.builder.pop_region();
        self
    }

    pub fn gen_else(mut self, body: impl FnOnce(&mut FirOpBuilder<'f>)) -> Self {
        self.builder.push_region();
        body(self.builder);
        self.else_region.operations = self.builder.pop_region();
        self
    }

    pub fn end(self) {
        let mut operation = Operation::new(OpKind::If, self.location);
        operation.operands = vec![self.condition];
        operation.regions = vec![self.then_region, self.else_region];
        self.builder.insert(operation);
    }
}
