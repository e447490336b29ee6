use hostlower::{
    error::LowerError,
    intern::InternedSymbol,
    lowering::{
        LoweringContext, LoweringOptions,
        extended_value::{ExtendedValue, SymMap},
        host_associations::{CaptureKind, HostAssociations, classify},
        procedure::{
            LoweredProcedure, ProcedureDescription, lower_host_procedure,
            lower_internal_procedure,
        },
    },
    middle::{
        ir::{Attribute, Function, OpKind, ValueId, builder::FirOpBuilder},
        semantics::{
            ArraySpec, Bound, CharLength, DeclaredType, IntrinsicCategory, Scope, ScopeId,
            ScopeVariable, ShapeSpec, Storage, Symbol, SymbolAttribute, SymbolFlag, SymbolId,
            SymbolTable,
        },
    },
};

fn integer() -> DeclaredType {
    DeclaredType::Intrinsic {
        category: IntrinsicCategory::Integer,
        kind: 4,
    }
}

fn real() -> DeclaredType {
    DeclaredType::Intrinsic {
        category: IntrinsicCategory::Real,
        kind: 4,
    }
}

fn assumed_shape(rank: usize) -> ArraySpec {
    ArraySpec::AssumedShape(vec![Bound::Constant(1); rank])
}

/// A host procedure `host` with the given dummies and locals, and an
/// internal procedure without variables of its own
struct Program {
    semantics: SymbolTable,
    host_scope: ScopeId,
    internal_scope: ScopeId,
    dummies: Vec<SymbolId>,
}

impl Program {
    fn new(semantics: SymbolTable, dummies: Vec<SymbolId>, locals: Vec<SymbolId>) -> Self {
        let mut semantics = semantics;
        let variables = dummies
            .iter()
            .chain(&locals)
            .map(|id| ScopeVariable::Symbol(*id))
            .collect();
        let host_scope = semantics.add_scope(Scope {
            name: InternedSymbol::new("host"),
            variables,
        });
        let internal_scope = semantics.add_scope(Scope {
            name: InternedSymbol::new("internal"),
            variables: Vec::new(),
        });

        Self {
            semantics,
            host_scope,
            internal_scope,
            dummies,
        }
    }

    fn associations(&self, captured: &[SymbolId]) -> HostAssociations {
        let mut associations = HostAssociations::new();
        associations
            .add_symbols_to_bind(&self.semantics, captured.iter().copied(), self.host_scope)
            .unwrap();
        associations
    }

    fn lower(
        &self,
        associations: &HostAssociations,
        options: &LoweringOptions,
    ) -> (LoweredProcedure, LoweredProcedure) {
        let host = ProcedureDescription {
            name: InternedSymbol::new("host"),
            scope: self.host_scope,
            dummies: self.dummies.clone(),
        };
        let internal = ProcedureDescription {
            name: InternedSymbol::new("host.internal"),
            scope: self.internal_scope,
            dummies: Vec::new(),
        };

        let host = lower_host_procedure(
            &self.semantics,
            options,
            &host,
            &[internal.name],
            associations,
        )
        .unwrap();
        let internal =
            lower_internal_procedure(&self.semantics, options, &internal, associations).unwrap();
        (host, internal)
    }
}

fn count(function: &Function, name: &str) -> usize {
    function.operations_named(name).len()
}

/// `integer :: x` local and `real :: y(:)` dummy of the host
fn scalar_and_assumed_shape() -> (Program, SymbolId, SymbolId) {
    let mut semantics = SymbolTable::new();
    let x = semantics.add_symbol(Symbol::object("x", integer(), ArraySpec::Scalar));
    let y = semantics.add_symbol(
        Symbol::object("y", real(), assumed_shape(1)).with_attribute(SymbolAttribute::Dummy),
    );
    (Program::new(semantics, vec![y], vec![x]), x, y)
}

#[test]
fn scalar_and_assumed_shape_array_are_tupled() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);

    let argument_type = associations.argument_type(&program.semantics).unwrap().unwrap();
    assert_eq!(
        argument_type.to_string(),
        "!fir.ref<tuple<!fir.ref<i32>, !fir.box<!fir.array<?xf32>>>>"
    );
    assert_eq!(associations.tuple_symbols(), [x, y]);

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    let coordinates = internal.function.operations_named("fir.coordinate_of");
    assert_eq!(
        internal.function.value_type(coordinates[0].result()).to_string(),
        "!fir.llvm_ptr<!fir.ref<i32>>"
    );
    assert_eq!(
        internal.function.value_type(coordinates[1].result()).to_string(),
        "!fir.ref<!fir.box<!fir.array<?xf32>>>"
    );

    assert_eq!(count(&host.function, "fir.coordinate_of"), 2);
    assert_eq!(count(&host.function, "fir.store"), 2);
    assert_eq!(count(&host.function, "fir.rebox"), 1);

    assert_eq!(internal.function.inputs.last(), Some(&argument_type));
    assert_eq!(count(&internal.function, "fir.coordinate_of"), 2);
    assert_eq!(count(&internal.function, "fir.load"), 2);

    assert!(matches!(
        internal.sym_map.lookup(x),
        Some(ExtendedValue::Unboxed(_))
    ));
    let Some(ExtendedValue::Box(y_box)) = internal.sym_map.lookup(y) else {
        panic!("y should be bound to its descriptor");
    };
    assert_eq!(y_box.lbounds.len(), 1);
    assert_eq!(count(&internal.function, "fir.box_dims"), 1);
}

#[test]
fn internal_calls_receive_the_tuple() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);
    let (host, _) = program.lower(&associations, &LoweringOptions::default());

    let tuple = host
        .function
        .operations_named("fir.alloca")
        .into_iter()
        .find(|op| {
            host.function
                .value_type(op.result())
                .dyn_cast_ptr_ele_ty()
                .is_some_and(|ty| ty.tuple_members().is_some())
        })
        .map(|op| op.result())
        .expect("the host allocates the tuple");

    let calls = host.function.operations_named("fir.call");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operands, [tuple]);
}

#[test]
fn argument_type_is_computed_once() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);

    let first = associations.argument_type(&program.semantics).unwrap().unwrap();
    let second = associations.argument_type(&program.semantics).unwrap().unwrap();
    assert!(first.ptr_eq(&second));
}

#[test]
fn high_level_fir_declares_captured_variables() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);
    let options = LoweringOptions {
        lower_to_high_level_fir: true,
    };

    let (host, internal) = program.lower(&associations, &options);

    assert_eq!(count(&host.function, "hlfir.declare"), 0);
    assert_eq!(count(&internal.function, "hlfir.declare"), 2);
    assert!(
        hostlower::middle::ir::pretty_print::render_plain(&internal.function)
            .contains("{uniq_name = \"x\", host_assoc}")
    );
}

#[test]
fn globals_are_not_tupled() {
    let mut semantics = SymbolTable::new();
    let saved = semantics.add_symbol(
        Symbol::object("s", integer(), ArraySpec::Scalar).with_storage(Storage::Static {
            global: InternedSymbol::new("_QFhostEs"),
        }),
    );
    let private = semantics.add_symbol(
        Symbol::object("t", real(), ArraySpec::Scalar)
            .with_storage(Storage::Static {
                global: InternedSymbol::new("_QFhostEt"),
            })
            .with_flag(SymbolFlag::OmpThreadprivate),
    );
    let program = Program::new(semantics, Vec::new(), vec![saved, private]);
    let associations = program.associations(&[saved, private]);

    assert!(!associations.has_tuple_associations());
    assert!(associations.is_global(&program.semantics, saved));
    assert_eq!(associations.argument_type(&program.semantics).unwrap(), None);

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    assert!(internal.function.inputs.is_empty());
    assert_eq!(count(&internal.function, "fir.address_of"), 2);
    assert_eq!(count(&internal.function, "omp.threadprivate"), 1);
    assert!(internal.sym_map.contains(saved));
    assert!(internal.sym_map.contains(private));

    let calls = host.function.operations_named("fir.call");
    assert!(calls[0].operands.is_empty());
}

#[test]
fn absent_optional_array_stays_absent() {
    let mut semantics = SymbolTable::new();
    let a = semantics.add_symbol(
        Symbol::object("a", real(), assumed_shape(2))
            .with_attribute(SymbolAttribute::Dummy)
            .with_attribute(SymbolAttribute::Optional),
    );
    let program = Program::new(semantics, vec![a], Vec::new());
    let associations = program.associations(&[a]);

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    assert_eq!(count(&host.function, "fir.is_present"), 1);
    assert_eq!(count(&host.function, "fir.if"), 1);
    let if_op = host.function.operations_named("fir.if")[0];
    assert!(
        if_op.regions[1]
            .operations
            .iter()
            .any(|op| op.name() == "fir.zero_bits")
    );

    assert_eq!(count(&internal.function, "fir.absent"), 1);
    assert_eq!(count(&internal.function, "arith.select"), 1);
    let select = internal.function.operations_named("arith.select")[0].result();
    let Some(ExtendedValue::Box(bound)) = internal.sym_map.lookup(a) else {
        panic!("optional array should be bound to a descriptor");
    };
    assert_eq!(bound.addr, select);
}

#[test]
fn absent_optional_polymorphic_scalar_stays_absent() {
    let mut semantics = SymbolTable::new();
    let p = semantics.add_symbol(
        Symbol::object(
            "p",
            DeclaredType::Derived {
                name: InternedSymbol::new("t"),
                len_parameters: 0,
                polymorphic: true,
            },
            ArraySpec::Scalar,
        )
        .with_attribute(SymbolAttribute::Dummy)
        .with_attribute(SymbolAttribute::Optional),
    );
    let program = Program::new(semantics, vec![p], Vec::new());
    let associations = program.associations(&[p]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.class<!fir.type<t>>>>"
    );

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    assert_eq!(count(&host.function, "fir.is_present"), 1);
    assert_eq!(count(&host.function, "fir.if"), 1);
    assert_eq!(count(&internal.function, "fir.absent"), 1);
    assert_eq!(count(&internal.function, "arith.select"), 1);
}

#[test]
fn character_scalar_travels_as_boxchar() {
    let mut semantics = SymbolTable::new();
    let c = semantics.add_symbol(Symbol::object(
        "c",
        DeclaredType::Character {
            kind: 1,
            length: CharLength::Constant(10),
        },
        ArraySpec::Scalar,
    ));
    let program = Program::new(semantics, Vec::new(), vec![c]);
    let associations = program.associations(&[c]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.boxchar<1>>>"
    );

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    assert_eq!(count(&host.function, "fir.emboxchar"), 1);
    assert_eq!(count(&internal.function, "fir.unboxchar"), 1);
    assert!(matches!(
        internal.sym_map.lookup(c),
        Some(ExtendedValue::CharBox(_))
    ));
}

#[test]
fn allocatable_captures_its_descriptor_address() {
    let mut semantics = SymbolTable::new();
    let a = semantics.add_symbol(
        Symbol::object("a", real(), ArraySpec::Deferred(1))
            .with_attribute(SymbolAttribute::Allocatable),
    );
    let program = Program::new(semantics, Vec::new(), vec![a]);
    let associations = program.associations(&[a]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.ref<!fir.box<!fir.heap<!fir.array<?xf32>>>>>>"
    );

    let (_, internal) = program.lower(&associations, &LoweringOptions::default());

    assert!(matches!(
        internal.sym_map.lookup(a),
        Some(ExtendedValue::MutableBox(_))
    ));
}

#[test]
fn classification_covers_every_capture_kind() {
    let explicit = ArraySpec::Explicit(vec![ShapeSpec {
        lower: Bound::Constant(1),
        upper: Bound::Constant(10),
    }]);
    let cases = [
        (
            Symbol::object("i", integer(), ArraySpec::Scalar),
            CaptureKind::SimpleScalar,
        ),
        (Symbol::procedure("f", None), CaptureKind::Procedure),
        (
            Symbol::object(
                "c",
                DeclaredType::Character {
                    kind: 1,
                    length: CharLength::Assumed,
                },
                ArraySpec::Scalar,
            ),
            CaptureKind::CharacterScalar,
        ),
        (
            Symbol::object("u", DeclaredType::UnlimitedPolymorphic, ArraySpec::Scalar),
            CaptureKind::PolymorphicScalar,
        ),
        (
            Symbol::object("p", real(), ArraySpec::Deferred(2))
                .with_attribute(SymbolAttribute::Pointer),
            CaptureKind::AllocatableOrPointer,
        ),
        (
            Symbol::object("cp", real(), explicit.clone()).with_flag(SymbolFlag::CrayPointee),
            CaptureKind::AllocatableOrPointer,
        ),
        (
            Symbol::object("e", real(), explicit),
            CaptureKind::Array,
        ),
        (
            Symbol::object("r", real(), ArraySpec::AssumedRank),
            CaptureKind::Array,
        ),
    ];

    for (symbol, expected) in cases {
        let capture = classify(&symbol).unwrap();
        assert_eq!(capture.kind, expected, "classifying '{}'", symbol.name);
        assert_eq!(classify(&symbol).unwrap(), capture);
    }
}

#[test]
fn derived_type_with_length_parameters_is_not_captured() {
    let mut semantics = SymbolTable::new();
    let d = semantics.add_symbol(Symbol::object(
        "d",
        DeclaredType::Derived {
            name: InternedSymbol::new("pdt"),
            len_parameters: 1,
            polymorphic: false,
        },
        ArraySpec::Scalar,
    ));
    let program = Program::new(semantics, Vec::new(), vec![d]);

    assert!(matches!(
        classify(program.semantics.symbol(d)),
        Err(LowerError::Todo { .. })
    ));

    let mut associations = HostAssociations::new();
    let result = associations.add_symbols_to_bind(&program.semantics, [d], program.host_scope);
    assert!(matches!(result, Err(LowerError::Todo { .. })));
    assert!(!associations.has_tuple_associations());
}

#[test]
#[should_panic(expected = "populated exactly once")]
fn populating_twice_panics() {
    let (program, x, y) = scalar_and_assumed_shape();
    let mut associations = program.associations(&[x]);
    let _ = associations.add_symbols_to_bind(&program.semantics, [y], program.host_scope);
}

#[test]
fn missing_tuple_argument_is_fatal() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);
    let options = LoweringOptions::default();

    let mut function = Function::new(InternedSymbol::new("host.internal"), [], []);
    let mut ctx = LoweringContext::new(
        &program.semantics,
        &options,
        FirOpBuilder::new(&mut function),
    );
    let mut sym_map = SymMap::new();

    let result = associations.internal_procedure_bindings(&mut ctx, &mut sym_map);
    assert!(matches!(result, Err(LowerError::Fatal { .. })));
}

fn defined_by<'f>(function: &'f Function, value: ValueId) -> &'f OpKind {
    &function
        .defining_operation(value)
        .expect("value is defined by an operation")
        .kind
}

#[test]
fn cray_pointee_captures_its_descriptor_address() {
    let mut semantics = SymbolTable::new();
    let cp = semantics.add_symbol(
        Symbol::object(
            "cp",
            real(),
            ArraySpec::Explicit(vec![ShapeSpec {
                lower: Bound::Constant(1),
                upper: Bound::Constant(10),
            }]),
        )
        .with_flag(SymbolFlag::CrayPointee),
    );
    let program = Program::new(semantics, Vec::new(), vec![cp]);
    let associations = program.associations(&[cp]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.ref<!fir.box<!fir.ptr<!fir.array<10xf32>>>>>>"
    );

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    let Some(ExtendedValue::MutableBox(host_box)) = host.sym_map.lookup(cp) else {
        panic!("the pointee should be bound to its descriptor in the host");
    };
    assert_eq!(
        host.function.value_type(host_box.addr).to_string(),
        "!fir.ref<!fir.box<!fir.ptr<!fir.array<10xf32>>>>"
    );
    let stores = host.function.operations_named("fir.store");
    let slot_store = stores.last().unwrap();
    assert_eq!(slot_store.operands[0], host_box.addr);

    let Some(ExtendedValue::MutableBox(internal_box)) = internal.sym_map.lookup(cp) else {
        panic!("the pointee should be bound to its descriptor in the internal procedure");
    };
    assert!(internal_box.non_deferred_params.is_empty());
    assert_eq!(
        internal.function.value_type(internal_box.addr),
        host.function.value_type(host_box.addr)
    );
}

#[test]
fn local_threadprivate_shares_a_global_with_the_host() {
    let mut semantics = SymbolTable::new();
    let t = semantics.add_symbol(
        Symbol::object("t", integer(), ArraySpec::Scalar).with_flag(SymbolFlag::OmpThreadprivate),
    );
    let program = Program::new(semantics, Vec::new(), vec![t]);
    let associations = program.associations(&[t]);

    assert!(!associations.has_tuple_associations());
    assert!(associations.is_global(&program.semantics, t));

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    for function in [&host.function, &internal.function] {
        assert_eq!(count(function, "fir.alloca"), 0, "@{}", function.name);
        let address_of = function.operations_named("fir.address_of");
        assert_eq!(address_of.len(), 1);
        assert!(matches!(
            &address_of[0].kind,
            OpKind::AddressOf { symbol } if symbol.to_string() == "_QFhostEt"
        ));
    }

    let private = internal.function.operations_named("omp.threadprivate");
    assert_eq!(private.len(), 1);
    let address = internal.function.operations_named("fir.address_of")[0].result();
    assert_eq!(private[0].operands, [address]);
    assert_eq!(
        internal.sym_map.lookup(t),
        Some(&ExtendedValue::Unboxed(private[0].result()))
    );
}

#[test]
fn explicit_shape_array_keeps_its_bounds() {
    let mut semantics = SymbolTable::new();
    let e = semantics.add_symbol(Symbol::object(
        "e",
        real(),
        ArraySpec::Explicit(vec![ShapeSpec {
            lower: Bound::Constant(0),
            upper: Bound::Constant(4),
        }]),
    ));
    let program = Program::new(semantics, Vec::new(), vec![e]);
    let associations = program.associations(&[e]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.box<!fir.array<5xf32>>>>"
    );

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    let shape = host.function.operations_named("fir.shape_shift");
    assert_eq!(shape.len(), 1);
    let host_bounds = shape[0]
        .operands
        .iter()
        .map(|value| defined_by(&host.function, *value).clone())
        .collect::<Vec<_>>();
    assert_eq!(
        host_bounds,
        [
            OpKind::Constant(Attribute::Int(0)),
            OpKind::Constant(Attribute::Int(5)),
        ]
    );

    let Some(ExtendedValue::ArrayBox(array)) = internal.sym_map.lookup(e) else {
        panic!("e should be read out of its descriptor");
    };
    assert_eq!(array.lbounds.len(), 1);
    assert_eq!(
        defined_by(&internal.function, array.lbounds[0]),
        &OpKind::Constant(Attribute::Int(0))
    );
    assert_eq!(array.extents.len(), 1);
    assert_eq!(
        defined_by(&internal.function, array.extents[0]).clone(),
        OpKind::BoxDims
    );
    assert_eq!(
        defined_by(&internal.function, array.addr).clone(),
        OpKind::BoxAddr
    );
}

#[test]
fn procedures_are_captured_by_boxproc() {
    let mut semantics = SymbolTable::new();
    let f = semantics
        .add_symbol(Symbol::procedure("f", None).with_attribute(SymbolAttribute::Dummy));
    let pp = semantics
        .add_symbol(Symbol::procedure("pp", None).with_attribute(SymbolAttribute::Pointer));
    let program = Program::new(semantics, vec![f], vec![pp]);
    let associations = program.associations(&[f, pp]);

    assert_eq!(
        associations
            .argument_type(&program.semantics)
            .unwrap()
            .unwrap()
            .to_string(),
        "!fir.ref<tuple<!fir.boxproc<() -> ()>, !fir.ref<!fir.boxproc<() -> ()>>>>"
    );

    let (host, internal) = program.lower(&associations, &LoweringOptions::default());

    assert_eq!(count(&host.function, "fir.store"), 2);

    let coordinates = internal.function.operations_named("fir.coordinate_of");
    let coordinate_types = coordinates
        .iter()
        .map(|op| internal.function.value_type(op.result()).to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        coordinate_types,
        [
            "!fir.ref<!fir.boxproc<() -> ()>>",
            "!fir.llvm_ptr<!fir.ref<!fir.boxproc<() -> ()>>>",
        ]
    );

    assert!(matches!(
        internal.sym_map.lookup(f),
        Some(ExtendedValue::ProcBox(_))
    ));
    assert!(matches!(
        internal.sym_map.lookup(pp),
        Some(ExtendedValue::Unboxed(_))
    ));
}

#[test]
fn character_allocatable_and_pointer_lengths_are_recovered() {
    let character = |kind, length| DeclaredType::Character { kind, length };
    let mut semantics = SymbolTable::new();
    let constant = semantics.add_symbol(
        Symbol::object("c1", character(1, CharLength::Constant(5)), ArraySpec::Scalar)
            .with_attribute(SymbolAttribute::Allocatable),
    );
    let expression = semantics.add_symbol(
        Symbol::object("c2", character(1, CharLength::Expression), ArraySpec::Scalar)
            .with_attribute(SymbolAttribute::Pointer),
    );
    let deferred = semantics.add_symbol(
        Symbol::object("c3", character(1, CharLength::Deferred), ArraySpec::Scalar)
            .with_attribute(SymbolAttribute::Allocatable),
    );
    let assumed = semantics.add_symbol(
        Symbol::object("c4", character(2, CharLength::Assumed), ArraySpec::Scalar)
            .with_attribute(SymbolAttribute::Pointer)
            .with_attribute(SymbolAttribute::Dummy),
    );
    let program = Program::new(semantics, vec![assumed], vec![constant, expression, deferred]);
    let associations = program.associations(&[constant, expression, deferred, assumed]);

    let (_, internal) = program.lower(&associations, &LoweringOptions::default());
    let function = &internal.function;
    let params = |id| match internal.sym_map.lookup(id) {
        Some(ExtendedValue::MutableBox(mutable)) => mutable.non_deferred_params.clone(),
        other => panic!("expected a mutable box, got {other:?}"),
    };

    let constant = params(constant);
    assert_eq!(constant.len(), 1);
    assert_eq!(
        defined_by(function, constant[0]),
        &OpKind::Constant(Attribute::Int(5))
    );

    let expression = params(expression);
    assert_eq!(expression.len(), 1);
    assert_eq!(defined_by(function, expression[0]).clone(), OpKind::BoxEleSize);

    assert!(params(deferred).is_empty());

    let assumed = params(assumed);
    assert_eq!(assumed.len(), 1);
    assert_eq!(defined_by(function, assumed[0]).clone(), OpKind::DivSI);

    assert_eq!(count(function, "fir.box_elesize"), 2);
}

#[test]
fn tuple_argument_is_the_last_input_of_its_type() {
    let (program, x, y) = scalar_and_assumed_shape();
    let associations = program.associations(&[x, y]);
    let argument_type = associations.argument_type(&program.semantics).unwrap().unwrap();
    let options = LoweringOptions::default();

    let mut function = Function::new(
        InternedSymbol::new("host.internal"),
        [argument_type.clone(), argument_type],
        [],
    );
    let [first, last] = function.arguments[..] else {
        unreachable!()
    };

    {
        let mut ctx = LoweringContext::new(
            &program.semantics,
            &options,
            FirOpBuilder::new(&mut function),
        );
        let mut sym_map = SymMap::new();
        associations
            .internal_procedure_bindings(&mut ctx, &mut sym_map)
            .unwrap();
        assert_eq!(ctx.host_assoc_tuple(), Some(last));
    }

    let coordinates = function.operations_named("fir.coordinate_of");
    assert_eq!(coordinates.len(), 2);
    assert!(coordinates.iter().all(|op| op.operands[0] == last));
    assert!(coordinates.iter().all(|op| op.operands[0] != first));
}
