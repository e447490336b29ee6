use hostlower::{
    backend::{
        arm_sve::{self, SveOp, legalize::legalize_for_llvm_export},
        vector,
    },
    error::LegalizeError,
    intern::InternedSymbol,
    middle::{
        ir::{
            Attribute, Function, Location, OpKind, Operation, ValueId, builder::FirOpBuilder,
            pretty_print,
        },
        ty::{FloatKind, Type, VectorType},
    },
};

fn predicate(shape: &[i64], scalable: &[bool]) -> Type {
    Type::vector(VectorType::new(shape, scalable, Type::i1()))
}

fn scalable_predicate(shape: &[i64]) -> Type {
    let mut scalable = vec![false; shape.len()];
    scalable[shape.len() - 1] = true;
    predicate(shape, &scalable)
}

fn names(function: &Function) -> Vec<&'static str> {
    function.body.operations.iter().map(Operation::name).collect()
}

fn count(function: &Function, name: &str) -> usize {
    function.operations_named(name).len()
}

fn with_builder(
    inputs: Vec<Type>,
    build: impl FnOnce(&mut FirOpBuilder<'_>, &[ValueId]),
) -> Function {
    let mut function = Function::new(InternedSymbol::new("f"), inputs, []);
    let arguments = function.arguments.clone();
    build(&mut FirOpBuilder::new(&mut function), &arguments);
    function
}

#[test]
fn convert_to_svbool_is_unrolled_over_leading_dimensions() {
    let mut function = with_builder(vec![scalable_predicate(&[2, 4])], |builder, arguments| {
        arm_sve::convert_to_svbool(builder, Location::UNKNOWN, arguments[0]);
    });

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(count(&function, "arm_sve.convert_to_svbool"), 0);
    assert_eq!(count(&function, "vector.extract"), 2);
    assert_eq!(count(&function, "arm_sve.intr.convert.to.svbool"), 2);
    assert_eq!(count(&function, "vector.insert"), 2);

    let inserts = function.operations_named("vector.insert");
    assert_eq!(
        function.value_type(inserts[1].result()).to_string(),
        "vector<2x[16]xi1>"
    );
    let intrinsic = function.operations_named("arm_sve.intr.convert.to.svbool")[0];
    assert_eq!(
        function.value_type(intrinsic.result()).to_string(),
        "vector<[16]xi1>"
    );
}

#[test]
fn convert_from_svbool_unrolls_every_leading_position() {
    let mut function = with_builder(vec![scalable_predicate(&[2, 3, 16])], |builder, arguments| {
        arm_sve::convert_from_svbool(
            builder,
            Location::UNKNOWN,
            arguments[0],
            scalable_predicate(&[2, 3, 4]),
        );
    });

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(count(&function, "vector.extract"), 6);
    assert_eq!(count(&function, "arm_sve.intr.convert.from.svbool"), 6);
    assert_eq!(count(&function, "vector.insert"), 6);

    let positions = function
        .operations_named("vector.extract")
        .iter()
        .map(|op| match &op.kind {
            OpKind::VectorExtract { position } => position.to_vec(),
            other => unreachable!("{other:?}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(
        positions,
        [[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]
    );
}

#[test]
fn rank_one_svbool_conversion_is_direct() {
    let mut function = with_builder(vec![scalable_predicate(&[4])], |builder, arguments| {
        arm_sve::convert_to_svbool(builder, Location::UNKNOWN, arguments[0]);
    });

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(names(&function), ["arm_sve.intr.convert.to.svbool"]);
}

#[test]
fn psel_goes_through_full_predicates() {
    let p1_type = scalable_predicate(&[4]);
    let mut function = with_builder(
        vec![p1_type.clone(), scalable_predicate(&[16]), Type::index()],
        |builder, arguments| {
            arm_sve::psel(
                builder,
                Location::UNKNOWN,
                arguments[0],
                arguments[1],
                arguments[2],
            );
        },
    );

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(
        names(&function),
        [
            "arm_sve.intr.convert.to.svbool",
            "arith.index_cast",
            "arm_sve.intr.psel",
            "arm_sve.intr.convert.from.svbool",
        ]
    );

    let operations = &function.body.operations;
    assert_eq!(function.value_type(operations[1].result()), &Type::i32());
    assert_eq!(operations[2].operands[0], operations[0].result());
    assert_eq!(operations[2].operands[1], function.arguments[1]);
    assert_eq!(function.value_type(operations[3].result()), &p1_type);
}

fn lowered_create_mask(mask_type: VectorType) -> Function {
    let mut function = with_builder(vec![Type::index()], |builder, arguments| {
        vector::create_mask(builder, Location::UNKNOWN, arguments[0], mask_type);
    });
    legalize_for_llvm_export(&mut function).unwrap();
    function
}

#[test]
fn create_mask_uses_whilelt_for_svbool_sizes() {
    for size in [2, 4, 8, 16] {
        let function = lowered_create_mask(VectorType::new(&[size], &[true], Type::i1()));

        assert_eq!(
            names(&function),
            ["llvm.mlir.zero", "arith.index_cast", "arm_sve.intr.whilelt"],
            "size {size}"
        );
        let whilelt = function.operations_named("arm_sve.intr.whilelt")[0];
        assert_eq!(
            function.value_type(whilelt.result()).to_string(),
            format!("vector<[{size}]xi1>")
        );
    }
}

#[test]
fn create_mask_falls_back_outside_svbool_sizes() {
    let unsupported = [
        VectorType::new(&[1], &[true], Type::i1()),
        VectorType::new(&[3], &[true], Type::i1()),
        VectorType::new(&[32], &[true], Type::i1()),
        VectorType::new(&[4], &[false], Type::i1()),
    ];

    for mask_type in unsupported {
        let function = lowered_create_mask(mask_type.clone());

        assert_eq!(count(&function, "arm_sve.intr.whilelt"), 0, "{mask_type}");
        assert_eq!(count(&function, "vector.create_mask"), 0);
        assert_eq!(count(&function, "vector.step"), 1);
        assert_eq!(count(&function, "arith.cmpi"), 1);
    }
}

#[test]
fn multi_dimensional_create_mask_fails_to_legalize() {
    let mut function = with_builder(vec![Type::index()], |builder, arguments| {
        vector::create_mask(
            builder,
            Location::UNKNOWN,
            arguments[0],
            VectorType::new(&[2, 4], &[false, true], Type::i1()),
        );
    });
    let before = pretty_print::render_plain(&function);

    let error = legalize_for_llvm_export(&mut function).unwrap_err();

    assert!(matches!(
        error,
        LegalizeError::FailedToLegalize { ref operation, .. } if operation == "vector.create_mask"
    ));
    assert_eq!(pretty_print::render_plain(&function), before);
}

#[test]
fn one_to_one_ops_become_intrinsics() {
    let int_vector = |element: Type| Type::vector(VectorType::new(&[4], &[true], element));
    let float = Type::float(FloatKind::F32);

    let mut function = with_builder(
        vec![
            int_vector(Type::i32()),
            int_vector(Type::integer(8)),
            scalable_predicate(&[4]),
            int_vector(float.clone()),
        ],
        |builder, arguments| {
            let [acc, bytes, mask, floats] = arguments[..] else {
                unreachable!()
            };
            let location = Location::UNKNOWN;
            arm_sve::dot_like(builder, location, SveOp::Sdot, acc, bytes, bytes);
            arm_sve::dot_like(builder, location, SveOp::Ummla, acc, bytes, bytes);
            arm_sve::masked_binary(builder, location, SveOp::ScalableMaskedAddI, mask, acc, acc);
            arm_sve::masked_binary(
                builder,
                location,
                SveOp::ScalableMaskedDivF,
                mask,
                floats,
                floats,
            );
            arm_sve::dupq_lane(builder, location, acc, 3);
            arm_sve::zip(builder, location, &[acc, acc]);
        },
    );

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(
        names(&function),
        [
            "arm_sve.intr.sdot",
            "arm_sve.intr.ummla",
            "arm_sve.intr.add",
            "arm_sve.intr.fdiv",
            "arm_sve.intr.dupq_lane",
            "arm_sve.intr.zip.x2",
        ]
    );

    let operations = &function.body.operations;
    assert_eq!(operations[4].attributes.get("lane"), Some(&Attribute::Int(3)));
    assert_eq!(operations[5].results.len(), 2);
    assert_eq!(operations[2].operands[0], function.arguments[2]);
}

#[test]
fn bfmmla_is_already_legal() {
    let bf = |element: Type| Type::vector(VectorType::new(&[4], &[true], element));
    let mut function = with_builder(
        vec![bf(Type::float(FloatKind::F32)), bf(Type::integer(16))],
        |builder, arguments| {
            arm_sve::dot_like(
                builder,
                Location::UNKNOWN,
                SveOp::Bfmmla,
                arguments[0],
                arguments[1],
                arguments[1],
            );
        },
    );

    legalize_for_llvm_export(&mut function).unwrap();

    assert_eq!(names(&function), ["arm_sve.bfmmla"]);
}

#[test]
fn malformed_svbool_conversion_is_reported() {
    let not_a_predicate = Type::vector(VectorType::new(&[4], &[true], Type::i32()));
    let mut function = with_builder(vec![not_a_predicate], |builder, arguments| {
        arm_sve::sve_op(
            builder,
            Location::UNKNOWN,
            SveOp::ConvertToSvbool,
            &[arguments[0]],
            scalable_predicate(&[16]),
        );
    });
    let before = pretty_print::render_plain(&function);

    let error = legalize_for_llvm_export(&mut function).unwrap_err();

    assert!(matches!(error, LegalizeError::MalformedOperation { .. }));
    assert_eq!(pretty_print::render_plain(&function), before);
}
