use std::str::FromStr;

use clap::{CommandFactory, Parser as ClapParser, Subcommand, error::ErrorKind};
use hostlower::{
    Error,
    backend::arm_sve::{self, SveOp, legalize::legalize_for_llvm_export, svbool_type_like},
    intern::InternedSymbol,
    lowering::{
        LoweringOptions,
        host_associations::HostAssociations,
        procedure::{ProcedureDescription, lower_host_procedure, lower_internal_procedure},
    },
    middle::{
        ir::{Function, Location, OpKind, builder::FirOpBuilder, pretty_print},
        semantics::{
            ArraySpec, Bound, DeclaredType, IntrinsicCategory, Scope, ScopeVariable, Symbol,
            SymbolAttribute, SymbolTable,
        },
        ty::{FloatKind, Type, VectorType},
    },
};
use indoc::indoc;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Print the IR without colors
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lowers a host procedure with a local scalar `x` and an assumed-shape
    /// dummy `y`, both used by an internal procedure
    #[command(after_help = indoc! {"
        The host and internal procedures correspond to:

            subroutine host(y)
              real :: y(:)
              integer :: x
              call internal()
            contains
              subroutine internal()
                x = size(y)
              end subroutine
            end subroutine
    "})]
    HostAssoc {
        /// Bind captured variables through hlfir.declare
        #[arg(long)]
        hlfir: bool,
    },
    /// Builds a single operation and legalizes it for LLVM export
    #[command(after_help = indoc! {"
        Examples:
            hostlower legalize --op arm_sve.convert_to_svbool --shape 2x[4]
            hostlower legalize --op vector.create_mask --shape [8]
    "})]
    Legalize {
        /// Name of the operation, an arm_sve operation or vector.create_mask
        #[arg(long)]
        op: String,
        /// Vector shape, scalable dimensions in brackets
        #[arg(long, default_value = "[4]")]
        shape: String,
    },
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let result = match args.command {
        Command::HostAssoc { hlfir } => host_assoc(hlfir),
        Command::Legalize { op, shape } => {
            let shape = parse_vector_shape(&shape).unwrap_or_else(|| {
                Args::command()
                    .error(
                        ErrorKind::InvalidValue,
                        format!("Invalid vector shape '{shape}'!"),
                    )
                    .exit()
            });
            legalize(&op, &shape)
        }
    };

    match result {
        Ok(functions) => {
            for function in &functions {
                if args.plain {
                    print!("{}", pretty_print::render_plain(function));
                } else {
                    pretty_print::pretty_print_function(function);
                }
            }
        }
        Err(error) => {
            log::error!("{error}");
            std::process::exit(1);
        }
    }
}

fn host_assoc(hlfir: bool) -> Result<Vec<Function>, Error> {
    let mut semantics = SymbolTable::new();
    let x = semantics.add_symbol(
        Symbol::object(
            "x",
            DeclaredType::Intrinsic {
                category: IntrinsicCategory::Integer,
                kind: 4,
            },
            ArraySpec::Scalar,
        )
        .at(Location::new(4, 18)),
    );
    let y = semantics.add_symbol(
        Symbol::object(
            "y",
            DeclaredType::Intrinsic {
                category: IntrinsicCategory::Real,
                kind: 4,
            },
            ArraySpec::AssumedShape(vec![Bound::Constant(1)]),
        )
        .with_attribute(SymbolAttribute::Dummy)
        .at(Location::new(3, 15)),
    );

    let host_scope = semantics.add_scope(Scope {
        name: InternedSymbol::new("host"),
        variables: vec![ScopeVariable::Symbol(x), ScopeVariable::Symbol(y)],
    });
    let internal_scope = semantics.add_scope(Scope {
        name: InternedSymbol::new("internal"),
        variables: Vec::new(),
    });

    let mut associations = HostAssociations::new();
    associations.add_symbols_to_bind(&semantics, [x, y], host_scope)?;

    let options = LoweringOptions {
        lower_to_high_level_fir: hlfir,
    };
    let host = ProcedureDescription {
        name: InternedSymbol::new("host"),
        scope: host_scope,
        dummies: vec![y],
    };
    let internal = ProcedureDescription {
        name: InternedSymbol::new("host.internal"),
        scope: internal_scope,
        dummies: Vec::new(),
    };

    let host = lower_host_procedure(&semantics, &options, &host, &[internal.name], &associations)?;
    let internal = lower_internal_procedure(&semantics, &options, &internal, &associations)?;

    Ok(vec![host.function, internal.function])
}

/// Parses `2x[4]` into sizes and scalability flags
fn parse_vector_shape(shape: &str) -> Option<(Vec<i64>, Vec<bool>)> {
    shape
        .split('x')
        .map(|dim| match dim.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']')?.parse().ok().map(|size| (size, true)),
            None => dim.parse().ok().map(|size| (size, false)),
        })
        .collect::<Option<Vec<(i64, bool)>>>()
        .filter(|dims| !dims.is_empty() && dims.iter().all(|(size, _)| *size > 0))
        .map(|dims| dims.into_iter().unzip())
}

fn legalize(op: &str, (shape, scalable): &(Vec<i64>, Vec<bool>)) -> Result<Vec<Function>, Error> {
    let vector_of = |element: Type| Type::vector(VectorType::new(shape, scalable, element));
    let predicate = VectorType::new(shape, scalable, Type::i1());
    let location = Location::new(1, 1);

    let mut function;
    if op == OpKind::VectorCreateMask.name() {
        function = Function::new(InternedSymbol::new("create_mask"), [Type::index()], []);
        let bound = function.arguments[0];
        let mut builder = FirOpBuilder::new(&mut function);
        hostlower::backend::vector::create_mask(&mut builder, location, bound, predicate);
    } else {
        let Ok(sve_op) = SveOp::from_str(op) else {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Unknown operation '{op}'!"),
                )
                .exit()
        };

        let inputs = match sve_op {
            SveOp::ConvertToSvbool => vec![Type::vector(predicate.clone())],
            SveOp::ConvertFromSvbool => vec![Type::vector(svbool_type_like(&predicate))],
            SveOp::Psel => vec![
                Type::vector(predicate.clone()),
                Type::vector(svbool_type_like(&predicate)),
                Type::index(),
            ],
            SveOp::ScalableMaskedAddF
            | SveOp::ScalableMaskedSubF
            | SveOp::ScalableMaskedMulF
            | SveOp::ScalableMaskedDivF => vec![
                Type::vector(predicate.clone()),
                vector_of(Type::float(FloatKind::F32)),
                vector_of(Type::float(FloatKind::F32)),
            ],
            SveOp::ScalableMaskedAddI
            | SveOp::ScalableMaskedSubI
            | SveOp::ScalableMaskedMulI
            | SveOp::ScalableMaskedSDivI
            | SveOp::ScalableMaskedUDivI => vec![
                Type::vector(predicate.clone()),
                vector_of(Type::i32()),
                vector_of(Type::i32()),
            ],
            SveOp::DupQLane => vec![vector_of(Type::i32())],
            SveOp::ZipX2 => vec![vector_of(Type::i32()); 2],
            SveOp::ZipX4 => vec![vector_of(Type::i32()); 4],
            SveOp::Sdot
            | SveOp::Smmla
            | SveOp::Udot
            | SveOp::Ummla
            | SveOp::Usmmla
            | SveOp::Bfmmla => vec![
                vector_of(Type::i32()),
                vector_of(Type::integer(8)),
                vector_of(Type::integer(8)),
            ],
        };

        function = Function::new(InternedSymbol::new("legalize"), inputs, []);
        let arguments = function.arguments.clone();
        let mut builder = FirOpBuilder::new(&mut function);
        match sve_op {
            SveOp::ConvertToSvbool => {
                arm_sve::convert_to_svbool(&mut builder, location, arguments[0]);
            }
            SveOp::ConvertFromSvbool => {
                arm_sve::convert_from_svbool(
                    &mut builder,
                    location,
                    arguments[0],
                    Type::vector(predicate),
                );
            }
            SveOp::Psel => {
                arm_sve::psel(&mut builder, location, arguments[0], arguments[1], arguments[2]);
            }
            SveOp::DupQLane => {
                arm_sve::dupq_lane(&mut builder, location, arguments[0], 0);
            }
            SveOp::ZipX2 | SveOp::ZipX4 => {
                arm_sve::zip(&mut builder, location, &arguments);
            }
            SveOp::Sdot
            | SveOp::Smmla
            | SveOp::Udot
            | SveOp::Ummla
            | SveOp::Usmmla
            | SveOp::Bfmmla => {
                arm_sve::dot_like(
                    &mut builder,
                    location,
                    sve_op,
                    arguments[0],
                    arguments[1],
                    arguments[2],
                );
            }
            _ => {
                arm_sve::masked_binary(
                    &mut builder,
                    location,
                    sve_op,
                    arguments[0],
                    arguments[1],
                    arguments[2],
                );
            }
        }
    }

    log::info!("input:\n{}", pretty_print::render_plain(&function));
    legalize_for_llvm_export(&mut function)?;
    Ok(vec![function])
}
