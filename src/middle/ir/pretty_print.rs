use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::ir::{Attribute, Block, Function, OpKind, Operation, ValueId},
};

pub fn pretty_print_function(function: &Function) {
    print!("{}", render_function(function));
}

/// Renders a function without color codes, the form used by tests and by
/// `--plain` output
pub fn render_plain(function: &Function) -> String {
    strip_ansi_escapes::strip_str(render_function(function))
}

pub fn render_function(function: &Function) -> String {
    let mut out = String::new();

    let arguments = function
        .arguments
        .iter()
        .map(|arg| format!("{}: {}", value_name(*arg), function.value_type(*arg).colored()))
        .join(", ");

    let results = if function.results.is_empty() {
        String::new()
    } else {
        format!(
            " -> ({})",
            function.results.iter().map(|ty| ty.colored()).join(", ")
        )
    };

    let _ = writeln!(
        out,
        "{} {}({arguments}){results} {}",
        "func".magenta(),
        format!("@{}", function.name).blue(),
        "{".white()
    );

    render_block(&mut out, function, &function.body, 1);

    let _ = writeln!(out, "{}", "}".white());

    out
}

fn value_name(value: ValueId) -> String {
    format!("%{}", value.index())
}

fn render_block(out: &mut String, function: &Function, block: &Block, depth: usize) {
    for operation in &block.operations {
        render_operation(out, function, operation, depth);
    }
}

fn render_operation(out: &mut String, function: &Function, operation: &Operation, depth: usize) {
    let indent = "  ".repeat(depth);

    if let OpKind::If = operation.kind {
        let _ = writeln!(
            out,
            "{indent}{} {} {}",
            operation.name().cyan(),
            value_name(operation.operands[0]),
            "{".white()
        );
        render_block(out, function, &operation.regions[0], depth + 1);
        if !operation.regions[1].operations.is_empty() {
            let _ = writeln!(out, "{indent}{} {}", "} else".white(), "{".white());
            render_block(out, function, &operation.regions[1], depth + 1);
        }
        let _ = writeln!(out, "{indent}{}", "}".white());
        return;
    }

    let _ = write!(out, "{indent}");

    if !operation.results.is_empty() {
        let _ = write!(
            out,
            "{} {} ",
            operation.results.iter().map(|r| value_name(*r)).join(", "),
            "=".white()
        );
    }

    let _ = write!(out, "{}", operation.name().cyan());

    match &operation.kind {
        OpKind::Constant(attribute) => {
            let _ = write!(
                out,
                " {} : {}",
                format_attribute(attribute).purple(),
                function.value_type(operation.result()).colored()
            );
            let _ = writeln!(out);
            return;
        }
        OpKind::CmpI(predicate) => {
            let _ = write!(out, " {predicate},");
        }
        OpKind::Alloca { in_type } => {
            let _ = write!(out, " {}", in_type.colored());
        }
        OpKind::AddressOf { symbol } => {
            let _ = write!(out, "({})", format!("@{symbol}").blue());
        }
        OpKind::Call { callee } => {
            let _ = write!(out, " {}", format!("@{callee}").blue());
        }
        _ => {}
    }

    if !operation.operands.is_empty() {
        let _ = write!(
            out,
            " {}",
            operation.operands.iter().map(|v| value_name(*v)).join(", ")
        );
    }

    match &operation.kind {
        OpKind::VectorExtract { position } | OpKind::VectorInsert { position } => {
            let _ = write!(out, "[{}]", position.iter().join(", "));
        }
        OpKind::Declare {
            uniq_name,
            host_assoc,
        } => {
            let flags = if *host_assoc { ", host_assoc" } else { "" };
            let _ = write!(out, " {{uniq_name = \"{uniq_name}\"{flags}}}");
        }
        _ => {}
    }

    if !operation.attributes.is_empty() {
        let _ = write!(
            out,
            " {{{}}}",
            operation
                .attributes
                .iter()
                .map(|(name, value)| format!("{name} = {}", format_attribute(value)))
                .join(", ")
        );
    }

    let operand_types = operation
        .operands
        .iter()
        .map(|v| function.value_type(*v).colored())
        .join(", ");
    let result_types = operation
        .results
        .iter()
        .map(|v| function.value_type(*v).colored())
        .join(", ");

    let _ = writeln!(out, " : ({operand_types}) -> ({result_types})");
}

fn format_attribute(attribute: &Attribute) -> String {
    match attribute {
        Attribute::Int(value) => value.to_string(),
        Attribute::Bool(value) => value.to_string(),
        Attribute::Zero => "zero".to_string(),
        Attribute::Symbol(symbol) => format!("@{symbol}"),
        Attribute::Unit => "unit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        intern::InternedSymbol,
        middle::{
            ir::{Location, builder::FirOpBuilder},
            ty::Type,
        },
    };

    #[test]
    fn renders_plain_text() {
        let mut function = Function::new(
            InternedSymbol::new("store_one"),
            [Type::reference(Type::i32())],
            [],
        );
        let address = function.arguments[0];
        let mut builder = FirOpBuilder::new(&mut function);
        let one = builder.create_integer_constant(Location::UNKNOWN, Type::i32(), 1);
        builder.create_store(Location::UNKNOWN, one, address);

        assert_eq!(
            render_plain(&function),
            indoc! {"
                func @store_one(%0: !fir.ref<i32>) {
                  %1 = arith.constant 1 : i32
                  fir.store %1, %0 : (i32, !fir.ref<i32>) -> ()
                }
            "}
        );
    }
}
