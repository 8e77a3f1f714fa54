//! Stack machine for compiled formulas
//!
//! Every intermediate result is checked: an operation that leaves the real
//! line (log of a non-positive number, sqrt of a negative number, division by
//! zero, overflow to infinity, NaN) fails with [`SimError::Domain`].

use super::program::{BinaryOp, Function, Op};
use crate::SimError;

/// Run `program`, reading variable slots through `lookup`.
///
/// `names` maps slots back to identifiers for error messages. `stack` is
/// scratch space, cleared on entry.
pub(crate) fn execute<F>(
    program: &[Op],
    names: &[String],
    lookup: F,
    stack: &mut Vec<f64>,
) -> Result<f64, SimError>
where
    F: Fn(usize) -> f64,
{
    stack.clear();

    for op in program {
        match *op {
            Op::Const(value) => stack.push(value),
            Op::Load(slot) => {
                let value = lookup(slot);
                if !value.is_finite() {
                    let name = names.get(slot).map(String::as_str).unwrap_or("?");
                    return Err(SimError::domain(
                        "variable binding",
                        format!("'{name}' is bound to {value}"),
                    ));
                }
                stack.push(value);
            }
            Op::Neg => {
                let value = pop(stack)?;
                stack.push(-value);
            }
            Op::Binary(op) => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                stack.push(binary(op, lhs, rhs)?);
            }
            Op::Call { function, argc } => {
                let start = stack.len().checked_sub(argc).ok_or_else(underflow)?;
                let value = call(function, &stack[start..])?;
                stack.truncate(start);
                stack.push(value);
            }
        }
    }

    let result = pop(stack)?;
    if !stack.is_empty() {
        return Err(underflow());
    }
    Ok(result)
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, SimError> {
    stack.pop().ok_or_else(underflow)
}

// Only reachable through a hand-built program; the parser never emits one.
fn underflow() -> SimError {
    SimError::Syntax {
        position: 0,
        message: "malformed formula program".to_string(),
    }
}

fn finite(
    operation: &'static str,
    value: f64,
    detail: impl FnOnce() -> String,
) -> Result<f64, SimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::domain(operation, detail()))
    }
}

fn binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64, SimError> {
    let value = match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => {
            if rhs == 0.0 {
                return Err(SimError::domain("division", format!("{lhs} / 0 is undefined")));
            }
            lhs / rhs
        }
        BinaryOp::Pow => return power(op.name(), lhs, rhs),
    };
    finite(op.name(), value, || {
        format!("{lhs} {} {rhs} is not a finite number", op.symbol())
    })
}

fn power(operation: &'static str, base: f64, exponent: f64) -> Result<f64, SimError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(SimError::domain(
            operation,
            format!("0 cannot be raised to the negative power {exponent}"),
        ));
    }
    let value = base.powf(exponent);
    if value.is_nan() {
        return Err(SimError::domain(
            operation,
            format!("{base} ** {exponent} is not a real number"),
        ));
    }
    finite(operation, value, || format!("{base} ** {exponent} overflowed"))
}

fn call(function: Function, args: &[f64]) -> Result<f64, SimError> {
    let name = function.name();
    let arg = |i: usize| args.get(i).copied().ok_or_else(underflow);

    match function {
        Function::Sqrt => {
            let x = arg(0)?;
            if x < 0.0 {
                return Err(SimError::domain(name, format!("argument must be >= 0, got {x}")));
            }
            Ok(x.sqrt())
        }
        Function::Log => {
            let x = arg(0)?;
            if x <= 0.0 {
                return Err(SimError::domain(name, format!("argument must be > 0, got {x}")));
            }
            Ok(x.ln())
        }
        Function::Exp => {
            let x = arg(0)?;
            finite(name, x.exp(), || format!("exp({x}) overflowed"))
        }
        Function::Sin => Ok(arg(0)?.sin()),
        Function::Cos => Ok(arg(0)?.cos()),
        Function::Tan => {
            let x = arg(0)?;
            finite(name, x.tan(), || format!("tan({x}) is not a finite number"))
        }
        Function::Abs => Ok(arg(0)?.abs()),
        Function::Min => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or_else(underflow),
        Function::Max => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or_else(underflow),
        Function::Pow => power(name, arg(0)?, arg(1)?),
    }
}
