//! Compiled formula representation
//!
//! A formula compiles to a postfix program over a value stack. Variables are
//! referenced by slot, the position of their first appearance in the source.

use std::fmt;

/// Built-in functions. Nothing else is callable from a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Abs,
    Min,
    Max,
    Pow,
}

impl Function {
    pub const ALL: [Function; 10] = [
        Function::Sqrt,
        Function::Exp,
        Function::Log,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Abs,
        Function::Min,
        Function::Max,
        Function::Pow,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|function| function.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sqrt => "sqrt",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::Pow => "pow",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Function::Min | Function::Max => Arity::AtLeast(2),
            Function::Pow => Arity::Exactly(2),
            _ => Arity::Exactly(1),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match *self {
            Arity::Exactly(n) => write!(f, "{n} argument{}", plural(n)),
            Arity::AtLeast(n) => write!(f, "at least {n} argument{}", plural(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
        }
    }

    /// Operation name used in domain errors.
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "addition",
            BinaryOp::Sub => "subtraction",
            BinaryOp::Mul => "multiplication",
            BinaryOp::Div => "division",
            BinaryOp::Pow => "exponentiation",
        }
    }
}

/// One postfix instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Push a literal.
    Const(f64),
    /// Push the value bound to a variable slot.
    Load(usize),
    /// Negate the top of the stack.
    Neg,
    /// Pop `rhs`, pop `lhs`, push `lhs op rhs`.
    Binary(BinaryOp),
    /// Pop `argc` arguments (first argument deepest), push the result.
    Call { function: Function, argc: usize },
}

impl Op {
    /// Net change in stack height after executing this op.
    pub(crate) fn stack_effect(&self) -> isize {
        match *self {
            Op::Const(_) | Op::Load(_) => 1,
            Op::Neg => 0,
            Op::Binary(_) => -1,
            Op::Call { argc, .. } => 1 - argc as isize,
        }
    }
}
