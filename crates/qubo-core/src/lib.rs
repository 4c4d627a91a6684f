//! Rewrites mixed-integer quadratic programs into QUBO form.
//!
//! Each stage in [`converters`] produces a new [`Problem`] plus an
//! interpreter that maps solutions of that problem back to its input.
//! [`QuboConverter`] chains the stages needed to reach an unconstrained
//! binary quadratic objective.

pub mod converters;
mod expression;
mod pipeline;
mod problem;
mod solution;

pub use converters::{
    Conversion, ConvertError, Converter, DEFAULT_PENALTY, IdentityInterpreter, InequalityToEquality,
    IntegerToBinary, Interpreter, InterpreterChain, LinearEqualityToPenalty, LinearInequalityToPenalty,
    MAX_INTEGER_RANGE, MaximizeToMinimize, MinimizeToMaximize, SlackMode,
};
pub use expression::{AffineExpression, ExpressionBuilder, LinearExpression, QuadraticExpression, QuadraticTerm};
pub use pipeline::QuboConverter;
pub use problem::{Constraint, ConstraintOp, Objective, Problem, ProblemError, Sense, VarType, Variable};
pub use solution::{ConstraintViolation, DEFAULT_TOLERANCE};
