//! Problem rewriting stages.
//!
//! A [`Converter`] turns a [`Problem`] into a new problem together with an
//! [`Interpreter`] that maps solution vectors of the new problem back onto the
//! variables of the input problem. Interpreters carry everything they need, so
//! a converter can be reused for any number of independent conversions.

mod inequality_to_equality;
mod inequality_to_penalty;
mod integer_to_binary;
mod linear_equality_to_penalty;
mod sense;

pub use inequality_to_equality::{InequalityToEquality, SlackInterpreter, SlackMode};
pub use inequality_to_penalty::LinearInequalityToPenalty;
pub use integer_to_binary::{BinaryInterpreter, IntegerToBinary, MAX_INTEGER_RANGE, bounded_coefficients};
pub use linear_equality_to_penalty::LinearEqualityToPenalty;
pub use sense::{MaximizeToMinimize, MinimizeToMaximize};

use thiserror::Error;

use crate::problem::{Problem, ProblemError, VarType};

/// Penalty factor used when none is configured
pub const DEFAULT_PENALTY: f64 = 1e5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// `term` names the unbounded variable, or `rhs` for an infinite right-hand side
    #[error("Constraint {constraint} is unbounded in {term}; cannot size a slack")]
    UnboundedConstraint { constraint: String, term: String },
    #[error("Variable {variable} of kind {kind:?} is not supported by {stage}")]
    UnsupportedVariableKind {
        stage: &'static str,
        variable: String,
        kind: VarType,
    },
    #[error("{stage}: {reason}")]
    PreconditionViolated { stage: &'static str, reason: String },
    #[error("Expected a vector of length {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("No conversion has been performed yet")]
    StateNotInitialized,
    #[error(transparent)]
    Problem(#[from] ProblemError),
}

/// Maps a solution of a converted problem back to its source problem
pub trait Interpreter: Send + Sync {
    /// Variable count of the converted problem
    fn input_len(&self) -> usize;

    /// Variable count of the source problem
    fn output_len(&self) -> usize;

    /// `x` is indexed by the converted problem's variables; the result by the source's
    fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError>;

    fn check_len(&self, x: &[f64]) -> Result<(), ConvertError> {
        if x.len() != self.input_len() {
            return Err(ConvertError::DimensionMismatch {
                expected: self.input_len(),
                found: x.len(),
            });
        }
        Ok(())
    }
}

/// The rewritten problem plus the means to undo its variable substitution
#[derive(Debug, Clone)]
pub struct Conversion<I> {
    pub problem: Problem,
    pub interpreter: I,
}

pub trait Converter {
    type Interpreter: Interpreter + 'static;

    fn convert(&self, problem: &Problem) -> Result<Conversion<Self::Interpreter>, ConvertError>;
}

/// Interpreter for stages that keep the variable set untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityInterpreter {
    num_variables: usize,
}

impl IdentityInterpreter {
    pub fn new(num_variables: usize) -> Self {
        Self { num_variables }
    }
}

impl Interpreter for IdentityInterpreter {
    fn input_len(&self) -> usize {
        self.num_variables
    }

    fn output_len(&self) -> usize {
        self.num_variables
    }

    fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        self.check_len(x)?;
        Ok(x.to_vec())
    }
}

/// Interpreters of consecutive stages, applied last stage first.
///
/// An empty chain maps every vector to itself.
#[derive(Default)]
pub struct InterpreterChain {
    stages: Vec<Box<dyn Interpreter>>,
}

impl InterpreterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the interpreter of the stage that ran after all previously pushed ones
    pub fn push(&mut self, interpreter: impl Interpreter + 'static) {
        self.stages.push(Box::new(interpreter));
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for InterpreterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl Interpreter for InterpreterChain {
    fn input_len(&self) -> usize {
        self.stages.last().map(|s| s.input_len()).unwrap_or(0)
    }

    fn output_len(&self) -> usize {
        self.stages.first().map(|s| s.output_len()).unwrap_or(0)
    }

    fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        let mut current = x.to_vec();
        for stage in self.stages.iter().rev() {
            current = stage.interpret(&current)?;
        }
        Ok(current)
    }
}

/// Fails with `UnsupportedVariableKind` on the first variable that is not binary
pub(crate) fn require_binary(problem: &Problem, stage: &'static str) -> Result<(), ConvertError> {
    match problem.variables().iter().find(|v| v.var_type != VarType::Binary) {
        Some(v) => Err(ConvertError::UnsupportedVariableKind {
            stage,
            variable: v.name.clone(),
            kind: v.var_type,
        }),
        None => Ok(()),
    }
}

/// Penalty factors must be finite and strictly positive
pub(crate) fn require_penalty(penalty: f64, stage: &'static str) -> Result<(), ConvertError> {
    if penalty > 0.0 && penalty.is_finite() {
        Ok(())
    } else {
        Err(ConvertError::PreconditionViolated {
            stage,
            reason: format!("penalty must be finite and positive, got {}", penalty),
        })
    }
}

/// Copy of `problem` with the same variables and objective but no constraints
pub(crate) fn without_constraints(problem: &Problem) -> Result<Problem, ConvertError> {
    let mut result = Problem::new(problem.name());
    for var in problem.variables() {
        result.add_variable(var.clone())?;
    }
    result.set_objective(problem.objective().clone())?;
    Ok(result)
}
