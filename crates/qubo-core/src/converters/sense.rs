use super::{Conversion, ConvertError, Converter, IdentityInterpreter};
use crate::problem::{Problem, Sense};

/// Rewrites a maximization as the minimization of the negated objective
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximizeToMinimize;

/// Rewrites a minimization as the maximization of the negated objective
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimizeToMaximize;

fn normalize(problem: &Problem, target: Sense) -> Result<Conversion<IdentityInterpreter>, ConvertError> {
    let mut result = problem.clone();
    if problem.objective().sense != target {
        result.set_objective(problem.objective().negated())?;
    }
    Ok(Conversion {
        problem: result,
        interpreter: IdentityInterpreter::new(problem.num_variables()),
    })
}

impl Converter for MaximizeToMinimize {
    type Interpreter = IdentityInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<IdentityInterpreter>, ConvertError> {
        normalize(problem, Sense::Minimize)
    }
}

impl Converter for MinimizeToMaximize {
    type Interpreter = IdentityInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<IdentityInterpreter>, ConvertError> {
        normalize(problem, Sense::Maximize)
    }
}
