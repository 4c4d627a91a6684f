use tracing::{debug, warn};

use super::linear_equality_to_penalty::add_squared_residual;
use super::{
    Conversion, ConvertError, Converter, DEFAULT_PENALTY, IdentityInterpreter, require_binary,
    require_penalty, without_constraints,
};
use crate::expression::{AffineExpression, ExpressionBuilder, LinearExpression};
use crate::problem::{Constraint, ConstraintOp, Objective, Problem};
use crate::solution::DEFAULT_TOLERANCE;

const STAGE: &str = "LinearInequalityToPenalty";

/// Folds constraints over binary variables into the objective without slacks.
///
/// Each penalty is zero exactly on the assignments that satisfy its
/// constraint and at least `M` elsewhere. Supported inequality shapes:
///
/// - any constraint over at most two variables, penalized by the quadratic
///   interpolating its violation indicator;
/// - `sum(w * l_i) <= r` after complementing negatively weighted variables,
///   with one common weight `w` and at most one (or no) literal allowed to be
///   set, penalized by `sum(l_i l_j)` (or `sum(l_i)`).
///
/// Equalities are penalized by their squared residual. Anything else is
/// rejected.
#[derive(Debug, Clone)]
pub struct LinearInequalityToPenalty {
    penalty: f64,
    tolerance: f64,
}

impl Default for LinearInequalityToPenalty {
    fn default() -> Self {
        Self {
            penalty: DEFAULT_PENALTY,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl LinearInequalityToPenalty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    fn add_inequality(
        &self,
        builder: &mut ExpressionBuilder,
        c: &Constraint,
        scale: f64,
    ) -> Result<(), ConvertError> {
        let terms: Vec<(usize, f64)> = c.linear.iter().collect();
        if terms.len() <= 2 {
            self.add_indicator(builder, c, &terms, scale);
            return Ok(());
        }

        // Normalize to sum(w * l_i) <= rhs with every weight positive
        let flip = if c.op == ConstraintOp::Ge { -1.0 } else { 1.0 };
        let mut rhs = flip * c.rhs;
        let weight = (flip * terms[0].1).abs();
        let mut literals = Vec::with_capacity(terms.len());
        for &(var, coef) in &terms {
            let a = flip * coef;
            if (a.abs() - weight).abs() > self.tolerance {
                return Err(unsupported(c));
            }
            if a < 0.0 {
                // a x = a - a (1 - x)
                rhs -= a;
                literals.push(AffineExpression {
                    constant: 1.0,
                    linear: LinearExpression::from([(var, -1.0)]),
                });
            } else {
                literals.push(AffineExpression::variable(var));
            }
        }

        // How many literals may be set at once
        let allowed = (rhs / weight + self.tolerance).floor();
        if allowed >= literals.len() as f64 {
            debug!(constraint = %c.name, "constraint holds everywhere, no penalty needed");
        } else if allowed < 0.0 {
            warn!(constraint = %c.name, "constraint cannot be satisfied by any binary assignment");
            builder.constant += scale;
        } else if allowed == 0.0 {
            for literal in &literals {
                builder.add_affine(literal, scale);
            }
        } else if allowed == 1.0 {
            for (k, a) in literals.iter().enumerate() {
                for b in &literals[k + 1..] {
                    builder.add_product(a, b, scale);
                }
            }
        } else {
            return Err(unsupported(c));
        }
        Ok(())
    }

    /// Adds `scale` times the multilinear interpolation of "constraint
    /// violated" over the (at most two) variables of `terms`.
    fn add_indicator(
        &self,
        builder: &mut ExpressionBuilder,
        c: &Constraint,
        terms: &[(usize, f64)],
        scale: f64,
    ) {
        let violated = |mask: usize| -> f64 {
            let lhs: f64 = terms
                .iter()
                .enumerate()
                .filter(|&(k, _)| mask & (1 << k) != 0)
                .map(|(_, &(_, coef))| coef)
                .sum();
            let ok = match c.op {
                ConstraintOp::Le => lhs <= c.rhs + self.tolerance,
                ConstraintOp::Ge => lhs >= c.rhs - self.tolerance,
                ConstraintOp::Eq => (lhs - c.rhs).abs() <= self.tolerance,
            };
            if ok { 0.0 } else { 1.0 }
        };

        let f00 = violated(0);
        builder.constant += scale * f00;
        match terms {
            [] => {}
            [(x, _)] => {
                builder.linear.add_term(*x, scale * (violated(1) - f00));
            }
            [(x, _), (y, _), ..] => {
                let f10 = violated(1);
                let f01 = violated(2);
                let f11 = violated(3);
                builder.linear.add_term(*x, scale * (f10 - f00));
                builder.linear.add_term(*y, scale * (f01 - f00));
                builder.quadratic.add_term(*x, *y, scale * (f11 - f10 - f01 + f00));
            }
        }
        debug!(constraint = %c.name, "penalized constraint by its violation indicator");
    }
}

fn unsupported(c: &Constraint) -> ConvertError {
    ConvertError::PreconditionViolated {
        stage: STAGE,
        reason: format!("constraint {} has no slack-free quadratic penalty", c.name),
    }
}

impl Converter for LinearInequalityToPenalty {
    type Interpreter = IdentityInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<IdentityInterpreter>, ConvertError> {
        require_penalty(self.penalty, STAGE)?;
        require_binary(problem, STAGE)?;

        let objective = problem.objective();
        let scale = objective.sense.sign() * self.penalty;
        let mut builder = ExpressionBuilder {
            constant: objective.constant,
            linear: objective.linear.clone(),
            quadratic: objective.quadratic.clone(),
        };
        for c in problem.constraints() {
            match c.op {
                ConstraintOp::Eq => add_squared_residual(&mut builder, c, scale),
                ConstraintOp::Le | ConstraintOp::Ge => self.add_inequality(&mut builder, c, scale)?,
            }
        }

        let mut result = without_constraints(problem)?;
        result.set_objective(Objective::new(
            objective.sense,
            builder.constant,
            builder.linear,
            builder.quadratic,
        ))?;

        Ok(Conversion {
            problem: result,
            interpreter: IdentityInterpreter::new(problem.num_variables()),
        })
    }
}
