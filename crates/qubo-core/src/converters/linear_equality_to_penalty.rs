use tracing::debug;

use super::{
    Conversion, ConvertError, Converter, DEFAULT_PENALTY, IdentityInterpreter, require_binary,
    require_penalty, without_constraints,
};
use crate::expression::ExpressionBuilder;
use crate::problem::{Constraint, ConstraintOp, Objective, Problem};

const STAGE: &str = "LinearEqualityToPenalty";

/// Folds equality constraints over binary variables into the objective.
///
/// Each `sum(a_i x_i) == b` adds `sign * M * (b - sum(a_i x_i))^2`, where
/// `sign` follows the objective sense so the penalty always works against the
/// optimizer. The square is expanded using `x_i^2 = x_i`.
#[derive(Debug, Clone)]
pub struct LinearEqualityToPenalty {
    penalty: f64,
}

impl Default for LinearEqualityToPenalty {
    fn default() -> Self {
        Self { penalty: DEFAULT_PENALTY }
    }
}

impl LinearEqualityToPenalty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }
}

/// Add `scale * (rhs - lhs)^2` for a constraint over binary variables
pub(crate) fn add_squared_residual(builder: &mut ExpressionBuilder, c: &Constraint, scale: f64) {
    let b = c.rhs;
    builder.constant += scale * b * b;
    let terms: Vec<(usize, f64)> = c.linear.iter().collect();
    for (k, &(i, a_i)) in terms.iter().enumerate() {
        // a_i^2 x_i^2 - 2 b a_i x_i with x_i^2 = x_i
        builder.linear.add_term(i, scale * (a_i * a_i - 2.0 * b * a_i));
        for &(j, a_j) in &terms[k + 1..] {
            builder.quadratic.add_term(i, j, scale * 2.0 * a_i * a_j);
        }
    }
}

impl Converter for LinearEqualityToPenalty {
    type Interpreter = IdentityInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<IdentityInterpreter>, ConvertError> {
        require_penalty(self.penalty, STAGE)?;
        require_binary(problem, STAGE)?;
        if let Some(c) = problem.constraints().iter().find(|c| c.op != ConstraintOp::Eq) {
            return Err(ConvertError::PreconditionViolated {
                stage: STAGE,
                reason: format!("constraint {} is not an equality", c.name),
            });
        }

        let objective = problem.objective();
        let scale = objective.sense.sign() * self.penalty;
        let mut builder = ExpressionBuilder {
            constant: objective.constant,
            linear: objective.linear.clone(),
            quadratic: objective.quadratic.clone(),
        };
        for c in problem.constraints() {
            debug!(constraint = %c.name, penalty = self.penalty, "penalized equality constraint");
            add_squared_residual(&mut builder, c, scale);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::Interpreter;
    use crate::expression::{LinearExpression, QuadraticExpression};
    use crate::problem::Sense;

    fn equality_problem(sense: Sense) -> Problem {
        // objective x0 - 2 x1 + x1 x2, constraints x0 + 2 x1 - x2 == 1, x1 + x2 == 1
        let mut problem = Problem::new("eq");
        for name in ["x0", "x1", "x2"] {
            problem.add_binary(name).unwrap();
        }
        problem
            .set_objective(Objective::new(
                sense,
                0.0,
                LinearExpression::from([(0, 1.0), (1, -2.0)]),
                QuadraticExpression::from([(1, 2, 1.0)]),
            ))
            .unwrap();
        problem
            .add_constraint("a", LinearExpression::from([(0, 1.0), (1, 2.0), (2, -1.0)]), ConstraintOp::Eq, 1.0)
            .unwrap();
        problem
            .add_constraint("b", LinearExpression::from([(1, 1.0), (2, 1.0)]), ConstraintOp::Eq, 1.0)
            .unwrap();
        problem
    }

    fn points(n: usize) -> impl Iterator<Item = Vec<f64>> {
        (0..1u32 << n).map(move |mask| (0..n).map(|k| f64::from((mask >> k) & 1)).collect())
    }

    #[test]
    fn test_penalty_zero_exactly_at_feasible_points() {
        for sense in [Sense::Minimize, Sense::Maximize] {
            let problem = equality_problem(sense);
            let converted = LinearEqualityToPenalty::new().with_penalty(10.0).convert(&problem).unwrap().problem;

            assert_eq!(converted.num_constraints(), 0);
            assert_eq!(converted.objective().sense, sense);

            for x in points(3) {
                let added = converted.evaluate(&x).unwrap() - problem.evaluate(&x).unwrap();
                let contribution = added * sense.sign();
                if problem.is_feasible(&x, 1e-9).unwrap() {
                    assert!(contribution.abs() < 1e-9, "{:?}: penalty {}", x, contribution);
                } else {
                    assert!(contribution > 0.5, "{:?}: penalty {}", x, contribution);
                }
            }
        }
    }

    #[test]
    fn test_expansion_coefficients() {
        // M * (1 - x - y)^2 = M * (1 - x - y + 2xy)
        let mut problem = Problem::new("pair");
        let x = problem.add_binary("x").unwrap();
        let y = problem.add_binary("y").unwrap();
        problem
            .add_constraint("one", LinearExpression::from([(x, 1.0), (y, 1.0)]), ConstraintOp::Eq, 1.0)
            .unwrap();

        let objective = LinearEqualityToPenalty::new().convert(&problem).unwrap().problem.objective().clone();
        assert_eq!(objective.constant, 1e5);
        assert_eq!(objective.linear.coefficient(x), -1e5);
        assert_eq!(objective.linear.coefficient(y), -1e5);
        assert_eq!(objective.quadratic.coefficient(x, y), 2e5);
        assert_eq!(objective.quadratic.coefficient(x, x), 0.0);
    }

    #[test]
    fn test_repeated_conversion_is_bit_identical() {
        let problem = equality_problem(Sense::Minimize);
        let converter = LinearEqualityToPenalty::new();
        let first = converter.convert(&problem).unwrap().problem;
        let second = converter.convert(&problem).unwrap().problem;
        assert_eq!(first, second);
    }

    #[test]
    fn test_inequality_rejected() {
        let mut problem = Problem::new("ineq");
        let x = problem.add_binary("x").unwrap();
        problem
            .add_constraint("le", LinearExpression::from([(x, 1.0)]), ConstraintOp::Le, 1.0)
            .unwrap();

        let err = LinearEqualityToPenalty::new().convert(&problem).unwrap_err();
        assert!(matches!(err, ConvertError::PreconditionViolated { .. }));
    }

    #[test]
    fn test_integer_rejected() {
        let mut problem = Problem::new("int");
        problem.add_integer("i", 0.0, 3.0).unwrap();

        let err = LinearEqualityToPenalty::new().convert(&problem).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedVariableKind { .. }));
    }

    #[test]
    fn test_non_positive_penalty_rejected() {
        let problem = equality_problem(Sense::Minimize);
        for penalty in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = LinearEqualityToPenalty::new().with_penalty(penalty).convert(&problem).unwrap_err();
            assert!(matches!(err, ConvertError::PreconditionViolated { stage: STAGE, .. }), "penalty {}", penalty);
        }
    }

    #[test]
    fn test_interpret_is_identity() {
        let conversion = LinearEqualityToPenalty::new().convert(&equality_problem(Sense::Minimize)).unwrap();
        assert_eq!(conversion.interpreter.interpret(&[1.0, 0.0, 1.0]).unwrap(), vec![1.0, 0.0, 1.0]);
        assert!(conversion.interpreter.interpret(&[1.0]).is_err());
    }
}
