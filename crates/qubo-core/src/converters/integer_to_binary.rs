use tracing::debug;

use super::{Conversion, ConvertError, Converter, Interpreter};
use crate::expression::{AffineExpression, ExpressionBuilder, LinearExpression};
use crate::problem::{Objective, Problem, VarType, Variable};

const STAGE: &str = "IntegerToBinary";

/// Widest integer range that can be encoded: beyond `2^53` an `f64` no
/// longer represents every integer of the range.
pub const MAX_INTEGER_RANGE: f64 = 9_007_199_254_740_992.0;

/// Weights of the bounded-coefficient encoding of `[0, range]`.
///
/// Powers of two `1, 2, ..., 2^(m-1)` for the largest `m` with `2^m - 1 <= range`,
/// followed by `range - (2^m - 1)` when that remainder is positive. Every
/// subset sum lies in `[0, range]` and every integer of that interval is one.
pub fn bounded_coefficients(range: u64) -> Vec<u64> {
    let mut coefficients = Vec::new();
    let mut covered = 0u64;
    let mut power = 1u64;
    // covered == power - 1, so neither side overflows
    while power <= range - covered {
        coefficients.push(power);
        covered += power;
        match power.checked_mul(2) {
            Some(next) => power = next,
            None => break,
        }
    }
    if covered < range {
        coefficients.push(range - covered);
    }
    coefficients
}

/// Replaces each bounded integer variable `v` in `[lb, ub]` by
/// `lb + sum(c_k * v@k)` over new binary variables `v@k`.
///
/// The binary expansion takes the integer's position in the variable order;
/// binary variables are kept. Continuous variables cannot be encoded and are
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct IntegerToBinary;

impl IntegerToBinary {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for IntegerToBinary {
    type Interpreter = BinaryInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<BinaryInterpreter>, ConvertError> {
        let mut result = Problem::new(problem.name());
        let mut substitutions = Vec::with_capacity(problem.num_variables());
        let mut encodings = Vec::with_capacity(problem.num_variables());

        for var in problem.variables() {
            match var.var_type {
                VarType::Binary => {
                    let index = result.add_variable(var.clone())?;
                    substitutions.push(AffineExpression::variable(index));
                    encodings.push(Encoding::Copy(index));
                }
                VarType::Integer => {
                    let range = var.upper - var.lower;
                    if range > MAX_INTEGER_RANGE {
                        return Err(ConvertError::PreconditionViolated {
                            stage: STAGE,
                            reason: format!(
                                "integer variable {} spans {}, wider than 2^53 cannot be encoded exactly",
                                var.name, range
                            ),
                        });
                    }
                    let coefficients = bounded_coefficients(range as u64);
                    let start = result.num_variables();
                    let mut linear = LinearExpression::new();
                    for (k, &c) in coefficients.iter().enumerate() {
                        let index = result.add_variable(Variable::binary(format!("{}@{}", var.name, k)))?;
                        linear.add_term(index, c as f64);
                    }
                    debug!(variable = %var.name, ?coefficients, "encoded integer variable");
                    substitutions.push(AffineExpression { constant: var.lower, linear });
                    encodings.push(Encoding::Integer {
                        lower: var.lower,
                        start,
                        coefficients,
                    });
                }
                VarType::Continuous => {
                    return Err(ConvertError::UnsupportedVariableKind {
                        stage: STAGE,
                        variable: var.name.clone(),
                        kind: var.var_type,
                    });
                }
            }
        }

        let objective = problem.objective();
        let mut builder = ExpressionBuilder::new();
        builder.constant = objective.constant;
        builder.add_substituted_linear(&objective.linear, &substitutions);
        builder.add_substituted_quadratic(&objective.quadratic, &substitutions);
        result.set_objective(Objective::new(
            objective.sense,
            builder.constant,
            builder.linear,
            builder.quadratic,
        ))?;

        for c in problem.constraints() {
            let mut builder = ExpressionBuilder::new();
            builder.add_substituted_linear(&c.linear, &substitutions);
            result.add_constraint(c.name.clone(), builder.linear, c.op, c.rhs - builder.constant)?;
        }

        let interpreter = BinaryInterpreter {
            num_binary: result.num_variables(),
            encodings,
        };
        Ok(Conversion { problem: result, interpreter })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Encoding {
    /// Binary variable kept at the given output index
    Copy(usize),
    /// `lower + sum(coefficients[k] * x[start + k])`
    Integer {
        lower: f64,
        start: usize,
        coefficients: Vec<u64>,
    },
}

/// Folds binary expansions back into integer values
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInterpreter {
    num_binary: usize,
    encodings: Vec<Encoding>,
}

impl BinaryInterpreter {
    /// Maps an assignment of the source variables to one of the binary
    /// variables. Integer values are rounded and clamped to their bounds.
    pub fn encode(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        if x.len() != self.encodings.len() {
            return Err(ConvertError::DimensionMismatch {
                expected: self.encodings.len(),
                found: x.len(),
            });
        }

        let mut bits = vec![0.0; self.num_binary];
        for (encoding, &value) in self.encodings.iter().zip(x) {
            match encoding {
                Encoding::Copy(index) => bits[*index] = value,
                Encoding::Integer { lower, start, coefficients } => {
                    let range: u64 = coefficients.iter().sum();
                    let mut rest = ((value - lower).round().max(0.0) as u64).min(range);
                    let powers = coefficients
                        .iter()
                        .enumerate()
                        .take_while(|&(k, &c)| 1u64.checked_shl(k as u32) == Some(c))
                        .count();
                    let span = 1u64.checked_shl(powers as u32).map_or(u64::MAX, |p| p - 1);
                    // Values above the power-of-two span need the corrective weight
                    if rest > span {
                        bits[start + powers] = 1.0;
                        rest -= coefficients[powers];
                    }
                    for k in 0..powers {
                        if rest & (1 << k) != 0 {
                            bits[start + k] = 1.0;
                        }
                    }
                }
            }
        }
        Ok(bits)
    }
}

impl Interpreter for BinaryInterpreter {
    fn input_len(&self) -> usize {
        self.num_binary
    }

    fn output_len(&self) -> usize {
        self.encodings.len()
    }

    fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        self.check_len(x)?;
        Ok(self
            .encodings
            .iter()
            .map(|encoding| match encoding {
                Encoding::Copy(index) => x[*index],
                Encoding::Integer { lower, start, coefficients } => {
                    lower
                        + coefficients
                            .iter()
                            .enumerate()
                            .map(|(k, &c)| c as f64 * x[start + k])
                            .sum::<f64>()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::QuadraticExpression;
    use crate::problem::ConstraintOp;

    #[test]
    fn test_documented_coefficients() {
        assert_eq!(bounded_coefficients(7), vec![1, 2, 4]);
        assert_eq!(bounded_coefficients(6), vec![1, 2, 3]);
        assert_eq!(bounded_coefficients(8), vec![1, 2, 4, 1]);
        assert_eq!(bounded_coefficients(1), vec![1]);
        assert_eq!(bounded_coefficients(0), Vec::<u64>::new());
    }

    #[test]
    fn test_coefficients_cover_range_exactly() {
        for range in 0..=40u64 {
            let coefficients = bounded_coefficients(range);
            let k = coefficients.len();
            // ceil(log2(range + 1))
            let bound = (u64::BITS - range.leading_zeros()) as usize;
            assert!(k <= bound, "range {}: {} weights", range, k);

            let mut reachable = vec![false; range as usize + 1];
            for mask in 0..(1u32 << k) {
                let sum: u64 = (0..k).filter(|&i| mask & (1 << i) != 0).map(|i| coefficients[i]).sum();
                assert!(sum <= range, "range {}: subset sum {} escapes", range, sum);
                reachable[sum as usize] = true;
            }
            assert!(reachable.iter().all(|&r| r), "range {}: gap in coverage", range);
        }
    }

    #[test]
    fn test_coefficients_of_widest_ranges() {
        let widest = bounded_coefficients(u64::MAX);
        assert_eq!(widest.len(), 64);
        assert_eq!(widest.last(), Some(&(1u64 << 63)));

        let almost = bounded_coefficients(u64::MAX - 1);
        assert_eq!(almost.len(), 64);
        assert_eq!(almost.last(), Some(&((1u64 << 63) - 1)));
        assert_eq!(almost.iter().fold(0u64, |acc, &c| acc.wrapping_add(c)), u64::MAX - 1);
    }

    #[test]
    fn test_too_wide_integer_rejected() {
        let mut huge = Problem::new("huge");
        huge.add_integer("v", 0.0, 1e20).unwrap();
        assert!(matches!(
            IntegerToBinary::new().convert(&huge),
            Err(ConvertError::PreconditionViolated { stage: STAGE, .. })
        ));

        // 2^53 + 1 rounds to 2^53 in f64, so the span becomes 2^54
        let mut symmetric = Problem::new("symmetric");
        let edge = 9_007_199_254_740_993.0;
        symmetric.add_integer("v", -edge, edge).unwrap();
        assert!(IntegerToBinary::new().convert(&symmetric).is_err());
    }

    #[test]
    fn test_widest_exact_range_round_trips() {
        let mut problem = Problem::new("wide");
        problem.add_integer("v", 0.0, MAX_INTEGER_RANGE).unwrap();

        let conversion = IntegerToBinary::new().convert(&problem).unwrap();
        assert_eq!(conversion.problem.num_variables(), 54);

        let bits = conversion.interpreter.encode(&[MAX_INTEGER_RANGE]).unwrap();
        assert!(bits.iter().all(|&b| b == 1.0));
        assert_eq!(conversion.interpreter.interpret(&bits).unwrap(), vec![MAX_INTEGER_RANGE]);

        let bits = conversion.interpreter.encode(&[12345.0]).unwrap();
        assert_eq!(conversion.interpreter.interpret(&bits).unwrap(), vec![12345.0]);
    }

    fn integer_problem() -> Problem {
        // minimize x*z + 2y - z s.t. x + y + z <= 5, x binary, y in [-2, 3], z in [0, 6]
        let mut problem = Problem::new("ints");
        let x = problem.add_binary("x").unwrap();
        let y = problem.add_integer("y", -2.0, 3.0).unwrap();
        let z = problem.add_integer("z", 0.0, 6.0).unwrap();
        problem
            .minimize(
                1.5,
                LinearExpression::from([(y, 2.0), (z, -1.0)]),
                QuadraticExpression::from([(x, z, 1.0), (y, z, -0.5), (z, z, 2.0)]),
            )
            .unwrap();
        problem
            .add_constraint("sum", LinearExpression::from([(x, 1.0), (y, 1.0), (z, 1.0)]), ConstraintOp::Le, 5.0)
            .unwrap();
        problem
    }

    #[test]
    fn test_layout_and_names() {
        let conversion = IntegerToBinary::new().convert(&integer_problem()).unwrap();
        let names: Vec<&str> = conversion.problem.variables().iter().map(|v| v.name.as_str()).collect();

        // y spans 5 -> [1, 2, 2]; z spans 6 -> [1, 2, 3]
        assert_eq!(names, vec!["x", "y@0", "y@1", "y@2", "z@0", "z@1", "z@2"]);
        assert!(conversion.problem.variables().iter().all(|v| v.var_type == VarType::Binary));
        // sum: x + (-2 + y@0 + 2y@1 + 2y@2) + (z@0 + 2z@1 + 3z@2) <= 5
        let sum = &conversion.problem.constraints()[0];
        assert_eq!(sum.rhs, 7.0);
        assert_eq!(sum.linear.coefficient(6), 3.0);
    }

    #[test]
    fn test_objective_and_constraints_agree_on_every_point() {
        let problem = integer_problem();
        let conversion = IntegerToBinary::new().convert(&problem).unwrap();
        let converted = &conversion.problem;
        let interpreter = &conversion.interpreter;

        for x in 0..2 {
            for y in -2..=3 {
                for z in 0..=6 {
                    let point = [x as f64, y as f64, z as f64];
                    let bits = interpreter.encode(&point).unwrap();
                    assert_eq!(interpreter.interpret(&bits).unwrap(), point.to_vec());

                    let original = problem.evaluate(&point).unwrap();
                    let encoded = converted.evaluate(&bits).unwrap();
                    assert!((original - encoded).abs() < 1e-9, "{:?}: {} vs {}", point, original, encoded);
                    assert_eq!(
                        problem.is_feasible(&point, 1e-9).unwrap(),
                        converted.is_feasible(&bits, 1e-9).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_interpret_uses_source_order() {
        let conversion = IntegerToBinary::new().convert(&integer_problem()).unwrap();
        // x = 1, y = -2 + 1 + 2 = 1, z = 2 + 3 = 5
        let values = conversion.interpreter.interpret(&[1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        assert_eq!(values, vec![1.0, 1.0, 5.0]);

        assert_eq!(
            conversion.interpreter.interpret(&[1.0, 1.0]),
            Err(ConvertError::DimensionMismatch { expected: 7, found: 2 })
        );
    }

    #[test]
    fn test_fixed_integer_becomes_constant() {
        let mut problem = Problem::new("fixed");
        let f = problem.add_integer("f", 4.0, 4.0).unwrap();
        problem
            .maximize(0.0, LinearExpression::from([(f, 3.0)]), QuadraticExpression::new())
            .unwrap();

        let conversion = IntegerToBinary::new().convert(&problem).unwrap();
        assert_eq!(conversion.problem.num_variables(), 0);
        assert_eq!(conversion.problem.objective().constant, 12.0);
        assert_eq!(conversion.interpreter.interpret(&[]).unwrap(), vec![4.0]);
    }

    #[test]
    fn test_continuous_variable_rejected() {
        let mut problem = Problem::new("cont");
        problem.add_continuous("c", 0.0, 1.0).unwrap();

        let err = IntegerToBinary::new().convert(&problem).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedVariableKind { kind: VarType::Continuous, .. }
        ));
    }
}
