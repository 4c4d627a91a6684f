use crate::problem::{ConstraintOp, Problem, ProblemError, VarType};

/// Default tolerance for feasibility checks
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Information about a violated constraint or variable domain
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintViolation {
    /// Constraint or variable name
    pub constraint: String,
    /// Required value (constraint RHS or the nearest bound)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the requirement is missed by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl Problem {
    fn check_solution_len(&self, x: &[f64]) -> Result<(), ProblemError> {
        if x.len() != self.num_variables() {
            return Err(ProblemError::SolutionLength {
                expected: self.num_variables(),
                found: x.len(),
            });
        }
        Ok(())
    }

    /// Objective value at `x`
    pub fn evaluate(&self, x: &[f64]) -> Result<f64, ProblemError> {
        self.check_solution_len(x)?;
        Ok(self.objective().evaluate(x))
    }

    /// Every constraint, bound and integrality requirement `x` misses, worst first
    pub fn violations(&self, x: &[f64], tolerance: f64) -> Result<Vec<ConstraintViolation>, ProblemError> {
        self.check_solution_len(x)?;
        let mut violations = Vec::new();

        for (var, &value) in self.variables().iter().zip(x) {
            if value < var.lower - tolerance {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: var.lower,
                    actual: value,
                    violation_amount: var.lower - value,
                    description: format!("{} is below its lower bound {} by {}", var.name, var.lower, var.lower - value),
                });
            } else if value > var.upper + tolerance {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: var.upper,
                    actual: value,
                    violation_amount: value - var.upper,
                    description: format!("{} exceeds its upper bound {} by {}", var.name, var.upper, value - var.upper),
                });
            }

            if var.var_type != VarType::Continuous {
                let nearest = value.round();
                let gap = (value - nearest).abs();
                if gap > tolerance {
                    violations.push(ConstraintViolation {
                        constraint: var.name.clone(),
                        required: nearest,
                        actual: value,
                        violation_amount: gap,
                        description: format!("{} must be integral but is {}", var.name, value),
                    });
                }
            }
        }

        for c in self.constraints() {
            let lhs = c.lhs(x);

            let (is_violated, violation_amount, description) = match c.op {
                ConstraintOp::Le => {
                    if lhs > c.rhs + tolerance {
                        let amt = lhs - c.rhs;
                        (true, amt, format!("{} exceeds maximum of {} by {}", c.name, c.rhs, amt))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
                ConstraintOp::Ge => {
                    if lhs < c.rhs - tolerance {
                        let amt = c.rhs - lhs;
                        (true, amt, format!("{} is below minimum of {} by {}", c.name, c.rhs, amt))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
                ConstraintOp::Eq => {
                    let diff = (lhs - c.rhs).abs();
                    if diff > tolerance {
                        (true, diff, format!("{} requires exactly {} but got {}", c.name, c.rhs, lhs))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
            };

            if is_violated {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        // Sort by violation amount (worst first)
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));

        Ok(violations)
    }

    pub fn is_feasible(&self, x: &[f64], tolerance: f64) -> Result<bool, ProblemError> {
        Ok(self.violations(x, tolerance)?.is_empty())
    }
}
