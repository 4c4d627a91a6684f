use tracing::{debug, warn};

use super::{Conversion, ConvertError, Converter, Interpreter};
use crate::expression::LinearExpression;
use crate::problem::{Constraint, ConstraintOp, Problem, Variable};

const STAGE: &str = "InequalityToEquality";

/// Domain of the slack variables introduced for inequalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlackMode {
    /// Integer slacks only; fails on constraints that are not integer-valued
    Integer,
    /// Continuous slacks, right-hand sides kept as they are
    Continuous,
    /// Integer slacks where the expression is integer-valued, continuous otherwise
    #[default]
    Auto,
}

/// Rewrites every `<=`/`>=` constraint as an equality with a bounded slack.
///
/// Slack variables are appended after the input variables and are named
/// `<constraint>@int_slack` or `<constraint>@continuous_slack`.
#[derive(Debug, Clone, Default)]
pub struct InequalityToEquality {
    mode: SlackMode,
}

impl InequalityToEquality {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slack_mode(mut self, mode: SlackMode) -> Self {
        self.mode = mode;
        self
    }

    fn rewrite(
        &self,
        problem: &Problem,
        result: &mut Problem,
        c: &Constraint,
    ) -> Result<Option<usize>, ConvertError> {
        if c.op == ConstraintOp::Eq {
            result.add_constraint(c.name.clone(), c.linear.clone(), c.op, c.rhs)?;
            return Ok(None);
        }
        if !c.rhs.is_finite() {
            return Err(ConvertError::UnboundedConstraint {
                constraint: c.name.clone(),
                term: "rhs".to_string(),
            });
        }

        let integral = is_integer_valued(problem, &c.linear);
        let use_integer = match self.mode {
            SlackMode::Integer if !integral => {
                return Err(ConvertError::PreconditionViolated {
                    stage: STAGE,
                    reason: format!("constraint {} is not integer-valued, so it cannot take an integer slack", c.name),
                });
            }
            SlackMode::Integer => true,
            SlackMode::Continuous => false,
            SlackMode::Auto => integral,
        };

        // An integer-valued lhs can only meet the rounded rhs
        let (rhs, slack_upper, slack_coef) = match c.op {
            ConstraintOp::Le | ConstraintOp::Eq => {
                let rhs = if use_integer { c.rhs.floor() } else { c.rhs };
                let (lo, _) = linear_range(problem, c, true, false)?;
                (rhs, rhs - lo, 1.0)
            }
            ConstraintOp::Ge => {
                let rhs = if use_integer { c.rhs.ceil() } else { c.rhs };
                let (_, hi) = linear_range(problem, c, false, true)?;
                (rhs, hi - rhs, -1.0)
            }
        };

        let mut linear = c.linear.clone();
        let mut slack = None;
        if slack_upper > 0.0 {
            let variable = if use_integer {
                Variable::integer(format!("{}@int_slack", c.name), 0.0, slack_upper)
            } else {
                Variable::continuous(format!("{}@continuous_slack", c.name), 0.0, slack_upper)
            };
            debug!(constraint = %c.name, slack = %variable.name, upper = slack_upper, "added slack variable");
            let index = result.add_variable(variable)?;
            linear.add_term(index, slack_coef);
            slack = Some(index);
        } else if slack_upper < 0.0 {
            warn!(constraint = %c.name, "constraint cannot be satisfied within the variable bounds");
        }

        result.add_constraint(c.name.clone(), linear, ConstraintOp::Eq, rhs)?;
        Ok(slack)
    }
}

impl Converter for InequalityToEquality {
    type Interpreter = SlackInterpreter;

    fn convert(&self, problem: &Problem) -> Result<Conversion<SlackInterpreter>, ConvertError> {
        let mut result = Problem::new(problem.name());
        for var in problem.variables() {
            result.add_variable(var.clone())?;
        }
        result.set_objective(problem.objective().clone())?;

        let mut slacks = Vec::with_capacity(problem.num_constraints());
        for c in problem.constraints() {
            slacks.push(self.rewrite(problem, &mut result, c)?);
        }

        let interpreter = SlackInterpreter {
            num_original: problem.num_variables(),
            num_total: result.num_variables(),
            slacks,
        };
        Ok(Conversion { problem: result, interpreter })
    }
}

/// Drops the slack entries appended by [`InequalityToEquality`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackInterpreter {
    num_original: usize,
    num_total: usize,
    slacks: Vec<Option<usize>>,
}

impl SlackInterpreter {
    /// Slack variable index added for the constraint at `constraint`, if any
    pub fn slack_of(&self, constraint: usize) -> Option<usize> {
        self.slacks.get(constraint).copied().flatten()
    }
}

impl Interpreter for SlackInterpreter {
    fn input_len(&self) -> usize {
        self.num_total
    }

    fn output_len(&self) -> usize {
        self.num_original
    }

    fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        self.check_len(x)?;
        Ok(x[..self.num_original].to_vec())
    }
}

/// True when the expression takes integral values at every integral point of its variables
fn is_integer_valued(problem: &Problem, linear: &LinearExpression) -> bool {
    linear
        .iter()
        .all(|(var, coef)| coef.fract() == 0.0 && problem.variables()[var].is_discrete())
}

/// Tight `[lo, hi]` of the constraint's lhs over the variable box. Only the
/// requested ends are checked for finiteness.
fn linear_range(
    problem: &Problem,
    c: &Constraint,
    need_lo: bool,
    need_hi: bool,
) -> Result<(f64, f64), ConvertError> {
    let mut lo = 0.0;
    let mut hi = 0.0;
    for (var, coef) in c.linear.iter() {
        let v = &problem.variables()[var];
        let a = coef * v.lower;
        let b = coef * v.upper;
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        if (need_lo && !min.is_finite()) || (need_hi && !max.is_finite()) {
            return Err(ConvertError::UnboundedConstraint {
                constraint: c.name.clone(),
                term: v.name.clone(),
            });
        }
        lo += min;
        hi += max;
    }
    Ok((lo, hi))
}
