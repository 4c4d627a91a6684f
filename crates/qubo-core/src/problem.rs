use std::collections::HashMap;

use thiserror::Error;

use crate::expression::{LinearExpression, QuadraticExpression};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("Duplicate variable name: {0}")]
    DuplicateVariable(String),
    #[error("Duplicate constraint name: {0}")]
    DuplicateConstraint(String),
    #[error("Unknown variable index {index} in {context}")]
    UnknownVariable { index: usize, context: String },
    #[error("Invalid bounds for variable {name}: [{lower}, {upper}]")]
    InvalidBounds { name: String, lower: f64, upper: f64 },
    #[error("Integer variable {name} needs finite integral bounds, got [{lower}, {upper}]")]
    NonIntegralBounds { name: String, lower: f64, upper: f64 },
    #[error("Solution has {found} values but the problem has {expected} variables")]
    SolutionLength { expected: usize, found: usize },
}

/// Domain of a decision variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum VarType {
    /// Takes 0 or 1
    Binary,
    /// Takes integral values within finite bounds
    Integer,
    /// Takes any real value within (possibly infinite) bounds
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: VarType::Binary,
            lower: 0.0,
            upper: 1.0,
        }
    }

    pub fn integer(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            var_type: VarType::Integer,
            lower,
            upper,
        }
    }

    pub fn continuous(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            var_type: VarType::Continuous,
            lower,
            upper,
        }
    }

    /// Binary or integer
    pub fn is_discrete(&self) -> bool {
        !matches!(self.var_type, VarType::Continuous)
    }
}

/// Optimization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

impl Sense {
    pub fn flipped(self) -> Self {
        match self {
            Sense::Minimize => Sense::Maximize,
            Sense::Maximize => Sense::Minimize,
        }
    }

    /// `+1` for minimization, `-1` for maximization
    pub fn sign(self) -> f64 {
        match self {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Objective {
    pub sense: Sense,
    #[cfg_attr(feature = "serde", serde(default))]
    pub constant: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub linear: LinearExpression,
    #[cfg_attr(feature = "serde", serde(default))]
    pub quadratic: QuadraticExpression,
}

impl Objective {
    pub fn new(
        sense: Sense,
        constant: f64,
        linear: LinearExpression,
        quadratic: QuadraticExpression,
    ) -> Self {
        Self { sense, constant, linear, quadratic }
    }

    /// Unchecked; panics if `x` misses a referenced variable, see [`Problem::evaluate`]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.constant + self.linear.evaluate(x) + self.quadratic.evaluate(x)
    }

    /// Same optimum under the opposite sense
    pub fn negated(&self) -> Self {
        Self {
            sense: self.sense.flipped(),
            constant: -self.constant,
            linear: self.linear.scaled(-1.0),
            quadratic: self.quadratic.scaled(-1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Left-hand side
    pub linear: LinearExpression,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

impl Constraint {
    /// # Panics
    ///
    /// Panics if `x` misses a variable of the constraint; [`Problem::violations`]
    /// checks the length first.
    pub fn lhs(&self, x: &[f64]) -> f64 {
        self.linear.evaluate(x)
    }

    /// Same length precondition as [`Constraint::lhs`]
    pub fn is_satisfied(&self, x: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(x);
        match self.op {
            ConstraintOp::Le => lhs <= self.rhs + tolerance,
            ConstraintOp::Ge => lhs >= self.rhs - tolerance,
            ConstraintOp::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// A mixed-integer quadratic program with linear constraints.
///
/// Variables are addressed by their position, which is also the ordering of
/// every solution vector for this problem. Construction goes through the
/// `add_*` methods so that names stay unique and every expression refers to
/// an existing variable.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "ProblemData", into = "ProblemData")
)]
pub struct Problem {
    name: String,
    variables: Vec<Variable>,
    objective: Objective,
    constraints: Vec<Constraint>,
    variable_index: HashMap<String, usize>,
    constraint_index: HashMap<String, usize>,
}

impl Problem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variable_index.get(name).copied()
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraint_index.get(name).map(|&i| &self.constraints[i])
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Append a variable and return its index
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<usize, ProblemError> {
        if self.variable_index.contains_key(&variable.name) {
            return Err(ProblemError::DuplicateVariable(variable.name));
        }
        match variable.var_type {
            VarType::Binary => {
                variable.lower = 0.0;
                variable.upper = 1.0;
            }
            VarType::Integer => {
                let integral = |v: f64| v.is_finite() && v.fract() == 0.0;
                if !integral(variable.lower) || !integral(variable.upper) {
                    return Err(ProblemError::NonIntegralBounds {
                        name: variable.name,
                        lower: variable.lower,
                        upper: variable.upper,
                    });
                }
            }
            VarType::Continuous => {}
        }
        // NaN fails this comparison as well
        if !(variable.lower <= variable.upper) {
            return Err(ProblemError::InvalidBounds {
                name: variable.name,
                lower: variable.lower,
                upper: variable.upper,
            });
        }

        let index = self.variables.len();
        self.variable_index.insert(variable.name.clone(), index);
        self.variables.push(variable);
        Ok(index)
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> Result<usize, ProblemError> {
        self.add_variable(Variable::binary(name))
    }

    pub fn add_integer(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> Result<usize, ProblemError> {
        self.add_variable(Variable::integer(name, lower, upper))
    }

    pub fn add_continuous(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> Result<usize, ProblemError> {
        self.add_variable(Variable::continuous(name, lower, upper))
    }

    pub fn set_objective(&mut self, objective: Objective) -> Result<(), ProblemError> {
        self.check_references(objective.linear.variables(), "objective")?;
        self.check_references(objective.quadratic.variables(), "objective")?;
        self.objective = objective;
        Ok(())
    }

    pub fn minimize(
        &mut self,
        constant: f64,
        linear: LinearExpression,
        quadratic: QuadraticExpression,
    ) -> Result<(), ProblemError> {
        self.set_objective(Objective::new(Sense::Minimize, constant, linear, quadratic))
    }

    pub fn maximize(
        &mut self,
        constant: f64,
        linear: LinearExpression,
        quadratic: QuadraticExpression,
    ) -> Result<(), ProblemError> {
        self.set_objective(Objective::new(Sense::Maximize, constant, linear, quadratic))
    }

    /// Append a linear constraint and return its index
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        linear: LinearExpression,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<usize, ProblemError> {
        let name = name.into();
        if self.constraint_index.contains_key(&name) {
            return Err(ProblemError::DuplicateConstraint(name));
        }
        self.check_references(linear.variables(), &format!("constraint {}", name))?;

        let index = self.constraints.len();
        self.constraint_index.insert(name.clone(), index);
        self.constraints.push(Constraint { name, linear, op, rhs });
        Ok(index)
    }

    fn check_references(
        &self,
        mut vars: impl Iterator<Item = usize>,
        context: &str,
    ) -> Result<(), ProblemError> {
        match vars.find(|&v| v >= self.variables.len()) {
            Some(index) => Err(ProblemError::UnknownVariable {
                index,
                context: context.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Plain field layout used for (de)serialization; rebuilt through the
/// validating `add_*` methods on the way in.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ProblemData {
    #[serde(default)]
    name: String,
    variables: Vec<Variable>,
    #[serde(default)]
    objective: Objective,
    #[serde(default)]
    constraints: Vec<Constraint>,
}

#[cfg(feature = "serde")]
impl TryFrom<ProblemData> for Problem {
    type Error = ProblemError;

    fn try_from(data: ProblemData) -> Result<Self, Self::Error> {
        let mut problem = Problem::new(data.name);
        for variable in data.variables {
            problem.add_variable(variable)?;
        }
        problem.set_objective(data.objective)?;
        for c in data.constraints {
            problem.add_constraint(c.name, c.linear, c.op, c.rhs)?;
        }
        Ok(problem)
    }
}

#[cfg(feature = "serde")]
impl From<Problem> for ProblemData {
    fn from(problem: Problem) -> Self {
        Self {
            name: problem.name,
            variables: problem.variables,
            objective: problem.objective,
            constraints: problem.constraints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_problem() {
        let mut problem = Problem::new("knapsack");
        let x = problem.add_binary("x").unwrap();
        let y = problem.add_integer("y", -2.0, 5.0).unwrap();
        problem
            .maximize(1.0, LinearExpression::from([(x, 3.0), (y, 2.0)]), QuadraticExpression::new())
            .unwrap();
        problem
            .add_constraint("cap", LinearExpression::from([(x, 1.0), (y, 1.0)]), ConstraintOp::Le, 4.0)
            .unwrap();

        assert_eq!(problem.num_variables(), 2);
        assert_eq!(problem.variable_index("y"), Some(1));
        assert_eq!(problem.objective().sense, Sense::Maximize);
        assert_eq!(problem.constraint("cap").map(|c| c.rhs), Some(4.0));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut problem = Problem::new("dup");
        let x = problem.add_binary("x").unwrap();
        assert_eq!(
            problem.add_continuous("x", 0.0, 1.0),
            Err(ProblemError::DuplicateVariable("x".to_string()))
        );

        problem
            .add_constraint("c", LinearExpression::from([(x, 1.0)]), ConstraintOp::Eq, 1.0)
            .unwrap();
        assert_eq!(
            problem.add_constraint("c", LinearExpression::new(), ConstraintOp::Eq, 0.0),
            Err(ProblemError::DuplicateConstraint("c".to_string()))
        );
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let mut problem = Problem::new("refs");
        problem.add_binary("x").unwrap();

        let err = problem
            .add_constraint("c", LinearExpression::from([(3, 1.0)]), ConstraintOp::Le, 1.0)
            .unwrap_err();
        assert!(matches!(err, ProblemError::UnknownVariable { index: 3, .. }));

        let err = problem
            .minimize(0.0, LinearExpression::new(), QuadraticExpression::from([(0, 1, 1.0)]))
            .unwrap_err();
        assert!(matches!(err, ProblemError::UnknownVariable { index: 1, .. }));
    }

    #[test]
    fn test_variable_bounds_validated() {
        let mut problem = Problem::new("bounds");
        assert!(matches!(
            problem.add_integer("i", 0.0, f64::INFINITY),
            Err(ProblemError::NonIntegralBounds { .. })
        ));
        assert!(matches!(
            problem.add_integer("j", 0.0, 2.5),
            Err(ProblemError::NonIntegralBounds { .. })
        ));
        assert!(matches!(
            problem.add_continuous("c", 3.0, 1.0),
            Err(ProblemError::InvalidBounds { .. })
        ));
        assert!(problem.add_continuous("free", f64::NEG_INFINITY, f64::INFINITY).is_ok());

        let b = problem
            .add_variable(Variable { lower: -4.0, upper: 9.0, ..Variable::binary("b") })
            .unwrap();
        assert_eq!(problem.variables()[b].lower, 0.0);
        assert_eq!(problem.variables()[b].upper, 1.0);
    }

    #[test]
    fn test_negated_objective_flips_sense() {
        let objective = Objective::new(
            Sense::Maximize,
            2.0,
            LinearExpression::from([(0, 1.0)]),
            QuadraticExpression::from([(0, 1, -3.0)]),
        );
        let negated = objective.negated();

        assert_eq!(negated.sense, Sense::Minimize);
        let x = [2.0, 5.0];
        assert_eq!(negated.evaluate(&x), -objective.evaluate(&x));
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn test_read_example_file() {
        let problem: Problem = serde_json::from_str(include_str!("../../../demos/example.json")).unwrap();

        assert_eq!(problem.name(), "example");
        assert_eq!(problem.num_variables(), 3);
        assert_eq!(problem.variable(2).unwrap().var_type, VarType::Integer);
        assert_eq!(problem.variable(2).unwrap().upper, 7.0);
        assert_eq!(problem.objective().sense, Sense::Maximize);
        assert_eq!(problem.objective().linear.coefficient(0), 3.0);
        assert!(problem.objective().quadratic.is_empty());
        assert_eq!(problem.constraint("xyz_leq").unwrap().op, ConstraintOp::Le);
        assert_eq!(problem.constraint("xyz_geq").unwrap().rhs, 2.5);
        assert_eq!(problem.variable_index("z"), Some(2));
    }

    #[test]
    fn test_quadratic_terms_written_as_records() {
        let mut problem = Problem::new("quad");
        let a = problem.add_binary("a").unwrap();
        let b = problem.add_integer("b", -1.0, 2.0).unwrap();
        problem
            .minimize(0.5, LinearExpression::from([(a, 1.0)]), QuadraticExpression::from([(b, a, -2.0), (b, b, 1.5)]))
            .unwrap();

        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(
            json["objective"]["quadratic"],
            serde_json::json!([
                { "i": 0, "j": 1, "coefficient": -2.0 },
                { "i": 1, "j": 1, "coefficient": 1.5 },
            ])
        );

        let back: Problem = serde_json::from_value(json).unwrap();
        assert_eq!(back, problem);
        assert_eq!(back.variable_index("b"), Some(b));
    }

    #[test]
    fn test_malformed_files_rejected_by_validation() {
        let unknown = r#"{
            "variables": [{ "name": "x", "var_type": "binary", "lower": 0, "upper": 1 }],
            "constraints": [{ "name": "c", "linear": { "3": 1.0 }, "op": "le", "rhs": 1 }]
        }"#;
        let data: ProblemData = serde_json::from_str(unknown).unwrap();
        assert_eq!(
            Problem::try_from(data),
            Err(ProblemError::UnknownVariable { index: 3, context: "constraint c".to_string() })
        );
        let err = serde_json::from_str::<Problem>(unknown).unwrap_err();
        assert!(err.to_string().contains("Unknown variable index 3"), "{}", err);

        let duplicate = r#"{
            "variables": [
                { "name": "x", "var_type": "binary", "lower": 0, "upper": 1 },
                { "name": "x", "var_type": "integer", "lower": 0, "upper": 3 }
            ]
        }"#;
        let data: ProblemData = serde_json::from_str(duplicate).unwrap();
        assert_eq!(Problem::try_from(data), Err(ProblemError::DuplicateVariable("x".to_string())));
        let err = serde_json::from_str::<Problem>(duplicate).unwrap_err();
        assert!(err.to_string().contains("Duplicate variable name: x"), "{}", err);
    }
}
