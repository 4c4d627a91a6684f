use tracing::info;

use crate::converters::{
    Conversion, ConvertError, Converter, DEFAULT_PENALTY, InequalityToEquality, IntegerToBinary,
    Interpreter, InterpreterChain, LinearEqualityToPenalty, MaximizeToMinimize, MinimizeToMaximize,
    SlackMode, require_penalty,
};
use crate::problem::{ConstraintOp, Problem, Sense, VarType};

/// End-to-end conversion of a problem into an unconstrained binary quadratic one.
///
/// Stages run in a fixed order: sense normalization, inequality to equality,
/// integer to binary, equality to penalty. The converter remembers the
/// interpreters of its latest successful [`QuboConverter::convert`] so that
/// solutions of the QUBO can be mapped back with [`QuboConverter::interpret`].
#[derive(Debug)]
pub struct QuboConverter {
    penalty: f64,
    slack_mode: SlackMode,
    target_sense: Option<Sense>,
    state: Option<InterpreterChain>,
}

impl Default for QuboConverter {
    fn default() -> Self {
        Self {
            penalty: DEFAULT_PENALTY,
            slack_mode: SlackMode::Auto,
            target_sense: Some(Sense::Minimize),
            state: None,
        }
    }
}

impl QuboConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be finite and positive; otherwise conversion fails
    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_slack_mode(mut self, mode: SlackMode) -> Self {
        self.slack_mode = mode;
        self
    }

    pub fn with_target_sense(mut self, sense: Sense) -> Self {
        self.target_sense = Some(sense);
        self
    }

    /// Leave the objective sense as given instead of normalizing it
    pub fn keep_sense(mut self) -> Self {
        self.target_sense = None;
        self
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Run every stage without touching the stored state
    pub fn to_qubo(&self, problem: &Problem) -> Result<Conversion<InterpreterChain>, ConvertError> {
        let mut chain = InterpreterChain::new();

        let normalized = match self.target_sense {
            Some(Sense::Minimize) => apply(&mut chain, &MaximizeToMinimize, problem)?,
            Some(Sense::Maximize) => apply(&mut chain, &MinimizeToMaximize, problem)?,
            None => problem.clone(),
        };
        let equalities = apply(
            &mut chain,
            &InequalityToEquality::new().with_slack_mode(self.slack_mode),
            &normalized,
        )?;
        let binary = apply(&mut chain, &IntegerToBinary::new(), &equalities)?;
        let qubo = apply(
            &mut chain,
            &LinearEqualityToPenalty::new().with_penalty(self.penalty),
            &binary,
        )?;

        info!(
            problem = %problem.name(),
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            binary_variables = qubo.num_variables(),
            "converted problem to QUBO"
        );
        Ok(Conversion { problem: qubo, interpreter: chain })
    }

    /// Convert `problem` and keep the means to interpret solutions of the result.
    ///
    /// Any state from an earlier call is discarded first, also when this one fails.
    pub fn convert(&mut self, problem: &Problem) -> Result<Problem, ConvertError> {
        self.state = None;
        let Conversion { problem, interpreter } = self.to_qubo(problem)?;
        self.state = Some(interpreter);
        Ok(problem)
    }

    /// Map a solution of the last converted QUBO back to the original variables
    pub fn interpret(&self, x: &[f64]) -> Result<Vec<f64>, ConvertError> {
        let chain = self.state.as_ref().ok_or(ConvertError::StateNotInitialized)?;
        chain.check_len(x)?;
        chain.interpret(x)
    }

    /// First reason the pipeline would refuse `problem`, if any
    pub fn check(&self, problem: &Problem) -> Result<(), ConvertError> {
        require_penalty(self.penalty, "QuboConverter")?;
        if let Some(v) = problem.variables().iter().find(|v| v.var_type == VarType::Continuous) {
            return Err(ConvertError::UnsupportedVariableKind {
                stage: "QuboConverter",
                variable: v.name.clone(),
                kind: v.var_type,
            });
        }
        if self.slack_mode == SlackMode::Continuous {
            if let Some(c) = problem.constraints().iter().find(|c| c.op != ConstraintOp::Eq) {
                return Err(ConvertError::PreconditionViolated {
                    stage: "QuboConverter",
                    reason: format!("constraint {} would get a continuous slack", c.name),
                });
            }
        }
        // All variables are discrete here, so only fractional coefficients
        // force a continuous slack
        if let Some(c) = problem
            .constraints()
            .iter()
            .find(|c| c.op != ConstraintOp::Eq && c.linear.iter().any(|(_, coef)| coef.fract() != 0.0))
        {
            return Err(ConvertError::PreconditionViolated {
                stage: "QuboConverter",
                reason: format!("constraint {} has fractional coefficients and needs a continuous slack", c.name),
            });
        }
        Ok(())
    }
}

fn apply<C: Converter>(
    chain: &mut InterpreterChain,
    converter: &C,
    problem: &Problem,
) -> Result<Problem, ConvertError> {
    let Conversion { problem, interpreter } = converter.convert(problem)?;
    chain.push(interpreter);
    Ok(problem)
}
