use std::collections::BTreeMap;

/// Linear combination of variables, keyed by variable index
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LinearExpression {
    coefficients: BTreeMap<usize, f64>,
}

/// Sum of `coefficient * x_i * x_j` terms.
///
/// Each unordered pair is stored once under `(min(i, j), max(i, j))`, so an
/// off-diagonal coefficient already combines both symmetric entries.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(into = "Vec<QuadraticTerm>", from = "Vec<QuadraticTerm>")
)]
pub struct QuadraticExpression {
    coefficients: BTreeMap<(usize, usize), f64>,
}

/// One entry of a quadratic expression, as written to external formats
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuadraticTerm {
    pub i: usize,
    pub j: usize,
    pub coefficient: f64,
}

impl LinearExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coefficient` to the term of `var`. Terms that cancel to zero are removed.
    pub fn add_term(&mut self, var: usize, coefficient: f64) {
        let entry = self.coefficients.entry(var).or_insert(0.0);
        *entry += coefficient;
        if *entry == 0.0 {
            self.coefficients.remove(&var);
        }
    }

    pub fn coefficient(&self, var: usize) -> f64 {
        self.coefficients.get(&var).copied().unwrap_or(0.0)
    }

    /// Terms in ascending variable order
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.coefficients.iter().map(|(&var, &coef)| (var, coef))
    }

    pub fn variables(&self) -> impl Iterator<Item = usize> + '_ {
        self.coefficients.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Value at `x`, indexed by variable.
    ///
    /// # Panics
    ///
    /// Panics if `x` is shorter than the largest referenced index. Use
    /// [`crate::Problem::evaluate`] for a checked evaluation.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.iter().map(|(var, coef)| coef * x[var]).sum()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.iter().map(|(var, coef)| (var, coef * factor)).collect()
    }
}

impl FromIterator<(usize, f64)> for LinearExpression {
    fn from_iter<T: IntoIterator<Item = (usize, f64)>>(iter: T) -> Self {
        let mut expr = Self::new();
        for (var, coef) in iter {
            expr.add_term(var, coef);
        }
        expr
    }
}

impl<const N: usize> From<[(usize, f64); N]> for LinearExpression {
    fn from(terms: [(usize, f64); N]) -> Self {
        terms.into_iter().collect()
    }
}

impl QuadraticExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coefficient * x_i * x_j`. `(i, j)` and `(j, i)` land on the same term.
    pub fn add_term(&mut self, i: usize, j: usize, coefficient: f64) {
        let key = if i <= j { (i, j) } else { (j, i) };
        let entry = self.coefficients.entry(key).or_insert(0.0);
        *entry += coefficient;
        if *entry == 0.0 {
            self.coefficients.remove(&key);
        }
    }

    pub fn coefficient(&self, i: usize, j: usize) -> f64 {
        let key = if i <= j { (i, j) } else { (j, i) };
        self.coefficients.get(&key).copied().unwrap_or(0.0)
    }

    /// Terms as `(i, j, coefficient)` with `i <= j`, in ascending pair order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.coefficients.iter().map(|(&(i, j), &coef)| (i, j, coef))
    }

    pub fn variables(&self) -> impl Iterator<Item = usize> + '_ {
        self.coefficients.keys().flat_map(|&(i, j)| [i, j])
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Value at `x`, indexed by variable.
    ///
    /// # Panics
    ///
    /// Panics if `x` is shorter than the largest referenced index. Use
    /// [`crate::Problem::evaluate`] for a checked evaluation.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.iter().map(|(i, j, coef)| coef * x[i] * x[j]).sum()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.iter().map(|(i, j, coef)| (i, j, coef * factor)).collect()
    }
}

impl FromIterator<(usize, usize, f64)> for QuadraticExpression {
    fn from_iter<T: IntoIterator<Item = (usize, usize, f64)>>(iter: T) -> Self {
        let mut expr = Self::new();
        for (i, j, coef) in iter {
            expr.add_term(i, j, coef);
        }
        expr
    }
}

impl<const N: usize> From<[(usize, usize, f64); N]> for QuadraticExpression {
    fn from(terms: [(usize, usize, f64); N]) -> Self {
        terms.into_iter().collect()
    }
}

impl From<QuadraticExpression> for Vec<QuadraticTerm> {
    fn from(expr: QuadraticExpression) -> Self {
        expr.iter()
            .map(|(i, j, coefficient)| QuadraticTerm { i, j, coefficient })
            .collect()
    }
}

impl From<Vec<QuadraticTerm>> for QuadraticExpression {
    fn from(terms: Vec<QuadraticTerm>) -> Self {
        terms.into_iter().map(|t| (t.i, t.j, t.coefficient)).collect()
    }
}

/// Affine form `constant + linear` of one variable after substitution.
///
/// Stages that replace a variable by an expression over new variables
/// describe the replacement with one of these per input variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffineExpression {
    pub constant: f64,
    pub linear: LinearExpression,
}

impl AffineExpression {
    /// A variable standing for itself (possibly renumbered)
    pub fn variable(index: usize) -> Self {
        Self {
            constant: 0.0,
            linear: LinearExpression::from([(index, 1.0)]),
        }
    }
}

/// Accumulates constant, linear and quadratic contributions while an
/// expression is being rewritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionBuilder {
    pub constant: f64,
    pub linear: LinearExpression,
    pub quadratic: QuadraticExpression,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `scale * a`
    pub fn add_affine(&mut self, a: &AffineExpression, scale: f64) {
        self.constant += scale * a.constant;
        for (var, coef) in a.linear.iter() {
            self.linear.add_term(var, scale * coef);
        }
    }

    /// Add `scale * a * b`, expanding into the full bilinear sum
    pub fn add_product(&mut self, a: &AffineExpression, b: &AffineExpression, scale: f64) {
        self.constant += scale * a.constant * b.constant;
        for (var, coef) in b.linear.iter() {
            self.linear.add_term(var, scale * a.constant * coef);
        }
        for (var, coef) in a.linear.iter() {
            self.linear.add_term(var, scale * b.constant * coef);
        }
        for (u, cu) in a.linear.iter() {
            for (v, cv) in b.linear.iter() {
                self.quadratic.add_term(u, v, scale * cu * cv);
            }
        }
    }

    /// Substitute `map[i]` for every variable `i` of `linear`
    pub fn add_substituted_linear(&mut self, linear: &LinearExpression, map: &[AffineExpression]) {
        for (var, coef) in linear.iter() {
            self.add_affine(&map[var], coef);
        }
    }

    /// Substitute `map[i]` for every variable `i` of `quadratic`
    pub fn add_substituted_quadratic(
        &mut self,
        quadratic: &QuadraticExpression,
        map: &[AffineExpression],
    ) {
        for (i, j, coef) in quadratic.iter() {
            self.add_product(&map[i], &map[j], coef);
        }
    }
}
