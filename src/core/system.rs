/// Dominates any realistic single-year dollar flow. Signed splits and min
/// linearizations are only exact while every participating magnitude stays
/// below this value.
pub const BIG_M: f64 = 5_000_000.0;

/// Fraction of big-M treated as already too close.
pub const BIG_M_MARGIN: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    terms: Vec<(usize, f64)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `coefficient` to the entry for `index`, merging repeated indices.
    pub fn add(&mut self, index: usize, coefficient: f64) -> &mut Self {
        if coefficient == 0.0 {
            return self;
        }
        match self.terms.iter_mut().find(|(i, _)| *i == index) {
            Some((_, c)) => *c += coefficient,
            None => self.terms.push((index, coefficient)),
        }
        self
    }

    pub fn with(mut self, index: usize, coefficient: f64) -> Self {
        self.add(index, coefficient);
        self
    }

    pub fn terms(&self) -> &[(usize, f64)] {
        &self.terms
    }

    pub fn coefficient(&self, index: usize) -> f64 {
        self.terms
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, c)| *c)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(i, c)| c * values[i]).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub row: Row,
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const NON_NEGATIVE: Bounds = Bounds {
        lower: 0.0,
        upper: f64::INFINITY,
    };
    pub const FREE: Bounds = Bounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };
    pub const BINARY: Bounds = Bounds {
        lower: 0.0,
        upper: 1.0,
    };

    pub fn fixed(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }
}

/// Minimize `objective · x` subject to `A_ub x <= b_ub`, `A_eq x = b_eq`,
/// per-variable bounds and an integrality mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSystem {
    objective: Vec<f64>,
    inequalities: Vec<Constraint>,
    equalities: Vec<Constraint>,
    bounds: Vec<Bounds>,
    integrality: Vec<bool>,
}

impl ConstraintSystem {
    pub fn new(variables: usize) -> Self {
        Self {
            objective: vec![0.0; variables],
            inequalities: Vec::new(),
            equalities: Vec::new(),
            bounds: vec![Bounds::NON_NEGATIVE; variables],
            integrality: vec![false; variables],
        }
    }

    pub fn variables(&self) -> usize {
        self.objective.len()
    }

    pub fn add_inequality(&mut self, row: Row, upper: f64) {
        self.debug_check(&row);
        self.inequalities.push(Constraint { row, rhs: upper });
    }

    pub fn add_equality(&mut self, row: Row, target: f64) {
        self.debug_check(&row);
        self.equalities.push(Constraint { row, rhs: target });
    }

    pub fn set_bounds(&mut self, index: usize, bounds: Bounds) {
        self.bounds[index] = bounds;
    }

    pub fn mark_binary(&mut self, index: usize) {
        self.bounds[index] = Bounds::BINARY;
        self.integrality[index] = true;
    }

    pub fn set_objective(&mut self, index: usize, coefficient: f64) {
        self.objective[index] = coefficient;
    }

    pub fn clear_objective(&mut self) {
        self.objective.iter_mut().for_each(|c| *c = 0.0);
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn inequalities(&self) -> &[Constraint] {
        &self.inequalities
    }

    pub fn equalities(&self) -> &[Constraint] {
        &self.equalities
    }

    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    pub fn integrality(&self) -> &[bool] {
        &self.integrality
    }

    pub fn nonzeros(&self) -> usize {
        self.inequalities
            .iter()
            .chain(&self.equalities)
            .map(|c| c.row.len())
            .sum()
    }

    /// Whether `values` satisfies every row, bound and integrality mark to
    /// within `tolerance`, scaled by the magnitude of each row's terms.
    pub fn is_satisfied_by(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.variables() || values.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let slack = |c: &Constraint| {
            let scale = c
                .row
                .terms()
                .iter()
                .map(|&(i, coeff)| (coeff * values[i]).abs())
                .fold(1.0 + c.rhs.abs(), f64::max);
            (c.row.evaluate(values) - c.rhs, tolerance * scale)
        };
        let rows_hold = self.inequalities.iter().all(|c| {
            let (excess, tol) = slack(c);
            excess <= tol
        }) && self.equalities.iter().all(|c| {
            let (excess, tol) = slack(c);
            excess.abs() <= tol
        });
        let bounds_hold = values.iter().zip(&self.bounds).all(|(&v, b)| {
            let tol = tolerance * (1.0 + v.abs());
            v >= b.lower - tol && v <= b.upper + tol
        });
        let integral = values
            .iter()
            .zip(&self.integrality)
            .all(|(&v, &integer)| !integer || (v - v.round()).abs() <= tolerance.max(1e-6));
        rows_hold && bounds_hold && integral
    }

    fn debug_check(&self, row: &Row) {
        debug_assert!(
            row.terms().iter().all(|&(i, c)| i < self.variables() && c.is_finite()),
            "row references a variable outside the layout or a non-finite coefficient"
        );
    }
}
