//! Provides struct representing an optimization problem
use crate::optimize::constraint::Constraint;
use crate::optimize::objective::{Objective, ObjectiveSense, ObjectiveTerm};
use crate::optimize::variable::{Variable, VariableBuilder, VariableType};
use indexmap::IndexMap;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use thiserror::Error;

/// An optimization problem
///
/// Variables are stored in insertion order, and constraints and objective terms
/// refer to them by that index. Cloning a problem gives a fully independent copy,
/// which is how knockouts are applied without touching a shared template.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Objective to optimize
    objective: Objective,
    /// Variables of the optimization problem
    variables: IndexMap<String, Variable>,
    /// Constraints of the optimization problem
    constraints: IndexMap<String, Constraint>,
    /// Type of problem
    problem_type: ProblemType,
}

impl Problem {
    // region Creation Functions
    /// Create a new optimization problem
    pub fn new(objective_sense: ObjectiveSense) -> Self {
        Self {
            objective: Objective::new(objective_sense),
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            problem_type: ProblemType::LinearContinuous,
        }
    }

    /// Create a new maximization problem
    pub fn new_maximization() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new minimization problem
    pub fn new_minimization() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }
    // endregion Creation Functions

    // region Accessors
    /// Objective of the problem
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Type of the problem
    pub fn problem_type(&self) -> &ProblemType {
        &self.problem_type
    }

    /// Number of variables in the problem
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of constraints in the problem
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Iterator over the variables, in index order
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Iterator over the constraints, in insertion order
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    /// Get a variable by its id
    pub fn get_variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// Index of the variable with the given id
    pub fn variable_index(&self, id: &str) -> Option<usize> {
        self.variables.get_index_of(id)
    }

    /// Lower bounds of all the variables, in index order
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.variables.values().map(|v| v.lower_bound).collect()
    }

    /// Upper bounds of all the variables, in index order
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.variables.values().map(|v| v.upper_bound).collect()
    }

    /// Indices of all binary and integer variables
    pub fn integral_variables(&self) -> Vec<usize> {
        self.variables
            .values()
            .filter(|v| v.is_integral())
            .map(|v| v.index)
            .collect()
    }
    // endregion Accessors

    // region Adding Variables
    /// Add a variable to the optimization problem, returning its index
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<usize, ProblemError> {
        // Validate that the variable can in fact be added to the problem
        self.validate_variable(&variable)?;
        let index = self.variables.len();
        variable.index = index;
        // Update the type of the model if needed
        if variable.is_integral() {
            self.problem_type = match self.problem_type {
                ProblemType::LinearContinuous | ProblemType::LinearMixedInteger => {
                    ProblemType::LinearMixedInteger
                }
                ProblemType::QuadraticContinuous | ProblemType::QuadraticMixedInteger => {
                    ProblemType::QuadraticMixedInteger
                }
            };
        }
        self.variables.insert(variable.id.clone(), variable);
        Ok(index)
    }

    /// Create a new variable and add it to the optimization problem, returning its index
    pub fn add_new_variable(
        &mut self,
        id: &str,
        name: Option<&str>,
        variable_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<usize, ProblemError> {
        let mut builder = VariableBuilder::default();
        builder
            .id(id)
            .variable_type(variable_type)
            .lower_bound(lower_bound)
            .upper_bound(upper_bound);
        if let Some(name) = name {
            builder.name(name);
        }
        let new_var = builder
            .build()
            .map_err(|_| ProblemError::InvalidVariableBounds)?;
        self.add_variable(new_var)
    }
    // endregion Adding Variables

    // region Adding Constraints
    /// Add a constraint to the problem
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ProblemError> {
        self.validate_constraint(&constraint)?;
        self.constraints
            .insert(constraint.get_id().to_string(), constraint);
        Ok(())
    }

    /// Create a new equality constraint and add it to the model
    pub fn add_new_equality_constraint(
        &mut self,
        id: &str,
        variables: &[usize],
        coefficients: &[f64],
        equals: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(Constraint::new_equality(
            id,
            variables,
            coefficients,
            equals,
        ))
    }

    /// Create a new inequality constraint and add it to the model
    pub fn add_new_inequality_constraint(
        &mut self,
        id: &str,
        variables: &[usize],
        coefficients: &[f64],
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(Constraint::new_inequality(
            id,
            variables,
            coefficients,
            lower_bound,
            upper_bound,
        ))
    }
    // endregion Adding Constraints

    // region Adding Objective Terms
    /// Add a new term to the objective
    pub fn add_objective_term(&mut self, objective_term: ObjectiveTerm) -> Result<(), ProblemError> {
        self.validate_objective_term(&objective_term)?;
        if let ObjectiveTerm::Quadratic { .. } = &objective_term {
            self.problem_type = match self.problem_type {
                ProblemType::LinearContinuous | ProblemType::QuadraticContinuous => {
                    ProblemType::QuadraticContinuous
                }
                ProblemType::LinearMixedInteger | ProblemType::QuadraticMixedInteger => {
                    ProblemType::QuadraticMixedInteger
                }
            };
        }
        self.objective.add_term(objective_term);
        Ok(())
    }

    /// Add a new linear term to the objective
    pub fn add_new_linear_objective_term(
        &mut self,
        variable: usize,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        self.add_objective_term(ObjectiveTerm::new_linear(variable, coefficient))
    }

    /// Add a new quadratic term to the objective
    pub fn add_new_quadratic_objective_term(
        &mut self,
        variable1: usize,
        variable2: usize,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        self.add_objective_term(ObjectiveTerm::new_quadratic(
            variable1,
            variable2,
            coefficient,
        ))
    }
    // endregion Adding Objective Terms

    // region update variable bounds
    /// Update the bounds of a variable
    pub fn update_variable_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        let index = self
            .variable_index(id)
            .ok_or(ProblemError::NonExistentVariable)?;
        self.update_variable_bounds_by_index(index, lower_bound, upper_bound)
    }

    /// Update the bounds of the variable at `index`
    pub fn update_variable_bounds_by_index(
        &mut self,
        index: usize,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound.is_nan() || upper_bound.is_nan() || lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds);
        }
        match self.variables.get_index_mut(index) {
            Some((_, var)) => {
                var.lower_bound = lower_bound;
                var.upper_bound = upper_bound;
            }
            None => return Err(ProblemError::NonExistentVariable),
        };
        Ok(())
    }
    // endregion update variable bounds

    // region Standard Form
    /// Objective as `½·xᵀPx + qᵀx` to be minimized
    ///
    /// `P` is returned as its upper triangle only, which is the form both Clarabel and
    /// OSQP expect. Maximization objectives are negated.
    pub fn objective_matrices(&self) -> (CscMatrix<f64>, Vec<f64>) {
        let n = self.num_variables();
        let sign = self.minimization_sign();
        let mut p = CooMatrix::new(n, n);
        let mut q = vec![0.; n];
        for term in self.objective.terms() {
            match *term {
                ObjectiveTerm::Quadratic { var1, var2, coef } if var1 == var2 => {
                    p.push(var1, var1, 2. * sign * coef);
                }
                ObjectiveTerm::Quadratic { var1, var2, coef } => {
                    p.push(var1.min(var2), var1.max(var2), sign * coef);
                }
                ObjectiveTerm::Linear { var, coef } => q[var] += sign * coef,
            }
        }
        (CscMatrix::from(&p), q)
    }

    /// Value of the objective at `values`, in the problem's own sense
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.evaluate(values)
    }

    /// Value of the objective at `values` converted to minimization form
    pub fn minimization_value(&self, values: &[f64]) -> f64 {
        self.minimization_sign() * self.objective.evaluate(values)
    }

    fn minimization_sign(&self) -> f64 {
        match self.objective.sense() {
            ObjectiveSense::Minimize => 1.,
            ObjectiveSense::Maximize => -1.,
        }
    }
    // endregion Standard Form

    // region Validation Functions
    /// Check that a variable to be added is valid to add to this problem
    fn validate_variable(&self, variable: &Variable) -> Result<(), ProblemError> {
        // Check if there is already a variable with this id
        if self.variables.contains_key(&variable.id) {
            return Err(ProblemError::VariableIdAlreadyExists);
        };
        // Check if the variable bounds are valid
        let lb = variable.lower_bound;
        let ub = variable.upper_bound;
        if lb.is_nan() || ub.is_nan() || lb > ub {
            return Err(ProblemError::InvalidVariableBounds);
        }
        Ok(())
    }

    /// Check that a constraint to be added is valid to add to this Problem
    fn validate_constraint(&self, constraint: &Constraint) -> Result<(), ProblemError> {
        // Check that a constraint with the same id doesn't already exist
        if self.constraints.contains_key(constraint.get_id()) {
            return Err(ProblemError::ConstraintAlreadyExists);
        }
        // Check that for inequality constraints the bounds make sense
        if let Constraint::Inequality {
            lower_bound,
            upper_bound,
            ..
        } = constraint
        {
            if lower_bound.is_nan() || upper_bound.is_nan() || lower_bound > upper_bound {
                return Err(ProblemError::InvalidConstraintBounds);
            }
        }
        // Check that the variables in this constraint are in the model
        if constraint
            .terms()
            .iter()
            .any(|t| t.variable >= self.variables.len())
        {
            return Err(ProblemError::NonExistentVariablesInConstraint);
        }
        Ok(())
    }

    /// Check that an objective term to be added is valid to add to this Problem
    fn validate_objective_term(&self, objective_term: &ObjectiveTerm) -> Result<(), ProblemError> {
        let n = self.variables.len();
        let valid = match *objective_term {
            ObjectiveTerm::Quadratic { var1, var2, .. } => var1 < n && var2 < n,
            ObjectiveTerm::Linear { var, .. } => var < n,
        };
        if !valid {
            return Err(ProblemError::NonExistentVariablesInObjective);
        }
        Ok(())
    }
    // endregion Validation Functions

    // region Check Problem
    /// Whether the problem has any binary or integer variables
    pub fn has_integer_variables(&self) -> bool {
        self.variables.values().any(|v| v.is_integral())
    }
    // endregion Check Problem
}

/// Types of optimization problems
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemType {
    /// Problem with linear objectives and constraints, and continuous variables
    LinearContinuous,
    /// Problem with quadratic objective, linear constraints, and continuous variables
    QuadraticContinuous,
    /// Problem with linear objective and constraints, with integer and continuous variables
    LinearMixedInteger,
    /// Problem with a quadratic objective function, and some integer variables
    QuadraticMixedInteger,
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add a variable with the same id as an existing variable")]
    VariableIdAlreadyExists,
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to add a variable with lower_bound>upper_bound")]
    InvalidVariableBounds,
    /// Error when trying to add a constraint with the same id as an existing constraint
    #[error("Tried to add a constraint with the same id as an existing constraint")]
    ConstraintAlreadyExists,
    /// Error when trying to add a constraint with invalid bounds
    #[error("Tried to add an inequality constraint with lower_bound > upper_bound")]
    InvalidConstraintBounds,
    /// Error when trying to add a constraint that contains variables not in the model
    #[error("Tried to add a constraint with variables not in the model")]
    NonExistentVariablesInConstraint,
    /// Error when trying to add an objective term which includes variables not in the model
    #[error("Tried adding an objective term with variables not in the model")]
    NonExistentVariablesInObjective,
    /// Error when trying to perform an update on a variable that doesn't exist
    #[error("Tried to access a variable that doesn't exist")]
    NonExistentVariable,
}
