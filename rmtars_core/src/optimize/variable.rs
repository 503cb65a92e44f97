//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

use crate::configuration::read_configuration;

/// A decision variable of an optimization problem
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Variable {
    /// Used to identify the variable (must be unique within a problem)
    #[builder(setter(into))]
    pub id: String,
    /// Human readable name of the variable
    #[builder(default = "None", setter(into, strip_option))]
    pub name: Option<String>,
    /// Type of the variable, see [`VariableType`]
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    /// Lowest value the variable can take (may be `f64::NEG_INFINITY`)
    #[builder(default = "read_configuration(|c| c.lower_bound)")]
    pub lower_bound: f64,
    /// Highest value the variable can take (may be `f64::INFINITY`)
    #[builder(default = "read_configuration(|c| c.upper_bound)")]
    pub upper_bound: f64,
    /// Column of the variable in the problem, assigned when it is added
    #[builder(default = "0", setter(skip))]
    pub(crate) index: usize,
}

impl Variable {
    /// Position of the variable in the problem's variable ordering
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the variable is restricted to integral values
    pub fn is_integral(&self) -> bool {
        matches!(
            self.variable_type,
            VariableType::Binary | VariableType::Integer
        )
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", name, self.variable_type),
            None => write!(f, "{}:{}", self.id, self.variable_type),
        }
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// The continuous backends (Clarabel, OSQP) only understand continuous variables,
/// binary and integer variables are handled by
/// [`BranchAndBound`](crate::optimize::solvers::branch_bound::BranchAndBound)
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}
