//! This module provides the Model struct for representing an entire metabolic model
use std::fmt::{Display, Formatter};

use crate::metabolic_model::gene::{Gene, GeneActivity};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

use indexmap::IndexMap;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use thiserror::Error;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug)]
pub struct Model {
    /// Map of reaction ids to Reaction Objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of gene ids to Gene Objects
    pub genes: IndexMap<String, Gene>,
    /// Map of metabolite ids to Metabolite Objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model {
            reactions: IndexMap::new(),
            genes: IndexMap::new(),
            metabolites: IndexMap::new(),
            id: None,
            compartments: None,
            version: None,
        }
    }

    /// Add a reaction to the model
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use rmtars_core::metabolic_model::model::Model;
    /// use rmtars_core::metabolic_model::reaction::{Reaction, ReactionBuilder};
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction".to_string()).build().unwrap();
    /// model.add_reaction(new_reaction);
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a gene to the model
    ///
    /// # Parameters
    /// - gene: Gene to add
    ///
    /// # Examples
    /// ```rust
    /// use rmtars_core::metabolic_model::gene::GeneBuilder;
    /// use rmtars_core::metabolic_model::model::Model;
    /// let mut model=Model::new_empty();
    /// let new_gene = GeneBuilder::default().id("new_gene".to_string()).build().unwrap();
    /// model.add_gene(new_gene);
    /// ```
    pub fn add_gene(&mut self, gene: Gene) {
        let id = gene.id.clone();
        self.genes.insert(id, gene);
    }

    /// Add a metabolite to the model
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    /// Number of reactions in the model
    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Reaction identifiers, in model order
    pub fn reaction_ids(&self) -> Vec<String> {
        self.reactions.keys().cloned().collect()
    }

    /// Lower flux bounds, in model reaction order
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.reactions.values().map(|r| r.lower_bound).collect()
    }

    /// Upper flux bounds, in model reaction order
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.reactions.values().map(|r| r.upper_bound).collect()
    }

    /// Assemble the stoichiometric matrix of the model
    ///
    /// The matrix has one row per metabolite and one column per reaction, both in model
    /// order. Repeated entries for the same metabolite and reaction are summed.
    pub fn stoichiometric_matrix(&self) -> Result<CscMatrix<f64>, ModelError> {
        let mut coo = CooMatrix::new(self.metabolites.len(), self.reactions.len());
        for (rxn_idx, reaction) in self.reactions.values().enumerate() {
            for (met_id, coef) in &reaction.metabolites {
                let met_idx = match self.metabolites.get_index_of(met_id) {
                    Some(idx) => idx,
                    None => {
                        return Err(ModelError::UnknownMetabolite {
                            reaction: reaction.id.clone(),
                            metabolite: met_id.clone(),
                        })
                    }
                };
                coo.push(met_idx, rxn_idx, *coef);
            }
        }
        Ok(CscMatrix::from(&coo))
    }

    /// Check that the model is well-formed enough to build optimization problems from
    ///
    /// Checks that every reaction has `lower_bound <= upper_bound` with no NaN bounds,
    /// that every stoichiometric coefficient is finite and refers to a metabolite in
    /// the model, and that every gene referenced by a GPR is in the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        for reaction in self.reactions.values() {
            if reaction.lower_bound.is_nan()
                || reaction.upper_bound.is_nan()
                || reaction.lower_bound > reaction.upper_bound
            {
                return Err(ModelError::InvalidBounds {
                    reaction: reaction.id.clone(),
                    lower_bound: reaction.lower_bound,
                    upper_bound: reaction.upper_bound,
                });
            }
            for (met_id, coef) in &reaction.metabolites {
                if !self.metabolites.contains_key(met_id) {
                    return Err(ModelError::UnknownMetabolite {
                        reaction: reaction.id.clone(),
                        metabolite: met_id.clone(),
                    });
                }
                if !coef.is_finite() {
                    return Err(ModelError::NonFiniteCoefficient {
                        reaction: reaction.id.clone(),
                        metabolite: met_id.clone(),
                    });
                }
            }
            if let Some(gpr) = &reaction.gpr {
                for gene in gpr.gene_ids() {
                    if !self.genes.contains_key(gene) {
                        return Err(ModelError::UnknownGene {
                            reaction: reaction.id.clone(),
                            gene: gene.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Errors describing a malformed model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Reaction {reaction} has invalid bounds [{lower_bound}, {upper_bound}]")]
    InvalidBounds {
        reaction: String,
        lower_bound: f64,
        upper_bound: f64,
    },
    #[error("Reaction {reaction} references metabolite {metabolite} which is not in the model")]
    UnknownMetabolite { reaction: String, metabolite: String },
    #[error("Reaction {reaction} has a non-finite coefficient for metabolite {metabolite}")]
    NonFiniteCoefficient { reaction: String, metabolite: String },
    #[error("GPR of reaction {reaction} references gene {gene} which is not in the model")]
    UnknownGene { reaction: String, gene: String },
    #[error("Identifier {0} occurs more than once")]
    DuplicateId(String),
}

// region GPR Functionality
/// Representation of a Gene Protein Reaction Rule as an AST
#[derive(Clone, Debug, PartialEq)]
pub enum Gpr {
    /// Operation on two genes (see [`GprOperation`])
    Operation(GprOperation),
    /// A terminal gene Node (see [`Gene`])
    GeneNode(String),
}

impl Display for Gpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_id())
    }
}

impl Gpr {
    /// Create a new binary operation node
    pub fn new_binary_operation(
        left: Gpr,
        operator: GprOperatorType,
        right: Gpr,
    ) -> Result<Gpr, GprError> {
        let op = match operator {
            GprOperatorType::Or => GprOperation::Or {
                left: Box::new(left),
                right: Box::new(right),
            },
            GprOperatorType::And => GprOperation::And {
                left: Box::new(left),
                right: Box::new(right),
            },
            GprOperatorType::Not => return Err(GprError::InvalidBinaryOp),
        };
        Ok(Gpr::Operation(op))
    }

    /// Create a new unary operation node
    pub fn new_unary_operation(operator: GprOperatorType, operand: Gpr) -> Result<Gpr, GprError> {
        let op = match operator {
            GprOperatorType::Not => GprOperation::Not {
                val: Box::new(operand),
            },
            _ => return Err(GprError::InvalidUnaryOp),
        };
        Ok(Gpr::Operation(op))
    }

    /// Create a new gene node
    pub fn new_gene_node(gene: &str) -> Gpr {
        Gpr::GeneNode(gene.to_string())
    }

    /// Generate a GPR string with gene ids from the GPR AST
    pub fn to_string_id(&self) -> String {
        match self {
            Gpr::Operation(op) => match op {
                GprOperation::Or { left, right } => {
                    format!("({} or {})", left.to_string_id(), right.to_string_id())
                }
                GprOperation::And { left, right } => {
                    format!("({} and {})", left.to_string_id(), right.to_string_id())
                }
                GprOperation::Not { val } => {
                    format!("(not {})", val)
                }
            },
            Gpr::GeneNode(gene_ref) => gene_ref.to_string(),
        }
    }

    /// Ids of every gene referenced in the GPR, in order of appearance (may repeat)
    pub fn gene_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_gene_ids(&mut ids);
        ids
    }

    fn collect_gene_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            Gpr::Operation(GprOperation::Or { left, right })
            | Gpr::Operation(GprOperation::And { left, right }) => {
                left.collect_gene_ids(ids);
                right.collect_gene_ids(ids);
            }
            Gpr::Operation(GprOperation::Not { val }) => val.collect_gene_ids(ids),
            Gpr::GeneNode(gene) => ids.push(gene),
        }
    }

    /// Evaluate the GPR with gene activities supplied by `activity`
    ///
    /// `activity` returns `None` for a gene it doesn't know about, which is reported as
    /// [`GprError::GeneNotFound`].
    pub fn eval_with<F>(&self, activity: &F) -> Result<GeneActivity, GprError>
    where
        F: Fn(&str) -> Option<GeneActivity>,
    {
        match self {
            Gpr::Operation(op) => match op {
                GprOperation::Or { left, right } => {
                    let l = left.eval_with(activity)?;
                    let r = right.eval_with(activity)?;
                    if l == GeneActivity::Active || r == GeneActivity::Active {
                        Ok(GeneActivity::Active)
                    } else {
                        Ok(GeneActivity::Inactive)
                    }
                }
                GprOperation::And { left, right } => {
                    let l = left.eval_with(activity)?;
                    let r = right.eval_with(activity)?;
                    if l == GeneActivity::Active && r == GeneActivity::Active {
                        Ok(GeneActivity::Active)
                    } else {
                        Ok(GeneActivity::Inactive)
                    }
                }
                GprOperation::Not { val } => match val.eval_with(activity)? {
                    GeneActivity::Active => Ok(GeneActivity::Inactive),
                    GeneActivity::Inactive => Ok(GeneActivity::Active),
                },
            },
            Gpr::GeneNode(gene) => activity(gene).ok_or(GprError::GeneNotFound),
        }
    }
}

/// Possible operations on genes
#[derive(Clone, Debug, PartialEq)]
pub enum GprOperation {
    Or { left: Box<Gpr>, right: Box<Gpr> },
    And { left: Box<Gpr>, right: Box<Gpr> },
    Not { val: Box<Gpr> },
}

/// Types of Allowed GPR Operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GprOperatorType {
    /// Or, results in active if either left or right are active
    Or,
    /// And, results in active if both left and right are active
    And,
    /// Not, results in active if val is inactive
    Not,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GprError {
    #[error("Invalid Binary Operation")]
    InvalidBinaryOp,
    #[error("Invalid Unary Operation")]
    InvalidUnaryOp,
    #[error("Gene is GPR is not present in the model")]
    GeneNotFound,
}

// Model associated functions for working with GPRs
impl Model {
    /// Evaluate whether a GPR evaluates to Active or Inactive
    pub fn eval_gpr(&self, gpr: &Gpr) -> Result<GeneActivity, GprError> {
        gpr.eval_with(&|gene: &str| self.genes.get(gene).map(|g| g.activity))
    }

    /// Evaluate a GPR as if every gene in `knocked_out` were inactive
    ///
    /// Genes not in `knocked_out` keep the activity recorded in the model.
    pub fn eval_gpr_with_knockout(
        &self,
        gpr: &Gpr,
        knocked_out: &[&str],
    ) -> Result<GeneActivity, GprError> {
        gpr.eval_with(&|gene: &str| {
            if knocked_out.iter().any(|k| *k == gene) {
                Some(GeneActivity::Inactive)
            } else {
                self.genes.get(gene).map(|g| g.activity)
            }
        })
    }
}

// endregion GPR Functionality

#[cfg(test)]
mod model_tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn toy_model() -> Model {
        let mut model = Model::new_empty();
        model.add_metabolite(Metabolite::new("a"));
        model.add_metabolite(Metabolite::new("b"));
        let mut upt = IndexMap::new();
        upt.insert("a".to_string(), 1.0);
        let mut conv = IndexMap::new();
        conv.insert("a".to_string(), -1.0);
        conv.insert("b".to_string(), 1.0);
        let mut sec = IndexMap::new();
        sec.insert("b".to_string(), -1.0);
        for (id, mets, lb) in [("R1", upt, 0.), ("R2", conv, -10.), ("R3", sec, 0.)] {
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id.to_string())
                    .metabolites(mets)
                    .lower_bound(lb)
                    .upper_bound(10.)
                    .build()
                    .unwrap(),
            );
        }
        model
    }

    #[test]
    fn stoichiometric_matrix() {
        let model = toy_model();
        let s = model.stoichiometric_matrix().unwrap();
        assert_eq!(s.nrows(), 2);
        assert_eq!(s.ncols(), 3);
        let dense: Vec<(usize, usize, f64)> =
            s.triplet_iter().map(|(i, j, v)| (i, j, *v)).collect();
        assert!(dense.contains(&(0, 0, 1.0)));
        assert!(dense.contains(&(0, 1, -1.0)));
        assert!(dense.contains(&(1, 1, 1.0)));
        assert!(dense.contains(&(1, 2, -1.0)));
        assert_eq!(model.lower_bounds(), vec![0., -10., 0.]);
        assert_eq!(model.reaction_ids(), vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn validate_catches_bad_models() {
        let model = toy_model();
        assert!(model.validate().is_ok());

        let mut bad_bounds = toy_model();
        bad_bounds.reactions.get_mut("R2").unwrap().lower_bound = 20.;
        match bad_bounds.validate() {
            Err(ModelError::InvalidBounds { reaction, .. }) => assert_eq!(reaction, "R2"),
            _ => panic!("Invalid bounds not caught"),
        }

        let mut unknown_met = toy_model();
        unknown_met
            .reactions
            .get_mut("R1")
            .unwrap()
            .metabolites
            .insert("c".to_string(), 1.0);
        match unknown_met.validate() {
            Err(ModelError::UnknownMetabolite { metabolite, .. }) => assert_eq!(metabolite, "c"),
            _ => panic!("Unknown metabolite not caught"),
        }
        assert!(unknown_met.stoichiometric_matrix().is_err());

        let mut unknown_gene = toy_model();
        unknown_gene.reactions.get_mut("R1").unwrap().gpr = Some(Gpr::new_gene_node("g1"));
        match unknown_gene.validate() {
            Err(ModelError::UnknownGene { gene, .. }) => assert_eq!(gene, "g1"),
            _ => panic!("Unknown gene not caught"),
        }
    }
}

#[cfg(test)]
mod gpr_tests {
    use super::*;
    use crate::metabolic_model::gene::GeneBuilder;

    fn setup_model() -> Model {
        let mut model = Model::new_empty();
        // This model only needs to hold genes for these tests
        for (id, activity) in [
            ("active_gene1", GeneActivity::Active),
            ("active_gene2", GeneActivity::Active),
            ("inactive_gene1", GeneActivity::Inactive),
            ("inactive_gene2", GeneActivity::Inactive),
        ] {
            model.add_gene(
                GeneBuilder::default()
                    .id(id.to_string())
                    .activity(activity)
                    .build()
                    .unwrap(),
            );
        }
        model
    }

    fn and(left: &str, right: &str) -> Gpr {
        Gpr::Operation(GprOperation::And {
            left: Box::new(Gpr::new_gene_node(left)),
            right: Box::new(Gpr::new_gene_node(right)),
        })
    }

    fn or(left: &str, right: &str) -> Gpr {
        Gpr::Operation(GprOperation::Or {
            left: Box::new(Gpr::new_gene_node(left)),
            right: Box::new(Gpr::new_gene_node(right)),
        })
    }

    #[test]
    fn gene_node() {
        let model = setup_model();
        assert_eq!(
            model.eval_gpr(&Gpr::new_gene_node("active_gene1")).unwrap(),
            GeneActivity::Active
        );
        assert_eq!(
            model.eval_gpr(&Gpr::new_gene_node("inactive_gene1")).unwrap(),
            GeneActivity::Inactive
        );
        assert_eq!(
            model.eval_gpr(&Gpr::new_gene_node("missing")),
            Err(GprError::GeneNotFound)
        );
    }

    #[test]
    fn and_node() {
        let model = setup_model();
        assert_eq!(
            model.eval_gpr(&and("active_gene1", "active_gene2")).unwrap(),
            GeneActivity::Active
        );
        assert_eq!(
            model.eval_gpr(&and("active_gene1", "inactive_gene1")).unwrap(),
            GeneActivity::Inactive
        );
        assert_eq!(
            model.eval_gpr(&and("inactive_gene1", "inactive_gene2")).unwrap(),
            GeneActivity::Inactive
        );
    }

    #[test]
    fn or_node() {
        let model = setup_model();
        assert_eq!(
            model.eval_gpr(&or("active_gene1", "active_gene2")).unwrap(),
            GeneActivity::Active
        );
        assert_eq!(
            model.eval_gpr(&or("active_gene1", "inactive_gene1")).unwrap(),
            GeneActivity::Active
        );
        assert_eq!(
            model.eval_gpr(&or("inactive_gene1", "inactive_gene2")).unwrap(),
            GeneActivity::Inactive
        );
    }

    #[test]
    fn not_node() {
        let model = setup_model();
        let not_active = Gpr::new_unary_operation(
            GprOperatorType::Not,
            Gpr::new_gene_node("active_gene1"),
        )
        .unwrap();
        assert_eq!(model.eval_gpr(&not_active).unwrap(), GeneActivity::Inactive);
        let not_inactive = Gpr::new_unary_operation(
            GprOperatorType::Not,
            Gpr::new_gene_node("inactive_gene1"),
        )
        .unwrap();
        assert_eq!(model.eval_gpr(&not_inactive).unwrap(), GeneActivity::Active);
    }

    #[test]
    fn knockout_evaluation() {
        let model = setup_model();
        let isozymes = or("active_gene1", "active_gene2");
        assert_eq!(
            model
                .eval_gpr_with_knockout(&isozymes, &["active_gene1"])
                .unwrap(),
            GeneActivity::Active
        );
        assert_eq!(
            model
                .eval_gpr_with_knockout(&isozymes, &["active_gene1", "active_gene2"])
                .unwrap(),
            GeneActivity::Inactive
        );
        let complex = and("active_gene1", "active_gene2");
        assert_eq!(
            model
                .eval_gpr_with_knockout(&complex, &["active_gene2"])
                .unwrap(),
            GeneActivity::Inactive
        );
    }

    #[test]
    fn display_and_gene_ids() {
        let gpr = Gpr::Operation(GprOperation::Or {
            left: Box::new(and("Rv0001", "Rv0002")),
            right: Box::new(Gpr::new_gene_node("Rv0003")),
        });
        // Display is very explicit with parenthesis
        assert_eq!(format!("{}", gpr), "((Rv0001 and Rv0002) or Rv0003)");
        assert_eq!(gpr.gene_ids(), vec!["Rv0001", "Rv0002", "Rv0003"]);
    }

    #[test]
    fn invalid_operators() {
        let res = Gpr::new_binary_operation(
            Gpr::new_gene_node("a"),
            GprOperatorType::Not,
            Gpr::new_gene_node("b"),
        );
        assert_eq!(res, Err(GprError::InvalidBinaryOp));
        let res = Gpr::new_unary_operation(GprOperatorType::And, Gpr::new_gene_node("a"));
        assert_eq!(res, Err(GprError::InvalidUnaryOp));
    }
}
