//! Knockout patterns for genes or reactions
//!
//! Each knockout entity (a gene, a parent gene grouping several transcripts, or a
//! reaction) is mapped to the sorted list of reaction indices it disables.
use indexmap::IndexMap;
use nalgebra::DMatrix;

use crate::metabolic_model::gene::GeneActivity;
use crate::metabolic_model::model::{GprError, Model};

/// Reactions disabled by knocking out each entity
#[derive(Clone, Debug, PartialEq)]
pub struct PerturbationMatrix {
    entities: Vec<String>,
    patterns: Vec<Vec<usize>>,
    num_reactions: usize,
}

impl PerturbationMatrix {
    /// Build the perturbation matrix for `model`
    ///
    /// # Parameters
    /// - `rxn_ko`: knock out reactions rather than genes
    /// - `separate_transcript`: when knocking out genes, delimiter separating a gene id
    ///   from its transcript suffix. All transcripts of a gene are knocked out together.
    pub fn build(
        model: &Model,
        rxn_ko: bool,
        separate_transcript: Option<&str>,
    ) -> Result<Self, GprError> {
        if rxn_ko {
            Ok(PerturbationMatrix::from_reactions(model))
        } else {
            PerturbationMatrix::from_genes(model, separate_transcript)
        }
    }

    /// One entity per reaction, knocking out only that reaction
    pub fn from_reactions(model: &Model) -> Self {
        let num_reactions = model.num_reactions();
        PerturbationMatrix {
            entities: model.reaction_ids(),
            patterns: (0..num_reactions).map(|r| vec![r]).collect(),
            num_reactions,
        }
    }

    /// One entity per gene (or parent gene), knocking out every reaction whose GPR
    /// becomes inactive
    ///
    /// Reactions without a GPR are never knocked out.
    pub fn from_genes(model: &Model, separate_transcript: Option<&str>) -> Result<Self, GprError> {
        // Group genes into knockout entities, in the order genes appear in the model
        let mut groups: IndexMap<String, Vec<&str>> = IndexMap::new();
        for gene in model.genes.values() {
            let entity = match separate_transcript {
                Some(delimiter) => gene.parent_id(delimiter),
                None => gene.id.as_str(),
            };
            groups
                .entry(entity.to_string())
                .or_default()
                .push(gene.id.as_str());
        }

        // Only reactions mentioning a gene can be affected by knocking it out
        let mut gene_reactions: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (rxn_idx, reaction) in model.reactions.values().enumerate() {
            if let Some(gpr) = &reaction.gpr {
                for gene in gpr.gene_ids() {
                    let rxns = gene_reactions.entry(gene).or_default();
                    if rxns.last() != Some(&rxn_idx) {
                        rxns.push(rxn_idx);
                    }
                }
            }
        }

        let mut entities = Vec::with_capacity(groups.len());
        let mut patterns = Vec::with_capacity(groups.len());
        for (entity, genes) in groups {
            let mut candidates: Vec<usize> = genes
                .iter()
                .filter_map(|g| gene_reactions.get(g))
                .flatten()
                .copied()
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            let mut pattern = Vec::new();
            for rxn_idx in candidates {
                let gpr = match model.reactions[rxn_idx].gpr.as_ref() {
                    Some(gpr) => gpr,
                    None => continue,
                };
                if model.eval_gpr_with_knockout(gpr, &genes)? == GeneActivity::Inactive {
                    pattern.push(rxn_idx);
                }
            }
            entities.push(entity);
            patterns.push(pattern);
        }
        Ok(PerturbationMatrix {
            entities,
            patterns,
            num_reactions: model.num_reactions(),
        })
    }

    /// Knockout entity ids, in order
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Sorted reaction indices knocked out by each entity
    pub fn patterns(&self) -> &[Vec<usize>] {
        &self.patterns
    }

    /// Number of knockout entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Boolean reactions × entities matrix, `true` where the entity disables the reaction
    pub fn to_matrix(&self) -> DMatrix<bool> {
        let mut matrix = DMatrix::from_element(self.num_reactions, self.len(), false);
        for (col, pattern) in self.patterns.iter().enumerate() {
            for &row in pattern {
                matrix[(row, col)] = true;
            }
        }
        matrix
    }

    /// Collapse entities with identical knockout patterns
    pub fn deduplicate(&self) -> DeduplicatedKnockouts {
        let mut unique: IndexMap<&[usize], usize> = IndexMap::new();
        let mut inverse = Vec::with_capacity(self.len());
        for pattern in &self.patterns {
            let next = unique.len();
            inverse.push(*unique.entry(pattern.as_slice()).or_insert(next));
        }
        DeduplicatedKnockouts {
            patterns: unique.into_keys().map(|p| p.to_vec()).collect(),
            inverse,
        }
    }
}

/// Unique knockout patterns, with the map back to the original entities
#[derive(Clone, Debug, PartialEq)]
pub struct DeduplicatedKnockouts {
    /// Distinct patterns, in order of first appearance
    pub patterns: Vec<Vec<usize>>,
    /// `inverse[entity]` is the index into `patterns` of that entity's pattern
    pub inverse: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::model::Model;
    use std::path::PathBuf;

    fn toy_model() -> Model {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("test_models")
            .join("toy_model.json");
        Model::read_json(path).unwrap()
    }

    #[test]
    fn gene_knockouts() {
        let model = toy_model();
        let perturbation = PerturbationMatrix::build(&model, false, None).unwrap();
        assert_eq!(perturbation.entities(), ["g1", "g2", "g3", "t5.1", "t5.2"]);
        // R_AB is "g1 or g2", so neither gene alone removes it
        assert!(perturbation.patterns()[0].is_empty());
        assert!(perturbation.patterns()[1].is_empty());
        // R_BC is index 2
        assert_eq!(perturbation.patterns()[2], vec![2]);
        assert!(perturbation.patterns()[3].is_empty());
    }

    #[test]
    fn transcripts_grouped_by_parent() {
        let model = toy_model();
        let perturbation = PerturbationMatrix::build(&model, false, Some(".")).unwrap();
        assert_eq!(perturbation.entities(), ["g1", "g2", "g3", "t5"]);
        // Both transcripts out removes R_AC (index 3)
        assert_eq!(perturbation.patterns()[3], vec![3]);
    }

    #[test]
    fn reaction_knockouts() {
        let model = toy_model();
        let perturbation = PerturbationMatrix::build(&model, true, Some(".")).unwrap();
        assert_eq!(perturbation.len(), 6);
        assert_eq!(perturbation.entities()[1], "R_AB");
        assert_eq!(perturbation.patterns()[4], vec![4]);
        let matrix = perturbation.to_matrix();
        assert_eq!(matrix.shape(), (6, 6));
        assert!(matrix[(4, 4)]);
        assert!(!matrix[(3, 4)]);
    }

    #[test]
    fn deduplicate_patterns() {
        let model = toy_model();
        let perturbation = PerturbationMatrix::build(&model, false, None).unwrap();
        let dedup = perturbation.deduplicate();
        // Empty pattern (g1, g2, t5.1, t5.2) and R_BC (g3)
        assert_eq!(dedup.patterns, vec![vec![], vec![2]]);
        assert_eq!(dedup.inverse, vec![0, 0, 1, 0, 0]);
        for (entity, &u) in dedup.inverse.iter().enumerate() {
            assert_eq!(dedup.patterns[u], perturbation.patterns()[entity]);
        }
    }
}
