//! This module provides the Gene struct, representing a gene which can be knocked out
use std::fmt::{Display, Formatter};
use std::hash::Hash;

use derive_builder::Builder;

/// Structure Representing a Gene
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct Gene {
    /// Used to identify the gene
    pub id: String,
    /// Human Readable Gene Name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Whether this gene is currently active (see [`GeneActivity`])
    #[builder(default = "GeneActivity::Active")]
    pub activity: GeneActivity,
    /// Notes about the gene
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Gene Annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Gene {
    /// Create a new active gene with only an id
    pub fn new(id: &str) -> Gene {
        Gene {
            id: id.to_string(),
            name: None,
            activity: GeneActivity::Active,
            notes: None,
            annotation: None,
        }
    }

    /// Identifier of the gene this transcript belongs to.
    ///
    /// Transcript identifiers carry a suffix after `delimiter` (e.g. `10005.1` and
    /// `10005.2` are both transcripts of `10005`). When the delimiter doesn't occur in
    /// the id, the id itself is returned.
    pub fn parent_id(&self, delimiter: &str) -> &str {
        if delimiter.is_empty() {
            return &self.id;
        }
        match self.id.split_once(delimiter) {
            Some((parent, _)) => parent,
            None => &self.id,
        }
    }
}

impl Display for Gene {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Hash for Gene {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.activity.hash(state);
    }
}

/// Whether a gene is active or not
#[derive(Clone, Debug, Hash, Eq, PartialEq, Copy)]
pub enum GeneActivity {
    /// Gene is considered active
    Active,
    /// Gene is considered inactive
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let gene = GeneBuilder::default()
            .id("b1241".to_string())
            .build()
            .unwrap();
        assert_eq!(gene.activity, GeneActivity::Active);
        assert!(gene.name.is_none());
        assert_eq!(format!("{}", gene), "b1241");
    }

    #[test]
    fn transcript_parent() {
        let transcript = Gene::new("10005.1");
        assert_eq!(transcript.parent_id("."), "10005");
        // No delimiter means the gene is its own parent
        assert_eq!(transcript.parent_id(""), "10005.1");
        let plain = Gene::new("b1241");
        assert_eq!(plain.parent_id("."), "b1241");
    }
}
