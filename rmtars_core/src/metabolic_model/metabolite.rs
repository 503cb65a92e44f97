//! Metabolites, the rows of the stoichiometric matrix
use derive_builder::Builder;

/// A metabolite, identified by its (unique) id
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Metabolite {
    pub id: String,
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Compartment id, e.g. `c` for cytosol
    #[builder(default = "None")]
    pub compartment: Option<String>,
    #[builder(default = "0")]
    pub charge: i32,
    #[builder(default = "None")]
    pub formula: Option<String>,
    /// Kept as a JSON string
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Kept as a JSON string
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Metabolite {
    /// Metabolite with only an id
    pub fn new(id: &str) -> Metabolite {
        Metabolite {
            id: id.to_string(),
            name: None,
            compartment: None,
            charge: 0,
            formula: None,
            notes: None,
            annotation: None,
        }
    }
}
