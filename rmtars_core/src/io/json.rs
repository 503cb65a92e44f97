//! Module providing JSON IO for rmtars Models, using the COBRApy JSON layout
use std::fs;
use std::path::Path;

use crate::io::gpr_parse::{parse_gpr, GprParseError};
use crate::metabolic_model::gene::{Gene, GeneActivity};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::{Model, ModelError};
use crate::metabolic_model::reaction::{Reaction, ReactionBuilder, ReactionBuilderError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    genes: Vec<JsonGene>,
    id: Option<String>,
    compartments: Option<IndexMap<String, String>>,
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    charge: Option<i32>,
    formula: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(default)]
    gene_reaction_rule: String,
    subsystem: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonGene {
    id: String,
    name: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
}
// endregion JSON Model

// region Conversions
impl From<JsonGene> for Gene {
    fn from(g: JsonGene) -> Self {
        /* Notes and annotations are kept as JSON strings, the data isn't very structured
        so unpacking it further would require a lot of maintenance for little benefit
        */
        Self {
            id: g.id,
            name: g.name,
            activity: GeneActivity::Active, // All genes start as active
            notes: g.notes.map(|v| v.to_string()),
            annotation: g.annotation.map(|v| v.to_string()),
        }
    }
}

impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
            notes: m.notes.map(|v| v.to_string()),
            annotation: m.annotation.map(|v| v.to_string()),
        }
    }
}

/// Convert a string stored on a model object back into JSON, keeping it as a plain
/// string if it isn't valid JSON
fn string_to_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::String(s.to_string()))
}

impl From<&Gene> for JsonGene {
    fn from(g: &Gene) -> Self {
        Self {
            id: g.id.clone(),
            name: g.name.clone(),
            notes: g.notes.as_deref().map(string_to_value),
            annotation: g.annotation.as_deref().map(string_to_value),
        }
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: Some(m.charge),
            formula: m.formula.clone(),
            notes: m.notes.as_deref().map(string_to_value),
            annotation: m.annotation.as_deref().map(string_to_value),
        }
    }
}

impl From<&Reaction> for JsonReaction {
    fn from(r: &Reaction) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            metabolites: r.metabolites.clone(),
            lower_bound: r.lower_bound,
            upper_bound: r.upper_bound,
            gene_reaction_rule: r
                .gpr
                .as_ref()
                .map(|rule| rule.to_string_id())
                .unwrap_or_default(),
            subsystem: r.subsystem.clone(),
            notes: r.notes.as_deref().map(string_to_value),
            annotation: r.annotation.as_deref().map(string_to_value),
        }
    }
}

impl Model {
    /// Read a model from a COBRApy formatted JSON file
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, JsonError> {
        let model_str = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(JsonError::UnableToRead(format!("{:?}", err))),
        };
        Model::from_json_str(&model_str)
    }

    /// Parse a model from a COBRApy formatted JSON string
    pub fn from_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = match serde_json::from_str::<JsonModel>(model_str) {
            Ok(model) => model,
            Err(err) => return Err(JsonError::UnableToParse(format!("{:?}", err))),
        };
        Model::from_json(json_model)
    }

    /// Write the model to a COBRApy formatted JSON file
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        let json_model = self.to_json();
        let model_string = serde_json::to_string(&json_model)?;
        fs::write(path, model_string)?;
        Ok(())
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut reactions: IndexMap<String, Reaction> = IndexMap::new();
        let mut genes: IndexMap<String, Gene> = IndexMap::new();
        let mut metabolites: IndexMap<String, Metabolite> = IndexMap::new();
        // Start by converting the genes and metabolites using the From methods
        for g in json_model.genes {
            let id = g.id.clone();
            if genes.insert(id.clone(), Gene::from(g)).is_some() {
                return Err(ModelError::DuplicateId(id).into());
            }
        }
        for m in json_model.metabolites {
            let id = m.id.clone();
            if metabolites.insert(id.clone(), Metabolite::from(m)).is_some() {
                return Err(ModelError::DuplicateId(id).into());
            }
        }
        // Now, iterate through the reactions, parsing GPRs along the way
        for rxn in json_model.reactions {
            let gpr = if !rxn.gene_reaction_rule.trim().is_empty() {
                Some(parse_gpr(&rxn.gene_reaction_rule, &mut genes)?)
            } else {
                None
            };
            let new_reaction = ReactionBuilder::default()
                .id(rxn.id.clone())
                .metabolites(rxn.metabolites)
                .name(rxn.name)
                .gpr(gpr)
                .lower_bound(rxn.lower_bound)
                .upper_bound(rxn.upper_bound)
                .subsystem(rxn.subsystem)
                .notes(rxn.notes.map(|v| v.to_string()))
                .annotation(rxn.annotation.map(|v| v.to_string()))
                .build()?;
            if reactions.insert(rxn.id.clone(), new_reaction).is_some() {
                return Err(ModelError::DuplicateId(rxn.id).into());
            }
        }
        Ok(Model {
            reactions,
            genes,
            metabolites,
            id: json_model.id,
            compartments: json_model.compartments,
            version: json_model.version,
        })
    }

    fn to_json(&self) -> JsonModel {
        JsonModel {
            metabolites: self.metabolites.values().map(JsonMetabolite::from).collect(),
            reactions: self.reactions.values().map(JsonReaction::from).collect(),
            genes: self.genes.values().map(JsonGene::from).collect(),
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to parse a GPR rule during conversion from JSON")]
    GprParserError(#[from] GprParseError),
    #[error("Unable to read file due to {0}")]
    UnableToRead(String),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Invalid model: {0}")]
    InvalidModel(#[from] ModelError),
    #[error("Serde json parse error")]
    SerdeJsonParseError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}

// endregion Conversions

#[cfg(test)]
mod json_tests {
    use super::*;
    use crate::metabolic_model::model::{Gpr, GprOperation};
    use std::path::PathBuf;

    fn toy_model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("test_models")
            .join("toy_model.json")
    }

    #[test]
    fn json_reaction() {
        let data = r#"{
"id":"PFK",
"name":"Phosphofructokinase",
"metabolites":{
"adp_c":1.0,
"atp_c":-1.0,
"f6p_c":-1.0,
"fdp_c":1.0,
"h_c":1.0
},
"lower_bound":0.0,
"upper_bound":1000.0,
"gene_reaction_rule":"b3916 or b1723",
"objective_coefficient":0.0,
"subsystem":"Glycolysis/Gluconeogenesis"
}"#;
        let reaction: JsonReaction = serde_json::from_str(data).unwrap();
        assert_eq!(reaction.id, "PFK");
        assert_eq!(reaction.name.unwrap(), "Phosphofructokinase");
        assert!((reaction.metabolites["atp_c"] + 1.0).abs() < 1e-25);
        assert!((reaction.lower_bound - 0.0).abs() < 1e-25);
        assert!((reaction.upper_bound - 1000.0).abs() < 1e-25);
        assert_eq!(reaction.gene_reaction_rule, "b3916 or b1723");
        assert!(reaction.notes.is_none());
    }

    #[test]
    fn json_gene() {
        let data = r#"{"id":"b1241","name":"adhE","notes":{"original_bigg_ids":["b1241"]}}"#;
        let json_gene: JsonGene = serde_json::from_str(data).unwrap();
        let gene = Gene::from(json_gene);
        assert_eq!(gene.id, "b1241");
        assert_eq!(gene.name.unwrap(), "adhE");
        assert_eq!(gene.activity, GeneActivity::Active);
        assert_eq!(gene.notes.unwrap(), r#"{"original_bigg_ids":["b1241"]}"#);
    }

    #[test]
    fn read_json() {
        let model = Model::read_json(toy_model_path()).unwrap();
        assert_eq!(model.id.clone().unwrap(), "toy_model");
        assert_eq!(model.reactions.len(), 6);
        assert_eq!(model.metabolites.len(), 3);
        assert_eq!(model.genes.len(), 5);
        assert!(model.validate().is_ok());

        let (_, reaction) = model.reactions.get_index(1).unwrap();
        assert_eq!(reaction.id, "R_AB");
        match reaction.gpr {
            Some(Gpr::Operation(GprOperation::Or { .. })) => {}
            _ => panic!("Incorrect Parse"),
        }
        let exchange = &model.reactions["EX_a"];
        assert!(exchange.gpr.is_none());
        assert!((exchange.lower_bound + 10.).abs() < 1e-25);
    }

    #[test]
    fn write_then_read() {
        let model = Model::read_json(toy_model_path()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("written.json");
        model.write_json(&out).unwrap();
        let reread = Model::read_json(&out).unwrap();
        assert_eq!(reread.reaction_ids(), model.reaction_ids());
        assert_eq!(reread.lower_bounds(), model.lower_bounds());
        assert_eq!(
            reread.reactions["R_AB"].metabolites,
            model.reactions["R_AB"].metabolites
        );
        assert_eq!(
            reread.reactions["R_AB"].gpr.as_ref().map(|g| g.to_string_id()),
            model.reactions["R_AB"].gpr.as_ref().map(|g| g.to_string_id())
        );
    }

    #[test]
    fn duplicate_reaction() {
        let data = r#"{
"metabolites":[{"id":"a"}],
"genes":[],
"reactions":[
 {"id":"R1","metabolites":{"a":1.0},"lower_bound":0.0,"upper_bound":10.0},
 {"id":"R1","metabolites":{"a":-1.0},"lower_bound":0.0,"upper_bound":10.0}
]}"#;
        match Model::from_json_str(data) {
            Err(JsonError::InvalidModel(ModelError::DuplicateId(id))) => assert_eq!(id, "R1"),
            _ => panic!("Duplicate reaction not caught"),
        }
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Model::read_json("/does/not/exist.json"),
            Err(JsonError::UnableToRead(_))
        ));
    }
}
