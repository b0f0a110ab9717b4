//! Parsing of the `MLmodel` descriptor logged next to a model.
//!
//! The descriptor is YAML; its `signature.inputs` and `signature.outputs`
//! entries are JSON documents embedded as strings:
//!
//! ```yaml
//! signature:
//!   inputs: '[{"name": "country", "type": "string"}, {"name": "amount", "type": "integer"}]'
//!   outputs: '[{"name": "risk", "type": "string"}]'
//! ```

use crate::resolver::ResolveError;
use crate::schema::{Field, FieldType, Schema};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureField {
    pub name: String,
    #[serde(rename = "type")]
    pub declared: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSignature {
    pub inputs: Vec<SignatureField>,
    pub outputs: Vec<SignatureField>,
}

#[derive(Deserialize)]
struct MlModelDocument {
    signature: Option<RawSignature>,
}

#[derive(Deserialize)]
struct RawSignature {
    inputs: Option<String>,
    outputs: Option<String>,
}

impl ModelSignature {
    pub fn parse(raw: &[u8]) -> Result<Self, ResolveError> {
        let doc: MlModelDocument = serde_yaml::from_slice(raw).map_err(|e| ResolveError::Signature(format!("descriptor is not valid yaml: {e}")))?;
        let sig = doc.signature.ok_or_else(|| ResolveError::Signature("descriptor has no signature".into()))?;
        Ok(Self { inputs: parse_fields("inputs", sig.inputs)?, outputs: parse_fields("outputs", sig.outputs)? })
    }

    /// Input schema with declared types mapped onto runtime types.
    pub fn input_schema(&self) -> Result<Schema, ResolveError> {
        self.inputs
            .iter()
            .map(|f| {
                FieldType::from_declared(&f.declared)
                    .map(|ty| Field::new(f.name.clone(), ty))
                    .ok_or_else(|| ResolveError::UnsupportedType { field: f.name.clone(), declared: f.declared.clone() })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Schema::new)
    }

    /// Only single-output models are served; extra outputs are ignored.
    pub fn output_column(&self) -> Result<&str, ResolveError> {
        self.outputs.first().map(|f| f.name.as_str()).ok_or_else(|| ResolveError::Signature("signature declares no outputs".into()))
    }
}

fn parse_fields(section: &str, raw: Option<String>) -> Result<Vec<SignatureField>, ResolveError> {
    let raw = raw.ok_or_else(|| ResolveError::Signature(format!("signature has no {section}")))?;
    serde_json::from_str(&raw).map_err(|e| ResolveError::Signature(format!("signature {section} is not a column list: {e}")))
}
