//! Transformer stages a bundle can contain.

use super::tree::{argmax, TreeNode};
use super::{Attributes, BundleError, NodeShape};
use crate::pipeline::{LeapFrame, TransformError};
use crate::schema::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleInvalid {
    Error,
    Keep,
    Skip,
}

impl HandleInvalid {
    fn parse(stage: &str, raw: Option<&str>) -> Result<Self, BundleError> {
        match raw.unwrap_or("error") {
            "error" => Ok(HandleInvalid::Error),
            "keep" => Ok(HandleInvalid::Keep),
            "skip" => Ok(HandleInvalid::Skip),
            other => Err(BundleError::InvalidStage { stage: stage.to_string(), reason: format!("unknown handle_invalid {other}") }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stage {
    StringIndexer { input: String, output: String, labels: Vec<String>, handle_invalid: HandleInvalid },
    OneHotEncoder { input: String, output: String, size: usize, drop_last: bool, handle_invalid: HandleInvalid },
    VectorAssembler { inputs: Vec<String>, output: String },
    DecisionTreeClassifier { input: String, prediction: String, probability: Option<String>, num_features: Option<usize>, tree: TreeNode },
    IndexToString { input: String, output: String, labels: Vec<String> },
}

impl Stage {
    /// Build a stage from its `model.json` op and attributes plus the port
    /// wiring in `node.json`. `tree` is only consulted for tree models.
    pub(crate) fn build(name: &str, op: &str, attrs: &Attributes, shape: &NodeShape, tree: Option<TreeNode>) -> Result<Self, BundleError> {
        let invalid = |reason: &str| BundleError::InvalidStage { stage: name.to_string(), reason: reason.to_string() };
        match op {
            "string_indexer" => {
                let labels = attrs.string_list("labels").or_else(|| attrs.string_list("labels_array_0")).ok_or_else(|| invalid("missing labels"))?;
                Ok(Stage::StringIndexer {
                    input: shape.first_input(name)?,
                    output: shape.first_output(name)?,
                    labels,
                    handle_invalid: HandleInvalid::parse(name, attrs.string("handle_invalid"))?,
                })
            }
            "one_hot_encoder" => {
                let size = attrs
                    .long("size")
                    .or_else(|| attrs.long_list("category_sizes").and_then(|s| s.first().copied()))
                    .ok_or_else(|| invalid("missing category size"))?;
                let size = usize::try_from(size).ok().filter(|s| *s > 0).ok_or_else(|| invalid("category size must be positive"))?;
                Ok(Stage::OneHotEncoder {
                    input: shape.first_input(name)?,
                    output: shape.first_output(name)?,
                    size,
                    drop_last: attrs.boolean("drop_last").unwrap_or(true),
                    handle_invalid: HandleInvalid::parse(name, attrs.string("handle_invalid"))?,
                })
            }
            "vector_assembler" => {
                if shape.inputs.is_empty() { return Err(invalid("no input ports")); }
                Ok(Stage::VectorAssembler { inputs: shape.inputs.iter().map(|p| p.name.clone()).collect(), output: shape.first_output(name)? })
            }
            "decision_tree_classifier" => {
                let tree = tree.ok_or_else(|| invalid("missing tree.json"))?;
                let num_features = attrs.long("num_features").and_then(|n| usize::try_from(n).ok());
                if let (Some(n), Some(max)) = (num_features, tree.max_feature()) {
                    if max >= n { return Err(invalid("split references feature beyond num_features")); }
                }
                Ok(Stage::DecisionTreeClassifier {
                    input: shape.input_port("features").or_else(|| shape.inputs.first()).map(|p| p.name.clone()).ok_or_else(|| invalid("no features port"))?,
                    prediction: shape.output_port("prediction").map(|p| p.name.clone()).ok_or_else(|| invalid("no prediction port"))?,
                    probability: shape.output_port("probability").map(|p| p.name.clone()),
                    num_features,
                    tree,
                })
            }
            "index_to_string" => Ok(Stage::IndexToString {
                input: shape.first_input(name)?,
                output: shape.first_output(name)?,
                labels: attrs.string_list("labels").ok_or_else(|| invalid("missing labels"))?,
            }),
            other => Err(BundleError::UnsupportedOp { stage: name.to_string(), op: other.to_string() }),
        }
    }

    pub fn apply(&self, frame: LeapFrame) -> Result<LeapFrame, TransformError> {
        match self {
            Stage::StringIndexer { input, output, labels, handle_invalid } => {
                frame.map_column(std::slice::from_ref(input), output, |args| {
                    let label = match args[0] {
                        Value::Str(s) => s.clone(),
                        Value::Int(v) => v.to_string(),
                        other => return Err(mismatch(input, "string", other)),
                    };
                    match labels.iter().position(|l| *l == label) {
                        Some(i) => Ok(Some(Value::Double(i as f64))),
                        None => match handle_invalid {
                            HandleInvalid::Keep => Ok(Some(Value::Double(labels.len() as f64))),
                            HandleInvalid::Skip => Ok(None),
                            HandleInvalid::Error => Err(TransformError::UnseenLabel { column: input.clone(), label }),
                        },
                    }
                })
            }
            Stage::OneHotEncoder { input, output, size, drop_last, handle_invalid } => {
                let keep = *handle_invalid == HandleInvalid::Keep;
                let width = size + usize::from(keep) - usize::from(*drop_last);
                frame.map_column(std::slice::from_ref(input), output, |args| {
                    let raw = args[0].as_f64().ok_or_else(|| mismatch(input, "double", args[0]))?;
                    let mut idx = raw as i64;
                    if raw < 0.0 || raw.fract() != 0.0 || idx as usize >= *size {
                        match handle_invalid {
                            HandleInvalid::Keep => idx = *size as i64,
                            HandleInvalid::Skip => return Ok(None),
                            HandleInvalid::Error => return Err(TransformError::IndexOutOfRange { column: input.clone(), index: idx }),
                        }
                    }
                    let mut v = vec![0.0; width];
                    if let Some(slot) = v.get_mut(idx as usize) { *slot = 1.0; }
                    Ok(Some(Value::Vector(v)))
                })
            }
            Stage::VectorAssembler { inputs, output } => frame.map_column(inputs, output, |args| {
                let mut out = Vec::new();
                for (col, v) in inputs.iter().zip(args) {
                    match v {
                        Value::Vector(xs) => out.extend_from_slice(xs),
                        other => out.push(other.as_f64().ok_or_else(|| mismatch(col, "numeric", other))?),
                    }
                }
                Ok(Some(Value::Vector(out)))
            }),
            Stage::DecisionTreeClassifier { input, prediction, probability, num_features, tree } => {
                let leaf = |args: &[&Value]| -> Result<Vec<f64>, TransformError> {
                    let Value::Vector(features) = args[0] else { return Err(mismatch(input, "vector", args[0])) };
                    if let Some(n) = num_features {
                        if features.len() != *n {
                            return Err(TransformError::IndexOutOfRange { column: input.clone(), index: features.len() as i64 });
                        }
                    }
                    tree.leaf_values(features)
                        .map(<[f64]>::to_vec)
                        .ok_or_else(|| TransformError::IndexOutOfRange { column: input.clone(), index: features.len() as i64 })
                };
                let frame = frame.map_column(std::slice::from_ref(input), prediction, |args| Ok(Some(Value::Double(argmax(&leaf(args)?) as f64))))?;
                match probability {
                    Some(col) => frame.map_column(std::slice::from_ref(input), col, |args| {
                        let values = leaf(args)?;
                        let total: f64 = values.iter().sum();
                        let probs = if total > 0.0 { values.iter().map(|v| v / total).collect() } else { values };
                        Ok(Some(Value::Vector(probs)))
                    }),
                    None => Ok(frame),
                }
            }
            Stage::IndexToString { input, output, labels } => frame.map_column(std::slice::from_ref(input), output, |args| {
                let raw = args[0].as_f64().ok_or_else(|| mismatch(input, "double", args[0]))?;
                let label = if raw >= 0.0 && raw.fract() == 0.0 { labels.get(raw as usize) } else { None };
                label
                    .map(|l| Some(Value::Str(l.clone())))
                    .ok_or_else(|| TransformError::IndexOutOfRange { column: input.clone(), index: raw as i64 })
            }),
        }
    }
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> TransformError {
    TransformError::TypeMismatch { column: column.to_string(), expected, found: found.type_name() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cols: &[&str], row: Vec<Value>) -> LeapFrame {
        LeapFrame::new(cols.iter().map(|c| c.to_string()).collect(), vec![row])
    }

    fn indexer(handle_invalid: HandleInvalid) -> Stage {
        Stage::StringIndexer { input: "country".into(), output: "country_idx".into(), labels: vec!["PL".into(), "DE".into()], handle_invalid }
    }

    #[test]
    fn string_indexer_modes() {
        let out = indexer(HandleInvalid::Error).apply(frame(&["country"], vec![Value::Str("DE".into())])).unwrap();
        assert_eq!(out.value(0, "country_idx").unwrap(), &Value::Double(1.0));

        let err = indexer(HandleInvalid::Error).apply(frame(&["country"], vec![Value::Str("FR".into())])).unwrap_err();
        assert!(matches!(err, TransformError::UnseenLabel { .. }));

        let out = indexer(HandleInvalid::Keep).apply(frame(&["country"], vec![Value::Str("FR".into())])).unwrap();
        assert_eq!(out.value(0, "country_idx").unwrap(), &Value::Double(2.0));

        let out = indexer(HandleInvalid::Skip).apply(frame(&["country"], vec![Value::Str("FR".into())])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn one_hot_drops_last_category() {
        let ohe = Stage::OneHotEncoder { input: "i".into(), output: "o".into(), size: 3, drop_last: true, handle_invalid: HandleInvalid::Error };
        let out = ohe.apply(frame(&["i"], vec![Value::Double(1.0)])).unwrap();
        assert_eq!(out.value(0, "o").unwrap(), &Value::Vector(vec![0.0, 1.0]));
        let out = ohe.apply(frame(&["i"], vec![Value::Double(2.0)])).unwrap();
        assert_eq!(out.value(0, "o").unwrap(), &Value::Vector(vec![0.0, 0.0]));
        assert!(ohe.apply(frame(&["i"], vec![Value::Double(7.0)])).is_err());
    }

    #[test]
    fn one_hot_keep_uses_extra_slot() {
        let ohe = Stage::OneHotEncoder { input: "i".into(), output: "o".into(), size: 2, drop_last: false, handle_invalid: HandleInvalid::Keep };
        let out = ohe.apply(frame(&["i"], vec![Value::Double(5.0)])).unwrap();
        assert_eq!(out.value(0, "o").unwrap(), &Value::Vector(vec![0.0, 0.0, 1.0]));
    }

    #[test]
    fn assembler_flattens_vectors_and_scalars() {
        let va = Stage::VectorAssembler { inputs: vec!["a".into(), "b".into()], output: "features".into() };
        let out = va.apply(frame(&["a", "b"], vec![Value::Vector(vec![1.0, 0.0]), Value::Int(7)])).unwrap();
        assert_eq!(out.value(0, "features").unwrap(), &Value::Vector(vec![1.0, 0.0, 7.0]));
        let err = va.apply(frame(&["a", "b"], vec![Value::Str("x".into()), Value::Int(7)])).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { .. }));
    }

    #[test]
    fn tree_then_labels() {
        let tree = TreeNode::from_preorder(
            br#"[{"internal": {"split": {"continuous": {"feature": 0, "threshold": 0.5}}}}, {"leaf": {"values": [3.0, 1.0]}}, {"leaf": {"values": [0.0, 4.0]}}]"#,
            "dt",
        )
        .unwrap();
        let dt = Stage::DecisionTreeClassifier { input: "f".into(), prediction: "prediction".into(), probability: Some("probability".into()), num_features: Some(1), tree };
        let its = Stage::IndexToString { input: "prediction".into(), output: "label".into(), labels: vec!["user".into(), "bot".into()] };

        let out = its.apply(dt.apply(frame(&["f"], vec![Value::Vector(vec![0.2])])).unwrap()).unwrap();
        assert_eq!(out.value(0, "label").unwrap(), &Value::Str("user".into()));
        assert_eq!(out.value(0, "probability").unwrap(), &Value::Vector(vec![0.75, 0.25]));

        let out = its.apply(dt.apply(frame(&["f"], vec![Value::Vector(vec![0.9])])).unwrap()).unwrap();
        assert_eq!(out.value(0, "label").unwrap(), &Value::Str("bot".into()));

        assert!(dt.apply(frame(&["f"], vec![Value::Vector(vec![0.9, 1.0])])).is_err());
    }
}
