//! Decision tree model stored as a pre-order node list (`tree.json`).
//!
//! ```json
//! [
//!   {"internal": {"split": {"continuous": {"feature": 1, "threshold": 50.0}}}},
//!   {"leaf": {"values": [9.0, 1.0]}},
//!   {"leaf": {"values": [2.0, 8.0]}}
//! ]
//! ```
//! An internal node is followed by its left subtree, then its right subtree.

use super::BundleError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawNode {
    Leaf { values: Vec<f64> },
    Internal { split: Split },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Goes left when `features[feature] <= threshold`.
    Continuous { feature: usize, threshold: f64 },
    /// Goes left when `features[feature]` is one of `categories`.
    Categorical { feature: usize, categories: Vec<f64> },
}

impl Split {
    fn feature(&self) -> usize {
        match self {
            Split::Continuous { feature, .. } | Split::Categorical { feature, .. } => *feature,
        }
    }

    fn goes_left(&self, x: f64) -> bool {
        match self {
            Split::Continuous { threshold, .. } => x <= *threshold,
            Split::Categorical { categories, .. } => categories.iter().any(|c| *c == x),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf { values: Vec<f64> },
    Internal { split: Split, left: Box<TreeNode>, right: Box<TreeNode> },
}

impl TreeNode {
    /// Rebuild the tree from its pre-order serialization. Trailing nodes are
    /// rejected.
    pub fn from_preorder(json: &[u8], stage: &str) -> Result<Self, BundleError> {
        let nodes: Vec<RawNode> = serde_json::from_slice(json)?;
        let mut iter = nodes.into_iter();
        let root = build(&mut iter, stage)?;
        if iter.next().is_some() {
            return Err(BundleError::InvalidStage { stage: stage.to_string(), reason: "trailing tree nodes".into() });
        }
        Ok(root)
    }

    /// Class distribution of the leaf reached by `features`.
    pub fn leaf_values(&self, features: &[f64]) -> Option<&[f64]> {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { values } => return Some(values.as_slice()),
                TreeNode::Internal { split, left, right } => {
                    let x = *features.get(split.feature())?;
                    node = if split.goes_left(x) { &**left } else { &**right };
                }
            }
        }
    }

    /// Largest feature index referenced by any split.
    pub fn max_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Internal { split, left, right } => [Some(split.feature()), left.max_feature(), right.max_feature()].into_iter().flatten().max(),
        }
    }
}

fn build(iter: &mut impl Iterator<Item = RawNode>, stage: &str) -> Result<TreeNode, BundleError> {
    match iter.next() {
        None => Err(BundleError::InvalidStage { stage: stage.to_string(), reason: "truncated tree".into() }),
        Some(RawNode::Leaf { values }) if values.is_empty() => {
            Err(BundleError::InvalidStage { stage: stage.to_string(), reason: "leaf without class values".into() })
        }
        Some(RawNode::Leaf { values }) => Ok(TreeNode::Leaf { values }),
        Some(RawNode::Internal { split }) => {
            let left = build(iter, stage)?;
            let right = build(iter, stage)?;
            Ok(TreeNode::Internal { split, left: Box::new(left), right: Box::new(right) })
        }
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] { best = i; }
    }
    best
}
