//! Classifier seam and the decision-tree model used in production.
//!
//! The engine only needs `predict(features) -> {0,1}`. Models are trained
//! elsewhere and shipped as JSON:
//!
//! ```json
//! {
//!   "feature_count": 3,
//!   "root": {
//!     "feature": 0, "threshold": 1.5,
//!     "left":  { "label": 0 },
//!     "right": { "label": 1 }
//!   }
//! }
//! ```
//!
//! A sample goes left when `x[feature] <= threshold`.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use powerwatch_core::FeatureSchema;

use crate::error::{ClassifierError, EngineError};

/// Boxed future returned by [`Classifier::predict`].
pub type ClassifyFuture<'a> = Pin<Box<dyn Future<Output = Result<u32, ClassifierError>> + Send + 'a>>;

/// A stateless binary classifier, injected into the engine.
pub trait Classifier: Send + Sync {
    /// Number of features the model was trained on.
    fn feature_count(&self) -> usize;

    /// Predict a raw label for one feature vector.
    fn predict<'a>(&'a self, features: &'a [f64]) -> ClassifyFuture<'a>;
}

/// A validated classifier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    StayOn,
    TurnOff,
}

impl Decision {
    pub fn from_label(label: u32) -> Result<Self, ClassifierError> {
        match label {
            0 => Ok(Decision::StayOn),
            1 => Ok(Decision::TurnOff),
            other => Err(ClassifierError::MalformedOutput(other)),
        }
    }
}

/// Fail unless `classifier` accepts vectors of `schema`'s width.
pub fn ensure_schema(classifier: &dyn Classifier, schema: FeatureSchema) -> Result<(), EngineError> {
    let model = classifier.feature_count();
    if model == schema.width() {
        Ok(())
    } else {
        Err(EngineError::SchemaMismatch {
            schema: schema.name(),
            expected: schema.width(),
            model,
        })
    }
}

/// A node in a decision tree (either a split or a leaf).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        label: u32,
    },
}

impl TreeNode {
    /// Depth of the tree rooted here; leaves have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Largest feature index used by any split.
    fn max_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => [Some(*feature), left.max_feature(), right.max_feature()]
                .into_iter()
                .flatten()
                .max(),
        }
    }
}

/// Binary decision-tree classifier loaded from a JSON model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    feature_count: usize,
    root: TreeNode,
}

impl DecisionTree {
    pub fn new(feature_count: usize, root: TreeNode) -> Result<Self, ClassifierError> {
        let tree = Self {
            feature_count,
            root,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let tree: DecisionTree =
            serde_json::from_str(json).map_err(|e| ClassifierError::Model(e.to_string()))?;
        Self::new(tree.feature_count, tree.root)
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path).map_err(|source| ClassifierError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.feature_count == 0 {
            return Err(ClassifierError::Model("feature_count must be positive".to_string()));
        }
        match self.root.max_feature() {
            Some(max) if max >= self.feature_count => Err(ClassifierError::Model(format!(
                "split on feature {max} but the model has {} features",
                self.feature_count
            ))),
            _ => Ok(()),
        }
    }

    /// Walk the tree for one sample.
    pub fn predict_one(&self, features: &[f64]) -> Result<u32, ClassifierError> {
        if features.len() != self.feature_count {
            return Err(ClassifierError::WrongWidth {
                expected: self.feature_count,
                got: features.len(),
            });
        }
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { label } => return Ok(*label),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features[*feature];
                    if x.is_nan() {
                        return Err(ClassifierError::Inference(format!("feature {feature} is NaN")));
                    }
                    node = if x <= *threshold { left } else { right };
                }
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict<'a>(&'a self, features: &'a [f64]) -> ClassifyFuture<'a> {
        Box::pin(async move { self.predict_one(features) })
    }
}
