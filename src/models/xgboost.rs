//! Native evaluator for XGBoost JSON tree ensembles.
//!
//! Reads the document written by `XGBClassifier.save_model("model.json")`
//! and predicts by walking the trees directly, so serving needs no native
//! runtime. Only the `gbtree` booster with numerical splits is supported.

use crate::error::{ArtifactLoadError, InferenceError};
use crate::feature_encoder::FeatureVector;
use crate::models::loader::Classifier;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

// ---- on-disk document ----

#[derive(Debug, Deserialize)]
struct ModelDocument {
    learner: LearnerDocument,
}

#[derive(Debug, Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDocument,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDocument,
}

#[derive(Debug, Deserialize)]
struct BoosterDocument {
    name: String,
    #[serde(default)]
    model: Option<TreeModelDocument>,
}

#[derive(Debug, Deserialize)]
struct TreeModelDocument {
    trees: Vec<TreeDocument>,
    tree_info: Vec<usize>,
}

/// XGBoost stores these as strings
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde(default = "default_base_score")]
    base_score: String,
    #[serde(default)]
    num_class: String,
    num_feature: String,
}

fn default_base_score() -> String {
    "0.5".to_string()
}

#[derive(Debug, Deserialize)]
struct ObjectiveDocument {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    #[serde(default)]
    default_left: Vec<Flag>,
    #[serde(default)]
    categories_nodes: Vec<i64>,
}

/// `default_left` is written as 0/1 by current releases and as booleans by
/// some older ones
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

// ---- evaluation model ----

/// How margins turn into a class decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// `multi:softprob` / `multi:softmax`: one margin per class
    Softmax,
    /// `binary:*`: single margin, class 1 when positive
    Binary,
}

#[derive(Debug, Clone)]
struct Node {
    left: i64,
    right: i64,
    feature: usize,
    /// Split threshold, or leaf value when `left == -1`
    value: f32,
    default_left: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(doc: TreeDocument, num_feature: usize) -> Result<Self, String> {
        let n = doc.left_children.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if doc.right_children.len() != n
            || doc.split_indices.len() != n
            || doc.split_conditions.len() != n
            || (!doc.default_left.is_empty() && doc.default_left.len() != n)
        {
            return Err(format!("node arrays disagree on length (expected {})", n));
        }
        if !doc.categories_nodes.is_empty() {
            return Err("categorical splits are not supported".to_string());
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let left = doc.left_children[i];
            let right = doc.right_children[i];
            let feature = doc.split_indices[i] as usize;
            if left != -1 {
                if !(0..n as i64).contains(&left) || !(0..n as i64).contains(&right) {
                    return Err(format!("node {} has child outside the tree", i));
                }
                if feature >= num_feature {
                    return Err(format!(
                        "node {} splits on feature {} but model has {}",
                        i, feature, num_feature
                    ));
                }
            }
            nodes.push(Node {
                left,
                right,
                feature,
                value: doc.split_conditions[i],
                default_left: doc.default_left.get(i).map(Flag::is_set).unwrap_or(false),
            });
        }

        let tree = Self { nodes };
        tree.check_acyclic()?;
        Ok(tree)
    }

    /// Every node reachable from the root at most once, so walks terminate
    fn check_acyclic(&self) -> Result<(), String> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            if visited[i] {
                return Err(format!("node {} is reachable twice", i));
            }
            visited[i] = true;
            let node = &self.nodes[i];
            if node.left != -1 {
                stack.push(node.left as usize);
                stack.push(node.right as usize);
            }
        }
        Ok(())
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut node = &self.nodes[0];
        while node.left != -1 {
            let x = features[node.feature];
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                x < node.value
            };
            let next = if go_left { node.left } else { node.right };
            node = &self.nodes[next as usize];
        }
        node.value
    }
}

/// Gradient-boosted tree classifier loaded from XGBoost JSON.
#[derive(Debug, Clone)]
pub struct XgbClassifier {
    trees: Vec<Tree>,
    /// Output group each tree contributes to
    tree_group: Vec<usize>,
    /// Starting margin per output group
    base_margin: Vec<f32>,
    objective: Objective,
    num_feature: usize,
    feature_names: Vec<String>,
}

impl XgbClassifier {
    /// Load a model file written by `save_model`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let model = Self::from_json_str(&content).map_err(|reason| {
            ArtifactLoadError::Malformed {
                path: path.to_path_buf(),
                reason,
            }
        })?;

        info!(
            path = %path.display(),
            trees = model.tree_count(),
            classes = model.num_classes(),
            objective = ?model.objective(),
            "XGBoost model loaded"
        );
        Ok(model)
    }

    /// Parse and validate a model document
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        let doc: ModelDocument = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let learner = doc.learner;

        if learner.gradient_booster.name != "gbtree" {
            return Err(format!(
                "booster '{}' is not supported, expected gbtree",
                learner.gradient_booster.name
            ));
        }
        let tree_model = learner
            .gradient_booster
            .model
            .ok_or_else(|| "gbtree booster has no model section".to_string())?;

        let objective_name = learner.objective.name.as_str();
        let objective = match objective_name {
            "multi:softprob" | "multi:softmax" => Objective::Softmax,
            "binary:logistic" | "binary:logitraw" | "binary:hinge" => Objective::Binary,
            other => return Err(format!("objective '{}' is not a classifier", other)),
        };
        // Both logistic objectives transform base_score with the logit; hinge
        // and softmax use it as a margin unchanged
        let base_is_probability =
            matches!(objective_name, "binary:logistic" | "binary:logitraw");

        let params = &learner.learner_model_param;
        let num_feature: usize = params
            .num_feature
            .parse()
            .map_err(|_| format!("invalid num_feature '{}'", params.num_feature))?;
        let num_class: usize = if params.num_class.is_empty() {
            0
        } else {
            params
                .num_class
                .parse()
                .map_err(|_| format!("invalid num_class '{}'", params.num_class))?
        };

        let num_groups = match objective {
            Objective::Softmax if num_class < 2 => {
                return Err(format!("softmax objective with num_class {}", num_class))
            }
            Objective::Softmax => num_class,
            Objective::Binary => 1,
        };

        if tree_model.tree_info.len() != tree_model.trees.len() {
            return Err(format!(
                "tree_info has {} entries for {} trees",
                tree_model.tree_info.len(),
                tree_model.trees.len()
            ));
        }
        if let Some(&group) = tree_model.tree_info.iter().find(|&&g| g >= num_groups) {
            return Err(format!(
                "tree assigned to output group {} of {}",
                group, num_groups
            ));
        }

        let trees = tree_model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_document(t, num_feature).map_err(|e| format!("tree {}: {}", i, e)))
            .collect::<Result<Vec<_>, _>>()?;

        let base_margin = parse_base_score(&params.base_score, num_groups, base_is_probability)?;

        if !learner.feature_names.is_empty() && learner.feature_names.len() != num_feature {
            return Err(format!(
                "{} feature names for {} features",
                learner.feature_names.len(),
                num_feature
            ));
        }

        Ok(Self {
            trees,
            tree_group: tree_model.tree_info,
            base_margin,
            objective,
            num_feature,
            feature_names: learner.feature_names,
        })
    }

    /// Raw per-group margins for one row of at least `num_feature` values
    pub fn margins(&self, features: &[f32]) -> Vec<f32> {
        let mut margins = self.base_margin.clone();
        for (tree, &group) in self.trees.iter().zip(&self.tree_group) {
            margins[group] += tree.leaf_value(features);
        }
        margins
    }

    /// Class probabilities from per-group margins
    fn probabilities(&self, margins: &[f32]) -> Vec<f32> {
        match self.objective {
            Objective::Softmax => softmax(margins),
            Objective::Binary => {
                let p = sigmoid(margins[0]);
                vec![1.0 - p, p]
            }
        }
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Number of boosted trees across all output groups
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn decide(&self, margins: &[f32]) -> usize {
        match self.objective {
            Objective::Softmax => argmax(margins),
            Objective::Binary => usize::from(margins[0] > 0.0),
        }
    }
}

impl Classifier for XgbClassifier {
    fn predict_index(&self, features: &FeatureVector) -> Result<usize, InferenceError> {
        let row = features.to_f32();
        if row.len() < self.num_feature {
            return Err(InferenceError::Backend(format!(
                "model expects {} features, got {}",
                self.num_feature,
                row.len()
            )));
        }

        let margins = self.margins(&row);
        let index = self.decide(&margins);
        debug!(
            margins = ?margins,
            probabilities = ?self.probabilities(&margins),
            index = index,
            "Tree ensemble evaluated"
        );
        Ok(index)
    }

    fn num_classes(&self) -> usize {
        match self.objective {
            Objective::Softmax => self.base_margin.len(),
            Objective::Binary => 2,
        }
    }

    fn feature_count(&self) -> usize {
        self.num_feature
    }

    fn feature_names(&self) -> Option<&[String]> {
        if self.feature_names.is_empty() {
            None
        } else {
            Some(self.feature_names.as_slice())
        }
    }

    fn format(&self) -> &'static str {
        "xgboost"
    }
}

/// `base_score` is a scalar (`"5E-1"`) or, in newer releases, a bracketed
/// per-group list. Logistic objectives store it as a probability.
fn parse_base_score(
    raw: &str,
    num_groups: usize,
    base_is_probability: bool,
) -> Result<Vec<f32>, String> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let values = trimmed
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid base_score '{}'", raw))?;

    let mut margins = match values.len() {
        1 => vec![values[0]; num_groups],
        n if n == num_groups => values,
        n => return Err(format!("base_score has {} values for {} groups", n, num_groups)),
    };

    if base_is_probability {
        for m in margins.iter_mut() {
            if *m > 0.0 && *m < 1.0 {
                *m = (*m / (1.0 - *m)).ln();
            }
        }
    }
    Ok(margins)
}

/// First index of the largest value, as numpy's argmax
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn softmax(margins: &[f32]) -> Vec<f32> {
    let max = margins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
