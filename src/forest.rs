//! Tree-ensemble inference for the exported stress classifier.
//!
//! The forest is trained elsewhere and dumped to JSON in sklearn's array
//! layout (`children_left`, `children_right`, `feature`, `threshold`,
//! `value`); this module only predicts. Like sklearn's `RandomForestClassifier`
//! the ensemble averages per-tree class distributions and takes the argmax,
//! lowest index winning ties.

use serde::Deserialize;

/// Array-form tree as exported. Leaves have `children_left == -1`.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeJson {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights (counts or fractions).
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForestJson {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<TreeJson>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Normalized class distribution.
    Leaf(Vec<f64>),
}

/// A validated decision tree.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Validate array-form nodes.
    ///
    /// Child pointers must point forward (sklearn's pre-order layout), which
    /// also rules out cycles, so `leaf_distribution` always terminates.
    pub fn from_json(tree: &TreeJson, n_features: usize, n_classes: usize) -> Result<Self, String> {
        let n = tree.feature.len();
        if n == 0 {
            return Err("empty tree".into());
        }
        if tree.children_left.len() != n
            || tree.children_right.len() != n
            || tree.threshold.len() != n
            || tree.value.len() != n
        {
            return Err("inconsistent array lengths".into());
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (l, r) = (tree.children_left[i], tree.children_right[i]);
            if l < 0 {
                let weights = &tree.value[i];
                if weights.len() != n_classes {
                    return Err(format!(
                        "node {i}: {} class weights, expected {n_classes}",
                        weights.len()
                    ));
                }
                let total: f64 = weights.iter().sum();
                let dist = if total > 0.0 {
                    weights.iter().map(|w| w / total).collect()
                } else {
                    vec![0.0; n_classes]
                };
                nodes.push(Node::Leaf(dist));
                continue;
            }
            let feature = usize::try_from(tree.feature[i])
                .ok()
                .filter(|f| *f < n_features)
                .ok_or_else(|| format!("node {i}: feature index {} out of range", tree.feature[i]))?;
            let child = |c: i64| {
                usize::try_from(c)
                    .ok()
                    .filter(|c| *c > i && *c < n)
                    .ok_or_else(|| format!("node {i}: bad child pointer {c}"))
            };
            nodes.push(Node::Split {
                feature,
                threshold: tree.threshold[i],
                left: child(l)?,
                right: child(r)?,
            });
        }
        Ok(Self { nodes })
    }

    /// Class distribution of the leaf reached by `features`.
    /// Values `<= threshold` go left.
    pub fn leaf_distribution(&self, features: &[f64]) -> &[f64] {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(dist) => return dist,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Soft-voting ensemble of decision trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    pub fn from_json(forest: &ForestJson) -> Result<Self, String> {
        if forest.trees.is_empty() {
            return Err("empty forest".into());
        }
        if forest.n_classes == 0 {
            return Err("n_classes must be positive".into());
        }
        let trees = forest
            .trees
            .iter()
            .enumerate()
            .map(|(i, t)| {
                DecisionTree::from_json(t, forest.n_features, forest.n_classes)
                    .map_err(|e| format!("tree {i}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            trees,
            n_features: forest.n_features,
            n_classes: forest.n_classes,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let forest: ForestJson = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Self::from_json(&forest)
    }

    /// Mean class distribution over all trees.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.leaf_distribution(features)) {
                *a += p;
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }

    pub fn predict(&self, features: &[f64]) -> usize {
        let proba = self.predict_proba(features);
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        best
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub const fn n_classes(&self) -> usize {
        self.n_classes
    }
}
