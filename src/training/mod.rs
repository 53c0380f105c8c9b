//! Model training module
//!
//! Provides the base learners of the stacked ensemble and the machinery to tune them:
//! - Extra Trees (Extremely Randomized Trees)
//! - K-Nearest Neighbors
//! - Gradient boosting over regression trees
//! - Logistic regression (meta learner)
//! - Stratified cross-validation, ROC-AUC and classification metrics
//! - Per-learner hyperparameter search

pub mod cross_validation;
pub mod decision_tree;
pub mod extra_trees;
pub mod gradient_boosting;
pub mod knn;
pub mod learner;
pub mod logistic;
pub mod metrics;
pub mod search;

pub use cross_validation::{train_test_split, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{RegressionTree, TreeNode};
pub use extra_trees::ExtraTreesClassifier;
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::{DistanceMetric, KnnClassifier, KnnConfig, WeightScheme};
pub use learner::{ExtraTreesConfig, FittedLearner, Learner, LearnerConfig, LearnerKind};
pub use logistic::LogisticRegression;
pub use metrics::{roc_auc, ClassificationMetrics};
pub use search::{HyperparameterSearch, SearchOutcome};
