/*!
 * # Machine Learning Module
 *
 * Analytical engines over the order dataset: gradient-boosted demand
 * forecasting and late-delivery classification, plus the statistical
 * inventory and supplier-scoring engines. All engines share the metrics
 * and gradient-boosting primitives defined here.
 */

/// Shared evaluation metrics and normalization helpers.
pub mod metrics;

/// Gradient-boosted decision trees (regression and binary classification).
pub mod gbdt;

/// Label encoding for categorical features.
pub mod encoder;

/// Daily demand forecasting per product category.
pub mod forecasting;

/// Late-delivery risk classification.
pub mod delivery;

/// EOQ, safety stock, and reorder point optimization.
pub mod inventory;

/// Multi-criteria department/supplier scoring.
pub mod scoring;
