//! Concrete regressors
//!
//! The experiment engine is algorithm-agnostic; these are the terminal
//! estimators the built-in experiments use: a dummy baseline, a closed-form
//! ridge, the frozen pre-trained linear models from the registry, and the
//! stacking meta-regressor over them.

pub mod linear;
pub mod pretrained;
pub mod stacking;

pub use linear::{BaselineRegressor, RidgeRegressor};
pub use pretrained::PretrainedLinear;
pub use stacking::StackedRegressor;
