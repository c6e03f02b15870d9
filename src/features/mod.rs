/// Построение новых признаков

pub mod aggregation;
pub mod binning;
pub mod polynomial;

pub use aggregation::{AggFunc, AggregationTransformer};
pub use binning::{BinningStrategy, BinningTransformer};
pub use polynomial::PolynomialFeatures;
