/// Модуль предобработки данных

pub mod datetime;
pub mod encoding;
pub mod imputation;
pub mod normalization;
pub mod resolver;

pub use datetime::{DateTimeExtractor, DateTimeField};
pub use encoding::{Encoder, Encoding};
pub use imputation::{ImputeStrategy, Imputer};
pub use normalization::{ColumnScaler, Scaler, ScalingMethod};
pub use resolver::ColumnStrategyResolver;
