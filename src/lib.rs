//! Featurewise - преобразование табличных признаков

pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod models;
pub mod observer;
pub mod preprocessing;
pub mod selection;
pub mod server;
pub mod stats;
pub mod types;

pub use error::{ErrorCategory, FeatureError, Result};
pub use features::*;
pub use models::{DecisionTreeClassifier, Estimator, RandomForestClassifier};
pub use observer::{EventLevel, RecordingObserver, TracingObserver, TransformEvent, TransformObserver};
pub use preprocessing::*;
pub use selection::{FeatureSelector, ScoreFunction};
pub use types::{Column, ColumnData, ColumnKind, Scalar, Table};
