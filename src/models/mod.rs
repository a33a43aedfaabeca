//! Data models for the record linkage system

pub mod algorithm;
pub mod blocking;
pub mod feature;
pub mod identifier;
pub mod mpi;
pub mod pii;
pub mod tuning;

pub use algorithm::{
    default_algorithm, AdvancedThresholds, Algorithm, AlgorithmContext, AlgorithmPass, Evaluator,
    EvaluatorFunc, LogOdd, PassKwargs, SimilarityMeasure, SkipValue,
};
pub use blocking::{BlockingKey, BLOCKING_VALUE_MAX_LENGTH};
pub use feature::{Feature, FeatureAttribute};
pub use identifier::{Identifier, IdentifierType};
pub use mpi::{Patient, Person};
pub use pii::{Address, Name, PIIRecord, Race, Sex, Telecom};
pub use tuning::{
    PassRecommendation, TuningJob, TuningParams, TuningResults, TuningStatus,
};
