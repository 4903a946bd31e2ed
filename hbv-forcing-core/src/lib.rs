//! Core building blocks for HBV forcing data.
//!
//! A forcing run starts from a [`assembler::ForcingRequest`] naming a
//! directory, an inclusive time window and a [`source::ForcingSource`].
//! The [`assembler::ForcingAssembler`] turns it into cropped, persisted
//! datasets holding `pr`, `evspsblpot` and `tas`.

pub mod assembler;
pub mod dataset;
pub mod errors;
pub mod naming;
pub mod pet;
pub mod source;
pub mod storage;
pub mod units;
pub mod variables;

pub use assembler::{parse_timestamp, AssembledForcing, ForcingAssembler, ForcingRequest};
pub use dataset::{AttributeValue, DataVariable, ForcingDataset};
pub use errors::{ForcingError, ForcingResult};
pub use naming::{ArtifactFormat, ArtifactNamer, SequentialNamer, TimestampNamer};
pub use pet::{estimate_pet, pet_for_day, PetParameters, DEFAULT_ALPHA};
pub use source::{ForcingPart, ForcingSource};
pub use units::normalize_artifact;
