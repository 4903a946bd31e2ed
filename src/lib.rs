//! Forcing preparation for the HBV rainfall-runoff model.
//!
//! Builds daily `pr`, `evspsblpot` and `tas` datasets from synthetic test
//! tables, CAMELS station files or existing datasets, estimating
//! Priestley-Taylor PET where the source has none.
//!
//! ```no_run
//! use hbv_forcing::{assemble_from_config_file, ForcingAssembler};
//! use std::path::Path;
//!
//! let forcing = assemble_from_config_file(&ForcingAssembler::new(), Path::new("forcing.toml"))?;
//! println!("precipitation in {:?}", forcing.path("pr"));
//! # Ok::<(), hbv_forcing::ForcingError>(())
//! ```

pub use hbv_forcing_core::{
    assembler, dataset, errors, naming, pet, source, storage, units, variables,
};
pub use hbv_forcing_core::{
    estimate_pet, normalize_artifact, parse_timestamp, pet_for_day, AssembledForcing,
    ArtifactFormat, ArtifactNamer, AttributeValue, DataVariable, ForcingAssembler, ForcingDataset,
    ForcingError, ForcingPart, ForcingRequest, ForcingResult, ForcingSource, PetParameters,
    SequentialNamer, TimestampNamer, DEFAULT_ALPHA,
};
pub use hbv_forcing_sources::{config, sources};
pub use hbv_forcing_sources::{CamelsText, ExternalDataset, ForcingConfig, TestText};

use log::info;
use std::path::Path;

/// Reads a flat forcing configuration and assembles it.
pub fn assemble_from_config_file(
    assembler: &ForcingAssembler,
    path: &Path,
) -> ForcingResult<AssembledForcing> {
    info!("Assembling forcing from {}", path.display());
    let request = ForcingConfig::from_file(path)?.into_request()?;
    assembler.assemble(&request)
}
