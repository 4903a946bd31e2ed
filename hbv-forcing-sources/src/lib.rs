//! Forcing sources for HBV.
//!
//! Three ways of obtaining forcing, each a [`ForcingSource`]:
//!
//! * [`TestText`]: synthetic `year month day pr Q pev` tables
//! * [`CamelsText`]: CAMELS station files, with Priestley-Taylor PET
//! * [`ExternalDataset`]: existing datasets, optionally in Caravan naming
//!
//! [`ForcingConfig`] maps the flat user configuration onto one of them.
//!
//! [`ForcingSource`]: hbv_forcing_core::source::ForcingSource

pub mod config;
pub mod sources;

pub use config::ForcingConfig;
pub use sources::{CamelsText, ExternalDataset, TestText};
