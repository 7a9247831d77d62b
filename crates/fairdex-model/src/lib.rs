#![forbid(unsafe_code)]

mod author;
mod dataset;
mod doi;
mod indexes;
mod job;
mod score;

pub use author::{Author, NameIdentifier, NameType};
pub use dataset::{DatasetRecord, IdentifierType};
pub use doi::{normalize_doi, Doi, ValidationError, DOI_MAX_LEN};
pub use indexes::{latest_per_entity, mean_latest_sindex, DIndexRecord, SIndexRecord};
pub use job::JobDescriptor;
pub use score::{FairScore, ScoreValue, SCORE_MAX, SCORE_MIN};

pub const CRATE_NAME: &str = "fairdex-model";
