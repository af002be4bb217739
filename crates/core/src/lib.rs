//! CSP violation report core types
//!
//! Wire-format normalization, noise classification and the canonical record
//! shape shared by the collector's write and read paths. Nothing here touches
//! the filesystem or the network.

pub mod noise;
pub mod normalize;
pub mod record;

pub use noise::{classify, is_extension_noise, is_ignorable, is_noise, NoiseKind};
pub use normalize::{normalize, Submission, CSP_VIOLATION_TYPE, REPORTS_CONTENT_TYPE};
pub use record::{ArrivalMetadata, CanonicalReport, RawViolation};
