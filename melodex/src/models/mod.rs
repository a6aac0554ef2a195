pub mod duplicate_group;
pub mod profile;
pub mod session;
pub mod track;

pub use duplicate_group::DuplicateGroup;
pub use profile::{Profile, ProfileStore};
pub use session::{FingerprintSession, FingerprintState, ScanSession, ScanState};
pub use track::Track;
