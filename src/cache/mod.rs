//! Content-addressable cache for images and exported build output
//!
//! Cache keys are derived from a fingerprint of the recipe content plus the
//! repository identity, so identical content always maps to the same registry
//! reference and any changed byte maps to a new one. Entries are never
//! invalidated; a stale entry is simply never looked up again.
//!
//! # Tiers
//!
//! | Tier | Image (`pull_cached`) | Export (`export_cached`) |
//! |------|-----------------------|--------------------------|
//! | Local | - | cache directory exists |
//! | Remote | `<engine> pull` | `oras pull --output` |
//! | Build | `<engine> build` | `<engine> buildx build --output type=local` |
//! | Populate | `<engine> push` (opt-in) | `oras push` (opt-in) |
//!
//! Remote and populate failures are logged and demoted; build failures and
//! missing recipes are returned to the caller.

mod filter;
pub mod fingerprint;
mod flight;
pub mod key;
mod layout;
mod store;

pub use filter::KeepFilter;
pub use fingerprint::{file_digest, Fingerprinter, Sha256Fingerprinter};
pub use flight::KeyLocks;
pub use key::{image_cache_name, RepoIdentity};
pub use layout::find_cache_dir;
pub use store::{CacheKey, CacheSettings, ImageCache, EXPORT_CONTENT_TYPE};
