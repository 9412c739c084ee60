//! Collaborators shared by every stream of a period.

mod allocator;
mod error_thrower;

pub use allocator::{Allocator, DefaultAllocator};
pub use error_thrower::{LoaderErrorThrower, ManifestErrorSlot, NoErrors};
