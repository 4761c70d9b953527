//! Service descriptors and the JSON configuration loader.
//!
//! - [`ServiceDescriptor`] / [`Action`]: what one service runs, and how.
//! - [`Loader`]: files, directories and includes → ordered descriptor list.

#[allow(clippy::module_inception)]
mod descriptor;
mod loader;

pub use descriptor::{Action, ServiceDescriptor};
pub use loader::{Loader, load_paths};
