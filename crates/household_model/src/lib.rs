//! Household model - entity shapes for plants, projects and tasks
//!
//! These types are the unit of caching, journaling and conflict resolution.
//! Every record lives in a [`Collection`] and is addressed by its document id.

mod collection;
mod entity;
mod error;
mod patch;
mod plant;
mod project;
mod record;
mod task;

pub use collection::*;
pub use entity::*;
pub use error::*;
pub use patch::*;
pub use plant::*;
pub use project::*;
pub use record::*;
pub use task::*;
