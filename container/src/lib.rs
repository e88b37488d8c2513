//! # corral-container
//!
//! The container abstraction: a named bundle of one task plus its
//! cgroup, PID namespace, IPC namespace, and private filesystem root,
//! instantiated from a flat image on the flash store.
//!
//! [`manager::ContainerManager`] owns the container list and composes
//! the isolation controllers into the lifecycle
//! (create → start → stop → delete, with pause/resume and a
//! reconciliation pass). [`image`] is the bit-exact codec for the flat
//! image format. [`loader::ProgramLoader`] is the seam to the external
//! code loader that turns file bytes into a running program.

#![no_std]

extern crate alloc;

pub mod container;
pub mod error;
pub mod image;
pub mod loader;
pub mod manager;
mod wrapper;

pub use container::{ContainerInfo, ContainerState};
pub use error::{ContainerError, ContainerResult};
pub use loader::{LoadError, NullLoader, ProgramLoader};
pub use manager::{ContainerManager, CONTAINER_ROOT, IMAGE_DIR, MAX_CONTAINERS};
