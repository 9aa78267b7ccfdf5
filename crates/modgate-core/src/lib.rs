//! Modgate Core
//!
//! Module-based access control for a managed runtime:
//! - **Descriptors**: immutable module declarations (`descriptor` module)
//! - **Resolution**: closing root modules over `requires` into a configuration
//!   (`finder`, `resolver`, `configuration` modules)
//! - **Layers**: binding configurations to loaders and creating runtime
//!   modules (`layer`, `loader`, `module` modules)
//! - **Access checks**: readability plus export visibility (`access` module)
//! - **Registry**: the [`ModuleSystem`] that owns all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use modgate_core::{ModuleDescriptor, ModuleLibrary, ModuleSystem, Loader, check_access};
//!
//! let system = ModuleSystem::new()?;
//! let m1 = ModuleDescriptor::builder("m1").requires("java.base").requires("m2").exports("p1").build()?;
//! let m2 = ModuleDescriptor::builder("m2").requires("java.base").exports_to("p2", ["m1"]).build()?;
//! let library = ModuleLibrary::of([m1, m2])?;
//!
//! let cf = system.resolve(&library, system.boot_configuration(), &[], &["m1"])?;
//! let layer = system.create_layer_with_one_loader(&cf, system.boot_layer(), Loader::custom())?;
//!
//! let (m1, m2) = (layer.module("m1").unwrap(), layer.module("m2").unwrap());
//! assert!(check_access(m1, m2, "p2").is_allowed());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod config;
pub mod configuration;
pub mod deps;
pub mod descriptor;
pub mod finder;
pub mod layer;
pub mod loader;
pub mod module;
pub mod resolver;
pub mod system;

pub use access::{check_access, AccessDecision, AccessError, AccessRequest, DenyReason};
pub use config::{BootConfig, ConfigError, ModuleSpec, SystemConfig};
pub use configuration::{Configuration, ConfigurationId, ResolvedModule};
pub use descriptor::{DescriptorError, ExportSpec, ModuleDescriptor, ModuleDescriptorBuilder};
pub use finder::{ChainedFinder, EmptyFinder, ModuleFinder, ModuleLibrary};
pub use layer::{Layer, LayerError, LayerId};
pub use loader::{Loader, LoaderId};
pub use module::{Module, ModuleIdentity, ModuleRef, NotOwnedPackageError, RuntimeExport};
pub use resolver::{ResolutionError, Resolver};
pub use system::ModuleSystem;

/// Errors surfaced by the module system
///
/// Every variant is a misconfiguration; denied access is an
/// [`AccessDecision`], not an error.
#[derive(Debug, thiserror::Error)]
pub enum ModuleSystemError {
    /// Malformed descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Unsatisfiable or conflicting module graph
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Inconsistent loader assignment
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// Export of a package the module does not contain
    #[error(transparent)]
    NotOwnedPackage(#[from] NotOwnedPackageError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No runtime module has this identity
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleIdentity),
}

/// Module system result
pub type ModuleSystemResult<T> = Result<T, ModuleSystemError>;
