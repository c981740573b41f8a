//! Resolution of Maven 2 dependencies: coordinates and exclusion rules, repository chains, POM
//!  inheritance and dependency management, transitive resolution with cycle detection, and a
//!  verifying download cache shared between processes.
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use maven_resolve::config::ResolverSettings;
//! use maven_resolve::maven::coordinates::{Dependency, DependencyId};
//! use maven_resolve::maven::repository::maven_central;
//! use maven_resolve::resolver::Resolver;
//!
//! let resolver = Resolver::new(ResolverSettings::from_env()?);
//! let dependencies = [Dependency::new(DependencyId::new("org.slf4j", "slf4j-api", "2.0.9"))];
//! let (resolution, complete) = resolver.resolve(&dependencies, &[Arc::new(maven_central())]).await?;
//! println!("{}", resolution.pretty_print(None));
//! if !complete {
//!     eprintln!("{}", resolution.failure_report());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod interchange;
pub mod maven;
pub mod resolver;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use maven::coordinates::{Dependency, DependencyExclusion, DependencyId};
pub use maven::repository::Repository;
pub use resolver::{Resolution, ResolvedDependency, Resolver};
