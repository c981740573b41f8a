use std::sync::Arc;
use std::time::Instant;

use async_recursion::async_recursion;
use tracing::{debug, info};

use crate::maven::coordinates::{Dependency, DependencyExclusion, DependencyId};
use crate::maven::pom::ScopeKind;
use crate::maven::repository::{sort_for_resolution, Repository};
use crate::resolver::{DependencyMapper, Resolution, Resolver};
use crate::util::directory_lock::lock_all;

/// Path from the current root down to the dependency being resolved, and the exclusion rules
///  declared along it
#[derive(Default)]
struct ResolutionStacks {
    dependencies: Vec<DependencyId>,
    exclusions: Vec<DependencyExclusion>,
}

impl ResolutionStacks {
    fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.exclusions.is_empty()
    }

    /// `A → B → ↪ C → D → ↩` for a stack `A, B, C, D` that reached `C` again
    fn cycle(&self, repeated: &DependencyId) -> String {
        let mut result = String::new();
        for id in &self.dependencies {
            if id == repeated {
                result.push_str("↪ ");
            }
            result.push_str(&id.to_string());
            result.push_str(" → ");
        }
        result.push('↩');
        result
    }

    fn excluding_rule(&self, id: &DependencyId) -> Option<&DependencyExclusion> {
        self.exclusions.iter().find(|rule| rule.excludes(id))
    }
}

impl Resolver {
    /// Resolves `dependencies` transitively into `resolution`, reusing what it already contains.
    ///
    /// The caches of all involved remote repositories are locked for the duration of the run.
    ///  Returns `true` iff every coordinate reached during this run resolved successfully.
    pub async fn resolve_into(&self, resolution: &mut Resolution, dependencies: &[Dependency], repositories: &[Arc<Repository>], mapper: DependencyMapper<'_>) -> anyhow::Result<bool> {
        let start = Instant::now();
        let chain = sort_for_resolution(repositories);

        let writable_directories = chain.iter()
            .filter(|r| !r.is_local())
            .filter_map(|r| r.directory_to_lock())
            .collect::<Vec<_>>();
        let _locks = lock_all(writable_directories).await?;

        let mut stacks = ResolutionStacks::default();
        let mut complete = true;
        for dependency in dependencies {
            complete &= self.do_resolve(resolution, &mut stacks, dependency, &chain, mapper).await;
            debug_assert!(stacks.is_empty(), "resolution stacks not balanced after resolving {}", dependency);
        }

        debug!("resolved {} dependencies in {} ms, complete: {}", resolution.len(), start.elapsed().as_millis(), complete);
        Ok(complete)
    }

    #[async_recursion]
    async fn do_resolve<'m>(&self, resolution: &mut Resolution, stacks: &mut ResolutionStacks, dependency: &Dependency, repositories: &[Arc<Repository>], mapper: DependencyMapper<'m>) -> bool
    where 'm: 'async_recursion
    {
        let dependency = mapper(dependency);
        let id = dependency.id;

        if stacks.dependencies.contains(&id) {
            info!("circular dependency: {}", stacks.cycle(&id));
            return true;
        }

        let stack_depth = stacks.dependencies.len();
        let exclusions_depth = stacks.exclusions.len();
        stacks.dependencies.push(id.clone());

        let needs_resolution = match resolution.get(&id) {
            None => true,
            Some(previous) => previous.has_error
                && previous.id.preferred_repository.is_none()
                && id.preferred_repository.is_some(),
        };
        if needs_resolution {
            let resolved = self.resolve_single_dependency(&id, repositories).await;
            resolution.insert_requested(id.clone(), resolved);
        }

        let (mut ok, children) = match resolution.get(&id) {
            Some(resolved) => (!resolved.has_error, resolved.dependencies.clone()),
            None => (false, vec![]),
        };

        stacks.exclusions.extend(dependency.exclusions);
        let is_root = stack_depth == 0;

        for child in &children {
            if !is_root && ScopeKind::of(child.id.scope()) == ScopeKind::NonTransitive {
                debug!("skipping {} in scope {} (dependency of {})", child.id, child.id.scope(), id);
                continue;
            }
            if let Some(rule) = stacks.excluding_rule(&child.id) {
                debug!("excluded {} with rule {} (dependency of {})", child.id, rule, id);
                continue;
            }
            ok &= self.do_resolve(resolution, stacks, child, repositories, mapper).await;
        }

        stacks.exclusions.truncate(exclusions_depth);
        stacks.dependencies.truncate(stack_depth);
        ok
    }
}
