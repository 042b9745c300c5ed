use std::collections::{BTreeSet, HashMap};

use plugin_api::Plugin;
use tracing::{debug, trace};

use crate::error::CliError;

/// Order `plugins` so that every plugin comes after the plugins it depends on.
///
/// Optional dependencies constrain the order only when the referenced plugin
/// is present. Among plugins free to go next, the one supplied first wins, so
/// the same input always yields the same order.
pub fn resolve(plugins: &[Plugin]) -> Result<Vec<&Plugin>, CliError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(plugins.len());
    for (i, plugin) in plugins.iter().enumerate() {
        if index.insert(plugin.id().as_str(), i).is_some() {
            return Err(CliError::DuplicatePlugin(plugin.id().clone()));
        }
    }

    // requires[i] lists the plugins that must be installed before plugin i.
    let mut requires: Vec<Vec<usize>> = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let mut edges = Vec::new();
        for dep in plugin.dependencies() {
            match index.get(dep.id.as_str()) {
                Some(&d) => {
                    if !edges.contains(&d) {
                        edges.push(d);
                    }
                }
                None if dep.optional => {
                    trace!(plugin = %plugin.id(), dependency = %dep.id, "optional dependency absent");
                }
                None => {
                    return Err(CliError::MissingDependency {
                        plugin: plugin.id().clone(),
                        dependency: dep.id.clone(),
                    });
                }
            }
        }
        requires.push(edges);
    }

    let mut dependents = vec![Vec::new(); plugins.len()];
    for (i, edges) in requires.iter().enumerate() {
        for &d in edges {
            dependents[d].push(i);
        }
    }

    let mut waiting: Vec<usize> = requires.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..plugins.len()).filter(|&i| waiting[i] == 0).collect();
    let mut order = Vec::with_capacity(plugins.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            waiting[dependent] -= 1;
            if waiting[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < plugins.len() {
        let cycle = find_cycle(&requires, &waiting)
            .into_iter()
            .map(|i| plugins[i].id().clone())
            .collect();
        return Err(CliError::CircularDependency { cycle });
    }

    let resolved: Vec<&Plugin> = order.into_iter().map(|i| &plugins[i]).collect();
    debug!(
        order = ?resolved.iter().map(|p| p.id().as_str()).collect::<Vec<_>>(),
        "resolved plugin order"
    );
    Ok(resolved)
}

/// Walk unresolved dependency edges until a plugin repeats; returns the
/// closed path, e.g. `[a, b, a]`.
fn find_cycle(requires: &[Vec<usize>], waiting: &[usize]) -> Vec<usize> {
    let stuck = |i: usize| waiting[i] > 0;
    let Some(start) = (0..requires.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = requires[current].iter().copied().find(|&d| stuck(d)) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
