//! Execution planner - declarations to an execution plan

use anyhow::Result;
use declarative::{ExecutionPlan, matches_target};
use gcloudkit::{Provider, ResourceDeclaration};
use std::sync::Arc;

use crate::resource::{CloudResource, Resource};

/// Keep only the declarations a `--target` selects
///
/// Runs before cleanup and planning, so nothing outside the target is
/// deleted or applied.
pub fn select_target(
    declarations: Vec<ResourceDeclaration>,
    target: Option<&str>,
) -> Vec<ResourceDeclaration> {
    let Some(target) = target else {
        return declarations;
    };
    let selected: Vec<_> = declarations
        .into_iter()
        .filter(|d| matches_target(target, d.kind.as_str(), &d.id()))
        .collect();
    log::debug!("Target '{target}' selects {} resources", selected.len());
    selected
}

/// Build the plan for a run
///
/// With `background`, resources that allow it (function deployments) go to
/// the background batch, each through the provider `background_provider`
/// returns for it, so every deployment can log to its own file. Everything
/// else runs in the foreground through `provider`, in declaration order.
pub fn build_plan<F>(
    declarations: Vec<ResourceDeclaration>,
    provider: &Arc<dyn Provider>,
    background: bool,
    mut background_provider: F,
) -> Result<ExecutionPlan>
where
    F: FnMut(&ResourceDeclaration) -> Result<Arc<dyn Provider>>,
{
    let mut plan = ExecutionPlan::new();

    for declaration in declarations {
        let resource = CloudResource::new(declaration, Arc::clone(provider));
        if background && resource.can_background() {
            let own = background_provider(resource.declaration())?;
            let resource = CloudResource::new(resource.declaration().clone(), own);
            plan.add_resource(Box::new(resource), true);
        } else {
            plan.add(Box::new(resource));
        }
    }

    log::debug!(
        "Planned {} foreground and {} background resources",
        plan.foreground.len(),
        plan.background.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcloudkit::MemoryProvider;

    fn declarations() -> Vec<ResourceDeclaration> {
        vec![
            ResourceDeclaration::topic("report2bq-fetcher"),
            ResourceDeclaration::function("report2bq-fetcher", "report_fetch"),
            ResourceDeclaration::function("report2bq-loader", "report_upload"),
        ]
    }

    #[test]
    fn test_foreground_only() {
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new("acme-data"));
        let plan = build_plan(
            declarations(),
            &provider,
            false,
            |_| unreachable!("no background providers without --background"),
        )
        .unwrap();
        assert_eq!(plan.foreground.len(), 3);
        assert!(!plan.has_background());
    }

    #[test]
    fn test_background_functions_get_own_provider() {
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new("acme-data"));
        let mut requested = Vec::new();
        let plan = build_plan(declarations(), &provider, true, |decl| {
            requested.push(decl.name.clone());
            Ok(Arc::new(MemoryProvider::new("acme-data")) as Arc<dyn Provider>)
        })
        .unwrap();

        assert_eq!(plan.foreground.len(), 1);
        assert_eq!(plan.background.len(), 2);
        assert_eq!(requested, vec!["report2bq-fetcher", "report2bq-loader"]);
    }

    #[test]
    fn test_select_target() {
        let selected = select_target(declarations(), Some("function.loader"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), "function.report2bq-loader");

        assert_eq!(select_target(declarations(), Some("functions")).len(), 2);
        assert_eq!(select_target(declarations(), None).len(), 3);
    }
}
