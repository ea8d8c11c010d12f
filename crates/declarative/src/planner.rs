//! Execution planner - builds resource execution plans

use crate::resource::{BoxedResource, Resource};
use std::collections::HashSet;

/// An execution plan with resources split into a sequential foreground
/// batch and a concurrent background batch
pub struct ExecutionPlan {
    /// Resources applied one at a time, in insertion order
    pub foreground: Vec<BoxedResource>,
    /// Resources applied concurrently after the foreground batch
    pub background: Vec<BoxedResource>,
    seen: HashSet<String>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self {
            foreground: Vec::new(),
            background: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Add a resource to the foreground batch
    ///
    /// Returns `false` (and drops the resource) if a resource with the same
    /// id is already planned: each resource is applied at most once per run.
    pub fn add(&mut self, resource: BoxedResource) -> bool {
        self.add_resource(resource, false)
    }

    /// Add a resource, placing it in the background batch when `background`
    /// is requested and the resource allows it
    pub fn add_resource(&mut self, resource: BoxedResource, background: bool) -> bool {
        if !self.seen.insert(resource.id()) {
            log::debug!("{} already planned, skipping duplicate", resource.id());
            return false;
        }

        if background && resource.can_background() {
            self.background.push(resource);
        } else {
            self.foreground.push(resource);
        }
        true
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        let foreground: Vec<_> = self
            .foreground
            .into_iter()
            .filter(|r| predicate(r.as_ref()))
            .collect();
        let background: Vec<_> = self
            .background
            .into_iter()
            .filter(|r| predicate(r.as_ref()))
            .collect();
        let seen = foreground.iter().chain(background.iter()).map(|r| r.id()).collect();

        Self {
            foreground,
            background,
            seen,
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => self.filter(|r| matches_target(t, r.resource_type(), &r.id())),
        }
    }

    /// All resources, foreground first
    pub fn resources(&self) -> impl Iterator<Item = &BoxedResource> {
        self.foreground.iter().chain(self.background.iter())
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.foreground.len() + self.background.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.foreground.is_empty() && self.background.is_empty()
    }

    /// Check if plan has any background resources
    pub fn has_background(&self) -> bool {
        !self.background.is_empty()
    }
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a target string like "type.name" into (type, name)
///
/// Only the first `.` separates: resource names such as bucket names may
/// contain dots themselves.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((t, n)) => (Some(t.to_string()), Some(n.to_string())),
    }
}

/// Check whether a resource with this type and id matches a target
///
/// Target format: "type" or "type.name". Plural and short type aliases are
/// accepted; the name matches any part of the id.
pub fn matches_target(target: &str, resource_type: &str, id: &str) -> bool {
    let (wanted_type, name) = parse_target(target);

    if let Some(rt) = wanted_type.as_deref() {
        // Allow plural aliases
        let rt = rt.strip_suffix('s').unwrap_or(rt);
        let matches_type = match rt {
            "job" | "scheduler" => resource_type == "scheduler_job",
            "api" => resource_type == "service",
            _ => resource_type == rt,
        };
        if !matches_type {
            return false;
        }
    }

    if let Some(n) = name.as_deref()
        && !id.contains(n)
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ApplyContext;
    use crate::types::{ApplyResult, ResourceState};
    use anyhow::Result;

    #[derive(Debug)]
    struct Named {
        kind: &'static str,
        name: &'static str,
        background: bool,
    }

    impl Resource for Named {
        fn id(&self) -> String {
            format!("{}.{}", self.kind, self.name)
        }
        fn description(&self) -> String {
            self.id()
        }
        fn resource_type(&self) -> &'static str {
            self.kind
        }
        fn current_state(&self) -> Result<ResourceState> {
            Ok(ResourceState::Absent)
        }
        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }
        fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
            Ok(ApplyResult::Created)
        }
        fn can_background(&self) -> bool {
            self.background
        }
    }

    fn named(kind: &'static str, name: &'static str, background: bool) -> Box<Named> {
        Box::new(Named {
            kind,
            name,
            background,
        })
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("topic"), (Some("topic".to_string()), None));
        assert_eq!(
            parse_target("topic.report2bq-trigger"),
            (Some("topic".to_string()), Some("report2bq-trigger".to_string()))
        );
        assert_eq!(
            parse_target("bucket.acme.example.com"),
            (Some("bucket".to_string()), Some("acme.example.com".to_string()))
        );
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut plan = ExecutionPlan::new();
        assert!(plan.add(named("topic", "report2bq-trigger", false)));
        assert!(!plan.add(named("topic", "report2bq-trigger", false)));
        assert_eq!(plan.total_resources(), 1);
    }

    #[test]
    fn test_background_placement() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(named("function", "report2bq-fetcher", true), true);
        plan.add_resource(named("topic", "report2bq-fetcher", false), true);
        plan.add_resource(named("function", "report2bq-loader", true), false);

        assert_eq!(plan.background.len(), 1);
        assert_eq!(plan.foreground.len(), 2);
        assert!(plan.has_background());
    }

    #[test]
    fn test_matches_target() {
        assert!(matches_target("topic", "topic", "topic.report2bq-trigger"));
        assert!(matches_target("topics.trigger", "topic", "topic.report2bq-trigger"));
        assert!(matches_target("apis", "service", "service.pubsub.googleapis.com"));
        assert!(!matches_target("topic.fetcher", "topic", "topic.report2bq-trigger"));
        assert!(!matches_target("function", "topic", "topic.report2bq-fetcher"));
    }

    #[test]
    fn test_filter_by_target() {
        let mut plan = ExecutionPlan::new();
        plan.add(named("topic", "report2bq-trigger", false));
        plan.add(named("scheduler_job", "report2bq-job-monitor", false));
        plan.add(named("function", "report2bq-job-monitor", false));

        let jobs = plan.filter_by_target(Some("jobs"));
        assert_eq!(jobs.total_resources(), 1);

        let mut plan = ExecutionPlan::new();
        plan.add(named("topic", "report2bq-trigger", false));
        plan.add(named("topic", "report2bq-fetcher", false));
        let one = plan.filter_by_target(Some("topic.fetcher"));
        assert_eq!(one.total_resources(), 1);
    }
}
