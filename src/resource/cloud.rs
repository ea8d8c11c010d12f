//! Cloud resource - one declaration converged through a provider

use anyhow::Result;
use gcloudkit::{ObservedState, Outcome, Provider, Reconciler, ResourceDeclaration, ResourceKind};
use std::fmt;
use std::sync::Arc;

use super::{ApplyContext, ApplyResult, Resource, ResourceState};

/// A declared Google Cloud resource
pub struct CloudResource {
    declaration: ResourceDeclaration,
    provider: Arc<dyn Provider>,
}

impl CloudResource {
    pub fn new(declaration: ResourceDeclaration, provider: Arc<dyn Provider>) -> Self {
        Self {
            declaration,
            provider,
        }
    }

    pub fn declaration(&self) -> &ResourceDeclaration {
        &self.declaration
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.provider.as_ref())
    }
}

impl fmt::Debug for CloudResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudResource")
            .field("declaration", &self.declaration)
            .field("project", &self.provider.project())
            .finish()
    }
}

/// Fields shown and compared in previews, per kind
fn compared_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::SchedulerJob => &["schedule", "topic"],
        ResourceKind::Function => &["entry_point", "runtime"],
        _ => &[],
    }
}

fn details<'a>(pairs: impl Iterator<Item = (&'a str, Option<&'a str>)>) -> Option<String> {
    let parts: Vec<String> = pairs
        .filter_map(|(k, v)| v.map(|v| format!("{k}={v}")))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

impl Resource for CloudResource {
    fn id(&self) -> String {
        self.declaration.id()
    }

    fn description(&self) -> String {
        let d = &self.declaration;
        let name = d.name.as_str();
        match d.kind {
            ResourceKind::Topic => format!("Pub/Sub topic {name}"),
            ResourceKind::SchedulerJob => format!(
                "Scheduler job {name} ({})",
                d.get("schedule").unwrap_or("no schedule")
            ),
            ResourceKind::Bucket => format!("Bucket gs://{name}"),
            ResourceKind::Function => format!(
                "Function {name} ({})",
                d.get("entry_point").unwrap_or("no entry point")
            ),
            ResourceKind::Dataset => format!("BigQuery dataset {name}"),
            ResourceKind::Secret => format!("Secret {name}"),
            ResourceKind::ServiceAccount => format!("Service account {name}"),
            ResourceKind::Service => format!("API {name}"),
            ResourceKind::Object => format!("Object {name}"),
        }
    }

    fn resource_type(&self) -> &'static str {
        self.declaration.kind.as_str()
    }

    fn current_state(&self) -> Result<ResourceState> {
        let observed = self.reconciler().observe(&self.declaration)?;
        Ok(match observed {
            ObservedState::Absent => ResourceState::Absent,
            ObservedState::Present { .. } => ResourceState::Present {
                details: details(
                    compared_fields(self.declaration.kind)
                        .iter()
                        .map(|k| (*k, observed.field(k))),
                ),
            },
        })
    }

    fn desired_state(&self) -> ResourceState {
        let d = &self.declaration;
        ResourceState::Present {
            details: details(compared_fields(d.kind).iter().map(|k| {
                let value = match *k {
                    "runtime" => d.get(k).or(Some("python310")),
                    _ => d.get(k),
                };
                (*k, value)
            })),
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let outcome = self.reconciler().reconcile(&self.declaration).map_err(|e| {
            anyhow::anyhow!("{}: {e}. {}", self.id(), e.category().advice())
        })?;
        log::debug!("{} reconciled: {:?}", self.id(), outcome);

        if ctx.dry_run && outcome.is_change() {
            return Ok(ApplyResult::Skipped {
                reason: "dry run".to_string(),
            });
        }

        Ok(match outcome {
            Outcome::Created => ApplyResult::Created,
            Outcome::Recreated | Outcome::Deployed | Outcome::Updated => ApplyResult::Modified,
            Outcome::Unchanged => ApplyResult::NoChange,
        })
    }

    fn can_background(&self) -> bool {
        self.declaration.kind == ResourceKind::Function
    }
}
