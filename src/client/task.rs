// SPDX-License-Identifier: MIT OR Apache-2.0

//! Waiting for remote tasks to finish.
//!
//! A [`TaskWaiter`] opens a private property collector with one filter on
//! the task's `info.state`, `info.error` and `info.result`, then long-polls
//! `WaitForUpdatesEx` until the state is terminal. The collector is destroyed
//! on every exit path.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::api::{
    FaultKind, LocalizedMethodFault, ManagedObjectReference, ObjectSpec, ObjectUpdateKind,
    PropertyChange, PropertyFilterSpec, PropertySpec, Session, TaskState, Value, WaitOptions,
};
use crate::client::remote::Remote;
use crate::error::{Result, VsphereError};
use crate::runtime::Context;

const TASK_PROPERTIES: &[&str] = &["info.state", "info.error", "info.result"];

/// Destroys a collector if the wait is dropped before tearing it down itself.
struct CollectorGuard {
    session: Arc<dyn Session>,
    collector: Option<ManagedObjectReference>,
}

impl CollectorGuard {
    fn disarm(&mut self) {
        self.collector = None;
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        let Some(collector) = self.collector.take() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(
                target: "vsphere_api::client",
                "no runtime to destroy property collector {}", collector
            );
            return;
        };
        let session = self.session.clone();
        handle.spawn(async move {
            if let Err(err) = session.destroy_property_collector(&collector).await {
                warn!(
                    target: "vsphere_api::client",
                    "failed to destroy property collector {}: {}", collector, err
                );
            }
        });
    }
}

/// What the waiter has seen of the task so far.
#[derive(Debug, Default)]
struct Progress {
    state: Option<TaskState>,
    error: Option<LocalizedMethodFault>,
    result: Option<Value>,
}

impl Progress {
    fn apply(&mut self, change: PropertyChange) -> Result<()> {
        match change.name.as_str() {
            "info.state" => match change.val {
                Value::String(s) => {
                    self.state = Some(TaskState::parse(&s).ok_or_else(|| {
                        VsphereError::Protocol(format!("unknown task state {s:?}"))
                    })?);
                }
                Value::Null => self.state = None,
                other => {
                    return Err(VsphereError::Protocol(format!(
                        "info.state is {}, expected string",
                        other.kind()
                    )))
                }
            },
            "info.error" => {
                self.error = match change.val {
                    Value::Fault(fault) => Some(fault),
                    _ => None,
                }
            }
            "info.result" => {
                self.result = match change.val {
                    Value::Null => None,
                    val => Some(val),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn outcome(&mut self) -> Option<Result<Option<Value>>> {
        match self.state? {
            TaskState::Queued | TaskState::Running => None,
            TaskState::Success => Some(Ok(self.result.take())),
            TaskState::Error => Some(Err(VsphereError::Fault(self.error.take().unwrap_or_else(
                || LocalizedMethodFault::new(FaultKind::Other("TaskFailed".to_string()), ""),
            )))),
        }
    }
}

/// Waits for one task at a time to reach a terminal state.
pub(crate) struct TaskWaiter<'a> {
    remote: &'a Remote,
    options: WaitOptions,
}

impl<'a> TaskWaiter<'a> {
    pub(crate) fn new(remote: &'a Remote, options: WaitOptions) -> Self {
        Self { remote, options }
    }

    /// Wait for `task` and return its result value, if it produced one.
    ///
    /// A task that ends in error yields [`VsphereError::Fault`] carrying the
    /// task's fault.
    pub(crate) async fn wait(
        &self,
        ctx: &Context,
        task: ManagedObjectReference,
    ) -> Result<Option<Value>> {
        let collector = self.remote.create_collector(ctx).await?;
        let mut guard = CollectorGuard {
            session: self.remote.session().clone(),
            collector: Some(collector.clone()),
        };

        let outcome = self.watch(ctx, &collector, &task).await;

        if let Err(err) = self.remote.destroy_collector(&collector).await {
            warn!(
                target: "vsphere_api::client",
                "failed to destroy property collector {}: {}", collector, err
            );
        }
        guard.disarm();

        outcome
    }

    async fn watch(
        &self,
        ctx: &Context,
        collector: &ManagedObjectReference,
        task: &ManagedObjectReference,
    ) -> Result<Option<Value>> {
        let spec = PropertyFilterSpec {
            prop_set: vec![PropertySpec::new(task.type_name.clone(), TASK_PROPERTIES)],
            object_set: vec![ObjectSpec::single(task.clone())],
        };
        self.remote.create_filter(ctx, collector, spec).await?;

        let mut version = String::new();
        let mut progress = Progress::default();
        loop {
            let Some(updates) = self
                .remote
                .wait_for_updates(ctx, collector, &version, &self.options)
                .await?
            else {
                debug!(target: "vsphere_api::client", "no change to {} yet", task);
                continue;
            };
            version = updates.version;

            for filter in updates.filter_set {
                for update in filter.object_set {
                    if &update.obj != task {
                        continue;
                    }
                    if update.kind == ObjectUpdateKind::Leave {
                        return Err(VsphereError::ObjectNotFound(task.clone()));
                    }
                    for change in update.change_set {
                        progress.apply(change)?;
                    }
                }
            }

            if let Some(outcome) = progress.outcome() {
                debug!(
                    target: "vsphere_api::client",
                    "task {} finished: {:?}", task, progress.state
                );
                return outcome;
            }
        }
    }
}
