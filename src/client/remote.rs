// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logged, cancellable access to the session.

use std::future::Future;
use std::sync::Arc;

use crate::api::{
    ManagedObjectReference, Method, MethodResult, ObjectContent, PropertyFilterSpec,
    ServiceContent, Session, UpdateSet, WaitOptions,
};
use crate::error::Result;
use crate::runtime::{Context, RequestLogger};

/// A session paired with the logger every round trip is reported to.
pub(crate) struct Remote {
    session: Arc<dyn Session>,
    logger: Arc<RequestLogger>,
}

impl Remote {
    pub(crate) fn new(session: Arc<dyn Session>, logger: Arc<RequestLogger>) -> Self {
        Self { session, logger }
    }

    pub(crate) fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub(crate) fn logger(&self) -> &Arc<RequestLogger> {
        &self.logger
    }

    pub(crate) fn content(&self) -> &ServiceContent {
        self.session.service_content()
    }

    async fn logged<T, F>(&self, method: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = self.logger.start(method);
        match fut.await {
            Ok(value) => {
                self.logger.finish_success(span);
                Ok(value)
            }
            Err(err) => {
                self.logger.finish_error(span, &err.to_string());
                Err(err)
            }
        }
    }

    pub(crate) async fn retrieve(
        &self,
        ctx: &Context,
        spec: PropertyFilterSpec,
    ) -> Result<Vec<ObjectContent>> {
        let name = "RetrieveProperties";
        self.logged(name, ctx.run(name, self.session.retrieve_properties(spec)))
            .await
    }

    pub(crate) async fn invoke(
        &self,
        ctx: &Context,
        this: &ManagedObjectReference,
        method: Method,
    ) -> Result<MethodResult> {
        let name = method.name();
        self.logged(name, ctx.run(name, self.session.invoke_method(this, method)))
            .await
    }

    pub(crate) async fn create_collector(&self, ctx: &Context) -> Result<ManagedObjectReference> {
        let name = "CreatePropertyCollector";
        self.logged(name, ctx.run(name, self.session.create_property_collector()))
            .await
    }

    pub(crate) async fn create_filter(
        &self,
        ctx: &Context,
        collector: &ManagedObjectReference,
        spec: PropertyFilterSpec,
    ) -> Result<ManagedObjectReference> {
        let name = "CreateFilter";
        self.logged(
            name,
            ctx.run(name, self.session.create_filter(collector, spec, true)),
        )
        .await
    }

    pub(crate) async fn wait_for_updates(
        &self,
        ctx: &Context,
        collector: &ManagedObjectReference,
        version: &str,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>> {
        let name = "WaitForUpdatesEx";
        self.logged(
            name,
            ctx.run(
                name,
                self.session.wait_for_updates(collector, version, options),
            ),
        )
        .await
    }

    /// Not subject to cancellation: teardown must happen on every exit path.
    pub(crate) async fn destroy_collector(&self, collector: &ManagedObjectReference) -> Result<()> {
        self.logged(
            "DestroyPropertyCollector",
            self.session.destroy_property_collector(collector),
        )
        .await
    }
}
