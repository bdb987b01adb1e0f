//! Controller runner: watch pumps feeding coalescing queues, bounded
//! worker pools draining them, one reconcile per key at a time.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use forge_guard_core::labels::ANNOTATION_EMAIL_CHECK_CONFIG;
use forge_guard_core::{ObjectKey, StoreObject};
use forge_guard_store::WatchEvent;

use crate::account_link_reconciler::AccountLinkReconciler;
use crate::context::Context;
use crate::error::ControllerResult;
use crate::forge_reconciler::ForgeReconciler;
use crate::organization_reconciler::OrganizationReconciler;
use crate::provider_reconcilers::{
    DirectoryProviderReconciler, HttpProviderReconciler, StaticProviderReconciler,
};
use crate::queue::WorkQueue;
use crate::reconcile::ReconcileOutcome;
use crate::team_reconciler::TeamReconciler;
use crate::watches::{
    organizations_for_owner_team, organizations_for_team_repository, team_is_reconcilable,
    teams_for_account_link, teams_for_group_team,
};

/// The assembled engine: reconcilers, queues and watch topology.
pub struct Controller {
    ctx: Arc<Context>,
    forges: Arc<WorkQueue<ObjectKey>>,
    organizations: Arc<WorkQueue<ObjectKey>>,
    teams: Arc<WorkQueue<ObjectKey>>,
    account_links: Arc<WorkQueue<ObjectKey>>,
    directory_providers: Arc<WorkQueue<ObjectKey>>,
    http_providers: Arc<WorkQueue<ObjectKey>>,
    static_providers: Arc<WorkQueue<ObjectKey>>,
}

impl Controller {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            forges: WorkQueue::new(),
            organizations: WorkQueue::new(),
            teams: WorkQueue::new(),
            account_links: WorkQueue::new(),
            directory_providers: WorkQueue::new(),
            http_providers: WorkQueue::new(),
            static_providers: WorkQueue::new(),
        })
    }

    /// Run until `cancel` fires. Seeds every queue from a full list, then
    /// keeps them fed from the watch streams.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> ControllerResult<()> {
        self.seed_queues().await?;

        let mut tasks: JoinSet<()> = JoinSet::new();
        self.spawn_watch_pumps(&mut tasks, &cancel);
        self.spawn_workers(&mut tasks, &cancel);

        cancel.cancelled().await;
        info!("controller shutting down");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Enqueue every existing object once at startup.
    async fn seed_queues(&self) -> ControllerResult<()> {
        for forge in self.ctx.stores.forges.list().await? {
            self.forges.add(forge.key()).await;
        }
        for org in self.ctx.stores.organizations.list().await? {
            self.organizations.add(org.key()).await;
        }
        for team in self.ctx.stores.teams.list().await? {
            if team_is_reconcilable(&team) {
                self.teams.add(team.key()).await;
            }
        }
        for link in self.ctx.stores.account_links.list().await? {
            if link
                .metadata
                .annotation(ANNOTATION_EMAIL_CHECK_CONFIG)
                .is_some()
            {
                self.account_links.add(link.key()).await;
            }
        }
        for provider in self.ctx.stores.directory_providers.list().await? {
            self.directory_providers.add(provider.key()).await;
        }
        for provider in self.ctx.stores.http_providers.list().await? {
            self.http_providers.add(provider.key()).await;
        }
        for provider in self.ctx.stores.static_providers.list().await? {
            self.static_providers.add(provider.key()).await;
        }
        Ok(())
    }

    fn spawn_watch_pumps(self: &Arc<Self>, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        // Forge events re-enqueue the forge itself.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.forges.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            controller.forges.add(event.object().key()).await;
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // Organization events re-enqueue the organization itself.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.organizations.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            controller.organizations.add(event.object().key()).await;
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // Team events re-enqueue the team and, when it is listed as an
        // owner team, the parent organization.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.teams.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            let team = event.object();
                            if team_is_reconcilable(team) {
                                controller.teams.add(team.key()).await;
                            }
                            match controller.ctx.stores.organizations.list().await {
                                Ok(organizations) => {
                                    for key in
                                        organizations_for_owner_team(team, &organizations)
                                    {
                                        controller.organizations.add(key).await;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "listing organizations for team watch failed");
                                }
                            }
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // TeamRepository events re-enqueue the matching organization.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.team_repositories.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            match controller.ctx.stores.organizations.list().await {
                                Ok(organizations) => {
                                    for key in organizations_for_team_repository(
                                        event.object(),
                                        &organizations,
                                    ) {
                                        controller.organizations.add(key).await;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "listing organizations for override watch failed");
                                }
                            }
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // Sibling group-team events re-enqueue every referencing team.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.group_teams.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => match controller.ctx.stores.teams.list().await {
                            Ok(teams) => {
                                for key in
                                    teams_for_group_team(&event.object().metadata.name, &teams)
                                {
                                    controller.teams.add(key).await;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "listing teams for group team watch failed");
                            }
                        },
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // Account link events re-enqueue the link (when the email check is
        // configured) and every domain-gated team on the same forge.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.account_links.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            let link = event.object();
                            if link
                                .metadata
                                .annotation(ANNOTATION_EMAIL_CHECK_CONFIG)
                                .is_some()
                            {
                                controller.account_links.add(link.key()).await;
                            }
                            match controller.ctx.stores.teams.list().await {
                                Ok(teams) => {
                                    for key in teams_for_account_link(link, &teams) {
                                        controller.teams.add(key).await;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "listing teams for account link watch failed");
                                }
                            }
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }

        // Provider events re-enqueue the provider itself.
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.directory_providers.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            controller.directory_providers.add(event.object().key()).await;
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.http_providers.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            controller.http_providers.add(event.object().key()).await;
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }
        {
            let controller = Arc::clone(self);
            let mut watch = controller.ctx.stores.static_providers.watch();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    match next_event(&mut watch, &cancel).await {
                        Pump::Event(event) => {
                            controller.static_providers.add(event.object().key()).await;
                        }
                        Pump::Skip => {}
                        Pump::Stop => break,
                    }
                }
            });
        }
    }

    fn spawn_workers(self: &Arc<Self>, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        let forge_reconciler = Arc::new(ForgeReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(tasks, cancel, self, "Forge", &self.forges, move |key| {
            let reconciler = Arc::clone(&forge_reconciler);
            async move { reconciler.reconcile(&key).await }
        });

        let organization_reconciler =
            Arc::new(OrganizationReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(
            tasks,
            cancel,
            self,
            "Organization",
            &self.organizations,
            move |key| {
                let reconciler = Arc::clone(&organization_reconciler);
                async move { reconciler.reconcile(&key).await }
            },
        );

        let team_reconciler = Arc::new(TeamReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(tasks, cancel, self, "Team", &self.teams, move |key| {
            let reconciler = Arc::clone(&team_reconciler);
            async move { reconciler.reconcile(&key).await }
        });

        let account_link_reconciler =
            Arc::new(AccountLinkReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(
            tasks,
            cancel,
            self,
            "AccountLink",
            &self.account_links,
            move |key| {
                let reconciler = Arc::clone(&account_link_reconciler);
                async move { reconciler.reconcile(&key).await }
            },
        );

        let directory_reconciler =
            Arc::new(DirectoryProviderReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(
            tasks,
            cancel,
            self,
            "DirectoryProvider",
            &self.directory_providers,
            move |key| {
                let reconciler = Arc::clone(&directory_reconciler);
                async move { reconciler.reconcile(&key).await }
            },
        );

        let http_reconciler = Arc::new(HttpProviderReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(
            tasks,
            cancel,
            self,
            "HttpProvider",
            &self.http_providers,
            move |key| {
                let reconciler = Arc::clone(&http_reconciler);
                async move { reconciler.reconcile(&key).await }
            },
        );

        let static_reconciler = Arc::new(StaticProviderReconciler::new(Arc::clone(&self.ctx)));
        spawn_worker_pool(
            tasks,
            cancel,
            self,
            "StaticProvider",
            &self.static_providers,
            move |key| {
                let reconciler = Arc::clone(&static_reconciler);
                async move { reconciler.reconcile(&key).await }
            },
        );
    }
}

enum Pump<T: StoreObject> {
    Event(WatchEvent<T>),
    Skip,
    Stop,
}

async fn next_event<T: StoreObject>(
    watch: &mut tokio::sync::broadcast::Receiver<WatchEvent<T>>,
    cancel: &CancellationToken,
) -> Pump<T> {
    tokio::select! {
        _ = cancel.cancelled() => Pump::Stop,
        received = watch.recv() => match received {
            Ok(event) => Pump::Event(event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                // Affected keys are re-listed on their next reconcile.
                warn!(kind = T::KIND, missed, "watch stream lagged");
                Pump::Skip
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => Pump::Stop,
        },
    }
}

fn spawn_worker_pool<F, Fut>(
    tasks: &mut JoinSet<()>,
    cancel: &CancellationToken,
    controller: &Arc<Controller>,
    kind: &'static str,
    queue: &Arc<WorkQueue<ObjectKey>>,
    reconcile: F,
) where
    F: Fn(ObjectKey) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ControllerResult<ReconcileOutcome>> + Send,
{
    for _ in 0..controller.ctx.config.workers_per_kind.max(1) {
        let queue = Arc::clone(queue);
        let cancel = cancel.clone();
        let controller = Arc::clone(controller);
        let reconcile = reconcile.clone();
        tasks.spawn(async move {
            loop {
                let key = tokio::select! {
                    _ = cancel.cancelled() => break,
                    key = queue.next() => key,
                };

                let timer = controller.ctx.metrics.start_reconcile(kind);
                match reconcile(key.clone()).await {
                    Ok(outcome) => {
                        timer.done(outcome.result_label());
                        match outcome {
                            ReconcileOutcome::Done => {}
                            ReconcileOutcome::Requeue => queue.add(key.clone()).await,
                            ReconcileOutcome::RequeueAfter(delay) => {
                                queue.add_after(key.clone(), delay);
                            }
                        }
                    }
                    Err(e) if e.is_conflict() => {
                        // Another writer got there first; the watch event
                        // for that write re-triggers the key.
                        timer.done("requeue");
                        queue
                            .add_after(key.clone(), controller.ctx.config.error_requeue());
                    }
                    Err(e) => {
                        timer.done("error");
                        error!(kind, key = %key, error = %e, "reconcile failed");
                        queue
                            .add_after(key.clone(), controller.ctx.config.error_requeue());
                    }
                }
                queue.done(&key).await;
            }
        });
    }
}
