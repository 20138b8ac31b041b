//! Environment-driven application assembly.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chronicle_core::{Aggregate, Projector, Snapshot, Version};
use chronicle_persistence::{
    AggregateRecorder, ApplicationRecorder, EventStore, JsonTranscoder, Mapper, ProcessRecorder,
    Transcoder,
};

use crate::application::{Application, NotifyHook};
use crate::cache::AggregateCache;
use crate::env::{Env, keys};
use crate::error::ApplicationError;
use crate::factory::{FactoryRegistry, construct_cipher, construct_compressor};
use crate::notification_log::{DEFAULT_SECTION_SIZE, LocalNotificationLog};
use crate::repository::Repository;

/// Assembles an [`Application`] from a name, an environment and a factory
/// registry.
///
/// Configuration cascades: the process environment first, then explicit
/// overrides passed to [`env`](Self::env).
pub struct ApplicationBuilder<A: Aggregate> {
    name: String,
    env: Env,
    registry: FactoryRegistry,
    transcoder: Option<Arc<dyn Transcoder<A::Event>>>,
    snapshotting_interval: Option<Version>,
    notify_hook: Option<NotifyHook<A::Event>>,
    projector: Option<Projector<A>>,
}

impl<A: Aggregate> ApplicationBuilder<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: Env::new(),
            registry: FactoryRegistry::new(),
            transcoder: None,
            snapshotting_interval: None,
            notify_hook: None,
            projector: None,
        }
    }

    /// Explicit configuration overrides (highest precedence).
    pub fn env(mut self, env: Env) -> Self {
        self.env = self.env.merged(&env);
        self
    }

    /// Replace the factory registry, e.g. to add database drivers.
    pub fn registry(mut self, registry: FactoryRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the default JSON transcoder for the event family.
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder<A::Event>>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Snapshot automatically whenever a saved event's version is a multiple
    /// of `interval`. Implies snapshotting is enabled.
    pub fn snapshotting_interval(mut self, interval: Version) -> Self {
        self.snapshotting_interval = Some(interval);
        self
    }

    /// Hook invoked with the new events after each successful save.
    pub fn on_notify(mut self, hook: impl Fn(&[A::Event]) + Send + Sync + 'static) -> Self {
        self.notify_hook = Some(Arc::new(hook));
        self
    }

    /// Replace the default projector used by the repository.
    pub fn projector(mut self, projector: Projector<A>) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Build over the registry-selected application recorder.
    pub fn build(self) -> Result<Application<A>, ApplicationError> {
        let env = self.resolve_env();
        let factory = self.registry.resolve(&env)?;
        let recorder = factory.application_recorder()?;
        self.assemble(env, factory.as_ref(), recorder)
    }

    /// Build over a process recorder, returning it alongside the
    /// application for use in a process pipeline.
    pub fn build_process(
        self,
    ) -> Result<(Application<A>, Arc<dyn ProcessRecorder>), ApplicationError> {
        let env = self.resolve_env();
        let factory = self.registry.resolve(&env)?;
        let recorder = factory.process_recorder()?;
        let as_application: Arc<dyn ApplicationRecorder> = Arc::new(Arc::clone(&recorder));
        let application = self.assemble(env, factory.as_ref(), as_application)?;
        Ok((application, recorder))
    }

    fn resolve_env(&self) -> Env {
        let mut env = Env::capture().merged(&self.env);
        if self.snapshotting_interval.is_some() && !env.contains(keys::IS_SNAPSHOTTING_ENABLED) {
            env.set(keys::IS_SNAPSHOTTING_ENABLED, "y");
        }
        env.set(keys::APPLICATION_NAME, self.name.clone());
        env
    }

    fn assemble(
        self,
        env: Env,
        factory: &dyn crate::factory::InfrastructureFactory,
        recorder: Arc<dyn ApplicationRecorder>,
    ) -> Result<Application<A>, ApplicationError> {
        let compressor = construct_compressor(&env)?;
        let cipher = construct_cipher(&env)?;

        let transcoder = self
            .transcoder
            .unwrap_or_else(|| Arc::new(JsonTranscoder::new()));
        let mut mapper = Mapper::new(transcoder);
        let mut snapshot_mapper = Mapper::<Snapshot>::new(Arc::new(JsonTranscoder::new()));
        if let Some(compressor) = &compressor {
            mapper = mapper.with_compressor(Arc::clone(compressor));
            snapshot_mapper = snapshot_mapper.with_compressor(Arc::clone(compressor));
        }
        if let Some(cipher) = &cipher {
            mapper = mapper.with_cipher(Arc::clone(cipher));
            snapshot_mapper = snapshot_mapper.with_cipher(Arc::clone(cipher));
        }

        let as_aggregate: Arc<dyn AggregateRecorder> = Arc::new(Arc::clone(&recorder));
        let events = EventStore::new(mapper, as_aggregate);

        let snapshots = if env.is_truthy(keys::IS_SNAPSHOTTING_ENABLED) {
            let snapshot_recorder = factory.aggregate_recorder("snapshots")?;
            Some(EventStore::new(snapshot_mapper, snapshot_recorder))
        } else {
            None
        };

        let mut repository = Repository::new(events.clone());
        if let Some(snapshots) = snapshots.clone() {
            repository = repository.with_snapshots(snapshots);
        }
        if let Some(maxsize) = env.get_usize(keys::AGGREGATE_CACHE_MAXSIZE)? {
            if let Some(capacity) = NonZeroUsize::new(maxsize) {
                repository = repository.with_cache(AggregateCache::with_capacity(capacity));
            }
        }
        if env.contains(keys::AGGREGATE_CACHE_FASTFORWARD) {
            repository =
                repository.with_fastforward(env.is_truthy(keys::AGGREGATE_CACHE_FASTFORWARD));
        }
        if let Some(projector) = self.projector {
            repository = repository.with_projector(projector);
        }

        let section_size = env
            .get_usize(keys::NOTIFICATION_LOG_SECTION_SIZE)?
            .unwrap_or(DEFAULT_SECTION_SIZE);
        let log = Arc::new(LocalNotificationLog::with_section_size(
            Arc::new(Arc::clone(&recorder)),
            section_size,
        ));

        Ok(Application::assembled(
            self.name,
            env,
            recorder,
            events,
            snapshots,
            repository,
            log,
            self.snapshotting_interval,
            self.notify_hook,
        ))
    }
}

impl<A: Aggregate> core::fmt::Debug for ApplicationBuilder<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
