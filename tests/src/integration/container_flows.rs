//! # Container Flows
//!
//! Resolution behaviour seen from an application that keeps its services,
//! including the message bus, in one container.
//!
//! ## Properties Tested:
//!
//! 1. **Typed resolution**: `make` hands back the abstract type that was bound
//! 2. **Sharing**: singletons are one allocation; plain factories run per call
//! 3. **Auto-wiring**: filled slots survive, optional misses are tolerated
//! 4. **Rebinding**: the latest binding wins, cached instances included
//! 5. **Concurrency**: racing first resolutions of a singleton agree

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use conduit_bus::{BaseMessage, CancellationToken, MessageBus};
    use conduit_container::{
        Binding, CapabilityKey, Concrete, Container, ContainerError, Injectable, Injector, Params,
        ServiceProvider,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    trait Repository: Send + Sync {
        fn table(&self) -> String;
    }

    struct SqlRepository {
        table: String,
    }

    impl Repository for SqlRepository {
        fn table(&self) -> String {
            self.table.clone()
        }
    }

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    /// Service publishing through a container-provided bus.
    #[derive(Default)]
    struct SignupService {
        bus: Option<Arc<MessageBus>>,
        repository: Option<Arc<dyn Repository>>,
        clock: Option<Arc<dyn Clock>>,
    }

    impl Injectable for SignupService {
        fn injector() -> Injector<Self> {
            Injector::new()
                .required("bus", |s: &mut SignupService| &mut s.bus)
                .required("repository", |s: &mut SignupService| &mut s.repository)
                .optional("clock", |s: &mut SignupService| &mut s.clock)
        }
    }

    fn repository(table: &str) -> Concrete<dyn Repository> {
        let table = table.to_string();
        Concrete::factory(move |_c: &Container| {
            Ok(Arc::new(SqlRepository {
                table: table.clone(),
            }) as Arc<dyn Repository>)
        })
    }

    // =============================================================================
    // RESOLUTION
    // =============================================================================

    #[test]
    fn test_make_returns_bound_abstract_type() {
        let container = Container::new();
        container.bind::<dyn Repository>(repository("users"));
        container.bind::<dyn Clock>(Concrete::instance(Arc::new(FixedClock(7))));

        let repo: Arc<dyn Repository> = container.make().unwrap();
        let clock: Arc<dyn Clock> = container.make().unwrap();
        assert_eq!(repo.table(), "users");
        assert_eq!(clock.now(), 7);
    }

    #[test]
    fn test_make_unbound_is_not_found() {
        let container = Container::new();
        let err = container.make::<dyn Repository>().err().unwrap();
        assert!(err.is_not_found());
        assert!(!container.has::<dyn Repository>());
    }

    #[test]
    fn test_singleton_is_one_allocation() {
        let container = Container::new();
        container.singleton::<dyn Repository>(repository("orders"));

        let a: Arc<dyn Repository> = container.make().unwrap();
        let b: Arc<dyn Repository> = container.make().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_factory_runs_once_per_make() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let container = Container::new();
        container.factory::<dyn Clock, _>(move |_c| {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(Arc::new(FixedClock(n)) as Arc<dyn Clock>)
        });

        for _ in 0..5 {
            container.make::<dyn Clock>().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_rebind_reflects_only_latest() {
        let container = Container::new();
        container.singleton::<dyn Repository>(repository("v1"));
        assert_eq!(container.make::<dyn Repository>().unwrap().table(), "v1");

        container.singleton::<dyn Repository>(repository("v2"));
        assert_eq!(container.make::<dyn Repository>().unwrap().table(), "v2");
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_make_with_overrides_constructor_arguments() {
        let container = Container::new();
        container.bind::<dyn Clock>(Concrete::instance(Arc::new(FixedClock(1))));
        container.bind::<String>(Concrete::constructor(|args| {
            let clock = args.get::<dyn Clock>("clock")?;
            let prefix = args
                .param::<String>("prefix")
                .unwrap_or_else(|| Ok(Arc::new("anon".to_string())))?;
            Ok(Arc::new(format!("{prefix}@{}", clock.now())))
        }));

        let params = Params::new()
            .with_value("prefix", "job".to_string())
            .with::<dyn Clock>("clock", Arc::new(FixedClock(99)));
        assert_eq!(*container.make_with::<String>(&params).unwrap(), "job@99");

        // Without overrides the clock comes from the container.
        assert_eq!(*container.make::<String>().unwrap(), "anon@1");
    }

    #[test]
    fn test_named_bindings_are_distinct() {
        let container = Container::new();
        container.bind_key(CapabilityKey::named::<dyn Repository>("primary"), repository("a"));
        container.bind_key(CapabilityKey::named::<dyn Repository>("replica"), repository("b"));

        let replica: Arc<dyn Repository> = container
            .make_key(&CapabilityKey::named::<dyn Repository>("replica"))
            .unwrap();
        assert_eq!(replica.table(), "b");
        assert!(!container.has::<dyn Repository>());
    }

    // =============================================================================
    // AUTO-WIRING
    // =============================================================================

    #[test]
    fn test_autowire_resolves_bus_and_skips_optional() {
        let container = Container::new();
        container.singleton::<MessageBus>(Concrete::instance(Arc::new(MessageBus::new())));
        container.bind::<dyn Repository>(repository("signups"));

        let mut service = SignupService::default();
        container.autowire(&mut service).unwrap();

        assert!(service.bus.is_some());
        assert_eq!(service.repository.unwrap().table(), "signups");
        assert!(service.clock.is_none());
    }

    #[test]
    fn test_autowire_keeps_caller_provided_slots() {
        let container = Container::new();
        container.singleton::<MessageBus>(Concrete::instance(Arc::new(MessageBus::new())));
        container.bind::<dyn Repository>(repository("container"));

        let mine: Arc<dyn Repository> = Arc::new(SqlRepository {
            table: "mine".to_string(),
        });
        let mut service = SignupService {
            repository: Some(Arc::clone(&mine)),
            ..SignupService::default()
        };
        container.autowire(&mut service).unwrap();

        assert!(Arc::ptr_eq(service.repository.as_ref().unwrap(), &mine));
    }

    #[test]
    fn test_autowire_missing_required_names_field() {
        let container = Container::new();
        container.bind::<dyn Repository>(repository("x"));

        let mut service = SignupService::default();
        let err = container.autowire(&mut service).unwrap_err();
        assert!(matches!(err, ContainerError::Injection { field: "bus", .. }));
    }

    #[test]
    fn test_autowire_shared_requires_unique_arc() {
        let container = Container::new();
        container.singleton::<MessageBus>(Concrete::instance(Arc::new(MessageBus::new())));
        container.bind::<dyn Repository>(repository("x"));

        let mut service = Arc::new(SignupService::default());
        let _other = Arc::clone(&service);
        assert!(matches!(
            container.autowire_shared(&mut service),
            Err(ContainerError::InvalidTarget { .. })
        ));
    }

    // =============================================================================
    // TAGS & PROVIDERS
    // =============================================================================

    #[test]
    fn test_tagged_in_registration_order() {
        let container = Container::new();
        for table in ["a", "b", "c"] {
            container.bind_tagged_key(
                CapabilityKey::named::<dyn Repository>(table.to_string()),
                repository(table),
                ["repositories"],
            );
        }
        container.bind::<dyn Clock>(Concrete::instance(Arc::new(FixedClock(0))));

        let tables: Vec<_> = container
            .tagged_as::<dyn Repository>("repositories")
            .unwrap()
            .iter()
            .map(|r| r.table())
            .collect();
        assert_eq!(tables, vec!["a", "b", "c"]);
    }

    struct EventingProvider;

    impl ServiceProvider for EventingProvider {
        fn name(&self) -> &str {
            "eventing"
        }

        fn register(&self, container: &Container) -> Result<(), ContainerError> {
            container.register(
                CapabilityKey::of::<MessageBus>(),
                Binding::factory(|_c: &Container| Ok(Arc::new(MessageBus::with_capacity(4)))).shared(),
            );
            Ok(())
        }

        fn boot(&self, container: &Container) -> Result<(), ContainerError> {
            // Booting may resolve anything registered by any provider.
            let bus: Arc<MessageBus> = container.make()?;
            bus.subscribe(
                "user.created",
                conduit_bus::handler_fn("welcome", |_ctx, _msg| async { Ok(None) }),
            );
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_provider_booted_bus_delivers() {
        let container = Container::new();
        let providers: Vec<Arc<dyn ServiceProvider>> = vec![Arc::new(EventingProvider)];
        container.bootstrap(&providers).unwrap();

        let bus: Arc<MessageBus> = container.make().unwrap();
        assert_eq!(bus.capacity(), 4);
        assert_eq!(bus.subscriber_count("user.created"), 1);

        bus.start().unwrap();
        bus.publish_sync(BaseMessage::event("user.created").shared(), &CancellationToken::new())
            .await
            .unwrap();
        bus.shutdown().await.unwrap();
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[test]
    fn test_concurrent_singleton_resolution_agrees() {
        let container = Arc::new(Container::new());
        container.singleton::<dyn Repository>(repository("shared"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.make::<dyn Repository>().unwrap())
            })
            .collect();
        let instances: Vec<Arc<dyn Repository>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }
}
