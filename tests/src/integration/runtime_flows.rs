//! # Runtime Flows
//!
//! Configuration file -> manifests -> container bindings -> bus subscriptions,
//! exercised end to end through `ConduitRuntime`.
//!
//! ## Flow Tested:
//!
//! ```text
//! conduit.toml ──► RuntimeConfig ──► ConduitRuntime::start
//!                     │                    │
//!                     └─ manifests ───► ComponentRegistry ──► wire_components
//!                                                               │
//!                                     Container (bus.handler) ◄─┘──► MessageBus
//! ```

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use conduit_bus::{handler_fn, BaseMessage, BusState, CancellationToken, MessageHandler, WILDCARD};
    use conduit_container::{Concrete, Container, ContainerError, ServiceProvider};
    use conduit_runtime::{handler_key, ConduitRuntime, RuntimeConfig, HANDLER_TAG};
    use conduit_telemetry::{encode_metrics, register_metrics, BUS_HANDLER_FAILURES, BUS_MESSAGES_RECEIVED};
    use tempfile::TempDir;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Audit log shared between the test and the handler built by the container.
    #[derive(Default)]
    struct AuditLog {
        entries: parking_lot::Mutex<Vec<String>>,
    }

    struct AuditProvider {
        log: Arc<AuditLog>,
    }

    impl ServiceProvider for AuditProvider {
        fn name(&self) -> &str {
            "audit"
        }

        fn register(&self, container: &Container) -> Result<(), ContainerError> {
            container.singleton::<AuditLog>(Concrete::instance(Arc::clone(&self.log)));
            Ok(())
        }
    }

    /// Handler recipe pulling its dependency from the container.
    fn audit_recipe() -> Concrete<dyn MessageHandler> {
        Concrete::factory(|container: &Container| {
            let log: Arc<AuditLog> = container.make()?;
            Ok(handler_fn("audit", move |_ctx, msg| {
                let log = Arc::clone(&log);
                async move {
                    log.entries.lock().push(msg.slug().to_string());
                    Ok(None)
                }
            }))
        })
    }

    fn failing_recipe() -> Concrete<dyn MessageHandler> {
        Concrete::factory(|_c: &Container| {
            Ok(handler_fn("fraud", |_ctx, _msg| async {
                Err(conduit_bus::HandlerError::new("flagged"))
            }))
        })
    }

    /// Writes a manifest and a config file pointing at it.
    fn write_files(dir: &TempDir) -> std::path::PathBuf {
        let manifest_path = dir.path().join("accounts.toml");
        let mut manifest = std::fs::File::create(&manifest_path).unwrap();
        write!(
            manifest,
            r#"
            name = "accounts"
            version = "2.0.0"
            type = "package"

            [[components]]
            handlers = [{{ name = "audit", patterns = ["user.created", "user.deleted"] }}]

            [[components]]
            name = "risk"
            handlers = [{{ name = "fraud", patterns = ["order.placed"] }}]
            "#
        )
        .unwrap();

        let config_path = dir.path().join("conduit.toml");
        let mut config = std::fs::File::create(&config_path).unwrap();
        write!(
            config,
            "manifests = [{:?}]\n\n[bus]\nqueue_capacity = 16\nstop_timeout_secs = 2\n",
            manifest_path.display().to_string()
        )
        .unwrap();
        config_path
    }

    fn runtime_from(config_path: &std::path::Path, log: &Arc<AuditLog>) -> ConduitRuntime {
        let config = RuntimeConfig::load(config_path).unwrap();
        ConduitRuntime::new(config)
            .with_provider(Arc::new(AuditProvider { log: Arc::clone(log) }))
            .with_handler("audit", audit_recipe())
            .with_handler("fraud", failing_recipe())
    }

    // =============================================================================
    // END-TO-END
    // =============================================================================

    #[tokio::test]
    async fn test_manifest_handlers_receive_messages() {
        let dir = TempDir::new().unwrap();
        let config_path = write_files(&dir);
        let log = Arc::new(AuditLog::default());
        let runtime = runtime_from(&config_path, &log);

        let report = runtime.start().unwrap();
        assert_eq!(report.handlers, vec!["accounts/audit", "risk/fraud"]);
        assert_eq!(runtime.bus().capacity(), 16);

        let bus = runtime.bus();
        let cancel = CancellationToken::new();
        bus.publish_sync(BaseMessage::event("user.created").shared(), &cancel)
            .await
            .unwrap();
        bus.publish(BaseMessage::event("user.deleted").shared(), &cancel)
            .await
            .unwrap();
        runtime.shutdown().await.unwrap();

        assert_eq!(*log.entries.lock(), vec!["user.created", "user.deleted"]);
        assert_eq!(bus.state(), BusState::Stopped);
    }

    #[tokio::test]
    async fn test_components_inherit_manifest_fields() {
        let dir = TempDir::new().unwrap();
        let config_path = write_files(&dir);
        let runtime = runtime_from(&config_path, &Arc::new(AuditLog::default()));
        runtime.start().unwrap();

        let components = runtime.components();
        let accounts = components.get("accounts").unwrap();
        assert_eq!(accounts.version, "2.0.0");
        assert_eq!(accounts.kind, "package");
        assert_eq!(components.get("risk").unwrap().version, "2.0.0");

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handlers_are_tagged_bindings() {
        let dir = TempDir::new().unwrap();
        let config_path = write_files(&dir);
        let runtime = runtime_from(&config_path, &Arc::new(AuditLog::default()));
        runtime.start().unwrap();

        let container = runtime.container();
        let handlers = container.tagged_as::<dyn MessageHandler>(HANDLER_TAG).unwrap();
        assert_eq!(handlers.len(), 2);
        assert_eq!(container.tagged("risk").unwrap().len(), 1);

        // Shared bindings: resolving again yields the subscribed instance.
        let again: Arc<dyn MessageHandler> = container.make_key(&handler_key("accounts", "audit")).unwrap();
        assert!(Arc::ptr_eq(&again, &handlers[0]));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_failures_surface_and_are_counted() {
        register_metrics().unwrap();
        let dir = TempDir::new().unwrap();
        let config_path = write_files(&dir);
        let runtime = runtime_from(&config_path, &Arc::new(AuditLog::default()));
        runtime.start().unwrap();

        let before = BUS_HANDLER_FAILURES.with_label_values(&["risk/fraud"]).get();
        let err = runtime
            .bus()
            .publish_sync(BaseMessage::command("order.placed").shared(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "flagged");
        assert!(BUS_HANDLER_FAILURES.with_label_values(&["risk/fraud"]).get() >= before + 1.0);
        assert!(
            BUS_MESSAGES_RECEIVED
                .with_label_values(&["order.placed", "command"])
                .get()
                >= 1.0
        );
        assert!(encode_metrics().unwrap().contains("conduit_bus_handler_failures_total"));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_builtin_observers_on_wildcard() {
        let runtime = ConduitRuntime::new(RuntimeConfig::default());
        runtime.start().unwrap();

        assert_eq!(runtime.bus().subscriber_count(WILDCARD), 2);
        runtime
            .bus()
            .publish_sync(BaseMessage::query("nobody.listens").shared(), &CancellationToken::new())
            .await
            .unwrap();

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_handler_aborts_start() {
        let dir = TempDir::new().unwrap();
        let config_path = write_files(&dir);
        let config = RuntimeConfig::load(&config_path).unwrap();
        // No "fraud" recipe registered.
        let runtime = ConduitRuntime::new(config)
            .with_provider(Arc::new(AuditProvider {
                log: Arc::new(AuditLog::default()),
            }))
            .with_handler("audit", audit_recipe());

        let err = runtime.start().unwrap_err();
        assert!(format!("{err:#}").contains("unknown handler fraud"));
        assert_eq!(runtime.bus().state(), BusState::Unstarted);
    }
}
