//! # Shutdown Flows
//!
//! Draining guarantees of `MessageBus::stop` under load.
//!
//! ## Properties Tested:
//!
//! 1. Envelopes accepted before `stop` are all dispatched
//! 2. In-flight async handlers are awaited up to the deadline, then `Timeout`
//! 3. Handlers can watch the shutdown token and finish early
//! 4. Concurrent publishers never lose an accepted envelope

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use conduit_bus::{handler_fn, BaseMessage, BusConfig, BusError, BusState, CancellationToken, MessageBus};
    use conduit_container::{Concrete, Container};
    use conduit_runtime::{Component, ConduitRuntime, RuntimeConfig};
    use futures::future::join_all;
    use tokio::time::{sleep, timeout};

    fn slow_counter(hits: &Arc<AtomicUsize>, delay: Duration) -> Arc<dyn conduit_bus::MessageHandler> {
        let hits = Arc::clone(hits);
        handler_fn("slow", move |_ctx, _msg| {
            let hits = Arc::clone(&hits);
            async move {
                sleep(delay).await;
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
    }

    #[tokio::test]
    async fn test_stop_drains_queued_envelopes() {
        let bus = MessageBus::with_capacity(64);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("work", slow_counter(&hits, Duration::from_millis(5)));
        bus.start().unwrap();

        let cancel = CancellationToken::new();
        for _ in 0..50 {
            bus.publish(BaseMessage::command("work").shared(), &cancel)
                .await
                .unwrap();
        }
        bus.stop(Duration::from_secs(5)).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 50);
        assert_eq!(bus.stats().published, 50);
        assert_eq!(bus.stats().dispatched, 50);
    }

    #[tokio::test]
    async fn test_stop_deadline_exceeded() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("stuck", slow_counter(&hits, Duration::from_secs(30)));
        bus.start().unwrap();

        bus.publish(BaseMessage::event("stuck").shared(), &CancellationToken::new())
            .await
            .unwrap();

        let deadline = Duration::from_millis(50);
        let err = bus.stop(deadline).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout(d) if d == deadline));
        assert_eq!(bus.state(), BusState::Stopped);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_observes_shutdown_token() {
        let bus = MessageBus::new();
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        bus.subscribe(
            "stream",
            handler_fn("watcher", move |ctx, _msg| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::select! {
                        _ = ctx.shutdown().cancelled() => flag.store(true, Ordering::SeqCst),
                        _ = sleep(Duration::from_secs(30)) => {}
                    }
                    Ok(None)
                }
            }),
        );
        bus.start().unwrap();
        bus.publish(BaseMessage::event("stream").shared(), &CancellationToken::new())
            .await
            .unwrap();

        timeout(Duration::from_secs(5), bus.shutdown())
            .await
            .expect("handler ignored shutdown")
            .unwrap();
        assert!(interrupted.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_lose_nothing() {
        let bus = Arc::new(MessageBus::with_config(BusConfig {
            queue_capacity: 8,
            stop_timeout: Duration::from_secs(5),
        }));
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("tick", slow_counter(&hits, Duration::ZERO));
        bus.start().unwrap();

        let publishers = (0..4).map(|_| {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for _ in 0..25 {
                    bus.publish(BaseMessage::event("tick").shared(), &cancel)
                        .await
                        .unwrap();
                }
            })
        });
        for joined in join_all(publishers).await {
            joined.unwrap();
        }

        bus.shutdown().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_terminal() {
        let bus = MessageBus::new();
        bus.stop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(bus.state(), BusState::Stopped);
        assert!(matches!(bus.start(), Err(BusError::AlreadyStarted)));

        // Stopping again is a no-op.
        bus.stop(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_runtime_shutdown_reports_timeout() {
        let mut config = RuntimeConfig::default();
        config.bus.stop_timeout_secs = 0;
        let runtime = ConduitRuntime::new(config).with_handler(
            "hang",
            Concrete::factory(|_c: &Container| {
                Ok(handler_fn("hang", |_ctx, _msg| async {
                    sleep(Duration::from_secs(30)).await;
                    Ok(None)
                }))
            }),
        );
        runtime
            .components()
            .register(Component::new("jobs").with_handler("hang", ["job.start"]))
            .unwrap();
        runtime.start().unwrap();

        runtime
            .bus()
            .publish(BaseMessage::command("job.start").shared(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(runtime.shutdown().await.is_err());
    }
}
