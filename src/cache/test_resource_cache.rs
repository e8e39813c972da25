#[cfg(test)]
mod tests {
    use crate::cache::test_support::{init_logger, TestFactory};
    use crate::cache::{CacheError, CacheKey, ResourceCache};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrows_share_one_handle() {
        init_logger();
        let factory = TestFactory::with_delay(Duration::from_millis(20));
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_millis(50));
        let key = CacheKey::from("db-1:27080");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let handle = cache.acquire(&key).await.unwrap();
                tokio::task::yield_now().await;
                cache.release(&key, &handle).unwrap();
                handle.id
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }

        assert_eq!(counters.created(), 1);
        assert_eq!(cache.ref_count(&key), Some(0));

        sleep(Duration::from_millis(300)).await;
        assert!(!cache.contains(&key));
        assert_eq!(counters.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_time_acquires_construct_once() {
        let factory = TestFactory::with_delay(Duration::from_millis(30));
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::Default;

        let (a, b) = tokio::join!(cache.acquire(&key), cache.acquire(&key));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.address, None);
        assert_eq!(counters.created(), 1);
        assert_eq!(cache.ref_count(&key), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_handle_closed_after_keep_alive() {
        init_logger();
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_millis(100));
        let key = CacheKey::from("db-1:27080");

        let handle = cache.acquire(&key).await.unwrap();
        cache.release(&key, &handle).unwrap();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.ref_count(&key), Some(0));
        assert_eq!(counters.closed(), 0);

        sleep(Duration::from_millis(100)).await;
        assert!(!cache.contains(&key));
        assert_eq!(counters.closed(), 1);
        assert_eq!(cache.stats().evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_borrowed_handle_survives_reaper() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_millis(100));
        let key = CacheKey::from("db-1:27080");

        let first = cache.acquire(&key).await.unwrap();
        let second = cache.acquire(&key).await.unwrap();
        cache.release(&key, &first).unwrap();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.ref_count(&key), Some(1));
        assert_eq!(counters.closed(), 0);

        cache.release(&key, &second).unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(!cache.contains(&key));
        assert_eq!(counters.closed(), 1);
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_unbalanced() {
        let cache = ResourceCache::new(TestFactory::default(), Duration::from_secs(10));
        let key = CacheKey::Default;

        let handle = cache.acquire(&key).await.unwrap();
        cache.release(&key, &handle).unwrap();
        let err = cache.release(&key, &handle).unwrap_err();

        assert!(matches!(err, CacheError::UnbalancedRelease(k) if k == CacheKey::Default));
        assert_eq!(cache.stats().unbalanced_releases, 1);
        assert_eq!(cache.ref_count(&key), Some(0));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_acquire() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::from("db-1:27080");

        let held = cache.acquire(&key).await.unwrap();
        let idle = cache.acquire(&CacheKey::Default).await.unwrap();
        cache.release(&CacheKey::Default, &idle).unwrap();

        let report = cache.shutdown();
        assert_eq!(report.closed, 2);
        assert!(report.is_clean());
        assert!(cache.is_empty());

        let again = cache.shutdown();
        assert_eq!(again.evicted(), 0);
        assert_eq!(counters.closed(), 2);

        assert!(matches!(cache.acquire(&key).await, Err(CacheError::CacheClosed)));
        // the borrow outlived the shutdown, giving it back is harmless
        assert!(cache.release(&key, &held).is_ok());
    }

    #[tokio::test]
    async fn test_factory_failure_inserts_nothing() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::from("db-1:27080");

        counters.fail_create.store(true, Ordering::SeqCst);
        let err = cache.acquire(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::Factory(_)));
        assert!(!cache.contains(&key));

        counters.fail_create.store(false, Ordering::SeqCst);
        let handle = cache.acquire(&key).await.unwrap();
        assert_eq!(handle.id, 1);
        assert_eq!(cache.ref_count(&key), Some(1));
    }

    #[tokio::test]
    async fn test_stale_idle_handle_is_replaced() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::from("db-1:27080");

        let handle = cache.acquire(&key).await.unwrap();
        cache.release(&key, &handle).unwrap();
        handle.valid.store(false, Ordering::SeqCst);

        let fresh = cache.acquire(&key).await.unwrap();
        assert_eq!(fresh.id, 2);
        assert_eq!(counters.closed(), 1);
        assert_eq!(cache.stats().stale_discarded, 1);

        // the old handle's entry is gone, releasing it does not touch the new one
        cache.release(&key, &handle).unwrap();
        assert_eq!(cache.ref_count(&key), Some(1));
    }

    #[tokio::test]
    async fn test_borrowed_handle_is_not_revalidated() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::Default;

        let first = cache.acquire(&key).await.unwrap();
        first.valid.store(false, Ordering::SeqCst);
        let second = cache.acquire(&key).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counters.created(), 1);
        assert_eq!(cache.ref_count(&key), Some(2));
    }

    #[test]
    fn test_close_failure_does_not_stop_reap() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        // built outside a runtime, so only explicit reap() evicts
        let cache = ResourceCache::new(factory, Duration::from_millis(100));

        paused_runtime().block_on(async {
            for address in ["db-1:27080", "db-2:27080", "db-3:27080"] {
                let key = CacheKey::from(address);
                let handle = cache.acquire(&key).await.unwrap();
                cache.release(&key, &handle).unwrap();
            }
            let held = cache.acquire(&CacheKey::Default).await.unwrap();

            sleep(Duration::from_millis(50)).await;
            assert_eq!(cache.reap().evicted(), 0);

            counters.fail_close.store(true, Ordering::SeqCst);
            sleep(Duration::from_millis(60)).await;
            let report = cache.reap();

            assert_eq!(report.evicted(), 3);
            assert_eq!(report.failures.len(), 3);
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.stats().close_failures, 3);
            cache.release(&CacheKey::Default, &held).unwrap();
        });
    }

    #[test]
    fn test_drop_closes_remaining_handles() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));

        paused_runtime().block_on(async {
            let handle = cache.acquire(&CacheKey::Default).await.unwrap();
            cache.release(&CacheKey::Default, &handle).unwrap();
            cache.acquire(&CacheKey::from("db-2:27080")).await.unwrap();
        });

        assert_eq!(counters.closed(), 0);
        drop(cache);
        assert_eq!(counters.closed(), 2);
    }

    #[tokio::test]
    async fn test_keys_get_distinct_handles() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));

        let default = cache.acquire(&CacheKey::Default).await.unwrap();
        let other = cache.acquire(&CacheKey::from("db-2:27080")).await.unwrap();

        assert_eq!(default.address, None);
        assert_eq!(other.address.as_deref(), Some("db-2:27080"));
        assert_eq!(counters.created(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaped_keys_leave_no_creation_gates() {
        let cache = ResourceCache::new(TestFactory::default(), Duration::from_millis(100));

        for n in 0..200 {
            let key = CacheKey::Address(format!("db-{}:27080", n));
            let handle = cache.acquire(&key).await.unwrap();
            cache.release(&key, &handle).unwrap();
        }
        assert_eq!(cache.creation_gates(), 200);

        sleep(Duration::from_millis(500)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.creation_gates(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_creation_gate() {
        let factory = TestFactory::default();
        factory.counters.fail_create.store(true, Ordering::SeqCst);
        let cache = ResourceCache::new(factory, Duration::from_secs(10));

        assert!(cache.acquire(&CacheKey::from("db-1:27080")).await.is_err());
        assert_eq!(cache.creation_gates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_creation_closes_once() {
        let factory = TestFactory::with_delay(Duration::from_millis(50));
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));
        let key = CacheKey::from("db-1:27080");

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.acquire(&key).await })
        };
        sleep(Duration::from_millis(10)).await;

        let report = cache.shutdown();
        assert_eq!(report.evicted(), 0);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(CacheError::CacheClosed)));
        assert_eq!(counters.created(), 1);
        assert_eq!(counters.closed(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_key_does_not_block_other_keys() {
        let factory = TestFactory::slow_for("slow:27080", Duration::from_secs(5));
        let cache = ResourceCache::new(factory, Duration::from_secs(10));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire(&CacheKey::from("slow:27080")).await })
        };
        // let the slow create start and park in the factory
        sleep(Duration::from_millis(1)).await;

        let start = tokio::time::Instant::now();
        let fast = cache.acquire(&CacheKey::from("fast:27080")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fast.address.as_deref(), Some("fast:27080"));
        assert!(!slow.is_finished());

        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.address.as_deref(), Some("slow:27080"));
    }

    #[tokio::test]
    async fn test_shutdown_collects_close_failures() {
        let factory = TestFactory::default();
        let counters = factory.counters.clone();
        let cache = ResourceCache::new(factory, Duration::from_secs(10));

        let _held = cache.acquire(&CacheKey::from("db-1:27080")).await.unwrap();
        let idle = cache.acquire(&CacheKey::Default).await.unwrap();
        cache.release(&CacheKey::Default, &idle).unwrap();

        counters.fail_close.store(true, Ordering::SeqCst);
        let report = cache.shutdown();

        assert_eq!(report.closed, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .any(|failure| failure.key == CacheKey::Default));
        assert!(cache.is_empty());
        assert!(cache.is_closed());

        assert_eq!(cache.shutdown().evicted(), 0);
        assert_eq!(counters.closed(), 2);
        assert_eq!(cache.stats().close_failures, 2);
    }

    #[tokio::test]
    async fn test_ctrl_c_listener_ends_on_shutdown() {
        let cache = ResourceCache::new(TestFactory::default(), Duration::from_secs(10));
        let listener = cache.close_on_ctrl_c().unwrap();

        cache.shutdown();
        tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
