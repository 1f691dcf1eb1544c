//! Integration tests for the query cache: de-duplication, staleness,
//! superseded responses, stale-while-error and scope cancellation.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{network_error, scripted_fn, settle_tasks, setup_test_logging, ControlledFetcher};
use storefront::domain::models::{CatalogLabels, CatalogView, QueryKey, QueryOptions, QueryStatus};
use storefront::domain::QueryError;
use storefront::services::{query_fn, QueryClient};

fn options() -> QueryOptions {
    QueryOptions::default()
        .with_stale_time(Duration::from_secs(60))
        .without_retry()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_observers_share_one_fetch() {
    setup_test_logging();
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let mut first = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    let mut second = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    assert!(first.result().is_loading());
    assert!(second.result().is_fetching);

    fetcher.wait_for_calls(1).await;
    settle_tasks().await;
    assert_eq!(fetcher.calls(), 1);

    fetcher.resolve(0, Ok(vec![1_u32, 2]));
    let a = first.settled().await;
    let b = second.settled().await;

    assert!(a.is_success());
    assert_eq!(a.records(), Some(&[1, 2][..]));
    assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_imperative_reads_join_in_flight_fetch() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("techniques");

    let reads: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            let key = key.clone();
            let fetch = fetcher.query_fn();
            tokio::spawn(async move { client.fetch_query(&key, fetch, &options()).await })
        })
        .collect();

    fetcher.wait_for_calls(1).await;
    settle_tasks().await;
    fetcher.resolve(0, Ok(vec!["Weaving".to_string()]));

    for read in reads {
        let data = read.await.unwrap().unwrap();
        assert_eq!(*data, vec!["Weaving".to_string()]);
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_data_served_without_fetch() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from("events");

    let first = client
        .fetch_query(&key, scripted_fn(&calls, vec![Ok(vec![7_u32])]), &options())
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(59)).await;

    let observer = client
        .observe(&key, scripted_fn(&calls, vec![Ok(vec![8_u32])]), options())
        .unwrap();
    let result = observer.result();

    assert!(result.is_success());
    assert!(!result.is_fetching);
    assert!(!result.is_stale);
    assert!(Arc::ptr_eq(&first, result.data.as_ref().unwrap()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_entry_refetches_with_cached_data_visible() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let mut observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(1).await;
    fetcher.resolve(0, Ok(vec![1_u32]));
    observer.settled().await;
    observer.unmount();

    tokio::time::advance(Duration::from_secs(61)).await;

    let mut observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    let refreshing = observer.result();
    assert_eq!(refreshing.status, QueryStatus::Loading);
    assert!(refreshing.is_fetching);
    assert!(refreshing.is_stale);
    assert_eq!(refreshing.records(), Some(&[1][..]));

    fetcher.wait_for_calls(2).await;
    fetcher.resolve(1, Ok(vec![1_u32, 2]));

    let refreshed = observer.settled().await;
    assert!(refreshed.is_success());
    assert!(!refreshed.is_stale);
    assert_eq!(refreshed.records(), Some(&[1, 2][..]));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_is_discarded() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let mut observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(1).await;

    let refetch = {
        let client = client.clone();
        let key = key.clone();
        let fetch = fetcher.query_fn();
        tokio::spawn(async move { client.refetch(&key, fetch, &options()).await })
    };
    fetcher.wait_for_calls(2).await;

    // Newer response lands first
    fetcher.resolve(1, Ok(vec!["new".to_string()]));
    assert_eq!(*refetch.await.unwrap().unwrap(), vec!["new".to_string()]);

    // The slow first response must not overwrite it
    fetcher.resolve(0, Ok(vec!["old".to_string()]));
    settle_tasks().await;

    let result = observer.settled().await;
    assert!(result.is_success());
    assert_eq!(result.records(), Some(&["new".to_string()][..]));
    assert_eq!(
        *client.get_query_data::<String>(&key).unwrap(),
        vec!["new".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_older_response_ignored_while_newer_in_flight() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let mut observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(1).await;

    let refetch = {
        let client = client.clone();
        let key = key.clone();
        let fetch = fetcher.query_fn();
        tokio::spawn(async move { client.refetch(&key, fetch, &options()).await })
    };
    fetcher.wait_for_calls(2).await;

    fetcher.resolve(0, Ok(vec![1_u32]));
    settle_tasks().await;

    let pending = observer.result();
    assert!(pending.is_fetching);
    assert!(pending.data.is_none());

    fetcher.resolve(1, Ok(vec![2_u32]));
    refetch.await.unwrap().unwrap();

    assert_eq!(observer.settled().await.records(), Some(&[2][..]));
}

#[tokio::test(start_paused = true)]
async fn test_failed_refetch_keeps_stale_data() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from("techniques");
    let fetch = scripted_fn(&calls, vec![Ok(vec![3_u32]), Err(network_error())]);

    client.fetch_query(&key, Arc::clone(&fetch), &options()).await.unwrap();
    let err = client.refetch(&key, fetch, &options()).await.unwrap_err();
    assert_eq!(err, network_error());

    let state = client.get_query_state::<u32>(&key).unwrap();
    assert_eq!(state.status, QueryStatus::Error);
    assert_eq!(state.error, Some(network_error()));
    assert_eq!(state.data.as_deref(), Some(&vec![3]));

    let observer = client
        .observe(&key, scripted_fn(&calls, vec![Ok(vec![4_u32])]), options())
        .unwrap();
    let result = observer.result();
    assert!(result.is_error());
    match CatalogView::from_result(&result, &CatalogLabels::TECHNIQUES) {
        CatalogView::List(records) => assert_eq!(*records, vec![3]),
        other => panic!("Expected stale list, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from("events");
    let options = QueryOptions::default();

    let fetch = scripted_fn(
        &calls,
        vec![
            Err(network_error()),
            Err(QueryError::Http {
                status: 503,
                message: "unavailable".to_string(),
            }),
            Ok(vec![1_u32]),
        ],
    );

    let data = client.fetch_query(&key, fetch, &options).await.unwrap();
    assert_eq!(*data, vec![1]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let not_found = QueryError::Http {
        status: 404,
        message: "not found".to_string(),
    };

    let result = client
        .fetch_query(
            &QueryKey::from("events"),
            scripted_fn::<u32>(&calls, vec![Err(not_found.clone())]),
            &QueryOptions::default(),
        )
        .await;

    assert_eq!(result, Err(not_found));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmounted_scope_drops_response() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(1).await;
    observer.unmount();

    fetcher.resolve(0, Ok(vec![1_u32]));
    settle_tasks().await;

    let state = client.get_query_state::<u32>(&key).unwrap();
    assert_eq!(state.status, QueryStatus::Idle);
    assert!(state.data.is_none());
    assert!(!state.is_fetching);

    // Mounting again starts a fresh fetch
    let mut observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(2).await;
    fetcher.resolve(1, Ok(vec![2_u32]));
    assert_eq!(observer.settled().await.records(), Some(&[2][..]));
}

#[tokio::test(start_paused = true)]
async fn test_response_applied_while_any_scope_mounted() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::new();
    let key = QueryKey::from("events");

    let leaving = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    let mut staying = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    fetcher.wait_for_calls(1).await;
    drop(leaving);

    fetcher.resolve(0, Ok(vec![5_u32]));
    assert_eq!(staying.settled().await.records(), Some(&[5][..]));
    assert!(staying.is_mounted());
}

#[tokio::test(start_paused = true)]
async fn test_invalidated_observer_refreshes() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::new(["events", "main-venue"]);
    let fetch = scripted_fn(&calls, vec![Ok(vec![1_u32]), Ok(vec![1, 2])]);

    let mut observer = client.observe(&key, fetch, options()).unwrap();
    observer.settled().await;
    assert!(!observer.refresh_if_stale());

    assert_eq!(client.invalidate(&QueryKey::from("events")), 1);
    assert!(observer.result().is_stale);

    assert!(observer.refresh_if_stale());
    let result = observer.settled().await;
    assert_eq!(result.records(), Some(&[1, 2][..]));
    assert!(!result.is_stale);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_state_transitions() {
    let client = QueryClient::default();
    let fetcher = ControlledFetcher::<u32>::new();
    let key = QueryKey::from("techniques");

    let mut updates = client.subscribe::<u32>(&key).unwrap();
    assert_eq!(updates.borrow_and_update().status, QueryStatus::Idle);

    let _observer = client.observe(&key, fetcher.query_fn(), options()).unwrap();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().status, QueryStatus::Loading);

    fetcher.wait_for_calls(1).await;
    fetcher.resolve(0, Err(network_error()));
    updates.changed().await.unwrap();

    let state = updates.borrow_and_update().clone();
    assert_eq!(state.status, QueryStatus::Error);
    assert!(state.data.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_settles_as_error() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from("events");
    let fetch = {
        let calls = Arc::clone(&calls);
        query_fn(move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    panic!("catalog backend exploded");
                }
                Ok(vec![1_u32])
            }
        })
    };

    let mut observer = client.observe(&key, Arc::clone(&fetch), options()).unwrap();
    let failed = observer.settled().await;
    assert!(failed.is_error());
    assert!(failed.data.is_none());
    assert!(matches!(
        failed.error,
        Some(QueryError::Panicked(ref message)) if message.contains("catalog backend exploded")
    ));
    observer.unmount();

    // The entry is not left wedged: a new mount fetches again
    let mut observer = client.observe(&key, fetch, options()).unwrap();
    let recovered = observer.settled().await;
    assert!(recovered.is_success());
    assert_eq!(recovered.records(), Some(&[1][..]));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_during_backoff_stops_retrying() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::from("events");
    let retrying = QueryOptions::default().with_stale_time(Duration::from_secs(60));

    let observer = client
        .observe(&key, scripted_fn::<u32>(&calls, vec![Err(network_error())]), retrying)
        .unwrap();
    settle_tasks().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // First retry is 1s away; unmount while the fetch is sleeping
    observer.unmount();
    tokio::time::advance(Duration::from_secs(60)).await;
    settle_tasks().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let state = client.get_query_state::<u32>(&key).unwrap();
    assert_eq!(state.status, QueryStatus::Idle);
    assert!(!state.is_fetching);
    assert!(state.error.is_none());
}
