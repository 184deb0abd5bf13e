use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stroom::*;
use tokio::sync::oneshot;
use tokio_test::{assert_ok, assert_pending, assert_ready};

#[tokio::test]
async fn test_once_emits_single_value() {
    let result = once("value").collect_values().await.unwrap();
    assert_eq!(result, vec!["value"]);
}

#[tokio::test]
async fn test_state_moves_from_active_to_ended() {
    let mut s = from_array(vec![1, 2]);
    assert_eq!(s.state(), StreamState::Active);
    assert_eq!(s.next().await, Some(Ok(1)));
    assert_eq!(s.next().await, Some(Ok(2)));
    assert_eq!(s.state(), StreamState::Active);
    assert_eq!(s.next().await, None);
    assert_eq!(s.state(), StreamState::Ended);
    // terminal sources stay quiet
    assert_eq!(s.next().await, None);
}

#[tokio::test]
async fn test_error_item_is_terminal() {
    let mut s = Source::new(stream::iter(vec![
        Ok(1),
        Err(StreamError::custom("broken")),
        Ok(2),
    ]));
    assert_eq!(s.next().await, Some(Ok(1)));
    assert_eq!(s.next().await, Some(Err(StreamError::custom("broken"))));
    assert_eq!(s.next().await, None);
    assert_eq!(s.state(), StreamState::Errored(StreamError::custom("broken")));
}

#[tokio::test]
async fn test_destroy_before_reading() {
    let s = from_array(vec![1, 2, 3]);
    s.destroy(StreamError::custom("test"));
    assert_eq!(s.state(), StreamState::Errored(StreamError::custom("test")));
    assert_eq!(s.collect_values().await, Err(StreamError::custom("test")));
}

#[tokio::test]
async fn test_destroy_is_ignored_once_terminal() {
    let mut s = empty::<i32>();
    assert_eq!(s.next().await, None);
    s.destroy(StreamError::custom("late"));
    assert_eq!(s.state(), StreamState::Ended);
}

#[tokio::test]
async fn test_destroy_pending_source() {
    let mut s = Source::from_stream(stream::pending::<i32>());
    let lifecycle = s.lifecycle().clone();
    let waiter = tokio::spawn(async move { lifecycle.terminated().await });

    {
        let mut next = tokio_test::task::spawn(s.next());
        assert_pending!(next.poll());
    }

    s.destroy(StreamError::Cancelled);
    assert_eq!(s.next().await, Some(Err(StreamError::Cancelled)));
    assert_eq!(s.next().await, None);
    assert_eq!(
        waiter.await.unwrap(),
        StreamState::Errored(StreamError::Cancelled)
    );
}

#[test]
fn test_poll_ready_for_immediate_source() {
    let mut s = from_array(vec![7]);
    let mut next = tokio_test::task::spawn(s.next());
    let item = assert_ready!(next.poll());
    assert_eq!(assert_ok!(item.unwrap()), 7);
}

#[tokio::test]
async fn test_subscribe_delivers_values_then_completion() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let (done_tx, done_rx) = oneshot::channel();

    let subscription = from_array(vec![1, 2, 3]).subscribe(
        move |v| sink.lock().unwrap().push(v),
        move |outcome| {
            let _ = done_tx.send(outcome);
        },
    );

    assert_eq!(done_rx.await.unwrap(), Ok(()));
    assert_eq!(subscription.finished().await, Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_subscription_cancel() {
    let (done_tx, done_rx) = oneshot::channel();
    let subscription = Source::from_stream(stream::pending::<i32>()).subscribe(
        |_| {},
        move |outcome| {
            let _ = done_tx.send(outcome);
        },
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!subscription.is_finished());
    subscription.cancel();

    assert_eq!(done_rx.await.unwrap(), Err(StreamError::Cancelled));
    assert_eq!(subscription.finished().await, Err(StreamError::Cancelled));
}

#[tokio::test]
async fn test_fan_out_to_two_consumers_of_empty() {
    let hub = empty::<i32>().fan_out();
    let a = hub.subscribe();
    let b = hub.subscribe();

    let mut first = Collect::new();
    let mut second = Collect::new();
    let (ra, rb) = tokio::join!(a.pipe_to(&mut first), b.pipe_to(&mut second));

    assert_eq!(ra, Ok(()));
    assert_eq!(rb, Ok(()));
    assert!(first.is_finished());
    assert!(second.is_finished());
}

#[tokio::test]
async fn test_fan_out_every_consumer_sees_full_sequence() {
    let hub = from_array(vec![1, 2, 3, 4]).fan_out();
    assert!(!hub.is_started());

    let doubled = hub.subscribe().pipe(&map(|x: i32| x * 2));
    let plain = hub.subscribe();

    let (left, right) = tokio::join!(doubled.collect_values(), plain.collect_values());
    assert!(hub.is_started());
    assert_eq!(left.unwrap(), vec![2, 4, 6, 8]);
    assert_eq!(right.unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_fan_out_forwards_error_to_every_consumer() {
    let upstream = Source::new(stream::iter(vec![Ok(1), Err(StreamError::custom("hub"))]));
    let hub = upstream.fan_out();
    let (left, right) = tokio::join!(
        hub.subscribe().collect_values(),
        hub.subscribe().collect_values()
    );
    assert_eq!(left, Err(StreamError::custom("hub")));
    assert_eq!(right, Err(StreamError::custom("hub")));

    // late subscribers observe the terminal outcome only
    let late = hub.subscribe().collect_values().await;
    assert_eq!(late, Err(StreamError::custom("hub")));
}

#[tokio::test]
async fn test_fan_out_survives_a_dropped_consumer() {
    let hub = from_array(vec![1, 2, 3]).fan_out();
    let mut quitter = hub.subscribe();
    let stayer = hub.subscribe();

    let keep = tokio::spawn(stayer.collect_values());
    assert_eq!(quitter.next().await, Some(Ok(1)));
    drop(quitter);

    assert_eq!(keep.await.unwrap().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fan_out_abandoned_by_every_consumer_is_cancelled() {
    let hub = from_array(vec![1, 2, 3]).fan_out();
    let mut only = hub.subscribe();
    assert_eq!(only.next().await, Some(Ok(1)));
    drop(only);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let late = hub.subscribe().collect_values().await;
    assert_eq!(late, Err(StreamError::Cancelled));
}

#[tokio::test]
async fn test_pass_through_pairs_inlet_and_source() {
    let (mut inlet, out) = pass_through();
    let reader = tokio::spawn(out.collect_values());

    inlet.write("a").await.unwrap();
    inlet.write("b").await.unwrap();
    inlet.finish().await.unwrap();

    assert_eq!(reader.await.unwrap().unwrap(), vec!["a", "b"]);
    assert!(inlet.is_closed());
}

#[tokio::test]
async fn test_inlet_fail_errors_the_reader() {
    let (mut inlet, out) = pass_through::<u8>();
    let reader = tokio::spawn(out.collect_values());
    inlet.fail(StreamError::custom("writer gave up")).await;
    assert_eq!(
        reader.await.unwrap(),
        Err(StreamError::custom("writer gave up"))
    );
}

#[tokio::test]
async fn test_inlet_write_after_reader_dropped() {
    let (mut inlet, out) = pass_through::<u8>();
    drop(out);
    assert_eq!(inlet.write(1).await, Err(StreamError::SinkClosed));
}

#[tokio::test]
async fn test_extension_traits_wrap_plain_streams() {
    let plain = stream::iter(vec![1, 2, 3]).through(&map(|x: i32| x + 1));
    assert_eq!(plain.collect_values().await.unwrap(), vec![2, 3, 4]);

    let fallible = stream::iter(vec![Ok(1), Err(std::io::Error::other("disk"))]).try_into_source();
    match fallible.collect_values().await {
        Err(StreamError::IO(message)) => assert!(message.contains("disk")),
        other => panic!("expected io error, got {:?}", other),
    }
}
