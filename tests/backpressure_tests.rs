use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stroom::*;

/// Sink that takes its time with every value and records how far the
/// producer got ahead of it once each write is done
struct SlowSink {
    pulled: Arc<AtomicUsize>,
    written: usize,
    max_lead: usize,
}

impl SlowSink {
    fn new(pulled: Arc<AtomicUsize>) -> Self {
        Self {
            pulled,
            written: 0,
            max_lead: 0,
        }
    }
}

#[async_trait]
impl Sink<i32> for SlowSink {
    async fn write(&mut self, _value: i32) -> StreamResult<()> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.written += 1;
        let lead = self.pulled.load(Ordering::SeqCst).saturating_sub(self.written);
        self.max_lead = self.max_lead.max(lead);
        Ok(())
    }
}

fn counted(values: std::ops::Range<i32>, pulled: &Arc<AtomicUsize>) -> Source<i32> {
    let counter = pulled.clone();
    Source::from_stream(stream::iter(values).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }))
}

#[tokio::test]
async fn test_pipe_to_pulls_one_value_per_write() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let mut sink = SlowSink::new(pulled.clone());

    counted(0..20, &pulled).pipe_to(&mut sink).await.unwrap();

    assert_eq!(sink.written, 20);
    assert_eq!(pulled.load(Ordering::SeqCst), 20);
    assert!(sink.max_lead <= 1, "producer ran {} ahead", sink.max_lead);
}

#[tokio::test]
async fn test_map_keeps_producer_paced_by_sink() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let mut sink = SlowSink::new(pulled.clone());

    counted(0..20, &pulled)
        .pipe(&map(|x: i32| x * 2))
        .pipe(&filter(|x: &i32| *x >= 0))
        .pipe_to(&mut sink)
        .await
        .unwrap();

    assert_eq!(sink.written, 20);
    assert!(sink.max_lead <= 1, "producer ran {} ahead", sink.max_lead);
}

#[tokio::test]
async fn test_flat_map_keeps_inner_sources_paced_by_sink() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let mut sink = SlowSink::new(pulled.clone());

    let inner_pulled = pulled.clone();
    from_iter(0..5)
        .pipe(&flat_map(move |x: i32| counted(x * 4..x * 4 + 4, &inner_pulled)))
        .pipe_to(&mut sink)
        .await
        .unwrap();

    assert_eq!(sink.written, 20);
    assert!(sink.max_lead <= 1, "inner sources ran {} ahead", sink.max_lead);
}

#[tokio::test]
async fn test_split_when_groups_are_paced_by_their_reader() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let mut outer = counted(0..20, &pulled).pipe(&split_when(|x: &i32| x % 5 == 0));

    let mut groups = 0;
    let mut max_lead = 0;
    let mut written = 0;
    while let Some(group) = outer.next().await {
        let mut sink = SlowSink::new(pulled.clone());
        sink.written = written;
        group.unwrap().pipe_to(&mut sink).await.unwrap();
        written = sink.written;
        max_lead = max_lead.max(sink.max_lead);
        groups += 1;
    }

    // leading empty group, then one per multiple of five
    assert_eq!(groups, 5);
    assert_eq!(written, 20);
    assert!(max_lead <= 1, "split ran {} ahead", max_lead);
}
