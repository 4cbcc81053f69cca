use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::arena::Page;
use crate::data::FeedService;

pub const FIRST_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Complete { pages: u32 },
    Failed { page: u32 },
    Cancelled { pages: u32 },
}

#[derive(Debug)]
pub enum LoadEvent {
    Page(Page),
    Finished(LoadOutcome),
}

pub fn fetch_page(service: &dyn FeedService, page: u32, per: u32) -> Option<Page> {
    tracing::debug!(channel = service.channel(), page, per, "fetching page");
    match service.load_page(page, per) {
        Ok(data) => {
            tracing::debug!(
                channel = service.channel(),
                page,
                entries = data.len(),
                "fetched page"
            );
            Some(data)
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(
                channel = service.channel(),
                page,
                error = %message,
                "error fetching page"
            );
            None
        }
    }
}

pub fn load_all<F>(
    service: &dyn FeedService,
    per: u32,
    cancel: &AtomicBool,
    mut on_page: F,
) -> LoadOutcome
where
    F: FnMut(Page),
{
    let per = per.max(1);
    let mut page = FIRST_PAGE;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return LoadOutcome::Cancelled { pages: page - 1 };
        }
        let Some(data) = fetch_page(service, page, per) else {
            return LoadOutcome::Failed { page };
        };
        // An exact-size last page costs one extra, empty request.
        let more = data.len() == per as usize;
        on_page(data);
        if !more {
            tracing::info!(channel = service.channel(), pages = page, "feed exhausted");
            return LoadOutcome::Complete { pages: page };
        }
        page += 1;
    }
}

pub fn spawn<S>(
    service: Arc<dyn FeedService>,
    per: u32,
    cancel: Arc<AtomicBool>,
    mut sink: S,
) -> thread::JoinHandle<()>
where
    S: FnMut(LoadEvent) + Send + 'static,
{
    thread::spawn(move || {
        let outcome = load_all(service.as_ref(), per, &cancel, |page| {
            sink(LoadEvent::Page(page))
        });
        sink(LoadEvent::Finished(outcome));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockFeedService;

    fn image_json(url: &str) -> String {
        format!(
            r#"{{"class": "Image", "image": {{"thumb": {{"url": "{url}-t"}}, "display": {{"url": "{url}"}}}}}}"#
        )
    }

    fn page_body(urls: &[&str]) -> String {
        let items: Vec<String> = urls.iter().map(|url| image_json(url)).collect();
        format!(r#"{{"contents": [{}]}}"#, items.join(","))
    }

    #[test]
    fn full_page_triggers_another_request() {
        let mock = MockFeedService::new("c");
        mock.push_json(&page_body(&["a", "b"])).unwrap();
        mock.push_json(&page_body(&["c"])).unwrap();

        let mut seen = Vec::new();
        let outcome = load_all(&mock, 2, &AtomicBool::new(false), |page| {
            seen.push(page.len())
        });

        assert_eq!(outcome, LoadOutcome::Complete { pages: 2 });
        assert_eq!(seen, vec![2, 1]);
        assert_eq!(mock.requests(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn short_page_stops_immediately() {
        let mock = MockFeedService::new("c");
        mock.push_json(&page_body(&["a"])).unwrap();
        mock.push_json(&page_body(&["never"])).unwrap();

        let outcome = load_all(&mock, 20, &AtomicBool::new(false), |_| {});
        assert_eq!(outcome, LoadOutcome::Complete { pages: 1 });
        assert_eq!(mock.requests(), vec![(1, 20)]);
    }

    #[test]
    fn exact_multiple_costs_one_trailing_empty_request() {
        let mock = MockFeedService::new("c");
        mock.push_json(&page_body(&["a", "b"])).unwrap();

        let mut lengths = Vec::new();
        let outcome = load_all(&mock, 2, &AtomicBool::new(false), |page| {
            lengths.push(page.len())
        });
        assert_eq!(outcome, LoadOutcome::Complete { pages: 2 });
        assert_eq!(lengths, vec![2, 0]);
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn failure_stops_without_retry_and_keeps_earlier_pages() {
        let mock = MockFeedService::new("c");
        mock.push_json(&page_body(&["a", "b"])).unwrap();
        mock.push_failure("connection reset");
        mock.push_json(&page_body(&["c"])).unwrap();

        let mut delivered = 0;
        let outcome = load_all(&mock, 2, &AtomicBool::new(false), |_| delivered += 1);
        assert_eq!(outcome, LoadOutcome::Failed { page: 2 });
        assert_eq!(delivered, 1);
        assert_eq!(mock.requests(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn malformed_entries_count_toward_the_sentinel() {
        let mock = MockFeedService::new("c");
        mock.push_json(r#"{"contents": [{"class": "Text", "content": "x"}, {"nope": true}]}"#)
            .unwrap();

        let outcome = load_all(&mock, 2, &AtomicBool::new(false), |_| {});
        assert_eq!(outcome, LoadOutcome::Complete { pages: 2 });
    }

    #[test]
    fn cancel_is_checked_before_each_request() {
        let mock = MockFeedService::new("c");
        let cancel = AtomicBool::new(false);
        mock.push_json(&page_body(&["a", "b"])).unwrap();

        let outcome = load_all(&mock, 2, &cancel, |_| cancel.store(true, Ordering::SeqCst));
        assert_eq!(outcome, LoadOutcome::Cancelled { pages: 1 });
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn spawned_loader_streams_pages_then_outcome() {
        let mock = Arc::new(MockFeedService::new("c"));
        mock.push_json(&page_body(&["a"])).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        spawn(mock, 20, Arc::new(AtomicBool::new(false)), move |event| {
            let _ = tx.send(event);
        })
        .join()
        .unwrap();

        let events: Vec<LoadEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], LoadEvent::Page(page) if page.len() == 1));
        assert!(matches!(
            &events[1],
            LoadEvent::Finished(LoadOutcome::Complete { pages: 1 })
        ));
    }
}
