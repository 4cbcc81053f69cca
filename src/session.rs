use crate::arena::{BlockClass, Page};
use crate::feed::LoadOutcome;
use crate::input::Command;
use crate::registry::{PageSummary, Registry};
use crate::viewer::{ImageLoader, Viewer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading { pages: u32 },
    Complete { pages: u32 },
    Failed { page: u32 },
    Cancelled,
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }
}

pub struct Session<T> {
    channel: String,
    registry: Registry,
    viewer: Viewer<T>,
    icon_url: Option<String>,
    load: LoadState,
}

impl<T> Session<T> {
    pub fn new(channel: impl Into<String>, preload_radius: usize) -> Self {
        Self {
            channel: channel.into(),
            registry: Registry::new(),
            viewer: Viewer::new(preload_radius),
            icon_url: None,
            load: LoadState::Loading { pages: 0 },
        }
    }

    pub fn reload(&self) -> Self {
        Self {
            viewer: Viewer::resuming(self.viewer.preload_radius(), self.viewer.generation()),
            ..Self::new(self.channel.clone(), self.viewer.preload_radius())
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn viewer(&self) -> &Viewer<T> {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer<T> {
        &mut self.viewer
    }

    pub fn icon_url(&self) -> Option<&str> {
        self.icon_url.as_deref()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn ingest_page(&mut self, page: &Page) -> PageSummary {
        if page.number == 1 && self.icon_url.is_none() {
            self.icon_url = page
                .leading_block()
                .filter(|block| block.class == BlockClass::Image)
                .and_then(|block| block.thumb_url())
                .map(str::to_string);
        }
        let summary = self.registry.accept_page(page);
        if let LoadState::Loading { pages } = &mut self.load {
            *pages = page.number;
        }
        tracing::debug!(
            channel = %self.channel,
            page = page.number,
            added = summary.added,
            duplicates = summary.duplicates,
            ignored = summary.ignored,
            malformed = summary.malformed,
            "page accepted"
        );
        summary
    }

    pub fn finish(&mut self, outcome: &LoadOutcome) {
        self.load = match *outcome {
            LoadOutcome::Complete { pages } => LoadState::Complete { pages },
            LoadOutcome::Failed { page } => LoadState::Failed { page },
            LoadOutcome::Cancelled { .. } => LoadState::Cancelled,
        };
        tracing::info!(
            channel = %self.channel,
            items = self.registry.len(),
            images = self.registry.image_count(),
            state = ?self.load,
            "load finished"
        );
    }

    pub fn apply(&mut self, command: Command, loader: &dyn ImageLoader) -> bool {
        match command {
            Command::Open(index) => match isize::try_from(index) {
                Ok(index) => self.viewer.open(index, &self.registry, loader),
                Err(_) => false,
            },
            Command::Navigate(delta) => self.viewer.navigate(delta, &self.registry, loader),
            Command::Close => {
                let was_open = self.viewer.is_open();
                self.viewer.close();
                was_open
            }
        }
    }

    pub fn complete_image(
        &mut self,
        generation: u64,
        index: usize,
        result: Result<T, String>,
    ) -> bool {
        self.viewer.complete_image(generation, index, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::{ImageRequest, ImageSlot, ViewerState};

    struct NullLoader;

    impl ImageLoader for NullLoader {
        fn load(&self, _request: ImageRequest) {}
        fn preload(&self, _url: &str) {}
    }

    fn page(number: u32, body: &str) -> Page {
        Page::from_json(number, body).unwrap()
    }

    #[test]
    fn two_images_then_empty_page() {
        let mut session: Session<()> = Session::new("c", 3);
        session.ingest_page(&page(
            1,
            r#"{"contents": [
                {"class": "Image", "image": {"thumb": {"url": "A.t"}, "display": {"url": "A"}}},
                {"class": "Image", "image": {"thumb": {"url": "B.t"}, "display": {"url": "B"}}}
            ]}"#,
        ));
        session.ingest_page(&page(2, r#"{"contents": []}"#));
        session.finish(&LoadOutcome::Complete { pages: 2 });

        let urls: Vec<_> = session
            .registry()
            .items()
            .iter()
            .filter_map(|item| item.large_url())
            .collect();
        assert_eq!(urls, vec!["A", "B"]);
        assert_eq!(session.icon_url(), Some("A.t"));
        assert_eq!(session.load_state(), &LoadState::Complete { pages: 2 });
    }

    #[test]
    fn icon_only_from_a_leading_image_on_page_one() {
        let mut session: Session<()> = Session::new("c", 3);
        session.ingest_page(&page(
            1,
            r#"{"contents": [
                {"class": "Text", "content": "x"},
                {"class": "Image", "image": {"thumb": {"url": "A.t"}, "display": {"url": "A"}}}
            ]}"#,
        ));
        assert_eq!(session.icon_url(), None);

        session.ingest_page(&page(
            2,
            r#"{"contents": [{"class": "Image", "image": {"thumb": {"url": "B.t"}, "display": {"url": "B"}}}]}"#,
        ));
        assert_eq!(session.icon_url(), None);
    }

    #[test]
    fn failed_load_keeps_items() {
        let mut session: Session<()> = Session::new("c", 3);
        session.ingest_page(&page(1, r#"{"contents": [{"class": "Text", "content": "x"}]}"#));
        assert!(session.load_state().is_loading());
        session.finish(&LoadOutcome::Failed { page: 2 });
        assert_eq!(session.load_state(), &LoadState::Failed { page: 2 });
        assert_eq!(session.registry().len(), 1);
    }

    #[test]
    fn commands_drive_the_viewer() {
        let mut session: Session<()> = Session::new("c", 3);
        session.ingest_page(&page(
            1,
            r#"{"contents": [
                {"class": "Text", "content": "x"},
                {"class": "Image", "image": {"display": {"url": "A"}}}
            ]}"#,
        ));

        assert!(session.apply(Command::Open(0), &NullLoader));
        assert_eq!(session.viewer().state(), ViewerState::ShowingText);
        assert!(session.apply(Command::Navigate(1), &NullLoader));
        assert_eq!(session.viewer().state(), ViewerState::ShowingImage);
        assert!(!session.apply(Command::Navigate(1), &NullLoader));
        assert_eq!(session.viewer().cursor(), 1);
        assert!(session.apply(Command::Close, &NullLoader));
        assert!(!session.apply(Command::Close, &NullLoader));
        assert_eq!(session.viewer().cursor(), -1);
        assert!(!session.apply(Command::Open(9), &NullLoader));
    }

    #[test]
    fn reload_ignores_images_requested_before_it() {
        let body = r#"{"contents": [{"class": "Image", "image": {"display": {"url": "A"}}}]}"#;
        let mut old: Session<&str> = Session::new("c", 3);
        old.ingest_page(&page(1, body));
        old.apply(Command::Open(0), &NullLoader);
        let stale = old.viewer().generation();

        let mut fresh = old.reload();
        assert!(fresh.registry().is_empty());
        assert!(!fresh.viewer().is_open());
        fresh.ingest_page(&page(1, body));
        fresh.apply(Command::Open(0), &NullLoader);
        assert_ne!(fresh.viewer().generation(), stale);

        assert!(!fresh.complete_image(stale, 0, Ok("old pixels")));
        assert!(matches!(fresh.viewer().image(), ImageSlot::Loading { .. }));
        let current = fresh.viewer().generation();
        assert!(fresh.complete_image(current, 0, Ok("new pixels")));
        assert_eq!(fresh.viewer().image(), &ImageSlot::Loaded("new pixels"));
    }
}
