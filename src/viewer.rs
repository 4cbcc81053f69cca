use crate::registry::{ItemKind, Registry};

pub const DEFAULT_PRELOAD_RADIUS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub generation: u64,
    pub index: usize,
    pub url: String,
}

pub trait ImageLoader {
    fn load(&self, request: ImageRequest);
    fn preload(&self, url: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Closed,
    ShowingImage,
    ShowingText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSlot<T> {
    Empty,
    Loading { url: String },
    Loaded(T),
    Failed(String),
}

#[derive(Debug)]
pub struct Viewer<T> {
    cursor: Option<usize>,
    state: ViewerState,
    generation: u64,
    image: ImageSlot<T>,
    text: Option<String>,
    title: Option<String>,
    preload_radius: usize,
}

impl<T> Default for Viewer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PRELOAD_RADIUS)
    }
}

impl<T> Viewer<T> {
    pub fn new(preload_radius: usize) -> Self {
        Self::resuming(preload_radius, 0)
    }

    // Generations keep counting across reloads so completions issued by an
    // earlier session never match.
    pub fn resuming(preload_radius: usize, generation: u64) -> Self {
        Self {
            cursor: None,
            state: ViewerState::Closed,
            generation,
            image: ImageSlot::Empty,
            text: None,
            title: None,
            preload_radius,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != ViewerState::Closed
    }

    // -1 while closed
    pub fn cursor(&self) -> isize {
        self.cursor.map_or(-1, |index| index as isize)
    }

    pub fn current(&self) -> Option<usize> {
        self.cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> &ImageSlot<T> {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut ImageSlot<T> {
        &mut self.image
    }

    pub fn is_image_loaded(&self) -> bool {
        matches!(self.image, ImageSlot::Loaded(_))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn preload_radius(&self) -> usize {
        self.preload_radius
    }

    pub fn open(&mut self, index: isize, registry: &Registry, loader: &dyn ImageLoader) -> bool {
        let Some(item) = registry.get_signed(index) else {
            return false;
        };
        let index = item.index;
        self.cursor = Some(index);
        self.title = item.title().map(str::to_string);

        match &item.kind {
            ItemKind::Image(image) => {
                self.state = ViewerState::ShowingImage;
                self.text = None;
                self.generation = self.generation.wrapping_add(1);
                self.image = ImageSlot::Loading {
                    url: image.large_url.clone(),
                };
                loader.load(ImageRequest {
                    generation: self.generation,
                    index,
                    url: image.large_url.clone(),
                });
                self.preload_neighbors(index, registry, loader);
            }
            ItemKind::Text(text) => {
                self.state = ViewerState::ShowingText;
                self.image = ImageSlot::Empty;
                self.text = Some(text.markup());
            }
        }
        true
    }

    pub fn navigate(
        &mut self,
        delta: isize,
        registry: &Registry,
        loader: &dyn ImageLoader,
    ) -> bool {
        let Some(current) = self.cursor else {
            return false;
        };
        let Some(target) = (current as isize).checked_add(delta) else {
            return false;
        };
        self.open(target, registry, loader)
    }

    pub fn close(&mut self) {
        self.state = ViewerState::Closed;
        self.cursor = None;
        self.image = ImageSlot::Empty;
        self.text = None;
        self.title = None;
    }

    pub fn complete_image(
        &mut self,
        generation: u64,
        index: usize,
        result: Result<T, String>,
    ) -> bool {
        if self.state != ViewerState::ShowingImage
            || generation != self.generation
            || self.cursor != Some(index)
        {
            tracing::debug!(
                generation,
                index,
                current = self.generation,
                "dropping stale image completion"
            );
            return false;
        }
        self.image = match result {
            Ok(image) => ImageSlot::Loaded(image),
            Err(message) => {
                tracing::warn!(index, error = %message, "large image failed to load");
                ImageSlot::Failed(message)
            }
        };
        true
    }

    fn preload_neighbors(&self, index: usize, registry: &Registry, loader: &dyn ImageLoader) {
        for offset in 1..=self.preload_radius.min(registry.len()) {
            let around = [index.checked_sub(offset), index.checked_add(offset)];
            for neighbor in around.into_iter().flatten() {
                if let Some(url) = registry.get(neighbor).and_then(|item| item.large_url()) {
                    loader.preload(url);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Block;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingLoader {
        loads: RefCell<Vec<ImageRequest>>,
        preloads: RefCell<Vec<String>>,
    }

    impl ImageLoader for RecordingLoader {
        fn load(&self, request: ImageRequest) {
            self.loads.borrow_mut().push(request);
        }

        fn preload(&self, url: &str) {
            self.preloads.borrow_mut().push(url.to_string());
        }
    }

    fn registry(kinds: &str) -> Registry {
        let mut registry = Registry::new();
        for (i, kind) in kinds.chars().enumerate() {
            let value = match kind {
                'i' => serde_json::json!({
                    "class": "Image",
                    "title": format!("img {i}"),
                    "image": {"display": {"url": format!("u{i}")}}
                }),
                _ => serde_json::json!({"class": "Text", "content_html": format!("<p>\"t{i}\"</p>")}),
            };
            let block: Block = serde_json::from_value(value).unwrap();
            registry.accept(&block);
        }
        registry
    }

    #[test]
    fn starts_closed() {
        let viewer: Viewer<()> = Viewer::default();
        assert_eq!(viewer.state(), ViewerState::Closed);
        assert_eq!(viewer.cursor(), -1);
        assert_eq!(viewer.preload_radius(), 3);
    }

    #[test]
    fn out_of_range_open_is_a_no_op() {
        let registry = registry("ii");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        assert!(!viewer.open(-1, &registry, &loader));
        assert!(!viewer.open(2, &registry, &loader));
        assert_eq!(viewer.state(), ViewerState::Closed);
        assert_eq!(viewer.cursor(), -1);

        assert!(viewer.open(1, &registry, &loader));
        let generation = viewer.generation();
        assert!(!viewer.open(5, &registry, &loader));
        assert_eq!(viewer.cursor(), 1);
        assert_eq!(viewer.generation(), generation);
        assert_eq!(viewer.state(), ViewerState::ShowingImage);
        assert_eq!(loader.loads.borrow().len(), 1);
    }

    #[test]
    fn image_open_requests_large_url_and_title() {
        let registry = registry("iti");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<&str> = Viewer::default();

        viewer.open(2, &registry, &loader);
        assert_eq!(
            loader.loads.borrow()[0],
            ImageRequest {
                generation: 1,
                index: 2,
                url: "u2".into()
            }
        );
        assert_eq!(viewer.title(), Some("img 2"));
        assert_eq!(
            viewer.image(),
            &ImageSlot::Loading { url: "u2".into() }
        );
        assert!(!viewer.is_image_loaded());
        assert!(viewer.complete_image(1, 2, Ok("pixels")));
        assert!(viewer.is_image_loaded());
    }

    #[test]
    fn text_open_hides_image_and_unescapes_markup() {
        let registry = registry("it");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(1, &registry, &loader);
        assert_eq!(viewer.state(), ViewerState::ShowingText);
        assert_eq!(viewer.text(), Some("<p>\"t1\"</p>"));
        assert_eq!(viewer.image(), &ImageSlot::Empty);
        assert_eq!(viewer.title(), None);
        assert!(loader.loads.borrow().is_empty());
        assert!(loader.preloads.borrow().is_empty());
    }

    #[test]
    fn navigate_there_and_back_restores_content() {
        let registry = registry("itit");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(1, &registry, &loader);
        let text = viewer.text().map(str::to_string);
        assert!(viewer.navigate(1, &registry, &loader));
        assert_eq!(viewer.cursor(), 2);
        assert_eq!(viewer.state(), ViewerState::ShowingImage);
        assert!(viewer.navigate(-1, &registry, &loader));
        assert_eq!(viewer.cursor(), 1);
        assert_eq!(viewer.text().map(str::to_string), text);
    }

    #[test]
    fn edges_are_inert() {
        let registry = registry("ii");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(0, &registry, &loader);
        assert!(!viewer.navigate(-1, &registry, &loader));
        assert_eq!(viewer.cursor(), 0);
        viewer.navigate(1, &registry, &loader);
        assert!(!viewer.navigate(1, &registry, &loader));
        assert_eq!(viewer.cursor(), 1);
    }

    #[test]
    fn navigate_while_closed_does_nothing() {
        let registry = registry("ii");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();
        assert!(!viewer.navigate(1, &registry, &loader));
        assert_eq!(viewer.state(), ViewerState::Closed);
    }

    #[test]
    fn close_from_text_resets_everything() {
        let registry = registry("t");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(0, &registry, &loader);
        viewer.close();
        assert_eq!(viewer.state(), ViewerState::Closed);
        assert_eq!(viewer.cursor(), -1);
        assert_eq!(viewer.text(), None);
        assert_eq!(viewer.title(), None);
    }

    #[test]
    fn huge_preload_radius_stops_at_the_registry() {
        let registry = registry("iti");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::new(usize::MAX);

        assert!(viewer.open(0, &registry, &loader));
        assert_eq!(*loader.preloads.borrow(), vec!["u2".to_string()]);
    }

    #[test]
    fn stale_completions_are_dropped() {
        let registry = registry("iii");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<&str> = Viewer::default();

        viewer.open(0, &registry, &loader);
        let first = viewer.generation();
        viewer.navigate(1, &registry, &loader);
        assert!(!viewer.complete_image(first, 0, Ok("old")));
        assert!(!viewer.is_image_loaded());

        // Reopening the same index still invalidates the earlier load.
        viewer.open(0, &registry, &loader);
        assert!(!viewer.complete_image(first, 0, Ok("old")));
        assert!(viewer.complete_image(viewer.generation(), 0, Ok("new")));
        assert_eq!(viewer.image(), &ImageSlot::Loaded("new"));

        viewer.close();
        assert!(!viewer.complete_image(viewer.generation(), 0, Ok("late")));
    }

    #[test]
    fn failed_load_keeps_viewer_open() {
        let registry = registry("i");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(0, &registry, &loader);
        assert!(viewer.complete_image(viewer.generation(), 0, Err("404".into())));
        assert_eq!(viewer.image(), &ImageSlot::Failed("404".into()));
        assert_eq!(viewer.state(), ViewerState::ShowingImage);
    }

    #[test]
    fn preloads_up_to_radius_images_each_side() {
        let registry = registry("iiiitiiiii");
        let loader = RecordingLoader::default();
        let mut viewer: Viewer<()> = Viewer::default();

        viewer.open(5, &registry, &loader);
        let mut preloads = loader.preloads.borrow().clone();
        preloads.sort();
        assert_eq!(preloads, vec!["u2", "u3", "u6", "u7", "u8"]);

        loader.preloads.borrow_mut().clear();
        viewer.open(0, &registry, &loader);
        assert_eq!(*loader.preloads.borrow(), vec!["u1", "u2", "u3"]);
    }
}
