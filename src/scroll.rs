/// Where each word ended up after layout
pub trait WordLayout {
    /// Row of word `index`, or None if the word is not laid out.
    fn row_of(&self, index: usize) -> Option<usize>;

    fn row_count(&self) -> usize;
}

/// Scroll so that word `index` sits in the middle of the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub index: usize,
    pub offset: usize,
}

/// Top row that centres `row` in a viewport, without scrolling past the end.
pub fn centered_offset(row: usize, viewport_height: usize, row_count: usize) -> usize {
    let max_offset = row_count.saturating_sub(viewport_height);
    row.saturating_sub(viewport_height / 2).min(max_offset)
}

/// Turns current-word changes into scroll requests.
///
/// Only a change of index produces a request, so polls that land inside the
/// same word never restart the animation.
#[derive(Debug, Default)]
pub struct ScrollCoordinator {
    last_index: Option<usize>,
}

impl ScrollCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    pub fn observe<L: WordLayout + ?Sized>(
        &mut self,
        index: Option<usize>,
        layout: &L,
        viewport_height: usize,
    ) -> Option<ScrollRequest> {
        if index == self.last_index {
            return None;
        }
        let Some(index) = index else {
            self.last_index = None;
            return None;
        };
        // Nothing to scroll to yet (e.g. mid table swap); the next observation retries
        let row = layout.row_of(index)?;

        self.last_index = Some(index);
        Some(ScrollRequest {
            index,
            offset: centered_offset(row, viewport_height, layout.row_count()),
        })
    }

    /// Forget the last index so the next observation scrolls again (after a relayout).
    pub fn invalidate(&mut self) {
        self.last_index = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScrollAnimation {
    from: f32,
    to: usize,
    frame: u16,
}

/// Scroll offset of the reading surface plus at most one running animation
#[derive(Debug, Clone)]
pub struct Viewport {
    offset: f32,
    frames: u16,
    animation: Option<ScrollAnimation>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Viewport {
    pub fn new(frames: u16) -> Self {
        Self {
            offset: 0.0,
            frames,
            animation: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset.round() as usize
    }

    pub fn target(&self) -> Option<usize> {
        self.animation.map(|a| a.to)
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Start easing toward the request's offset, replacing any running animation.
    pub fn animate_to(&mut self, request: ScrollRequest) {
        if self.frames == 0 {
            self.offset = request.offset as f32;
            self.animation = None;
            return;
        }
        self.animation = Some(ScrollAnimation {
            from: self.offset,
            to: request.offset,
            frame: 0,
        });
    }

    /// Advance the animation one frame. Returns true while the offset moved.
    pub fn step(&mut self) -> bool {
        let Some(mut animation) = self.animation else {
            return false;
        };
        animation.frame += 1;
        let t = animation.frame as f32 / self.frames as f32;
        if t >= 1.0 {
            self.offset = animation.to as f32;
            self.animation = None;
            return true;
        }
        // ease-out
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        self.offset = animation.from + (animation.to as f32 - animation.from) * eased;
        self.animation = Some(animation);
        true
    }

    /// Manual scrolling takes over from any running animation.
    pub fn scroll_by(&mut self, delta: isize, row_count: usize, viewport_height: usize) {
        self.animation = None;
        let max_offset = row_count.saturating_sub(viewport_height) as isize;
        let offset = (self.offset() as isize + delta).clamp(0, max_offset.max(0));
        self.offset = offset as f32;
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.animation = None;
    }
}
