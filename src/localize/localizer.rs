use std::sync::Arc;

use crate::artifacts::{record_image, ArtifactSink, NullSink};
use crate::config::{LocalizerConfig, LocalizerStrategy};
use crate::errors::PilotResult;
use crate::localize::geometry::BoundingBox;
use crate::localize::overlay::annotate_grid;
use crate::localize::parse::{parse_bbox_reply, parse_cell_index, CellChoice};
use crate::oracle::{BboxOracle, GridOracle};
use crate::session::{EncodedImage, SessionManager};

/// Grid-narrowing localizer: one grounding-oracle call per refinement step.
pub struct GridLocalizer {
    oracle: Arc<dyn GridOracle>,
    sink: Arc<dyn ArtifactSink>,
    rows: u32,
    cols: u32,
    steps: u32,
}

impl GridLocalizer {
    pub fn new(oracle: Arc<dyn GridOracle>, config: &LocalizerConfig) -> Self {
        Self {
            oracle,
            sink: Arc::new(NullSink),
            rows: config.rows.max(1),
            cols: config.cols.max(1),
            steps: config.steps.max(1),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Resolve `description` on `frame`. `Ok(None)` means the oracle
    /// reported the element as not visible.
    pub async fn locate(&self, frame: &EncodedImage, description: &str) -> PilotResult<Option<BoundingBox>> {
        let pixels = frame.decode()?;
        let mut target: Option<BoundingBox> = None;

        for step in 1..=self.steps {
            let (annotated, cells) = annotate_grid(&pixels, target, self.rows, self.cols);
            let annotated = EncodedImage::encode_png(&annotated)?;
            record_image(self.sink.as_ref(), &annotated, "grid-step").await;

            let reply = self.oracle.choose_cell(&annotated, description).await?;
            match parse_cell_index(&reply, cells.len())? {
                CellChoice::NotVisible => {
                    tracing::info!(step, element = %description, "grounding oracle: element not visible");
                    return Ok(None);
                }
                CellChoice::Cell(index) => {
                    let rect = cells[index].rect;
                    tracing::debug!(step, cell = index, rect = %rect, "grid step narrowed");
                    target = Some(rect);
                }
            }
        }

        if let Some(rect) = target {
            tracing::info!(element = %description, rect = %rect, "element localized");
        }
        Ok(target)
    }
}

/// Single-shot localizer backed by a bounding-box oracle.
pub struct BboxLocalizer {
    oracle: Arc<dyn BboxOracle>,
}

impl BboxLocalizer {
    pub fn new(oracle: Arc<dyn BboxOracle>) -> Self {
        Self { oracle }
    }

    /// A point reply resolves to a zero-area box at that point.
    pub async fn locate(&self, frame: &EncodedImage, description: &str) -> PilotResult<Option<BoundingBox>> {
        let reply = self.oracle.locate_bbox(frame, description).await?;
        let bbox = parse_bbox_reply(&reply)?.bounding_box();
        tracing::info!(element = %description, rect = %bbox, "element localized via bbox oracle");
        Ok(Some(bbox))
    }
}

/// Either localization strategy. The two are not numerically
/// interchangeable; callers pick one per configuration.
pub enum Localizer {
    Grid(GridLocalizer),
    Bbox(BboxLocalizer),
}

impl Localizer {
    /// Pick the configured strategy from the available oracles.
    pub fn from_config(
        config: &LocalizerConfig,
        grid: Arc<dyn GridOracle>,
        bbox: Arc<dyn BboxOracle>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        match config.strategy {
            LocalizerStrategy::Grid => Localizer::Grid(GridLocalizer::new(grid, config).with_sink(sink)),
            LocalizerStrategy::Bbox => Localizer::Bbox(BboxLocalizer::new(bbox)),
        }
    }

    pub async fn locate(&self, frame: &EncodedImage, description: &str) -> PilotResult<Option<BoundingBox>> {
        match self {
            Localizer::Grid(g) => g.locate(frame, description).await,
            Localizer::Bbox(b) => b.locate(frame, description).await,
        }
    }

    /// Capture a fresh frame and resolve `description` on it.
    pub async fn query_element_bbox(
        &self,
        session: &SessionManager,
        description: &str,
    ) -> PilotResult<(Option<BoundingBox>, EncodedImage)> {
        let frame = session.capture_frame().await?;
        let bbox = self.locate(&frame, description).await?;
        Ok((bbox, frame))
    }

    /// Actionable point for `description` on the current screen.
    pub async fn query_element_position(
        &self,
        session: &SessionManager,
        description: &str,
    ) -> PilotResult<Option<(i32, i32)>> {
        let (bbox, _) = self.query_element_bbox(session, description).await?;
        Ok(bbox.map(|b| b.midpoint()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::artifacts::MemorySink;
    use crate::errors::PilotError;

    struct ScriptedGrid {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedGrid {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl GridOracle for ScriptedGrid {
        async fn choose_cell(&self, _annotated: &EncodedImage, _description: &str) -> PilotResult<String> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_else(|| "0".into()))
        }
    }

    struct FixedBbox(&'static str);

    #[async_trait]
    impl BboxOracle for FixedBbox {
        async fn locate_bbox(&self, _frame: &EncodedImage, _description: &str) -> PilotResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn frame(w: u32, h: u32) -> EncodedImage {
        EncodedImage::encode_png(&image::RgbaImage::new(w, h)).unwrap()
    }

    #[tokio::test]
    async fn two_steps_narrow_to_sub_cell() {
        let oracle = ScriptedGrid::new(&["5", "15"]);
        let sink = Arc::new(MemorySink::new());
        let localizer = GridLocalizer::new(oracle.clone(), &LocalizerConfig::default()).with_sink(sink.clone());

        let bbox = localizer.locate(&frame(400, 400), "OK button").await.unwrap().unwrap();
        // Cell 5 = (100,100)-(200,200); its cell 15 = (175,175)-(200,200).
        assert_eq!(bbox, BoundingBox::new(175, 175, 200, 200));
        assert_eq!(bbox.midpoint(), (187, 187));
        assert_eq!(oracle.calls(), 2);
        assert_eq!(sink.filenames().len(), 2);
    }

    #[tokio::test]
    async fn not_visible_stops_early() {
        let oracle = ScriptedGrid::new(&["-1"]);
        let localizer = GridLocalizer::new(oracle.clone(), &LocalizerConfig::default());
        assert_eq!(localizer.locate(&frame(100, 100), "ghost").await.unwrap(), None);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_is_localization_error() {
        let oracle = ScriptedGrid::new(&["cell 3 and 7"]);
        let localizer = GridLocalizer::new(oracle, &LocalizerConfig::default());
        let err = localizer.locate(&frame(100, 100), "x").await.unwrap_err();
        assert!(matches!(err, PilotError::Localization(ref m) if m.contains("cell 3 and 7")));
    }

    #[tokio::test]
    async fn degenerate_cells_do_not_crash() {
        // 3×3 on a 2-px image leaves zero-width cells after the first step.
        let oracle = ScriptedGrid::new(&["0", "4", "8"]);
        let config = LocalizerConfig { rows: 3, cols: 3, steps: 3, ..LocalizerConfig::default() };
        let localizer = GridLocalizer::new(oracle.clone(), &config);
        let bbox = localizer.locate(&frame(2, 2), "tiny").await.unwrap().unwrap();
        assert!(bbox.is_degenerate());
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn bbox_strategy_uses_midpoint() {
        let localizer = Localizer::Bbox(BboxLocalizer::new(Arc::new(FixedBbox(
            "<|box_start|>(10,20),(30,40)<|box_end|>",
        ))));
        let bbox = localizer.locate(&frame(50, 50), "icon").await.unwrap().unwrap();
        assert_eq!(bbox.midpoint(), (20, 30));
    }
}
