/// Connection-scoped entry points that compose the session, localizers,
/// oracles and executor.
use std::sync::Arc;

use crate::agent_engine::{DesktopTools, TaskExecutor};
use crate::artifacts::{upload_image, ArtifactSink, DirectorySink, FileRef, NullSink};
use crate::config::{AppConfig, Endpoint, LocalizerStrategy};
use crate::errors::{PilotError, PilotResult};
use crate::llm::registry::ProviderRegistry;
use crate::localize::overlay::draw_bounding_box;
use crate::localize::Localizer;
use crate::oracle::{
    BboxOracle, ExecutionOracle, GridOracle, LlmBboxOracle, LlmExecutionOracle, LlmGridOracle,
    LlmPlanningOracle, PlanningOracle,
};
use crate::rfb::RfbConnector;
use crate::session::{EncodedImage, SessionManager};

/// The oracle set a `ComputerUse` consults.
#[derive(Clone)]
pub struct Oracles {
    pub planner: Arc<dyn PlanningOracle>,
    pub executor: Arc<dyn ExecutionOracle>,
    pub grid: Arc<dyn GridOracle>,
    pub bbox: Arc<dyn BboxOracle>,
}

impl Oracles {
    /// Chat-model oracles resolved through the registry roles.
    pub fn from_registry(registry: Arc<ProviderRegistry>, max_tool_rounds: u32) -> Self {
        Self {
            planner: Arc::new(LlmPlanningOracle::new(registry.clone())),
            executor: Arc::new(LlmExecutionOracle::new(registry.clone(), max_tool_rounds)),
            grid: Arc::new(LlmGridOracle::new(registry.clone())),
            bbox: Arc::new(LlmBboxOracle::new(registry)),
        }
    }
}

pub struct ComputerUse {
    session: Arc<SessionManager>,
    oracles: Oracles,
    sink: Arc<dyn ArtifactSink>,
    config: AppConfig,
}

impl ComputerUse {
    pub fn new(session: Arc<SessionManager>, oracles: Oracles, sink: Arc<dyn ArtifactSink>, config: AppConfig) -> Self {
        Self { session, oracles, sink, config }
    }

    /// Wire everything from `config`: LLM oracles, artifact directory and a
    /// session manager over `connector`.
    pub fn from_config(config: AppConfig, connector: Arc<dyn RfbConnector>) -> Self {
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        let oracles = Oracles::from_registry(registry, config.executor.max_tool_rounds);
        let sink: Arc<dyn ArtifactSink> = if config.artifacts.enabled {
            Arc::new(DirectorySink::new(config.artifacts.resolved_dir()))
        } else {
            Arc::new(NullSink)
        };
        let session = Arc::new(SessionManager::new(connector, config.session.clone()));
        Self::new(session, oracles, sink, config)
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Endpoint from `[session].endpoint`.
    pub fn default_endpoint(&self) -> PilotResult<Endpoint> {
        self.config.session.endpoint.parse()
    }

    fn localizer(&self, strategy: LocalizerStrategy) -> Localizer {
        let mut config = self.config.localizer.clone();
        config.strategy = strategy;
        Localizer::from_config(&config, self.oracles.grid.clone(), self.oracles.bbox.clone(), self.sink.clone())
    }

    fn executor(&self, session: Arc<SessionManager>) -> TaskExecutor {
        let localizer = Arc::new(self.localizer(self.config.localizer.strategy));
        let tools = Arc::new(DesktopTools::new(session.clone(), localizer, &self.config.executor));
        let executor = TaskExecutor::new(
            session,
            self.oracles.planner.clone(),
            self.oracles.executor.clone(),
            tools,
            &self.config.executor,
        )
        .with_sink(self.sink.clone());
        if self.config.artifacts.enabled {
            executor.with_journal_dir(self.config.artifacts.resolved_dir().join("journal"))
        } else {
            executor
        }
    }

    /// Connect, drive `goal` to completion, always disconnect.
    pub async fn perform_computer_task(&self, goal: &str, endpoint: &Endpoint, password: &str) -> PilotResult<String> {
        tracing::info!(goal, endpoint = %endpoint, "perform_computer_task");
        self.session
            .scoped(endpoint, password, |session| async move {
                let outcome = self.executor(session).run(goal).await?;
                Ok(outcome.summary())
            })
            .await
    }

    /// Connect, localize `description`, upload the frame with the element
    /// outlined in red, always disconnect.
    pub async fn highlight_ui_element(
        &self,
        description: &str,
        strategy: Option<LocalizerStrategy>,
        endpoint: &Endpoint,
        password: &str,
    ) -> PilotResult<FileRef> {
        let strategy = strategy.unwrap_or(self.config.localizer.strategy);
        tracing::info!(element = description, ?strategy, "highlight_ui_element");
        self.session
            .scoped(endpoint, password, |session| async move {
                let localizer = self.localizer(strategy);
                let (bbox, frame) = localizer.query_element_bbox(&session, description).await?;
                let bbox = bbox.ok_or_else(|| {
                    PilotError::Localization(format!("{description} is not visible on the screen"))
                })?;
                let mut pixels = frame.decode()?;
                draw_bounding_box(&mut pixels, bbox);
                let highlighted = EncodedImage::encode_png(&pixels)?;
                upload_image(self.sink.as_ref(), &highlighted, "bounding-box").await
            })
            .await
    }

    /// Forced capture of the current session, uploaded to the sink.
    pub async fn take_screenshot(&self) -> PilotResult<FileRef> {
        let frame = self.session.capture_frame().await?;
        upload_image(self.sink.as_ref(), &frame, "desktop-screenshot").await
    }

    /// Point for `description` on the current session using `strategy`
    /// (configured default when `None`).
    pub async fn query_element_position(
        &self,
        description: &str,
        strategy: Option<LocalizerStrategy>,
    ) -> PilotResult<Option<(i32, i32)>> {
        let strategy = strategy.unwrap_or(self.config.localizer.strategy);
        self.localizer(strategy).query_element_position(&self.session, description).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::agent_engine::tools::ToolRunner;
    use crate::agent_engine::ToolAction;
    use crate::artifacts::MemorySink;
    use crate::session::testing::FakeConnector;

    struct Scripted;

    #[async_trait]
    impl PlanningOracle for Scripted {
        async fn next_step(&self, _frame: &EncodedImage, _goal: &str) -> PilotResult<String> {
            Ok("\"Complete\"".into())
        }
    }

    #[async_trait]
    impl ExecutionOracle for Scripted {
        async fn perform(&self, _frame: &EncodedImage, _instruction: &str, tools: &dyn ToolRunner) -> PilotResult<String> {
            tools.run(&ToolAction::TypeText { text: "x".into() }).await
        }
    }

    #[async_trait]
    impl GridOracle for Scripted {
        async fn choose_cell(&self, _annotated: &EncodedImage, _description: &str) -> PilotResult<String> {
            Ok("0".into())
        }
    }

    #[async_trait]
    impl BboxOracle for Scripted {
        async fn locate_bbox(&self, _frame: &EncodedImage, _description: &str) -> PilotResult<String> {
            Ok("<|box_start|>(4,4),(20,20)<|box_end|>".into())
        }
    }

    fn pilot() -> (ComputerUse, FakeConnector, Arc<MemorySink>) {
        let fake = FakeConnector::new();
        let scripted = Arc::new(Scripted);
        let oracles = Oracles {
            planner: scripted.clone(),
            executor: scripted.clone(),
            grid: scripted.clone(),
            bbox: scripted,
        };
        let sink = Arc::new(MemorySink::new());
        let mut config = AppConfig::default();
        config.artifacts.enabled = false;
        let session = Arc::new(SessionManager::new(Arc::new(fake.clone()), config.session.clone()));
        (ComputerUse::new(session, oracles, sink.clone(), config), fake, sink)
    }

    #[tokio::test]
    async fn task_reports_achieved_and_disconnects() {
        let (pilot, fake, sink) = pilot();
        let endpoint = pilot.default_endpoint().unwrap();
        let reply = pilot.perform_computer_task("open htop", &endpoint, "123456").await.unwrap();
        assert_eq!(reply, "Goal 'open htop' achieved.");
        assert!(!pilot.session().is_connected());
        assert!(pilot.session().cached_frame().is_placeholder());
        assert_eq!(fake.connects(), 1);
        assert_eq!(sink.filenames().len(), 1);
    }

    #[tokio::test]
    async fn highlight_uploads_png_for_both_strategies() {
        let (pilot, _fake, sink) = pilot();
        let endpoint = Endpoint::new("127.0.0.1", 5905);
        for strategy in [LocalizerStrategy::Grid, LocalizerStrategy::Bbox] {
            let file = pilot
                .highlight_ui_element("Trash", Some(strategy), &endpoint, "pw")
                .await
                .unwrap();
            assert!(file.filename.starts_with("bounding-box-"));
            assert_eq!(file.content_type, "image/png");
            assert!(sink.get(&file.id).is_some());
            assert!(!pilot.session().is_connected());
        }
    }

    #[tokio::test]
    async fn screenshot_requires_connection() {
        let (pilot, _fake, _sink) = pilot();
        assert!(matches!(pilot.take_screenshot().await, Err(PilotError::Connection(_))));
        pilot.session().connect(&Endpoint::new("h", 1), "pw").await.unwrap();
        let file = pilot.take_screenshot().await.unwrap();
        assert!(file.filename.starts_with("desktop-screenshot-"));
        assert_eq!(
            pilot.query_element_position("Trash", Some(LocalizerStrategy::Bbox)).await.unwrap(),
            Some((12, 12))
        );
        pilot.session().disconnect().await;
    }
}
