//! Built-in step actions.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use professoragent_jobs::{
    Artifact, CollaboratorMatch, CollaboratorMatches, ContextReport, ContextResults, Generated,
    GrantSuggestion, GrantSuggestions,
};
use professoragent_literature::{LiteratureAggregator, SearchOptions};
use professoragent_retrieval::{DocumentIndex, SearchHit};
use professoragent_shared::Result;

use super::{StepAction, StepContext, StepKind};
use crate::generation::Generator;

/// Source types the context step searches.
pub const FACULTY_SOURCE_TYPE: &str = "faculty_profile";
pub const GRANT_SOURCE_TYPE: &str = "grant";

/// Literature titles quoted in the proposal prompt.
const PROPOSAL_LITERATURE_TITLES: usize = 10;

/// Shared services the built-in actions are constructed from.
#[derive(Clone)]
pub struct BuiltinDeps {
    pub index: Arc<DocumentIndex>,
    pub literature: Arc<LiteratureAggregator>,
    pub generator: Arc<dyn Generator>,
    pub retrieval_top_k: usize,
    pub search_options: SearchOptions,
}

// ---------------------------------------------------------------------------
// context_retrieval
// ---------------------------------------------------------------------------

pub struct ContextRetrievalAction {
    index: Arc<DocumentIndex>,
    top_k: usize,
}

impl ContextRetrievalAction {
    pub fn new(index: Arc<DocumentIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl StepAction for ContextRetrievalAction {
    #[instrument(skip_all, fields(job_id = %ctx.job_id()))]
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.running("Retrieving local context (faculty + grants)...");

        let query = ctx.payload().query().to_string();
        let faculty = self
            .index
            .search(&query, self.top_k, Some(FACULTY_SOURCE_TYPE));
        let grants = self.index.search(&query, self.top_k, Some(GRANT_SOURCE_TYPE));
        let message = format!(
            "Context retrieved (faculty={}, grants={})",
            faculty.len(),
            grants.len()
        );

        ctx.store(Artifact::ContextRetrieval(ContextReport {
            query,
            top_k: self.top_k,
            results: ContextResults { faculty, grants },
        }));
        ctx.done(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// grants / collaborators
// ---------------------------------------------------------------------------

fn context_results(ctx: &StepContext) -> ContextResults {
    ctx.artifact_of(StepKind::ContextRetrieval)
        .and_then(|a| a.as_context().map(|c| c.results.clone()))
        .unwrap_or_default()
}

/// Ranks the grant hits found by `context_retrieval`.
pub struct GrantsAction;

#[async_trait]
impl StepAction for GrantsAction {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.running("Searching grants...");
        let top_grants: Vec<GrantSuggestion> = context_results(ctx)
            .grants
            .iter()
            .map(GrantSuggestion::from)
            .collect();
        let message = format!("Grant search complete ({} suggestions)", top_grants.len());
        ctx.store(Artifact::Grants(GrantSuggestions { top_grants }));
        ctx.done(message);
        Ok(())
    }
}

/// Suggests collaborators from the faculty hits found by `context_retrieval`.
pub struct CollaboratorsAction;

#[async_trait]
impl StepAction for CollaboratorsAction {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.running("Matching collaborators...");
        let matches: Vec<CollaboratorMatch> = context_results(ctx)
            .faculty
            .iter()
            .map(CollaboratorMatch::from)
            .collect();
        let message = format!("Collaborators matched ({})", matches.len());
        ctx.store(Artifact::Collaborators(CollaboratorMatches { matches }));
        ctx.done(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// literature
// ---------------------------------------------------------------------------

pub struct LiteratureAction {
    aggregator: Arc<LiteratureAggregator>,
    options: SearchOptions,
}

impl LiteratureAction {
    pub fn new(aggregator: Arc<LiteratureAggregator>, options: SearchOptions) -> Self {
        Self {
            aggregator,
            options,
        }
    }
}

#[async_trait]
impl StepAction for LiteratureAction {
    #[instrument(skip_all, fields(job_id = %ctx.job_id()))]
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        ctx.running("Searching literature sources...");
        let response = self
            .aggregator
            .search(ctx.payload().query(), self.options)
            .await;
        let message = match &response.warning {
            Some(warning) => format!("Literature results collected ({warning})"),
            None => format!("Literature results collected ({})", response.results.len()),
        };
        ctx.store(Artifact::Literature(response));
        ctx.done(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// lesson_plan / slides / proposal
// ---------------------------------------------------------------------------

/// Drafts a structured document with the generator.
pub struct GenerationAction {
    kind: StepKind,
    generator: Arc<dyn Generator>,
}

impl GenerationAction {
    /// `kind` must be one of the drafting steps: lesson plan, slides, or
    /// proposal. Other kinds are drafted as a proposal.
    pub fn new(kind: StepKind, generator: Arc<dyn Generator>) -> Self {
        Self { kind, generator }
    }

    fn messages(&self) -> (&'static str, &'static str) {
        match self.kind {
            StepKind::LessonPlan => ("Drafting lesson plan...", "Lesson plan created"),
            StepKind::Slides => ("Preparing slide outline...", "Slides outline created"),
            _ => ("Drafting proposal outline...", "Proposal outline drafted"),
        }
    }

    fn wrap(&self, generated: Generated) -> Artifact {
        match self.kind {
            StepKind::LessonPlan => Artifact::LessonPlan(generated),
            StepKind::Slides => Artifact::Slides(generated),
            _ => Artifact::Proposal(generated),
        }
    }

    fn prompts(&self, ctx: &StepContext) -> (&'static str, String) {
        match self.kind {
            StepKind::LessonPlan => (LESSON_PLAN_SYSTEM, lesson_plan_prompt(ctx)),
            StepKind::Slides => (SLIDES_SYSTEM, slides_prompt(ctx)),
            _ => (PROPOSAL_SYSTEM, proposal_prompt(ctx)),
        }
    }
}

#[async_trait]
impl StepAction for GenerationAction {
    #[instrument(skip_all, fields(job_id = %ctx.job_id(), step = %self.kind))]
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        let (running, done) = self.messages();
        ctx.running(running);

        let (system, user) = self.prompts(ctx);
        let generated = self.generator.complete_json(system, &user).await?;
        debug!(parsed = generated.is_parsed(), model = self.generator.model_name(), "draft generated");

        let message = if generated.is_parsed() {
            done.to_string()
        } else {
            format!("{done} (model reply was not valid JSON)")
        };
        ctx.store(self.wrap(generated));
        ctx.done(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const LESSON_PLAN_SYSTEM: &str = "You are an instructional design assistant for university faculty. \
     Draft a week-by-week lesson plan as a JSON object with keys \
     \"title\" and \"weeks\" (a list of objects with \"week\", \"topic\", \"activities\").";

const SLIDES_SYSTEM: &str = "You prepare lecture slide outlines. \
     Respond with a JSON object with key \"slides\" (a list of objects with \"title\" and \"bullets\").";

const PROPOSAL_SYSTEM: &str = "You help faculty draft research grant proposals. \
     Respond with a JSON object with keys \"title\", \"problem\", \"aims\", \"methods\", \
     \"timeline\" and \"related_work\".";

fn payload_section(ctx: &StepContext) -> String {
    let payload = ctx.payload();
    let mut out = format!("Goal: {}\n", payload.goal.trim());
    if let Some(profile) = payload.profile_text.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "Faculty profile: {}", profile.trim());
    }
    if let Some(idea) = payload.project_idea.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "Project idea: {}", idea.trim());
    }
    out
}

fn hits_section(out: &mut String, heading: &str, hits: &[SearchHit]) {
    if hits.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{heading}:");
    for hit in hits {
        let _ = writeln!(out, "- {}", hit.snippet);
    }
}

fn lesson_plan_prompt(ctx: &StepContext) -> String {
    let mut out = payload_section(ctx);
    let context = context_results(ctx);
    hits_section(&mut out, "Related faculty expertise", &context.faculty);
    out
}

fn slides_prompt(ctx: &StepContext) -> String {
    let mut out = payload_section(ctx);
    if let Some(Generated::Parsed(plan)) = ctx
        .artifact_of(StepKind::LessonPlan)
        .and_then(|a| a.as_generated().cloned())
    {
        let _ = writeln!(out, "\nLesson plan:\n{plan}");
    }
    out
}

fn proposal_prompt(ctx: &StepContext) -> String {
    let mut out = payload_section(ctx);
    let context = context_results(ctx);
    hits_section(&mut out, "Relevant funding opportunities", &context.grants);
    hits_section(&mut out, "Potential collaborators", &context.faculty);

    if let Some(literature) = ctx
        .artifact_of(StepKind::Literature)
        .and_then(|a| a.as_literature().cloned())
    {
        if !literature.results.is_empty() {
            let _ = writeln!(out, "\nRelated literature:");
            for paper in literature.results.iter().take(PROPOSAL_LITERATURE_TITLES) {
                match paper.year {
                    Some(year) => {
                        let _ = writeln!(out, "- {} ({year})", paper.title);
                    }
                    None => {
                        let _ = writeln!(out, "- {}", paper.title);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use professoragent_jobs::{InMemoryJobRepository, JobPayload, JobRepository, Status};
    use professoragent_literature::{LiteratureSource, SourceOutcome};
    use professoragent_retrieval::{Document, DocumentMetadata};
    use professoragent_shared::{Paper, SourceTag};
    use serde_json::json;

    fn doc(id: &str, source_type: &str, text: &str, extra: serde_json::Value) -> Document {
        Document {
            text: text.into(),
            metadata: DocumentMetadata {
                doc_id: json!(id),
                source_type: Some(source_type.into()),
                extra: extra.as_object().cloned().unwrap_or_default(),
            },
        }
    }

    fn index() -> Arc<DocumentIndex> {
        Arc::new(DocumentIndex::from_documents(vec![
            doc(
                "fac-1",
                FACULTY_SOURCE_TYPE,
                "climate machine learning",
                json!({"name": "Dr. Rivera", "department": "CS"}),
            ),
            doc("fac-2", FACULTY_SOURCE_TYPE, "medieval history", json!({})),
            doc(
                "grant-1",
                GRANT_SOURCE_TYPE,
                "NSF climate learning",
                json!({"agency": "NSF"}),
            ),
        ]))
    }

    fn setup(steps: &[&str], payload: JobPayload) -> (Arc<dyn JobRepository>, professoragent_jobs::JobId) {
        let repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new(
            steps.iter().map(|s| s.to_string()).collect(),
        ));
        let id = repo.create(payload);
        (repo, id)
    }

    fn ctx(repo: &Arc<dyn JobRepository>, id: professoragent_jobs::JobId, step: &str) -> StepContext {
        let payload = repo.get(id).unwrap().payload;
        StepContext::new(id, step, payload, repo.clone())
    }

    #[tokio::test]
    async fn context_retrieval_filters_by_source_type() {
        let (repo, id) = setup(&["context_retrieval"], JobPayload::new("climate learning"));
        ContextRetrievalAction::new(index(), 5)
            .run(&ctx(&repo, id, "context_retrieval"))
            .await
            .unwrap();

        let job = repo.get(id).unwrap();
        assert_eq!(job.steps[0].status, Status::Done);
        assert_eq!(
            job.steps[0].message.as_deref(),
            Some("Context retrieved (faculty=1, grants=1)")
        );

        let report = job.artifacts["context_retrieval"].as_context().unwrap();
        assert_eq!(report.query, "climate learning");
        assert_eq!(report.top_k, 5);
        assert_eq!(report.results.faculty[0].metadata.doc_id, json!("fac-1"));
        assert_eq!(report.results.grants[0].metadata.doc_id, json!("grant-1"));
    }

    #[tokio::test]
    async fn context_query_falls_back_to_default() {
        let (repo, id) = setup(&["context_retrieval"], JobPayload::new(""));
        ContextRetrievalAction::new(index(), 5)
            .run(&ctx(&repo, id, "context_retrieval"))
            .await
            .unwrap();
        let job = repo.get(id).unwrap();
        let report = job.artifacts["context_retrieval"].as_context().unwrap();
        assert_eq!(report.query, "research topic");
    }

    #[tokio::test]
    async fn grants_and_collaborators_derive_from_context() {
        let steps = ["context_retrieval", "grants", "collaborators"];
        let (repo, id) = setup(&steps, JobPayload::new("climate learning"));

        ContextRetrievalAction::new(index(), 5)
            .run(&ctx(&repo, id, "context_retrieval"))
            .await
            .unwrap();
        GrantsAction.run(&ctx(&repo, id, "grants")).await.unwrap();
        CollaboratorsAction
            .run(&ctx(&repo, id, "collaborators"))
            .await
            .unwrap();

        let job = repo.get(id).unwrap();
        match &job.artifacts["grants"] {
            Artifact::Grants(g) => {
                assert_eq!(g.top_grants.len(), 1);
                assert_eq!(g.top_grants[0].agency.as_deref(), Some("NSF"));
            }
            other => panic!("unexpected artifact {other:?}"),
        }
        match &job.artifacts["collaborators"] {
            Artifact::Collaborators(c) => {
                assert_eq!(c.matches.len(), 1);
                assert_eq!(c.matches[0].name.as_deref(), Some("Dr. Rivera"));
            }
            other => panic!("unexpected artifact {other:?}"),
        }
    }

    #[tokio::test]
    async fn grants_without_context_are_empty() {
        let (repo, id) = setup(&["grants"], JobPayload::new("x"));
        GrantsAction.run(&ctx(&repo, id, "grants")).await.unwrap();
        let job = repo.get(id).unwrap();
        assert_eq!(
            job.artifacts["grants"],
            Artifact::Grants(GrantSuggestions::default())
        );
        assert_eq!(job.steps[0].status, Status::Done);
    }

    /// Records the prompts it receives and replies with fixed text.
    struct ScriptedGenerator {
        reply: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, system: &str, user: &str) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn generation_stores_parsed_json() {
        let generator = ScriptedGenerator::new(r#"{"title": "Climate ML", "weeks": []}"#);
        let mut payload = JobPayload::new("Teach climate ML");
        payload.profile_text = Some("I work on remote sensing".into());
        let (repo, id) = setup(&["lesson_plan"], payload);

        GenerationAction::new(StepKind::LessonPlan, generator.clone())
            .run(&ctx(&repo, id, "lesson_plan"))
            .await
            .unwrap();

        let job = repo.get(id).unwrap();
        assert_eq!(
            job.artifacts["lesson_plan"],
            Artifact::LessonPlan(Generated::Parsed(json!({"title": "Climate ML", "weeks": []})))
        );
        assert_eq!(job.steps[0].message.as_deref(), Some("Lesson plan created"));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("Return ONLY valid JSON"));
        assert!(prompts[0].1.contains("Goal: Teach climate ML"));
        assert!(prompts[0].1.contains("Faculty profile: I work on remote sensing"));
    }

    #[tokio::test]
    async fn generation_keeps_unparsed_reply() {
        let generator = ScriptedGenerator::new("I cannot do that.");
        let (repo, id) = setup(&["slides"], JobPayload::new("x"));

        GenerationAction::new(StepKind::Slides, generator)
            .run(&ctx(&repo, id, "slides"))
            .await
            .unwrap();

        let job = repo.get(id).unwrap();
        assert_eq!(
            job.artifacts["slides"],
            Artifact::Slides(Generated::unparsed("I cannot do that."))
        );
        assert_eq!(job.steps[0].status, Status::Done);
    }

    struct OnePaper;

    #[async_trait]
    impl LiteratureSource for OnePaper {
        fn tag(&self) -> SourceTag {
            SourceTag::OpenAlex
        }

        async fn search(
            &self,
            _: &str,
            _: usize,
            _: std::time::Duration,
        ) -> Result<Vec<Paper>> {
            Ok(vec![Paper {
                source: SourceTag::OpenAlex,
                title: "Deep Learning for Sea Ice".into(),
                authors: vec![],
                year: Some(2022),
                venue: None,
                abstract_text: None,
                url: None,
                doi: None,
            }])
        }
    }

    #[tokio::test]
    async fn proposal_prompt_cites_literature() {
        let steps = ["literature", "proposal"];
        let (repo, id) = setup(&steps, JobPayload::new("sea ice"));
        let aggregator = Arc::new(LiteratureAggregator::with_sources(vec![
            Arc::new(OnePaper) as Arc<dyn LiteratureSource>,
        ]));

        LiteratureAction::new(aggregator, SearchOptions::default())
            .run(&ctx(&repo, id, "literature"))
            .await
            .unwrap();

        let job = repo.get(id).unwrap();
        let literature = job.artifacts["literature"].as_literature().unwrap();
        assert_eq!(literature.sources[0].outcome, SourceOutcome::Ok { count: 1 });
        assert_eq!(
            job.steps[0].message.as_deref(),
            Some("Literature results collected (1)")
        );

        let generator = ScriptedGenerator::new("{}");
        GenerationAction::new(StepKind::Proposal, generator.clone())
            .run(&ctx(&repo, id, "proposal"))
            .await
            .unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("- Deep Learning for Sea Ice (2022)"));
    }
}
