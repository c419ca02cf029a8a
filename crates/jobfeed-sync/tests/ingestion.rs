use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobfeed_adapters::{
    job_page_from_html, AdapterContext, AdapterError, CompanyDetailSource, DiscoveredJob, JobPage,
    JobSource, PageLoader,
};
use jobfeed_core::{CompanyDetails, CompanyRef, ExtractedJobRecord, FieldMap, JobCategory};
use jobfeed_extract::{ExtractionError, FieldExtractor};
use jobfeed_storage::{HttpClientConfig, HttpFetcher, MemoryStore, PageArchive};
use jobfeed_sync::{IngestionPipeline, IngestionSummary, PipelineSettings, SkipReason};
use serde_json::json;

struct FakeSource {
    id: &'static str,
    jobs: Vec<DiscoveredJob>,
    fail: bool,
}

#[async_trait]
impl JobSource for FakeSource {
    fn source_id(&self) -> &str {
        self.id
    }

    async fn discover(
        &self,
        _http: &HttpFetcher,
        _ctx: &AdapterContext,
    ) -> Result<Vec<DiscoveredJob>, AdapterError> {
        if self.fail {
            return Err(AdapterError::Message("search quota exhausted".into()));
        }
        Ok(self.jobs.clone())
    }
}

#[derive(Default)]
struct FakePages {
    pages: HashMap<String, JobPage>,
    loads: AtomicUsize,
}

impl FakePages {
    fn with(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(link, html)| (link.to_string(), job_page_from_html(html)))
                .collect(),
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageLoader for FakePages {
    async fn load(&self, link: &str) -> JobPage {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.pages.get(link).cloned().unwrap_or_default()
    }
}

/// Answers with the record whose marker appears in the input, or fails when the
/// marker maps to `None`. Unmatched input gets `fallback`.
struct ScriptedExtractor {
    script: Vec<(&'static str, Option<ExtractedJobRecord>)>,
    fallback: ExtractedJobRecord,
    delay: Duration,
    stalls: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn answering(fallback: ExtractedJobRecord) -> Self {
        Self {
            script: Vec::new(),
            fallback,
            delay: Duration::ZERO,
            stalls: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers for input containing `marker`.
    fn stalling_on(mut self, marker: &'static str) -> Self {
        self.stalls.push(marker);
        self
    }

    fn on(mut self, marker: &'static str, answer: Option<ExtractedJobRecord>) -> Self {
        self.script.push((marker, answer));
        self
    }
}

#[async_trait]
impl FieldExtractor for ScriptedExtractor {
    async fn extract_job(&self, content: &str) -> Result<ExtractedJobRecord, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalls.iter().any(|marker| content.contains(marker)) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        match self.script.iter().find(|(marker, _)| content.contains(marker)) {
            Some((_, Some(record))) => Ok(record.clone()),
            Some((_, None)) => Err(ExtractionError::Schema("expected an object".into())),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// A page host that accepts the connection and never responds.
struct HangingPages;

#[async_trait]
impl PageLoader for HangingPages {
    async fn load(&self, _link: &str) -> JobPage {
        std::future::pending().await
    }
}

struct CountingDetails {
    calls: AtomicUsize,
}

#[async_trait]
impl CompanyDetailSource for CountingDetails {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn details(&self, _company: &CompanyRef) -> CompanyDetails {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        CompanyDetails {
            company_logo: "https://acme.example/logo.png".into(),
            ..CompanyDetails::default()
        }
    }
}

fn source(id: &'static str, jobs: Vec<DiscoveredJob>, fail: bool) -> Arc<dyn JobSource> {
    Arc::new(FakeSource { id, jobs, fail })
}

fn company(platform: &str) -> CompanyRef {
    CompanyRef {
        platform: platform.into(),
        company_name: platform.rsplit('/').next().unwrap_or(platform).into(),
        hints: CompanyDetails::default(),
    }
}

fn api_job(link: &str, platform: &str, fields: serde_json::Value) -> DiscoveredJob {
    let serde_json::Value::Object(fields) = fields else {
        panic!("fields must be an object");
    };
    DiscoveredJob {
        source_id: "fake".into(),
        job_link: link.into(),
        company: company(platform),
        posted_date: String::new(),
        fields,
        needs_page: false,
    }
}

fn page_job(link: &str, platform: &str) -> DiscoveredJob {
    DiscoveredJob {
        source_id: "fake".into(),
        job_link: link.into(),
        company: company(platform),
        posted_date: "2025-01-02T00:00:00+00:00".into(),
        fields: FieldMap::new(),
        needs_page: true,
    }
}

fn titled(title: &str) -> ExtractedJobRecord {
    ExtractedJobRecord {
        job_title: Some(title.into()),
        ..ExtractedJobRecord::default()
    }
}

fn http() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap())
}

struct Harness {
    store: Arc<MemoryStore>,
    pages: Arc<FakePages>,
    extractor: Arc<ScriptedExtractor>,
    details: Arc<CountingDetails>,
}

impl Harness {
    fn new(pages: FakePages, extractor: ScriptedExtractor) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            pages: Arc::new(pages),
            extractor: Arc::new(extractor),
            details: Arc::new(CountingDetails {
                calls: AtomicUsize::new(0),
            }),
        }
    }

    fn pipeline(&self, jobs: Vec<DiscoveredJob>) -> IngestionPipeline {
        IngestionPipeline::new(
            self.store.clone(),
            http(),
            self.pages.clone(),
            self.extractor.clone(),
            vec![self.details.clone() as Arc<dyn CompanyDetailSource>],
        )
        .with_sources(vec![source("fake", jobs, false)])
    }
}

fn skip_reasons(summary: &IngestionSummary) -> Vec<(String, SkipReason)> {
    let mut reasons = summary
        .skipped
        .iter()
        .map(|s| (s.link.clone(), s.reason))
        .collect::<Vec<_>>();
    reasons.sort();
    reasons
}

#[tokio::test]
async fn source_fields_win_and_extraction_fills_gaps() {
    let extracted = ExtractedJobRecord {
        job_title: Some("Senior Backend Engineer".into()),
        job_benefits: Some(vec!["health".into(), "dental".into()]),
        job_is_remote: Some(true),
        ..ExtractedJobRecord::default()
    };
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(extracted));
    let job = api_job(
        "https://jobs.example/1",
        "jsearch/acme",
        json!({"job_title": "Backend Engineer", "job_benefits": []}),
    );

    let summary = harness.pipeline(vec![job]).run_once().await.unwrap();

    assert_eq!(summary.created, 1);
    let jobs = harness.store.jobs().await;
    let stored = &jobs[0].job;
    assert_eq!(stored.job_title, "Backend Engineer");
    assert_eq!(stored.job_benefits, vec!["health", "dental"]);
    assert!(stored.job_is_remote);
    assert_eq!(stored.job_publisher, "jsearch/acme");
    assert_eq!(stored.job_apply_link, "https://jobs.example/1");
    assert_eq!(harness.pages.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rerunning_the_same_discovery_persists_nothing_new() {
    let harness = Harness::new(
        FakePages::with(&[(
            "https://careers.example/job/1",
            "<html><body><h1>Welder</h1><p>Weld things</p></body></html>",
        )]),
        ScriptedExtractor::answering(titled("Welder")),
    );
    let jobs = vec![page_job("https://careers.example/job/1", "careers-page.com/acme")];

    let first = harness.pipeline(jobs.clone()).run_once().await.unwrap();
    let second = harness.pipeline(jobs).run_once().await.unwrap();

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.duplicates.len(), 1);
    assert_eq!(second.duplicates[0].existing_id, harness.store.jobs().await[0].id);
    assert_eq!(harness.store.jobs().await.len(), 1);
    assert_eq!(harness.pages.loads.load(Ordering::SeqCst), 1);
    assert_eq!(harness.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.companies_created, 0);
}

#[tokio::test]
async fn unknown_category_is_nulled_not_fatal() {
    let extracted = ExtractedJobRecord {
        job_category: Some("Astrology".into()),
        ..titled("Stargazer")
    };
    let harness = Harness::new(
        FakePages::default(),
        ScriptedExtractor::answering(extracted).on(
            "Chef",
            Some(ExtractedJobRecord {
                job_category: Some("Hospitality & Tourism".into()),
                ..titled("Chef")
            }),
        ),
    );
    let jobs = vec![
        api_job("https://jobs.example/star", "jsearch/cosmos", json!({"job_title": "Stargazer"})),
        api_job("https://jobs.example/chef", "jsearch/bistro", json!({"job_title": "Chef"})),
    ];

    let summary = harness.pipeline(jobs).run_once().await.unwrap();

    assert_eq!(summary.created, 2);
    assert_eq!(summary.categories_nulled, 1);
    let jobs = harness.store.jobs().await;
    let star = jobs.iter().find(|j| j.job.job_title == "Stargazer").unwrap();
    let chef = jobs.iter().find(|j| j.job.job_title == "Chef").unwrap();
    assert_eq!(star.job.job_category, None);
    assert_eq!(chef.job.job_category, Some(JobCategory::Hospitality));
}

#[tokio::test]
async fn extraction_failure_skips_only_that_job() {
    let harness = Harness::new(
        FakePages::with(&[
            ("https://careers.example/job/broken", "<p>BROKEN posting</p>"),
            ("https://careers.example/job/ok", "<h1>Baker</h1><p>Bake bread</p>"),
        ]),
        ScriptedExtractor::answering(titled("Baker")).on("BROKEN", None),
    );
    let jobs = vec![
        page_job("https://careers.example/job/broken", "careers-page.com/acme"),
        page_job("https://careers.example/job/ok", "careers-page.com/acme"),
    ];

    let summary = harness.pipeline(jobs).run_once().await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(
        skip_reasons(&summary),
        vec![(
            "https://careers.example/job/broken".to_string(),
            SkipReason::ExtractionFailed
        )]
    );
    assert_eq!(harness.store.jobs().await.len(), 1);
}

#[tokio::test]
async fn extraction_failure_keeps_complete_source_records() {
    let harness = Harness::new(
        FakePages::default(),
        ScriptedExtractor::answering(titled("unused")).on("Plumber", None),
    );
    let job = api_job(
        "https://jobs.example/plumber",
        "google-jobs/pipes",
        json!({"job_title": "Plumber", "job_description": "Fix pipes."}),
    );

    let summary = harness.pipeline(vec![job]).run_once().await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(harness.store.jobs().await[0].job.job_description, "Fix pipes.");
}

#[tokio::test]
async fn unreachable_page_without_source_fields_is_skipped() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("x")));
    let jobs = vec![page_job("https://careers.example/job/gone", "careers-page.com/acme")];

    let summary = harness.pipeline(jobs).run_once().await.unwrap();

    assert_eq!(
        skip_reasons(&summary),
        vec![(
            "https://careers.example/job/gone".to_string(),
            SkipReason::FetchUnavailable
        )]
    );
    assert_eq!(harness.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(harness.store.companies().await.is_empty());
}

#[tokio::test]
async fn record_without_title_is_skipped() {
    let harness = Harness::new(
        FakePages::with(&[("https://careers.example/job/blank", "<div>Apply now</div>")]),
        ScriptedExtractor::answering(ExtractedJobRecord::default()),
    );
    let jobs = vec![page_job("https://careers.example/job/blank", "careers-page.com/acme")];

    let summary = harness.pipeline(jobs).run_once().await.unwrap();

    assert_eq!(summary.skipped[0].reason, SkipReason::MissingRequiredField);
    assert!(summary.skipped[0].detail.contains("job_title"));
}

#[tokio::test]
async fn jobs_of_one_company_share_a_single_resolution() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("Porter")));
    let jobs = (0..6)
        .map(|i| {
            api_job(
                &format!("https://jobs.example/porter/{i}"),
                "careers-page.com/hotel",
                json!({"job_title": format!("Porter {i}")}),
            )
        })
        .collect();

    let summary = harness
        .pipeline(jobs)
        .with_settings(PipelineSettings {
            concurrency: 6,
            ..PipelineSettings::default()
        })
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.created, 6);
    assert_eq!(summary.companies_created, 1);
    assert_eq!(harness.details.calls.load(Ordering::SeqCst), 1);
    let companies = harness.store.companies().await;
    assert_eq!(companies.len(), 1);
    assert_eq!(
        companies[0].company_logo.as_deref(),
        Some("https://acme.example/logo.png")
    );
    assert!(harness
        .store
        .jobs()
        .await
        .iter()
        .all(|j| j.company_id == companies[0].id));
}

#[tokio::test]
async fn repeated_links_within_a_run_are_processed_once() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("Nurse")));
    let job = api_job("https://jobs.example/nurse", "jsearch/clinic", json!({"job_title": "Nurse"}));

    let summary = harness
        .pipeline(vec![job.clone(), job])
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.created, 1);
    assert!(summary.duplicates.is_empty());
}

#[tokio::test]
async fn json_ld_page_is_scraped_and_archived() {
    let html = r#"<html><head><script type="application/ld+json">
        {"@context": "https://schema.org", "@type": "JobPosting", "title": "Line Cook",
         "description": "<p>Cook food.</p>", "identifier": {"value": "LC-9"},
         "datePosted": "2025-03-01",
         "hiringOrganization": {"name": "Bistro", "logo": "https://bistro.example/logo.png"}}
        </script></head><body><h1>Line Cook</h1><p>Cook food all day</p></body></html>"#;
    let harness = Harness::new(
        FakePages::with(&[("https://careers.example/job/cook", html)]),
        ScriptedExtractor::answering(ExtractedJobRecord {
            job_category: Some("Hospitality & Tourism".into()),
            ..titled("Cook")
        }),
    );
    let dir = tempfile::tempdir().unwrap();
    let mut job = page_job("https://careers.example/job/cook", "careers-page.com/bistro");
    job.posted_date = String::new();

    let summary = harness
        .pipeline(vec![job])
        .with_archive(PageArchive::new(dir.path()))
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.created, 1);
    let jobs = harness.store.jobs().await;
    let stored = &jobs[0].job;
    assert_eq!(stored.job_title, "Line Cook");
    assert_eq!(stored.job_description, "Cook food.");
    assert_eq!(stored.job_id_from_source.as_deref(), Some("LC-9"));
    assert_eq!(stored.job_posted_at_timestamp.as_deref(), Some("2025-03-01"));
    assert_eq!(stored.job_category, Some(JobCategory::Hospitality));
    assert_eq!(
        harness.store.companies().await[0].company_logo.as_deref(),
        Some("https://acme.example/logo.png")
    );

    let run_dirs = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(run_dirs, 1);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_run() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("Clerk")));
    let job = api_job("https://jobs.example/clerk", "jsearch/shop", json!({"job_title": "Clerk"}));
    let pipeline = harness
        .pipeline(vec![])
        .with_sources(vec![source("broken", vec![], true), source("fake", vec![job], false)]);

    let summary = pipeline.run_once().await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(summary.sources.len(), 2);
    assert!(summary.sources[0].error.is_some());
    assert_eq!(summary.sources[1].discovered, 1);
}

#[tokio::test]
async fn run_fails_when_every_source_fails() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("x")));
    let pipeline = harness
        .pipeline(vec![])
        .with_sources(vec![source("broken", vec![], true)]);

    let err = pipeline.run_once().await.unwrap_err();
    assert!(err.to_string().contains("every job source failed"));
}

#[tokio::test(start_paused = true)]
async fn slow_extraction_times_out_without_stalling_the_run() {
    let harness = Harness::new(
        FakePages::with(&[
            ("https://careers.example/job/slow", "<p>SLOW posting</p>"),
            ("https://careers.example/job/fast", "<h1>Barista</h1><p>Pull shots</p>"),
        ]),
        ScriptedExtractor::answering(titled("Barista")).stalling_on("SLOW"),
    );
    let jobs = vec![
        page_job("https://careers.example/job/slow", "careers-page.com/cafe"),
        page_job("https://careers.example/job/fast", "careers-page.com/cafe"),
    ];

    let summary = harness
        .pipeline(jobs)
        .with_settings(PipelineSettings {
            extract_timeout: Duration::from_secs(5),
            ..PipelineSettings::default()
        })
        .run_once()
        .await
        .unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.created, 1);
    assert_eq!(
        skip_reasons(&summary),
        vec![(
            "https://careers.example/job/slow".to_string(),
            SkipReason::ExtractionFailed
        )]
    );
    assert!(summary.skipped[0].detail.contains("timed out"));
    let jobs = harness.store.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job.job_title, "Barista");
}

#[tokio::test(start_paused = true)]
async fn hanging_page_load_is_skipped_as_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let extractor = Arc::new(ScriptedExtractor::answering(titled("Roofer")));
    let pipeline = IngestionPipeline::new(
        store.clone(),
        http(),
        Arc::new(HangingPages),
        extractor.clone(),
        Vec::new(),
    )
    .with_sources(vec![source(
        "fake",
        vec![page_job("https://careers.example/job/roof", "careers-page.com/roofs")],
        false,
    )])
    .with_settings(PipelineSettings {
        page_timeout: Duration::from_secs(3),
        ..PipelineSettings::default()
    });

    let summary = pipeline.run_once().await.unwrap();

    assert_eq!(
        skip_reasons(&summary),
        vec![(
            "https://careers.example/job/roof".to_string(),
            SkipReason::FetchUnavailable
        )]
    );
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(store.jobs().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_jobs() {
    let mut extractor = ScriptedExtractor::answering(titled("Driver"));
    extractor.delay = Duration::from_secs(3600);
    let harness = Harness::new(FakePages::default(), extractor);
    let jobs = (0..3)
        .map(|i| {
            api_job(
                &format!("https://jobs.example/driver/{i}"),
                "jsearch/fleet",
                json!({"job_title": "Driver"}),
            )
        })
        .collect();

    let summary = harness
        .pipeline(jobs)
        .with_settings(PipelineSettings {
            extract_timeout: Duration::from_secs(7200),
            ..PipelineSettings::default()
        })
        .run_until(tokio::time::sleep(Duration::from_millis(10)))
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.created, 0);
    assert!(harness.store.jobs().await.is_empty());
}

#[tokio::test]
async fn reports_are_written_per_run() {
    let harness = Harness::new(FakePages::default(), ScriptedExtractor::answering(titled("Tailor")));
    let dir = tempfile::tempdir().unwrap();
    let jobs = vec![
        api_job("https://jobs.example/tailor", "jsearch/seams", json!({"job_title": "Tailor"})),
        page_job("https://careers.example/job/missing", "careers-page.com/seams"),
    ];

    let summary = harness
        .pipeline(jobs)
        .with_reports_root(dir.path())
        .run_once()
        .await
        .unwrap();

    let run_dir = dir.path().join(summary.run_id.to_string());
    assert_eq!(summary.reports_dir.as_deref(), run_dir.to_str());
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("ingest_report.json")).unwrap())
            .unwrap();
    assert_eq!(report["created"], 1);
    assert_eq!(report["skipped"][0]["reason"], "fetch_unavailable");
    let brief = std::fs::read_to_string(run_dir.join("daily_brief.md")).unwrap();
    assert!(brief.contains("# Jobfeed Daily Brief"));
    assert!(brief.contains("- FetchUnavailable: 1"));
}
