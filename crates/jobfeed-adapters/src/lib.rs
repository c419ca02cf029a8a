//! Source adapter contracts: job discovery, page loading, field scrapers and
//! company detail sources.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jobfeed_core::{slugify, CompanyDetails, CompanyRef, FieldMap};
use jobfeed_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-adapters";

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
pub const JSEARCH_ENDPOINT: &str = "https://jsearch.p.rapidapi.com/search";
pub const CAREERS_PAGE_HOST: &str = "www.careers-page.com";
pub const DEFAULT_CAREERS_QUERY: &str = "site:careers-page.com inurl:job/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("missing credential {0}")]
    MissingCredential(&'static str),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Search parameters shared by every discovery source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub queries: Vec<String>,
    pub max_pages: u32,
    /// Search-engine recency filter (`tbs` for SerpAPI, `date_posted` for JSearch).
    pub recency: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            max_pages: 1,
            recency: None,
        }
    }
}

/// One job posting found by a discovery source, before page loading and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredJob {
    pub source_id: String,
    pub job_link: String,
    pub company: CompanyRef,
    pub posted_date: String,
    /// Raw fields from the source's structured payload, if any.
    pub fields: FieldMap,
    /// Whether the job page must be fetched to obtain its content.
    pub needs_page: bool,
}

#[async_trait]
pub trait JobSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn discover(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<DiscoveredJob>, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct SerpApiClient {
    api_key: String,
    endpoint: String,
}

impl SerpApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: SERPAPI_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(
        &self,
        http: &HttpFetcher,
        params: &[(&str, &str)],
    ) -> Result<JsonValue, AdapterError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("api_key", self.api_key.as_str()));
        let results: JsonValue = http
            .fetch_json("serpapi", &self.endpoint, &query, &[])
            .await?;
        if let Some(message) = json_str(&results, &["error"]) {
            debug!(error = message, "serpapi returned no results");
        }
        Ok(results)
    }

    /// First organic result link containing `needle`.
    pub async fn first_organic_link(
        &self,
        http: &HttpFetcher,
        q: &str,
        needle: &str,
    ) -> Result<Option<String>, AdapterError> {
        let results = self.search(http, &[("engine", "google"), ("q", q)]).await?;
        Ok(first_link_matching(&results, needle))
    }
}

fn first_link_matching(results: &JsonValue, needle: &str) -> Option<String> {
    organic_results(results)
        .filter_map(|r| json_str(r, &["link"]))
        .find(|link| link.contains(needle))
        .map(ToString::to_string)
}

fn organic_results(results: &JsonValue) -> impl Iterator<Item = &JsonValue> {
    results
        .get("organic_results")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
}

/// Normalizes a careers-page.com job URL to `https://www.careers-page.com/{company}/job/{id}`.
pub fn clean_careers_job_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if url.scheme() != "https" || url.host_str() != Some(CAREERS_PAGE_HOST) {
        return None;
    }
    let mut segments = url.path_segments()?;
    let company = segments.next().filter(|s| !s.is_empty())?;
    if segments.next()? != "job" {
        return None;
    }
    let job_id = segments.next()?;
    if job_id.is_empty() || !job_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!("https://{CAREERS_PAGE_HOST}/{company}/job/{job_id}"))
}

/// Company slug of a cleaned careers-page.com job link.
pub fn careers_company_slug(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.path_segments()?
        .next()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Parses search-engine dates such as `"3 days ago"` or `"30+ days ago"`.
pub fn parse_relative_posted(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.trim().to_ascii_lowercase();
    let mut words = lower.split_whitespace();
    let amount: i64 = words.next()?.trim_end_matches('+').parse().ok()?;
    let unit = words.next()?;
    if words.next() != Some("ago") {
        return None;
    }
    // Out-of-range amounts yield None so the raw text is kept instead.
    let delta = match unit.trim_end_matches('s') {
        "minute" | "min" => ChronoDuration::try_minutes(amount)?,
        "hour" | "hr" => ChronoDuration::try_hours(amount)?,
        "day" => ChronoDuration::try_days(amount)?,
        "week" => ChronoDuration::try_weeks(amount)?,
        "month" => ChronoDuration::try_days(amount.checked_mul(30)?)?,
        _ => return None,
    };
    now.checked_sub_signed(delta)
}

fn posted_text(raw: &str, now: DateTime<Utc>) -> String {
    match parse_relative_posted(raw, now) {
        Some(ts) => ts.to_rfc3339(),
        None => raw.trim().to_string(),
    }
}

/// Careers-page.com postings found through web search. Their content comes from
/// the job page itself.
#[derive(Debug, Clone)]
pub struct CareersPageSource {
    serpapi: SerpApiClient,
    settings: SearchSettings,
}

impl CareersPageSource {
    pub fn new(serpapi: SerpApiClient, settings: SearchSettings) -> Self {
        Self { serpapi, settings }
    }

    fn map_result(&self, result: &JsonValue, now: DateTime<Utc>) -> Option<DiscoveredJob> {
        let link = clean_careers_job_link(json_str(result, &["link"])?)?;
        let company = careers_company_slug(&link)?;
        let platform = format!("careers-page.com/{company}");
        let posted_date = json_str(result, &["date"])
            .map(|d| posted_text(d, now))
            .unwrap_or_default();

        let mut fields = FieldMap::new();
        put_text(&mut fields, "job_apply_link", Some(link.clone()));
        put_text(&mut fields, "job_posted_at_timestamp", Some(posted_date.clone()));

        Some(DiscoveredJob {
            source_id: self.source_id().to_string(),
            job_link: link,
            company: CompanyRef {
                platform,
                company_name: company,
                hints: CompanyDetails::default(),
            },
            posted_date,
            fields,
            needs_page: true,
        })
    }
}

#[async_trait]
impl JobSource for CareersPageSource {
    fn source_id(&self) -> &str {
        "careers-page"
    }

    async fn discover(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<DiscoveredJob>, AdapterError> {
        let default_queries = [DEFAULT_CAREERS_QUERY.to_string()];
        let queries = if self.settings.queries.is_empty() {
            &default_queries[..]
        } else {
            &self.settings.queries[..]
        };
        let recency = self.settings.recency.as_deref().unwrap_or("qdr:d1");

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for q in queries {
            for page in 0..self.settings.max_pages.max(1) {
                let start = (page * 10).to_string();
                let results = self
                    .serpapi
                    .search(
                        http,
                        &[
                            ("engine", "google"),
                            ("q", q.as_str()),
                            ("tbs", recency),
                            ("start", start.as_str()),
                        ],
                    )
                    .await?;

                let before = out.len();
                for result in organic_results(&results) {
                    if let Some(job) = self.map_result(result, ctx.fetched_at) {
                        if seen.insert(job.job_link.clone()) {
                            out.push(job);
                        }
                    }
                }
                if out.len() == before {
                    break;
                }
            }
        }
        Ok(out)
    }
}

/// Google Jobs results through SerpAPI (`engine=google_jobs`).
#[derive(Debug, Clone)]
pub struct GoogleJobsSource {
    serpapi: SerpApiClient,
    settings: SearchSettings,
}

impl GoogleJobsSource {
    pub fn new(serpapi: SerpApiClient, settings: SearchSettings) -> Self {
        Self { serpapi, settings }
    }
}

/// Maps one `jobs_results` entry. Entries without any apply link are dropped.
pub fn map_google_job(job: &JsonValue, now: DateTime<Utc>) -> Option<DiscoveredJob> {
    let apply_link = job
        .get("apply_options")
        .and_then(JsonValue::as_array)
        .and_then(|opts| opts.iter().find_map(|o| json_str(o, &["link"])))
        .or_else(|| json_str(job, &["share_link"]))?
        .to_string();
    let company_name = json_str(job, &["company_name"]).unwrap_or("unknown").trim();
    let platform = format!("google-jobs/{}", slugify(company_name));

    let highlights = job
        .get("job_highlights")
        .and_then(JsonValue::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(|s| Some((json_str(s, &["title"])?, string_list(s.get("items")?))))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let section = |title: &str| {
        highlights
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(title))
            .map(|(_, items)| items.clone())
            .unwrap_or_default()
    };

    let posted_date = json_str(job, &["detected_extensions", "posted_at"])
        .map(|d| posted_text(d, now))
        .unwrap_or_default();

    let mut fields = FieldMap::new();
    put_text(&mut fields, "job_title", json_str(job, &["title"]).map(Into::into));
    put_text(
        &mut fields,
        "job_description",
        json_str(job, &["description"]).map(Into::into),
    );
    put_text(&mut fields, "job_id_from_source", json_str(job, &["job_id"]).map(Into::into));
    put_text(&mut fields, "job_apply_link", Some(apply_link.clone()));
    put_text(&mut fields, "job_posted_at_timestamp", Some(posted_date.clone()));
    if let Some(location) = json_str(job, &["location"]) {
        fields.insert("job_location".into(), json!(location));
    }
    if let Some(schedule) = json_str(job, &["detected_extensions", "schedule_type"]) {
        fields.insert(
            "job_employment_types".into(),
            json!([schedule.to_ascii_lowercase()]),
        );
    }
    if let Some(remote) = job
        .get("detected_extensions")
        .and_then(|d| d.get("work_from_home"))
        .and_then(JsonValue::as_bool)
    {
        fields.insert("job_is_remote".into(), json!(remote));
    }
    put_list(&mut fields, "job_qualifications", section("Qualifications"));
    put_list(&mut fields, "job_responsibilities", section("Responsibilities"));
    put_list(&mut fields, "job_benefits", section("Benefits"));

    Some(DiscoveredJob {
        source_id: "google-jobs".to_string(),
        job_link: apply_link,
        company: CompanyRef {
            platform,
            company_name: company_name.to_string(),
            hints: CompanyDetails {
                company_logo: json_str(job, &["thumbnail"]).unwrap_or_default().to_string(),
                ..CompanyDetails::default()
            },
        },
        posted_date,
        fields,
        needs_page: false,
    })
}

#[async_trait]
impl JobSource for GoogleJobsSource {
    fn source_id(&self) -> &str {
        "google-jobs"
    }

    async fn discover(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<DiscoveredJob>, AdapterError> {
        let mut out = Vec::new();
        for q in &self.settings.queries {
            let mut next_page_token: Option<String> = None;
            for _ in 0..self.settings.max_pages.max(1) {
                let mut params = vec![("engine", "google_jobs"), ("q", q.as_str()), ("hl", "en")];
                if let Some(token) = next_page_token.as_deref() {
                    params.push(("next_page_token", token));
                }
                let results = self.serpapi.search(http, &params).await?;
                out.extend(
                    results
                        .get("jobs_results")
                        .and_then(JsonValue::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(|job| map_google_job(job, ctx.fetched_at)),
                );

                next_page_token = json_str(&results, &["serpapi_pagination", "next_page_token"])
                    .map(ToString::to_string);
                if next_page_token.is_none() {
                    break;
                }
            }
        }
        Ok(out)
    }
}

/// JSearch (RapidAPI) structured job search.
#[derive(Debug, Clone)]
pub struct JSearchSource {
    api_key: String,
    endpoint: String,
    settings: SearchSettings,
}

impl JSearchSource {
    pub fn new(api_key: impl Into<String>, settings: SearchSettings) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: JSEARCH_ENDPOINT.to_string(),
            settings,
        }
    }
}

pub fn map_jsearch_job(job: &JsonValue) -> Option<DiscoveredJob> {
    let apply_link = json_str(job, &["job_apply_link"])?.trim().to_string();
    if apply_link.is_empty() {
        return None;
    }
    let employer = json_str(job, &["employer_name"]).unwrap_or("unknown").trim();
    let platform = format!("jsearch/{}", slugify(employer));

    let posted_date = json_str(job, &["job_posted_at_datetime_utc"])
        .map(ToString::to_string)
        .or_else(|| {
            job.get("job_posted_at_timestamp")
                .and_then(JsonValue::as_i64)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(|ts| ts.to_rfc3339())
        })
        .unwrap_or_default();

    let employment_types = match job.get("job_employment_types") {
        Some(list) => string_list(list),
        None => json_str(job, &["job_employment_type"])
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
    }
    .into_iter()
    .map(|t| t.to_ascii_lowercase())
    .collect::<Vec<_>>();

    let highlight = |key: &str| {
        job.get("job_highlights")
            .and_then(|h| h.get(key))
            .map(string_list)
            .unwrap_or_default()
    };

    let mut fields = FieldMap::new();
    put_text(&mut fields, "job_title", json_str(job, &["job_title"]).map(Into::into));
    put_text(
        &mut fields,
        "job_description",
        json_str(job, &["job_description"]).map(Into::into),
    );
    put_text(&mut fields, "job_id_from_source", json_str(job, &["job_id"]).map(Into::into));
    put_text(&mut fields, "job_apply_link", Some(apply_link.clone()));
    put_text(&mut fields, "job_posted_at_timestamp", Some(posted_date.clone()));
    put_list(&mut fields, "job_employment_types", employment_types);
    put_list(&mut fields, "job_qualifications", highlight("Qualifications"));
    put_list(&mut fields, "job_responsibilities", highlight("Responsibilities"));
    put_list(&mut fields, "job_benefits", highlight("Benefits"));
    if let Some(remote) = job.get("job_is_remote").and_then(JsonValue::as_bool) {
        fields.insert("job_is_remote".into(), json!(remote));
    }
    fields.insert(
        "job_location".into(),
        json!({
            "city": json_str(job, &["job_city"]),
            "state": json_str(job, &["job_state"]),
            "country": json_str(job, &["job_country"]),
        }),
    );

    Some(DiscoveredJob {
        source_id: "jsearch".to_string(),
        job_link: apply_link,
        company: CompanyRef {
            platform,
            company_name: employer.to_string(),
            hints: CompanyDetails {
                company_logo: json_str(job, &["employer_logo"]).unwrap_or_default().to_string(),
                company_description: String::new(),
                company_website: json_str(job, &["employer_website"])
                    .unwrap_or_default()
                    .to_string(),
            },
        },
        posted_date,
        fields,
        needs_page: false,
    })
}

#[async_trait]
impl JobSource for JSearchSource {
    fn source_id(&self) -> &str {
        "jsearch"
    }

    async fn discover(
        &self,
        http: &HttpFetcher,
        _ctx: &AdapterContext,
    ) -> Result<Vec<DiscoveredJob>, AdapterError> {
        let date_posted = self.settings.recency.as_deref().unwrap_or("all");
        let headers = [
            ("x-rapidapi-key", self.api_key.as_str()),
            ("x-rapidapi-host", "jsearch.p.rapidapi.com"),
        ];

        let mut out = Vec::new();
        for q in &self.settings.queries {
            for page in 1..=self.settings.max_pages.max(1) {
                let page = page.to_string();
                let results: JsonValue = http
                    .fetch_json(
                        "jsearch",
                        &self.endpoint,
                        &[
                            ("query", q.as_str()),
                            ("page", page.as_str()),
                            ("num_pages", "1"),
                            ("date_posted", date_posted),
                        ],
                        &headers,
                    )
                    .await?;
                let data = results
                    .get("data")
                    .and_then(JsonValue::as_array)
                    .cloned()
                    .unwrap_or_default();
                if data.is_empty() {
                    break;
                }
                out.extend(data.iter().filter_map(map_jsearch_job));
            }
        }
        Ok(out)
    }
}

/// Content of one job page. All fields are empty when the page could not be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPage {
    pub job_html: String,
    pub job_text: String,
    pub posted_date: String,
}

impl JobPage {
    pub fn is_empty(&self) -> bool {
        self.job_html.is_empty() && self.job_text.is_empty()
    }
}

#[async_trait]
pub trait PageLoader: Send + Sync {
    /// Never fails: network errors and non-2xx statuses yield [`JobPage::default`].
    async fn load(&self, link: &str) -> JobPage;
}

#[derive(Debug, Clone)]
pub struct HttpPageLoader {
    http: Arc<HttpFetcher>,
}

impl HttpPageLoader {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

/// Builds a [`JobPage`] from fetched HTML.
pub fn job_page_from_html(html: &str) -> JobPage {
    let posted_date = parse_json_ld_job(html)
        .ok()
        .flatten()
        .and_then(|scraped| {
            scraped
                .fields
                .get("job_posted_at_timestamp")
                .and_then(JsonValue::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_default();
    JobPage {
        job_text: visible_text(html),
        job_html: html.to_string(),
        posted_date,
    }
}

#[async_trait]
impl PageLoader for HttpPageLoader {
    async fn load(&self, link: &str) -> JobPage {
        let scope = Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "pages".to_string());
        match self.http.fetch(&scope, link).await {
            Ok(response) => job_page_from_html(&response.text()),
            Err(err) => {
                warn!(link, error = %err, "job page unavailable");
                JobPage::default()
            }
        }
    }
}

/// Fields scraped from a job page, plus employer hints found alongside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedFields {
    pub fields: FieldMap,
    pub company_name: Option<String>,
    pub company: CompanyDetails,
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(e.to_string()))
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn select_first_text(document: &Html, css: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

fn select_first_attr(document: &Html, css: &str, attr: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string())))
}

fn element_visible_text(root: ElementRef<'_>) -> String {
    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            if hidden {
                return None;
            }
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Visible text of a document, one line per text block.
pub fn visible_text(html: &str) -> String {
    element_visible_text(Html::parse_document(html).root_element())
}

fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_job_posting(node: &JsonValue) -> bool {
    match node.get("@type") {
        Some(JsonValue::String(t)) => t == "JobPosting",
        Some(JsonValue::Array(types)) => types.iter().any(|t| t.as_str() == Some("JobPosting")),
        _ => false,
    }
}

fn find_job_posting(node: &JsonValue) -> Option<&JsonValue> {
    match node {
        JsonValue::Array(items) => items.iter().find_map(find_job_posting),
        JsonValue::Object(map) => {
            if is_job_posting(node) {
                Some(node)
            } else {
                map.get("@graph").and_then(find_job_posting)
            }
        }
        _ => None,
    }
}

fn fmt_number(value: &JsonValue) -> Option<String> {
    let n = value.as_f64()?;
    if n.fract() == 0.0 {
        Some(format!("{}", n as i64))
    } else {
        Some(n.to_string())
    }
}

fn salary_text(base_salary: &JsonValue) -> Option<String> {
    let value = base_salary.get("value").unwrap_or(base_salary);
    let amount = match (value.get("minValue"), value.get("maxValue")) {
        (Some(min), Some(max)) => format!("{}-{}", fmt_number(min)?, fmt_number(max)?),
        (Some(min), None) => fmt_number(min)?,
        (None, Some(max)) => fmt_number(max)?,
        (None, None) => fmt_number(value.get("value").unwrap_or(value))?,
    };
    let mut text = match json_str(base_salary, &["currency"]) {
        Some(currency) => format!("{currency} {amount}"),
        None => amount,
    };
    if let Some(unit) = json_str(value, &["unitText"]) {
        text.push_str(" per ");
        text.push_str(unit);
    }
    Some(text)
}

fn address_part(address: &JsonValue, key: &str) -> Option<String> {
    match address.get(key)? {
        JsonValue::String(s) => text_or_none(s.clone()),
        other => json_str(other, &["name"]).and_then(|s| text_or_none(s.to_string())),
    }
}

fn logo_url(value: &JsonValue) -> Option<&str> {
    value.as_str().or_else(|| json_str(value, &["url"]))
}

/// Finds the first `JobPosting` in the page's JSON-LD blocks and maps it to job fields.
pub fn parse_json_ld_job(html: &str) -> Result<Option<ScrapedFields>, AdapterError> {
    let document = Html::parse_document(html);
    let sel = selector(r#"script[type="application/ld+json"]"#)?;

    let posting = document.select(&sel).find_map(|script| {
        let raw = script.text().collect::<String>();
        let value: JsonValue = serde_json::from_str(raw.trim()).ok()?;
        find_job_posting(&value).cloned()
    });
    let Some(posting) = posting else {
        return Ok(None);
    };

    let mut fields = FieldMap::new();
    put_text(&mut fields, "job_title", json_str(&posting, &["title"]).map(Into::into));
    put_text(
        &mut fields,
        "job_description",
        json_str(&posting, &["description"]).map(fragment_text),
    );
    put_text(
        &mut fields,
        "job_posted_at_timestamp",
        json_str(&posting, &["datePosted"]).map(Into::into),
    );
    put_text(
        &mut fields,
        "job_id_from_source",
        json_str(&posting, &["identifier", "value"])
            .or_else(|| json_str(&posting, &["identifier"]))
            .map(Into::into),
    );
    if let Some(types) = posting.get("employmentType") {
        put_list(&mut fields, "job_employment_types", string_list(types));
    }
    if let Some(location) = posting.get("jobLocation") {
        let first = match location {
            JsonValue::Array(items) => items.first(),
            other => Some(other),
        };
        if let Some(address) = first.and_then(|l| l.get("address")) {
            fields.insert(
                "job_location".into(),
                json!({
                    "city": address_part(address, "addressLocality"),
                    "state": address_part(address, "addressRegion"),
                    "country": address_part(address, "addressCountry"),
                }),
            );
        }
    }
    if json_str(&posting, &["jobLocationType"]) == Some("TELECOMMUTE") {
        fields.insert("job_is_remote".into(), json!(true));
    }
    put_text(
        &mut fields,
        "job_salary",
        posting.get("baseSalary").and_then(salary_text),
    );
    if let Some(skills) = posting.get("skills") {
        let tags: Vec<String> = match skills {
            JsonValue::String(s) => s
                .split(',')
                .filter_map(|t| text_or_none(t.to_string()))
                .collect(),
            other => string_list(other),
        };
        put_list(&mut fields, "job_tags", tags);
    }
    for (source_key, field) in [
        ("qualifications", "job_qualifications"),
        ("responsibilities", "job_responsibilities"),
    ] {
        if let Some(text) = json_str(&posting, &[source_key]).and_then(|t| text_or_none(fragment_text(t))) {
            fields.insert(field.into(), json!([text]));
        }
    }

    let org = posting.get("hiringOrganization");
    let company_name = org
        .and_then(|o| json_str(o, &["name"]))
        .and_then(|s| text_or_none(s.to_string()));
    let company = CompanyDetails {
        company_logo: org
            .and_then(|o| o.get("logo"))
            .and_then(logo_url)
            .unwrap_or_default()
            .to_string(),
        company_description: String::new(),
        company_website: org
            .and_then(|o| json_str(o, &["sameAs"]))
            .unwrap_or_default()
            .to_string(),
    };

    Ok(Some(ScrapedFields {
        fields,
        company_name,
        company,
    }))
}

/// Title and careers-page navbar logo straight from the DOM.
pub fn scrape_job_dom(html: &str) -> Result<ScrapedFields, AdapterError> {
    let document = Html::parse_document(html);
    let title = match select_first_text(&document, "h1")? {
        Some(title) => Some(title),
        None => select_first_text(&document, "title")?,
    };
    let mut fields = FieldMap::new();
    put_text(&mut fields, "job_title", title);
    Ok(ScrapedFields {
        fields,
        company_name: None,
        company: CompanyDetails {
            company_logo: select_first_attr(&document, "a.navbar-brand img", "src")?
                .unwrap_or_default(),
            ..CompanyDetails::default()
        },
    })
}

/// A source of company profile details. Failures degrade to empty details.
#[async_trait]
pub trait CompanyDetailSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn details(&self, company: &CompanyRef) -> CompanyDetails;
}

/// Company profile from its careers-page.com landing page.
pub fn parse_careers_company_page(html: &str, page_url: &str) -> Result<CompanyDetails, AdapterError> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let company_logo = select_first_attr(&document, "a.navbar-brand img", "src")?
        .map(|src| match base.as_ref().and_then(|b| b.join(&src).ok()) {
            Some(resolved) => resolved.to_string(),
            None => src,
        })
        .unwrap_or_default();

    let links = selector(r#"a.nav-link[href^="http"]"#)?;
    let button = selector("button")?;
    let company_website = document
        .select(&links)
        .find(|link| {
            link.select(&button).next().is_some_and(|b| {
                b.text()
                    .collect::<String>()
                    .to_ascii_lowercase()
                    .contains("company website")
            })
        })
        .and_then(|link| link.value().attr("href"))
        .unwrap_or_default()
        .to_string();

    Ok(CompanyDetails {
        company_logo,
        company_description: select_first_attr(&document, r#"meta[name="description"]"#, "content")?
            .unwrap_or_default(),
        company_website,
    })
}

#[derive(Debug, Clone)]
pub struct CareersPageCompanySource {
    http: Arc<HttpFetcher>,
}

impl CareersPageCompanySource {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CompanyDetailSource for CareersPageCompanySource {
    fn name(&self) -> &'static str {
        "careers-page"
    }

    async fn details(&self, company: &CompanyRef) -> CompanyDetails {
        let Some(slug) = company.platform.strip_prefix("careers-page.com/") else {
            return CompanyDetails::default();
        };
        let url = format!("https://{CAREERS_PAGE_HOST}/{slug}");
        let html = match self.http.fetch(CAREERS_PAGE_HOST, &url).await {
            Ok(response) => response.text(),
            Err(err) => {
                warn!(platform = %company.platform, error = %err, "careers page unavailable");
                return CompanyDetails::default();
            }
        };
        parse_careers_company_page(&html, &url).unwrap_or_else(|err| {
            warn!(platform = %company.platform, error = %err, "careers page unparseable");
            CompanyDetails::default()
        })
    }
}

/// Company profile from a public LinkedIn company page.
pub fn parse_linkedin_company_page(html: &str) -> Result<CompanyDetails, AdapterError> {
    let document = Html::parse_document(html);

    let images = selector("img")?;
    let company_logo = document
        .select(&images)
        .filter_map(|img| {
            img.value()
                .attr("data-delayed-url")
                .or_else(|| img.value().attr("src"))
        })
        .find(|url| url.contains("company-logo"))
        .unwrap_or_default()
        .to_string();

    let company_website = select_first_attr(
        &document,
        r#"a[data-tracking-control-name="about_website"]"#,
        "href",
    )?
    .and_then(|href| {
        let base = Url::parse("https://www.linkedin.com").ok()?;
        let redirect = base.join(&href).ok()?;
        redirect
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
    })
    .unwrap_or_default();

    Ok(CompanyDetails {
        company_logo,
        company_description: select_first_text(&document, r#"p[data-test-id="about-us__description"]"#)?
            .unwrap_or_default(),
        company_website,
    })
}

#[derive(Debug, Clone)]
pub struct LinkedInCompanySource {
    http: Arc<HttpFetcher>,
    serpapi: Option<SerpApiClient>,
}

impl LinkedInCompanySource {
    pub fn new(http: Arc<HttpFetcher>, serpapi: Option<SerpApiClient>) -> Self {
        Self { http, serpapi }
    }

    async fn try_details(&self, company: &CompanyRef) -> Result<CompanyDetails, AdapterError> {
        let serpapi = self
            .serpapi
            .as_ref()
            .ok_or(AdapterError::MissingCredential("SERPAPI_API_KEY"))?;
        let q = format!("{} site:linkedin.com/company", company.company_name);
        let Some(profile) = serpapi
            .first_organic_link(&self.http, &q, "linkedin.com/company")
            .await?
        else {
            return Ok(CompanyDetails::default());
        };
        let response = self.http.fetch("linkedin", &profile).await?;
        parse_linkedin_company_page(&response.text())
    }
}

#[async_trait]
impl CompanyDetailSource for LinkedInCompanySource {
    fn name(&self) -> &'static str {
        "linkedin"
    }

    async fn details(&self, company: &CompanyRef) -> CompanyDetails {
        self.try_details(company).await.unwrap_or_else(|err| {
            warn!(platform = %company.platform, error = %err, "linkedin lookup failed");
            CompanyDetails::default()
        })
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn string_list(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .filter_map(|s| text_or_none(s.to_string()))
            .collect(),
        JsonValue::String(s) => text_or_none(s.clone()).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn put_text(fields: &mut FieldMap, key: &str, value: Option<String>) {
    if let Some(text) = value.and_then(text_or_none) {
        fields.insert(key.to_string(), JsonValue::String(text));
    }
}

fn put_list(fields: &mut FieldMap, key: &str, items: Vec<String>) {
    if !items.is_empty() {
        fields.insert(key.to_string(), json!(items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn careers_links_are_cleaned_or_rejected() {
        assert_eq!(
            clean_careers_job_link("https://www.careers-page.com/acme/job/Q7X9R2?src=google#apply")
                .as_deref(),
            Some("https://www.careers-page.com/acme/job/Q7X9R2")
        );
        assert_eq!(
            clean_careers_job_link("https://www.careers-page.com/acme/job/Q7X9R2/apply").as_deref(),
            Some("https://www.careers-page.com/acme/job/Q7X9R2")
        );
        assert!(clean_careers_job_link("https://www.careers-page.com/acme").is_none());
        assert!(clean_careers_job_link("https://www.careers-page.com/acme/jobs/1").is_none());
        assert!(clean_careers_job_link("http://www.careers-page.com/acme/job/1").is_none());
        assert!(clean_careers_job_link("https://example.com/acme/job/1").is_none());
        assert_eq!(
            careers_company_slug("https://www.careers-page.com/acme/job/1").as_deref(),
            Some("acme")
        );
    }

    #[test]
    fn relative_dates_resolve_against_fetch_time() {
        assert_eq!(
            parse_relative_posted("3 days ago", now()),
            Some(now() - ChronoDuration::days(3))
        );
        assert_eq!(
            parse_relative_posted("30+ days ago", now()),
            Some(now() - ChronoDuration::days(30))
        );
        assert_eq!(
            parse_relative_posted("1 hour ago", now()),
            Some(now() - ChronoDuration::hours(1))
        );
        assert!(parse_relative_posted("Mar 3, 2026", now()).is_none());
        assert_eq!(posted_text("Mar 3, 2026", now()), "Mar 3, 2026");
    }

    #[test]
    fn first_matching_organic_link_is_picked() {
        let results = serde_json::json!({
            "organic_results": [
                {"title": "Acme | Glassdoor", "link": "https://www.glassdoor.com/acme"},
                {"title": "no link"},
                {"title": "Acme | LinkedIn", "link": "https://www.linkedin.com/company/acme"},
                {"title": "Acme jobs", "link": "https://www.linkedin.com/company/acme/jobs"}
            ]
        });
        assert_eq!(
            first_link_matching(&results, "linkedin.com/company").as_deref(),
            Some("https://www.linkedin.com/company/acme")
        );
        assert_eq!(first_link_matching(&results, "indeed.com"), None);
        assert_eq!(first_link_matching(&serde_json::json!({}), "linkedin.com"), None);
    }

    #[test]
    fn oversized_relative_dates_are_kept_as_text() {
        for text in [
            "99999999999999 weeks ago",
            "9223372036854775807 months ago",
            "9223372036854775807 minutes ago",
            "100000000 days ago",
        ] {
            assert!(parse_relative_posted(text, now()).is_none(), "{text}");
            assert_eq!(posted_text(text, now()), text);
        }
    }

    #[test]
    fn careers_search_results_map_to_page_jobs() {
        let source = CareersPageSource::new(SerpApiClient::new("k"), SearchSettings::default());
        let job = source
            .map_result(
                &json!({
                    "link": "https://www.careers-page.com/acme/job/AB12?utm=x",
                    "date": "2 hours ago"
                }),
                now(),
            )
            .unwrap();
        assert_eq!(job.job_link, "https://www.careers-page.com/acme/job/AB12");
        assert_eq!(job.company.platform, "careers-page.com/acme");
        assert_eq!(job.company.company_name, "acme");
        assert!(job.needs_page);
        assert_eq!(job.posted_date, (now() - ChronoDuration::hours(2)).to_rfc3339());
        assert_eq!(job.fields["job_apply_link"], json!(job.job_link));

        assert!(source
            .map_result(&json!({"link": "https://www.careers-page.com/acme"}), now())
            .is_none());
    }

    #[test]
    fn google_jobs_result_maps_highlights_and_company() {
        let raw = json!({
            "title": "Data Analyst",
            "company_name": "Acme Corp",
            "location": "Chicago, IL, United States",
            "description": "Analyze things.",
            "thumbnail": "https://img/acme.png",
            "job_id": "eyJqb2IiOjF9",
            "share_link": "https://google.com/share",
            "apply_options": [{"title": "Acme", "link": "https://acme.example/jobs/1"}],
            "detected_extensions": {"posted_at": "3 days ago", "schedule_type": "Full-time", "work_from_home": true},
            "job_highlights": [
                {"title": "Qualifications", "items": ["SQL", "Python"]},
                {"title": "Benefits", "items": ["Dental"]}
            ]
        });
        let job = map_google_job(&raw, now()).unwrap();
        assert_eq!(job.job_link, "https://acme.example/jobs/1");
        assert_eq!(job.company.platform, "google-jobs/acme-corp");
        assert_eq!(job.company.hints.company_logo, "https://img/acme.png");
        assert!(!job.needs_page);
        assert_eq!(job.fields["job_title"], json!("Data Analyst"));
        assert_eq!(job.fields["job_id_from_source"], json!("eyJqb2IiOjF9"));
        assert_eq!(job.fields["job_employment_types"], json!(["full-time"]));
        assert_eq!(job.fields["job_is_remote"], json!(true));
        assert_eq!(job.fields["job_qualifications"], json!(["SQL", "Python"]));
        assert_eq!(job.fields["job_benefits"], json!(["Dental"]));
        assert!(!job.fields.contains_key("job_responsibilities"));
        assert_eq!(job.fields["job_location"], json!("Chicago, IL, United States"));
    }

    #[test]
    fn google_jobs_without_links_are_dropped() {
        assert!(map_google_job(&json!({"title": "x", "company_name": "y"}), now()).is_none());
    }

    #[test]
    fn jsearch_result_maps_structured_fields() {
        let raw = json!({
            "job_id": "abc123",
            "job_title": "Developer",
            "job_description": "Build APIs",
            "job_apply_link": "https://jobs.example/abc123",
            "employer_name": "Globex",
            "employer_logo": "https://img/globex.png",
            "employer_website": "https://globex.example",
            "job_city": "Chicago",
            "job_state": "IL",
            "job_country": "US",
            "job_is_remote": false,
            "job_employment_type": "FULLTIME",
            "job_posted_at_timestamp": 1767225600,
            "job_highlights": {"Responsibilities": ["Ship code"]}
        });
        let job = map_jsearch_job(&raw).unwrap();
        assert_eq!(job.company.platform, "jsearch/globex");
        assert_eq!(job.company.hints.company_website, "https://globex.example");
        assert_eq!(job.fields["job_employment_types"], json!(["fulltime"]));
        assert_eq!(job.fields["job_responsibilities"], json!(["Ship code"]));
        assert_eq!(
            job.fields["job_location"],
            json!({"city": "Chicago", "state": "IL", "country": "US"})
        );
        assert_eq!(job.fields["job_posted_at_timestamp"], json!("2026-01-01T00:00:00+00:00"));
        assert_eq!(job.fields["job_is_remote"], json!(false));
    }

    const JOB_PAGE: &str = r#"<html><head><title>Acme - Backend Engineer</title>
        <script type="application/ld+json">{"@context": "https://schema.org", "@graph": [
          {"@type": "Organization", "name": "ignored"},
          {"@type": "JobPosting", "title": "Backend Engineer",
           "description": "<p>Build <b>services</b>.</p>",
           "datePosted": "2026-03-01",
           "employmentType": ["FULL_TIME"],
           "identifier": {"@type": "PropertyValue", "value": "BE-7"},
           "jobLocationType": "TELECOMMUTE",
           "jobLocation": {"address": {"addressLocality": "Chicago", "addressRegion": "IL", "addressCountry": {"name": "US"}}},
           "baseSalary": {"currency": "USD", "value": {"minValue": 100000, "maxValue": 120000, "unitText": "YEAR"}},
           "skills": "Rust, Postgres",
           "hiringOrganization": {"name": "Acme", "logo": {"url": "https://img/acme.png"}, "sameAs": "https://acme.example"}}
        ]}</script>
        <style>.x { color: red }</style></head>
        <body><a class="navbar-brand" href="/"><img src="https://cdn/logo.png"></a>
        <h1> Backend Engineer </h1><p>Join us.</p><script>var x = 1;</script></body></html>"#;

    #[test]
    fn json_ld_job_posting_is_found_in_graph() {
        let scraped = parse_json_ld_job(JOB_PAGE).unwrap().unwrap();
        let f = &scraped.fields;
        assert_eq!(f["job_title"], json!("Backend Engineer"));
        assert_eq!(f["job_description"], json!("Build services."));
        assert_eq!(f["job_posted_at_timestamp"], json!("2026-03-01"));
        assert_eq!(f["job_id_from_source"], json!("BE-7"));
        assert_eq!(f["job_employment_types"], json!(["FULL_TIME"]));
        assert_eq!(f["job_is_remote"], json!(true));
        assert_eq!(f["job_salary"], json!("USD 100000-120000 per YEAR"));
        assert_eq!(f["job_tags"], json!(["Rust", "Postgres"]));
        assert_eq!(
            f["job_location"],
            json!({"city": "Chicago", "state": "IL", "country": "US"})
        );
        assert_eq!(scraped.company_name.as_deref(), Some("Acme"));
        assert_eq!(scraped.company.company_logo, "https://img/acme.png");
        assert_eq!(scraped.company.company_website, "https://acme.example");
    }

    #[test]
    fn pages_without_json_ld_yield_none() {
        assert!(parse_json_ld_job("<html><body><h1>x</h1></body></html>")
            .unwrap()
            .is_none());
    }

    #[test]
    fn dom_scrape_prefers_h1_then_title() {
        let scraped = scrape_job_dom(JOB_PAGE).unwrap();
        assert_eq!(scraped.fields["job_title"], json!("Backend Engineer"));
        assert_eq!(scraped.company.company_logo, "https://cdn/logo.png");

        let fallback = scrape_job_dom("<html><head><title>Ops Lead</title></head></html>").unwrap();
        assert_eq!(fallback.fields["job_title"], json!("Ops Lead"));
    }

    #[test]
    fn visible_text_drops_scripts_and_styles() {
        let page = job_page_from_html(JOB_PAGE);
        assert!(page.job_text.contains("Join us."));
        assert!(page.job_text.contains("Backend Engineer"));
        assert!(!page.job_text.contains("var x"));
        assert!(!page.job_text.contains("color: red"));
        assert!(!page.job_text.contains("JobPosting"));
        assert_eq!(page.posted_date, "2026-03-01");
        assert!(!page.is_empty());
        assert!(JobPage::default().is_empty());
    }

    #[test]
    fn careers_company_page_yields_logo_website_and_description() {
        let html = r#"<html><head><meta name="description" content="Acme builds rockets."></head>
            <body><nav><a class="navbar-brand" href="/acme"><img src="/media/acme.png"></a>
            <a class="nav-link" href="https://blog.acme.example"><button>Blog</button></a>
            <a class="nav-link" href="https://acme.example"><button>Company Website</button></a></nav></body></html>"#;
        let details =
            parse_careers_company_page(html, "https://www.careers-page.com/acme").unwrap();
        assert_eq!(details.company_logo, "https://www.careers-page.com/media/acme.png");
        assert_eq!(details.company_website, "https://acme.example");
        assert_eq!(details.company_description, "Acme builds rockets.");
    }

    #[test]
    fn linkedin_page_yields_logo_description_and_redirect_target() {
        let html = r#"<html><body>
            <img src="https://static.licdn.com/aero/ghost.png">
            <img data-delayed-url="https://media.licdn.com/company-logo_200/acme.png">
            <p data-test-id="about-us__description"> We make anvils. </p>
            <a data-tracking-control-name="about_website"
               href="https://www.linkedin.com/redir/redirect?url=https%3A%2F%2Facme%2Eexample%2F&amp;urlhash=x">site</a>
            </body></html>"#;
        let details = parse_linkedin_company_page(html).unwrap();
        assert_eq!(details.company_logo, "https://media.licdn.com/company-logo_200/acme.png");
        assert_eq!(details.company_description, "We make anvils.");
        assert_eq!(details.company_website, "https://acme.example/");
    }

    #[tokio::test]
    async fn detail_sources_degrade_to_empty_details() {
        let http = Arc::new(HttpFetcher::new(Default::default()).unwrap());
        let company = CompanyRef {
            platform: "google-jobs/acme".into(),
            company_name: "Acme".into(),
            hints: CompanyDetails::default(),
        };

        let careers = CareersPageCompanySource::new(http.clone());
        assert!(careers.details(&company).await.is_empty());

        let linkedin = LinkedInCompanySource::new(http, None);
        assert!(linkedin.details(&company).await.is_empty());
    }
}
