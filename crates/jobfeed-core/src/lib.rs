//! Core domain model, canonical merge engine and field validation for jobfeed.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-core";

/// Untyped field bag discovered by one fetch path (search API, DOM, JSON-LD) or
/// produced by the extractor.
pub type FieldMap = Map<String, JsonValue>;

/// A value counts as empty when it is null, a blank string, an empty list, or an
/// object whose values are all empty.
pub fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.values().all(is_empty_value),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}

/// Combines two field maps without touching either input.
///
/// A non-empty value in `base` is never overwritten; empty or missing values are
/// filled from `overlay`, and nested objects are merged key by key with the same
/// rule. Call as `merge(&raw_source_fields, &llm_fields)` so that scraped and
/// structured data win over LLM inference wherever both carry a value.
pub fn merge(base: &FieldMap, overlay: &FieldMap) -> FieldMap {
    let mut merged = base.clone();
    for (key, incoming) in overlay {
        let nested = match (merged.get(key), incoming) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(next)) => {
                Some(merge(existing, next))
            }
            _ => None,
        };
        if let Some(combined) = nested {
            merged.insert(key.clone(), JsonValue::Object(combined));
            continue;
        }

        if is_empty_value(incoming) {
            continue;
        }
        if merged
            .get(key)
            .is_some_and(|existing| !is_empty_value(existing))
        {
            continue;
        }
        merged.insert(key.clone(), incoming.clone());
    }
    merged
}

/// Lower-case, dash-separated identifier fragment.
pub fn slugify(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Closed set of job categories the extractor may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum JobCategory {
    #[serde(rename = "Administrative & Office Support")]
    Administrative,
    #[serde(rename = "Agriculture, Forestry & Fishing")]
    Agriculture,
    #[serde(rename = "Arts, Culture & Entertainment")]
    Arts,
    #[serde(rename = "Business, Consulting & Management")]
    Business,
    #[serde(rename = "Community & Social Services")]
    Community,
    #[serde(rename = "Construction & Skilled Trades")]
    Construction,
    #[serde(rename = "Customer Service")]
    CustomerService,
    #[serde(rename = "Education & Training")]
    Education,
    #[serde(rename = "Engineering & Technical")]
    Engineering,
    #[serde(rename = "Finance & Accounting")]
    Finance,
    #[serde(rename = "Healthcare & Medical")]
    Healthcare,
    #[serde(rename = "Hospitality & Tourism")]
    Hospitality,
    #[serde(rename = "Human Resources (HR)")]
    HumanResources,
    #[serde(rename = "Information Technology (IT) & Software Development")]
    InformationTechnology,
    #[serde(rename = "Legal & Law Enforcement")]
    Legal,
    #[serde(rename = "Manufacturing & Production")]
    Manufacturing,
    #[serde(rename = "Marketing, Advertising & PR")]
    Marketing,
    #[serde(rename = "Media & Communications")]
    Media,
    #[serde(rename = "Real Estate & Property")]
    RealEstate,
    #[serde(rename = "Retail & Sales")]
    Retail,
    #[serde(rename = "Science & Research")]
    Science,
    #[serde(rename = "Supply Chain & Logistics")]
    SupplyChain,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Utilities & Energy")]
    Utilities,
}

impl JobCategory {
    pub const ALL: [JobCategory; 24] = [
        JobCategory::Administrative,
        JobCategory::Agriculture,
        JobCategory::Arts,
        JobCategory::Business,
        JobCategory::Community,
        JobCategory::Construction,
        JobCategory::CustomerService,
        JobCategory::Education,
        JobCategory::Engineering,
        JobCategory::Finance,
        JobCategory::Healthcare,
        JobCategory::Hospitality,
        JobCategory::HumanResources,
        JobCategory::InformationTechnology,
        JobCategory::Legal,
        JobCategory::Manufacturing,
        JobCategory::Marketing,
        JobCategory::Media,
        JobCategory::RealEstate,
        JobCategory::Retail,
        JobCategory::Science,
        JobCategory::SupplyChain,
        JobCategory::Transportation,
        JobCategory::Utilities,
    ];

    pub fn label(self) -> &'static str {
        match self {
            JobCategory::Administrative => "Administrative & Office Support",
            JobCategory::Agriculture => "Agriculture, Forestry & Fishing",
            JobCategory::Arts => "Arts, Culture & Entertainment",
            JobCategory::Business => "Business, Consulting & Management",
            JobCategory::Community => "Community & Social Services",
            JobCategory::Construction => "Construction & Skilled Trades",
            JobCategory::CustomerService => "Customer Service",
            JobCategory::Education => "Education & Training",
            JobCategory::Engineering => "Engineering & Technical",
            JobCategory::Finance => "Finance & Accounting",
            JobCategory::Healthcare => "Healthcare & Medical",
            JobCategory::Hospitality => "Hospitality & Tourism",
            JobCategory::HumanResources => "Human Resources (HR)",
            JobCategory::InformationTechnology => {
                "Information Technology (IT) & Software Development"
            }
            JobCategory::Legal => "Legal & Law Enforcement",
            JobCategory::Manufacturing => "Manufacturing & Production",
            JobCategory::Marketing => "Marketing, Advertising & PR",
            JobCategory::Media => "Media & Communications",
            JobCategory::RealEstate => "Real Estate & Property",
            JobCategory::Retail => "Retail & Sales",
            JobCategory::Science => "Science & Research",
            JobCategory::SupplyChain => "Supply Chain & Logistics",
            JobCategory::Transportation => "Transportation",
            JobCategory::Utilities => "Utilities & Energy",
        }
    }

    /// Short name accepted as an alias of the full label.
    pub fn short_name(self) -> &'static str {
        match self {
            JobCategory::Administrative => "Administrative",
            JobCategory::Agriculture => "Agriculture",
            JobCategory::Arts => "Arts",
            JobCategory::Business => "Business",
            JobCategory::Community => "Community",
            JobCategory::Construction => "Construction",
            JobCategory::CustomerService => "Customer Service",
            JobCategory::Education => "Education",
            JobCategory::Engineering => "Engineering",
            JobCategory::Finance => "Finance",
            JobCategory::Healthcare => "Healthcare",
            JobCategory::Hospitality => "Hospitality",
            JobCategory::HumanResources => "Human Resources",
            JobCategory::InformationTechnology => "Information Technology",
            JobCategory::Legal => "Legal",
            JobCategory::Manufacturing => "Manufacturing",
            JobCategory::Marketing => "Marketing",
            JobCategory::Media => "Media",
            JobCategory::RealEstate => "Real Estate",
            JobCategory::Retail => "Retail",
            JobCategory::Science => "Science",
            JobCategory::SupplyChain => "Supply Chain",
            JobCategory::Transportation => "Transportation",
            JobCategory::Utilities => "Utilities",
        }
    }

    /// Matches a full label or short name, ignoring case and `_`/space differences.
    pub fn parse(input: &str) -> Option<Self> {
        let needle = input.trim().replace('_', " ");
        if needle.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|category| {
            category.label().eq_ignore_ascii_case(&needle)
                || category.short_name().eq_ignore_ascii_case(&needle)
        })
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct JobLocation {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl JobLocation {
    /// Splits a listing location such as `"Chicago, IL, United States"`.
    pub fn parse_free_text(text: &str) -> Self {
        let mut parts = text
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string);
        Self {
            city: parts.next(),
            state: parts.next(),
            country: parts.next(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.state.is_none() && self.country.is_none()
    }
}

/// Structured answer of the extraction prompt. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExtractedJobRecord {
    /// Full title as displayed on the listing.
    pub job_title: Option<String>,
    /// Brief but complete plain-text summary of the role.
    pub job_description: Option<String>,
    pub job_qualifications: Option<Vec<String>>,
    pub job_responsibilities: Option<Vec<String>>,
    pub job_benefits: Option<Vec<String>>,
    /// One of the closed job category labels.
    pub job_category: Option<String>,
    /// Skills, tools and job-related keywords.
    pub job_tags: Option<Vec<String>>,
    /// e.g. "full-time", "part-time", "contractor".
    pub job_employment_types: Option<Vec<String>>,
    /// Salary text including currency and period when stated.
    pub job_salary: Option<String>,
    pub job_is_remote: Option<bool>,
    pub job_location: Option<JobLocation>,
}

impl ExtractedJobRecord {
    pub fn to_field_map(&self) -> FieldMap {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map,
            _ => FieldMap::new(),
        }
    }
}

/// Uniqueness keys a canonical job is checked against before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DedupKey {
    ApplyLink(String),
    SourceId {
        publisher: String,
        external_id: String,
    },
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::ApplyLink(link) => write!(f, "apply_link={link}"),
            DedupKey::SourceId {
                publisher,
                external_id,
            } => write!(f, "source_id={publisher}:{external_id}"),
        }
    }
}

/// Merged, validated job posting eligible for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    pub job_publisher: String,
    pub job_id_from_source: Option<String>,
    pub job_title: String,
    pub job_description: String,
    pub job_qualifications: Vec<String>,
    pub job_responsibilities: Vec<String>,
    pub job_benefits: Vec<String>,
    pub job_category: Option<JobCategory>,
    pub job_tags: Vec<String>,
    pub job_employment_types: Vec<String>,
    pub job_salary: Option<String>,
    pub job_is_remote: bool,
    pub job_location: JobLocation,
    pub job_apply_link: String,
    pub job_posted_at_timestamp: Option<String>,
    pub is_active: bool,
}

impl CanonicalJob {
    pub fn dedup_keys(&self) -> Vec<DedupKey> {
        let mut keys = vec![DedupKey::ApplyLink(self.job_apply_link.clone())];
        if let Some(external_id) = &self.job_id_from_source {
            keys.push(DedupKey::SourceId {
                publisher: self.job_publisher.clone(),
                external_id: external_id.clone(),
            });
        }
        keys
    }
}

/// A canonical job after it has been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: Uuid,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub job: CanonicalJob,
}

/// Non-fatal problems found while canonicalizing a merged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum FieldIssue {
    CategoryOutOfRange { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Canonicalized {
    pub job: CanonicalJob,
    pub issues: Vec<FieldIssue>,
}

/// Converts a merged field map into a typed canonical job.
///
/// `job_title` and `job_apply_link` are required. A category outside the closed set
/// is nulled and reported as an issue; the rest of the record is kept.
pub fn canonicalize(fields: &FieldMap) -> Result<Canonicalized, CanonicalizeError> {
    let job_title =
        field_text(fields, "job_title").ok_or(CanonicalizeError::MissingField("job_title"))?;
    let job_apply_link = field_text(fields, "job_apply_link")
        .ok_or(CanonicalizeError::MissingField("job_apply_link"))?;

    let mut issues = Vec::new();
    let job_category = match field_text(fields, "job_category") {
        Some(raw) => match JobCategory::parse(&raw) {
            Some(category) => Some(category),
            None => {
                issues.push(FieldIssue::CategoryOutOfRange { value: raw });
                None
            }
        },
        None => None,
    };

    let job = CanonicalJob {
        job_publisher: field_text(fields, "job_publisher").unwrap_or_default(),
        job_id_from_source: field_text(fields, "job_id_from_source"),
        job_title,
        job_description: field_text(fields, "job_description").unwrap_or_default(),
        job_qualifications: field_list(fields, "job_qualifications"),
        job_responsibilities: field_list(fields, "job_responsibilities"),
        job_benefits: field_list(fields, "job_benefits"),
        job_category,
        job_tags: field_list(fields, "job_tags"),
        job_employment_types: field_list(fields, "job_employment_types")
            .into_iter()
            .map(|t| normalize_employment_type(&t))
            .fold(Vec::new(), push_unique),
        job_salary: field_text(fields, "job_salary"),
        job_is_remote: field_bool(fields, "job_is_remote").unwrap_or(false),
        job_location: field_location(fields, "job_location"),
        job_apply_link,
        job_posted_at_timestamp: field_text(fields, "job_posted_at_timestamp"),
        is_active: field_bool(fields, "is_active").unwrap_or(true),
    };

    Ok(Canonicalized { job, issues })
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_text(fields: &FieldMap, key: &str) -> Option<String> {
    fields.get(key).and_then(scalar_text)
}

fn field_list(fields: &FieldMap, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(scalar_text)
            .fold(Vec::new(), push_unique),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn field_bool(fields: &FieldMap, key: &str) -> Option<bool> {
    match fields.get(key)? {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn field_location(fields: &FieldMap, key: &str) -> JobLocation {
    match fields.get(key) {
        Some(JsonValue::Object(map)) => JobLocation {
            city: field_text(map, "city"),
            state: field_text(map, "state"),
            country: field_text(map, "country"),
        },
        Some(JsonValue::String(text)) => JobLocation::parse_free_text(text),
        _ => JobLocation::default(),
    }
}

fn normalize_employment_type(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .replace(['_', ' '], "-")
}

fn push_unique(mut acc: Vec<String>, item: String) -> Vec<String> {
    if !acc.contains(&item) {
        acc.push(item);
    }
    acc
}

/// Partial company profile from one detail source. Empty strings mean "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDetails {
    pub company_logo: String,
    pub company_description: String,
    pub company_website: String,
}

impl CompanyDetails {
    pub fn is_empty(&self) -> bool {
        self.company_logo.trim().is_empty()
            && self.company_description.trim().is_empty()
            && self.company_website.trim().is_empty()
    }

    /// Field-by-field first-non-empty-wins over `layers`, in order.
    pub fn combine<'a>(layers: impl IntoIterator<Item = &'a CompanyDetails>) -> CompanyDetails {
        layers
            .into_iter()
            .fold(CompanyDetails::default(), |acc, next| CompanyDetails {
                company_logo: first_non_empty(acc.company_logo, &next.company_logo),
                company_description: first_non_empty(
                    acc.company_description,
                    &next.company_description,
                ),
                company_website: first_non_empty(acc.company_website, &next.company_website),
            })
    }
}

fn first_non_empty(current: String, fallback: &str) -> String {
    if current.trim().is_empty() {
        fallback.trim().to_string()
    } else {
        current
    }
}

/// The company a discovered job belongs to, keyed by `platform`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    pub platform: String,
    pub company_name: String,
    /// Employer fields carried on the job record itself, used as a last fallback.
    pub hints: CompanyDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompany {
    pub company_name: String,
    pub platform: String,
    pub company_description: Option<String>,
    pub company_logo: Option<String>,
    pub company_website: Option<String>,
}

impl NewCompany {
    pub fn from_details(company_name: &str, platform: &str, details: CompanyDetails) -> Self {
        let non_empty = |s: String| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        Self {
            company_name: company_name.trim().to_string(),
            platform: platform.trim().to_string(),
            company_description: non_empty(details.company_description),
            company_logo: non_empty(details.company_logo),
            company_website: non_empty(details.company_website),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub company_name: String,
    pub platform: String,
    pub company_description: Option<String>,
    pub company_logo: Option<String>,
    pub company_website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProfessionalExperience {
    pub organization: String,
    pub role: String,
    pub time: String,
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ProjectDescription {
    Text(String),
    Points(Vec<String>),
}

impl Default for ProjectDescription {
    fn default() -> Self {
        ProjectDescription::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub description: ProjectDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Education {
    pub school_name: String,
    pub certificate: String,
    pub time: String,
}

/// Structured resume used by the extraction and tailoring prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Resume {
    /// Keywords relevant for searching for a job.
    pub keywords: Vec<String>,
    pub name: String,
    pub summary: String,
    pub address: String,
    pub email: String,
    pub linkedin: String,
    pub phone_number: Option<String>,
    pub website: String,
    pub professional_experiences: Vec<ProfessionalExperience>,
    pub skills: Vec<String>,
    pub projects: Vec<Project>,
    pub educations: Vec<Education>,
    pub languages: Vec<String>,
}
