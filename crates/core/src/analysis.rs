use crate::error::AnalysisError;
use crate::llm::CompletionRequest;
use crate::traits::LlmClient;
use crate::{LlmError, Metadata};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const SUMMARY_PROMPT: &str = "You are an expert in summarising legal documents. \
Summarise the given text clearly and concisely, always keeping legally significant content \
and never dropping a key point.";

const KEY_POINTS_PROMPT: &str = "You are a legal document analyst. \
Extract the key points of the given text. Write each point on one line and number them.";

const LEGAL_ISSUES_PROMPT: &str = "You are a legal document analyst. \
Identify the legal issues in the given document: major legal risks, possible regulatory \
violations, contractual dispute factors, rights and obligations, and procedural cautions. \
Describe each issue clearly and concretely on its own numbered line.";

const ENTITIES_PROMPT: &str = "You are an expert in named entity recognition for legal documents. \
Extract entities under these headings: People, Organizations, Statutes, Dates, Amounts, \
Locations. List each entity on its own line starting with '-' under its heading.";

const RECOMMENDATIONS_PROMPT: &str = "You are a legal advisor. Based on the analysis results, \
give numbered recommendations covering immediate actions, preventive measures, areas that need \
further review, and areas where consulting a lawyer is advised.";

const RISK_PROMPT: &str = "You are a legal risk assessor. Rate the overall risk of the identified \
legal issues as High, Medium or Low and explain why. \
Answer in the form \"Risk level: [High/Medium/Low] - [reason]\".";

const RECOMMENDATION_CONTEXT_ITEMS: usize = 3;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Summary,
    KeyPoints,
    LegalIssues,
    Entities,
    #[default]
    Full,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::KeyPoints => "key_points",
            AnalysisKind::LegalIssues => "legal_issues",
            AnalysisKind::Entities => "entities",
            AnalysisKind::Full => "full",
        }
    }

    fn includes(self, step: AnalysisKind) -> bool {
        self == AnalysisKind::Full || self == step
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "summary" => Ok(AnalysisKind::Summary),
            "key_points" => Ok(AnalysisKind::KeyPoints),
            "legal_issues" => Ok(AnalysisKind::LegalIssues),
            "entities" => Ok(AnalysisKind::Entities),
            "full" => Ok(AnalysisKind::Full),
            other => Err(format!("unknown analysis kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    People,
    Organizations,
    Statutes,
    Dates,
    Amounts,
    Locations,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 6] = [
        EntityCategory::People,
        EntityCategory::Organizations,
        EntityCategory::Statutes,
        EntityCategory::Dates,
        EntityCategory::Amounts,
        EntityCategory::Locations,
    ];

    fn heading_keywords(self) -> &'static [&'static str] {
        match self {
            EntityCategory::People => &["people", "person", "인명"],
            EntityCategory::Organizations => &["organization", "organisation", "기관명"],
            EntityCategory::Statutes => &["statute", "law", "법령명"],
            EntityCategory::Dates => &["date", "날짜"],
            EntityCategory::Amounts => &["amount", "금액"],
            EntityCategory::Locations => &["location", "place", "장소"],
        }
    }
}

pub type Entities = BTreeMap<EntityCategory, Vec<String>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub document_metadata: Metadata,
    pub kind: AnalysisKind,
    pub provider: String,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub legal_issues: Vec<String>,
    pub entities: Entities,
    pub recommendations: Vec<String>,
    pub risk: Option<RiskAssessment>,
    pub error: Option<String>,
}

impl AnalysisReport {
    fn new(document_metadata: Metadata, kind: AnalysisKind, provider: String) -> Self {
        Self {
            document_metadata,
            kind,
            provider,
            summary: None,
            key_points: Vec::new(),
            legal_issues: Vec::new(),
            entities: Entities::new(),
            recommendations: Vec::new(),
            risk: None,
            error: None,
        }
    }

    pub fn not_started(kind: AnalysisKind, provider: String, reason: impl Into<String>) -> Self {
        let mut report = Self::new(Metadata::new(), kind, provider);
        report.error = Some(reason.into());
        report
    }

    fn record_error(&mut self, step: &str, error: LlmError) {
        warn!(step, error = %error, "analysis step failed");
        self.error = Some(format!("{step} error: {error}"));
    }
}

#[derive(Debug, Clone)]
pub struct ResponseParser {
    list_item: Regex,
    risk_level: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            list_item: Regex::new(r"^[0-9\-•][0-9.)\-•\s]*(.*)$")?,
            risk_level: Regex::new(
                r"(?i)(?:risk(?:\s+level)?|위험도)\s*[:：]\s*\[?\s*(high|medium|low|높음|중간|낮음)",
            )?,
        })
    }

    /// Numbered, `-` or `•` lines; the whole response when none are found.
    pub fn list_items(&self, response: &str) -> Vec<String> {
        let items: Vec<String> = response
            .lines()
            .filter_map(|line| {
                let captures = self.list_item.captures(line.trim())?;
                let item = captures.get(1)?.as_str().trim();
                (!item.is_empty()).then(|| item.to_string())
            })
            .collect();

        if items.is_empty() {
            vec![response.to_string()]
        } else {
            items
        }
    }

    /// Bullet lines grouped under the most recent category heading.
    pub fn entities(&self, response: &str) -> Entities {
        let mut entities: Entities = EntityCategory::ALL
            .iter()
            .map(|category| (*category, Vec::new()))
            .collect();
        let mut current = None;

        for line in response.lines().map(str::trim) {
            if let Some(item) = line.strip_prefix('-').or_else(|| line.strip_prefix('•')) {
                let item = item.trim();
                if let (Some(category), false) = (current, item.is_empty()) {
                    entities
                        .entry(category)
                        .or_default()
                        .push(item.to_string());
                }
                continue;
            }

            let lowered = line.to_lowercase();
            if let Some(category) = EntityCategory::ALL.into_iter().find(|category| {
                category
                    .heading_keywords()
                    .iter()
                    .any(|keyword| lowered.contains(keyword))
            }) {
                current = Some(category);
            }
        }

        entities
    }

    pub fn risk(&self, response: &str) -> RiskAssessment {
        let level = self
            .risk_level
            .captures(response)
            .and_then(|captures| captures.get(1))
            .map(|level| match level.as_str().to_lowercase().as_str() {
                "high" | "높음" => RiskLevel::High,
                "medium" | "중간" => RiskLevel::Medium,
                "low" | "낮음" => RiskLevel::Low,
                _ => RiskLevel::Unknown,
            })
            .unwrap_or(RiskLevel::Unknown);

        RiskAssessment {
            level,
            text: response.to_string(),
        }
    }
}

pub struct DocumentAnalyzer {
    llm: Arc<dyn LlmClient>,
    parser: ResponseParser,
}

impl DocumentAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Result<Self, AnalysisError> {
        Ok(Self {
            llm,
            parser: ResponseParser::new()?,
        })
    }

    pub fn provider(&self) -> String {
        self.llm.model_info().provider
    }

    pub async fn analyze(
        &self,
        content: &str,
        document_metadata: Metadata,
        kind: AnalysisKind,
    ) -> AnalysisReport {
        let mut report = AnalysisReport::new(document_metadata, kind, self.provider());

        if kind.includes(AnalysisKind::Summary) {
            let request = format!(
                "Summarise the following text in detail, paragraph by paragraph:\n\n{content}"
            );
            match self.ask(SUMMARY_PROMPT, request).await {
                Ok(summary) => report.summary = Some(summary),
                Err(error) => report.record_error("summary extraction", error),
            }
        }

        if kind.includes(AnalysisKind::KeyPoints) {
            let request = format!("Extract the key points of the following text:\n\n{content}");
            match self.ask(KEY_POINTS_PROMPT, request).await {
                Ok(response) => report.key_points = self.parser.list_items(&response),
                Err(error) => report.record_error("key points extraction", error),
            }
        }

        if kind.includes(AnalysisKind::LegalIssues) {
            let request = format!(
                "Analyse the legal issues in the following document:\n\n{content}"
            );
            match self.ask(LEGAL_ISSUES_PROMPT, request).await {
                Ok(response) => report.legal_issues = self.parser.list_items(&response),
                Err(error) => report.record_error("legal issues identification", error),
            }
        }

        if kind.includes(AnalysisKind::Entities) {
            let request = format!(
                "Extract the named entities from the following document:\n\n{content}"
            );
            match self.ask(ENTITIES_PROMPT, request).await {
                Ok(response) => report.entities = self.parser.entities(&response),
                Err(error) => report.record_error("entity extraction", error),
            }
        }

        let context = recommendation_context(&report);
        let request = format!("Give recommendations based on the following analysis:\n\n{context}");
        match self.ask(RECOMMENDATIONS_PROMPT, request).await {
            Ok(response) => report.recommendations = self.parser.list_items(&response),
            Err(error) => report.record_error("recommendations generation", error),
        }

        let issues = report
            .legal_issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");
        let request = format!("Assess the risk level of the following legal issues:\n\n{issues}");
        match self.ask(RISK_PROMPT, request).await {
            Ok(response) => report.risk = Some(self.parser.risk(&response)),
            Err(error) => report.record_error("risk assessment", error),
        }

        info!(
            kind = %kind,
            key_points = report.key_points.len(),
            legal_issues = report.legal_issues.len(),
            recommendations = report.recommendations.len(),
            failed = report.error.is_some(),
            "document analysis compiled"
        );
        report
    }

    async fn ask(&self, system_prompt: &str, user_message: String) -> Result<String, LlmError> {
        self.llm
            .complete(CompletionRequest::new(system_prompt, user_message))
            .await
    }
}

fn recommendation_context(report: &AnalysisReport) -> String {
    let mut lines = Vec::new();
    if let Some(summary) = &report.summary {
        lines.push(format!("Summary: {summary}"));
    }
    if !report.key_points.is_empty() {
        let points: Vec<&str> = report
            .key_points
            .iter()
            .take(RECOMMENDATION_CONTEXT_ITEMS)
            .map(String::as_str)
            .collect();
        lines.push(format!("Key points: {}", points.join(", ")));
    }
    if !report.legal_issues.is_empty() {
        let issues: Vec<&str> = report
            .legal_issues
            .iter()
            .take(RECOMMENDATION_CONTEXT_ITEMS)
            .map(String::as_str)
            .collect();
        lines.push(format!("Legal issues: {}", issues.join(", ")));
    }
    lines.join("\n")
}
