use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use scholarhub_core::{DocumentId, DomainError, DomainResult, ValueObject};

/// Research field enumeration offered by the submission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchField {
    PublicHealth,
    Agriculture,
    MiningEngineering,
    TechnologyIct,
    ArtificialIntelligence,
}

impl ResearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchField::PublicHealth => "public_health",
            ResearchField::Agriculture => "agriculture",
            ResearchField::MiningEngineering => "mining_engineering",
            ResearchField::TechnologyIct => "technology_ict",
            ResearchField::ArtificialIntelligence => "artificial_intelligence",
        }
    }
}

impl core::str::FromStr for ResearchField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public_health" => Ok(ResearchField::PublicHealth),
            "agriculture" => Ok(ResearchField::Agriculture),
            "mining_engineering" => Ok(ResearchField::MiningEngineering),
            "technology_ict" => Ok(ResearchField::TechnologyIct),
            "artificial_intelligence" => Ok(ResearchField::ArtificialIntelligence),
            other => Err(DomainError::validation(format!(
                "unknown research field: {other}"
            ))),
        }
    }
}

/// Author identity captured with every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub full_name: String,
    pub email: String,
    pub country: String,
    pub institution: String,
}

impl ValueObject for Author {}

/// Reference to a document held by the external upload store.
///
/// The core never touches document bytes; it only records the handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: DocumentId,
    pub file_name: String,
}

impl ValueObject for DocumentRef {}

/// Abstract body: inline text or an uploaded document, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractContent {
    Inline(String),
    Document(DocumentRef),
}

impl ValueObject for AbstractContent {}

/// Raw submission draft as handed over by the form capture layer.
///
/// The form performs no validation beyond field presence, so everything here
/// is optional or unchecked; [`SubmissionDraft::validate`] is the single
/// place that decides whether a draft is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub full_name: String,
    pub email: String,
    pub country: String,
    pub institution: String,
    pub field: Option<ResearchField>,
    pub year: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    pub abstract_text: Option<String>,
    pub document: Option<DocumentRef>,
}

impl SubmissionDraft {
    /// Validate required fields, reporting every missing field at once.
    ///
    /// Required: full name, well-formed email, field, title, and exactly one
    /// of abstract text / document.
    pub fn validate(&self) -> DomainResult<()> {
        let mut missing: Vec<&str> = Vec::new();

        if self.full_name.trim().is_empty() {
            missing.push("full_name");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if self.field.is_none() {
            missing.push("field");
        }
        if self.title.trim().is_empty() {
            missing.push("title");
        }

        let has_text = self
            .abstract_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let has_document = self.document.is_some();
        if !has_text && !has_document {
            missing.push("abstract");
        }

        if !missing.is_empty() {
            return Err(DomainError::validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        if has_text && has_document {
            return Err(DomainError::validation(
                "provide either abstract text or an uploaded document, not both",
            ));
        }

        if !is_well_formed_email(&self.email) {
            return Err(DomainError::validation(format!(
                "malformed email address: {}",
                self.email
            )));
        }

        Ok(())
    }

    /// The validated abstract body. Call after [`Self::validate`].
    pub fn content(&self) -> Option<AbstractContent> {
        if let Some(doc) = &self.document {
            return Some(AbstractContent::Document(doc.clone()));
        }
        self.abstract_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| AbstractContent::Inline(t.to_string()))
    }

    pub fn author(&self) -> Author {
        Author {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            country: self.country.trim().to_string(),
            institution: self.institution.trim().to_string(),
        }
    }
}

/// Minimal structural email check: non-empty local part, a domain with a dot.
///
/// Deliverability is the mail system's problem, not the domain model's.
fn is_well_formed_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !domain.contains('@')
}
