//! Document entity
//!
//! Documents are owned by the upload subsystem; the evaluation core
//! only reads `extracted_text` from them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document type enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Cv,
    ProjectReport,
    JobDescription,
    CaseStudy,
    CvRubric,
    ProjectRubric,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Cv => "cv",
            DocType::ProjectReport => "project_report",
            DocType::JobDescription => "job_description",
            DocType::CaseStudy => "case_study",
            DocType::CvRubric => "cv_rubric",
            DocType::ProjectRubric => "project_rubric",
        }
    }

    pub fn parse(s: &str) -> Option<DocType> {
        match s {
            "cv" => Some(DocType::Cv),
            "project_report" => Some(DocType::ProjectReport),
            "job_description" => Some(DocType::JobDescription),
            "case_study" => Some(DocType::CaseStudy),
            "cv_rubric" => Some(DocType::CvRubric),
            "project_rubric" => Some(DocType::ProjectRubric),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub doc_type: String,

    #[sea_orm(column_type = "Text")]
    pub extracted_text: String,

    /// Set once the document has been indexed into a retrieval collection
    pub vectorized: bool,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the document type as an enum, if recognized
    pub fn document_type(&self) -> Option<DocType> {
        DocType::parse(&self.doc_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for ty in [
            DocType::Cv,
            DocType::ProjectReport,
            DocType::JobDescription,
            DocType::CaseStudy,
            DocType::CvRubric,
            DocType::ProjectRubric,
        ] {
            assert_eq!(DocType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(DocType::parse("spreadsheet"), None);
    }
}
