//! SeaORM entity models
//!
//! Database entities for the evaluation pipeline

mod document;
mod evaluation_job;

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, DocType, Entity as DocumentEntity,
    Model as Document,
};

pub use evaluation_job::{
    ActiveModel as EvaluationJobActiveModel, Column as EvaluationJobColumn,
    Entity as EvaluationJobEntity, JobStatus, Model as EvaluationJob,
};
