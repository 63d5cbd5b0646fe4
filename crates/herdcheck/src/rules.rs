//! Demonstration data-quality rules for registry records.
//!
//! These cover the common export defects (missing breed, missing or
//! impossible date of birth); real deployments register their own rule set
//! against the same pipeline.

use anyhow::Result;
use chrono::Utc;
use herdcheck_core::{
    AnalysisContext, IssueCode, IssueDetection, Rule, RuleCode, RuleError, RulePipeline,
    RuleResult,
};
use std::sync::Arc;

use crate::records::RegistryRecord;

fn detection(code: &IssueCode, record: &RegistryRecord, description: &str) -> IssueDetection {
    let mut detection = IssueDetection::new(code.clone());
    detection.error_description = Some(description.to_string());
    detection.contact = record.contact();
    detection
}

struct MissingBreed {
    rule_code: RuleCode,
    issue_code: IssueCode,
}

impl Rule<RegistryRecord> for MissingBreed {
    fn code(&self) -> RuleCode {
        self.rule_code.clone()
    }

    fn evaluate(
        &self,
        record: &RegistryRecord,
        _ctx: &AnalysisContext,
    ) -> Result<RuleResult, RuleError> {
        match &record.breed {
            Some(breed) if !breed.trim().is_empty() => Ok(RuleResult::Clean),
            _ => Ok(RuleResult::Issue(detection(
                &self.issue_code,
                record,
                "no breed recorded for this animal",
            ))),
        }
    }
}

struct MissingDateOfBirth {
    rule_code: RuleCode,
    issue_code: IssueCode,
}

impl Rule<RegistryRecord> for MissingDateOfBirth {
    fn code(&self) -> RuleCode {
        self.rule_code.clone()
    }

    fn evaluate(
        &self,
        record: &RegistryRecord,
        _ctx: &AnalysisContext,
    ) -> Result<RuleResult, RuleError> {
        if record.date_of_birth.is_some() {
            Ok(RuleResult::Clean)
        } else {
            Ok(RuleResult::Issue(detection(
                &self.issue_code,
                record,
                "no date of birth recorded for this animal",
            )))
        }
    }
}

struct DateOfBirthInFuture {
    rule_code: RuleCode,
    issue_code: IssueCode,
}

impl Rule<RegistryRecord> for DateOfBirthInFuture {
    fn code(&self) -> RuleCode {
        self.rule_code.clone()
    }

    fn evaluate(
        &self,
        record: &RegistryRecord,
        _ctx: &AnalysisContext,
    ) -> Result<RuleResult, RuleError> {
        match record.date_of_birth {
            Some(dob) if dob > Utc::now().date_naive() => {
                let mut found = detection(
                    &self.issue_code,
                    record,
                    "date of birth is in the future",
                );
                found.context.insert("date_of_birth".to_string(), dob.to_string());
                Ok(RuleResult::Issue(found))
            }
            _ => Ok(RuleResult::Clean),
        }
    }
}

/// The default pipeline: every rule runs for every record.
pub fn default_pipeline() -> Result<RulePipeline<RegistryRecord>> {
    Ok(RulePipeline::builder()
        .continue_always(Arc::new(MissingBreed {
            rule_code: RuleCode::parse("MissingBreed")?,
            issue_code: IssueCode::parse("DQ-101")?,
        }))
        .continue_always(Arc::new(MissingDateOfBirth {
            rule_code: RuleCode::parse("MissingDateOfBirth")?,
            issue_code: IssueCode::parse("DQ-102")?,
        }))
        .continue_always(Arc::new(DateOfBirthInFuture {
            rule_code: RuleCode::parse("DateOfBirthInFuture")?,
            issue_code: IssueCode::parse("DQ-103")?,
        }))
        .build())
}
