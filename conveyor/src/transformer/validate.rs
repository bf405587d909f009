use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::transformer::base::{TransformInput, TransformOutput, Transformer};
use crate::types::{Cell, Dataset, RecordVerdict, ValidationReport};

/// Rule checks supported by the validation transformer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "check")]
enum RuleCheck {
    /// The field must carry a non-null value.
    NotNull,
    /// Numeric fields must be at least this value.
    Min { value: f64 },
    /// Numeric fields must be at most this value.
    Max { value: f64 },
    /// The field's display form must be one of these values.
    OneOf { values: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OnViolation {
    Flag,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldRule {
    field: String,
    #[serde(flatten)]
    check: RuleCheck,
    /// What happens to a record violating this rule; flagged records stay,
    /// rejected records are dropped.
    #[serde(default = "default_on_violation")]
    on_violation: OnViolation,
}

fn default_on_violation() -> OnViolation {
    OnViolation::Flag
}

#[derive(Debug, Deserialize)]
struct ValidateOptions {
    rules: Vec<FieldRule>,
}

/// Transformer applying per-record data-quality rules.
///
/// Rule violations are expected data conditions, so each record gets an
/// accept/flag/reject verdict aggregated into a [`ValidationReport`]; nothing
/// here is raised as an error. Rejected records are dropped from the dataset,
/// flagged records stay and the dataset is tagged with the flag count.
#[derive(Debug)]
pub struct ValidateTransformer {
    rules: Vec<FieldRule>,
}

impl ValidateTransformer {
    pub fn from_options(options: &serde_json::Value) -> ConveyorResult<Self> {
        let options: ValidateOptions = serde_json::from_value(options.clone()).map_err(|err| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Invalid validation transformer options",
                err
            )
        })?;

        if options.rules.is_empty() {
            return Err(conveyor_error!(
                ErrorKind::ConfigError,
                "Validation transformer declares no rules"
            ));
        }

        Ok(Self {
            rules: options.rules,
        })
    }

    fn check_cell(check: &RuleCheck, cell: &Cell) -> bool {
        match check {
            RuleCheck::NotNull => !cell.is_null(),
            RuleCheck::Min { value } => match cell {
                Cell::Int(v) => (*v as f64) >= *value,
                Cell::Float(v) => *v >= *value,
                Cell::Null => true,
                _ => false,
            },
            RuleCheck::Max { value } => match cell {
                Cell::Int(v) => (*v as f64) <= *value,
                Cell::Float(v) => *v <= *value,
                Cell::Null => true,
                _ => false,
            },
            RuleCheck::OneOf { values } => {
                cell.is_null() || values.iter().any(|allowed| *allowed == cell.to_string())
            }
        }
    }
}

#[async_trait]
impl Transformer for ValidateTransformer {
    async fn transform(&self, input: TransformInput) -> ConveyorResult<TransformOutput> {
        let dataset = input.into_single()?;
        let mut report = ValidationReport::default();

        // Resolve rule targets once; a rule naming an absent field applies to
        // no record and is reported up front.
        let mut resolved: Vec<(usize, &FieldRule)> = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            match dataset.schema.field_index(&rule.field) {
                Some(index) => resolved.push((index, rule)),
                None => warn!(field = rule.field, "validation rule targets an absent field"),
            }
        }

        let mut kept = Vec::with_capacity(dataset.rows.len());
        for row in dataset.rows {
            let mut verdict = RecordVerdict::Accept;
            for (index, rule) in &resolved {
                if !Self::check_cell(&rule.check, &row.values[*index]) {
                    report.record_failure(&rule.field);
                    verdict = match rule.on_violation {
                        OnViolation::Reject => RecordVerdict::Reject,
                        OnViolation::Flag if verdict == RecordVerdict::Accept => {
                            RecordVerdict::Flag
                        }
                        OnViolation::Flag => verdict,
                    };
                    if verdict == RecordVerdict::Reject {
                        break;
                    }
                }
            }

            report.record(verdict);
            if verdict != RecordVerdict::Reject {
                kept.push(row);
            }
        }

        info!(
            dataset = dataset.name,
            total = report.total,
            accepted = report.accepted,
            flagged = report.flagged,
            rejected = report.rejected,
            "validation finished"
        );

        let mut validated = Dataset::new(
            dataset.name.clone(),
            dataset.schema.clone(),
            kept,
            dataset.metadata.clone(),
        )?;
        if report.flagged > 0 {
            validated.tag(format!("flagged:{}", report.flagged));
        }
        if report.rejected > 0 {
            validated.tag(format!("rejected:{}", report.rejected));
        }

        Ok(TransformOutput::Replace(validated))
    }
}
