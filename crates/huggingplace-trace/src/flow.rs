//! Multi-step flow tracing.
//!
//! Runs an ordered list of steps under one trace id. Every step span uses the
//! flow's trace id as its parent, and each step receives the outcomes of the
//! steps before it.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::ids::generate_id;
use crate::tracer::{SpanOptions, Tracer};
use crate::types::Fields;

/// Result of one flow step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step returned a value.
    Completed(Value),

    /// The step failed and was allowed to continue.
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            StepOutcome::Completed(v) => Some(v),
            StepOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StepOutcome::Completed(_) => None,
            StepOutcome::Failed { error } => Some(error),
        }
    }
}

// Completed steps serialize as their value, failures as `{"error": msg}`.
impl Serialize for StepOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StepOutcome::Completed(v) => v.serialize(serializer),
            StepOutcome::Failed { error } => json!({ "error": error }).serialize(serializer),
        }
    }
}

type StepWork<E> = Box<dyn FnOnce(Vec<StepOutcome>) -> BoxFuture<'static, Result<Value, E>> + Send>;

/// One step of a flow.
pub struct FlowStep<E> {
    name: String,
    work: StepWork<E>,
    tags: Option<Vec<String>>,
    priority: Option<String>,
    attributes: Fields,
    logs: Fields,
    continue_on_error: bool,
}

impl<E> fmt::Debug for FlowStep<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStep")
            .field("name", &self.name)
            .field("continue_on_error", &self.continue_on_error)
            .finish_non_exhaustive()
    }
}

impl<E: 'static> FlowStep<E> {
    /// A step that receives the outcomes of all previous steps.
    pub fn new<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(Vec<StepOutcome>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            work: Box::new(move |previous| work(previous).boxed()),
            tags: None,
            priority: None,
            attributes: Fields::new(),
            logs: Fields::new(),
            continue_on_error: false,
        }
    }
}

impl<E> FlowStep<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the flow-level tags for this step.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the flow-level priority for this step.
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), v);
        }
        self
    }

    pub fn with_log(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.logs.insert(key.into(), v);
        }
        self
    }

    /// Record a failure of this step and keep going instead of aborting the flow.
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }
}

impl Tracer {
    /// Run `steps` in order under one trace id.
    ///
    /// `options.trace_id` is used when set, otherwise one is generated; it is
    /// also every step's parent span id. Returns one outcome per step. A failed
    /// step without `continue_on_error` ends the flow with its error, unchanged;
    /// later steps neither run nor emit.
    pub async fn trace_flow<E>(
        &self,
        flow_name: impl Into<String>,
        steps: Vec<FlowStep<E>>,
        options: SpanOptions,
    ) -> Result<Vec<StepOutcome>, E>
    where
        E: fmt::Display,
    {
        let flow_name = flow_name.into();
        let SpanOptions {
            trace_id,
            user_metadata,
            org_data,
            custom_metadata,
            logs,
            attributes,
            tags,
            priority,
            error_type,
            ..
        } = options;
        let trace_id = trace_id.unwrap_or_else(generate_id);

        let mut flow_attributes = Fields::from([
            ("workflow.name".to_string(), json!(flow_name)),
            ("workflow.step_count".to_string(), json!(steps.len())),
        ]);
        flow_attributes.extend(attributes);

        let step_names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        let mut flow_logs = Fields::from([("workflow.steps".to_string(), json!(step_names))]);
        flow_logs.extend(logs);

        let mut flow_metadata = custom_metadata;
        flow_metadata.insert("flowName".to_string(), json!(flow_name));

        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(steps.len());

        for (order, step) in steps.into_iter().enumerate() {
            let FlowStep {
                name,
                work,
                tags: step_tags,
                priority: step_priority,
                attributes: step_attributes,
                logs: step_logs,
                continue_on_error,
            } = step;

            let mut span_attributes = flow_attributes.clone();
            span_attributes.insert("workflow.step_order".to_string(), json!(order));
            span_attributes.insert("workflow.step_name".to_string(), json!(name));
            span_attributes.extend(step_attributes);

            let mut span_logs = flow_logs.clone();
            span_logs.insert(
                "workflow.previous_results".to_string(),
                serde_json::to_value(&outcomes).unwrap_or(Value::Null),
            );
            span_logs.extend(step_logs);

            let mut span_metadata = flow_metadata.clone();
            span_metadata.insert("stepOrder".to_string(), json!(order));
            span_metadata.insert("stepName".to_string(), json!(name));

            let span = SpanOptions {
                trace_id: Some(trace_id.clone()),
                parent_span_id: Some(trace_id.clone()),
                user_metadata: user_metadata.clone(),
                org_data: org_data.clone(),
                custom_metadata: span_metadata,
                logs: span_logs,
                attributes: span_attributes,
                tags: step_tags.unwrap_or_else(|| tags.clone()),
                priority: step_priority.or_else(|| priority.clone()),
                error_type: error_type.clone(),
            };

            match self.trace_step(name.clone(), span, work(outcomes.clone())).await {
                Ok(value) => outcomes.push(StepOutcome::Completed(value)),
                Err(error) if continue_on_error => {
                    tracing::debug!(
                        flow = %flow_name,
                        step = %name,
                        error = %error,
                        "Flow step failed, continuing"
                    );
                    outcomes.push(StepOutcome::Failed {
                        error: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Ok(outcomes)
    }
}
