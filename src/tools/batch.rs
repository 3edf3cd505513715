//! Batch Processor
//!
//! Executes one command's validated tool calls:
//!
//! 1. Partition into creation calls and individual calls, keeping indices
//! 2. Expand every creation call into its attribute sets
//! 3. Submit the whole creation group as one atomic multi-insert
//! 4. Dispatch each individual call on its own
//! 5. Splice all results back into the original order
//!
//! The creation group and each individual call run as separate jobs with
//! bounded concurrency. Each job is spawned, so a caller that goes away drops
//! only jobs not yet started; a started batch insert commits or rolls back
//! as a whole.

use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::catalog::ToolKind;
use super::creation::creation_attrs;
use super::dispatch::{ToolDispatcher, created_data};
use crate::types::{
    CanvasObjectAttrs, ErrorKind, ExecutionResult, ToolCall, ToolFailure, ToolOutcome,
};

enum Job {
    Creation(Vec<(usize, ToolCall)>),
    Individual(usize, ToolCall),
}

impl Job {
    fn indices(&self) -> Vec<usize> {
        match self {
            Job::Creation(calls) => calls.iter().map(|(i, _)| *i).collect(),
            Job::Individual(i, _) => vec![*i],
        }
    }
}

type Outcomes = Vec<(usize, ToolOutcome)>;

#[derive(Clone)]
pub struct BatchProcessor {
    dispatcher: Arc<ToolDispatcher>,
}

impl BatchProcessor {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Execute every call; the result list matches `calls` in length and order
    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn execute(&self, calls: &[ToolCall], canvas_id: &str) -> Vec<ExecutionResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        let mut creation = Vec::new();
        let mut jobs = Vec::new();
        for (index, call) in calls.iter().enumerate() {
            if ToolKind::parse(&call.name).is_some_and(|k| k.is_creation()) {
                creation.push((index, call.clone()));
            } else {
                jobs.push(Job::Individual(index, call.clone()));
            }
        }
        if !creation.is_empty() {
            debug!(creation_calls = creation.len(), "Batching creation calls");
            jobs.insert(0, Job::Creation(creation));
        }

        let concurrency = self.dispatcher.execution_config().max_concurrency.max(1);
        let finished: Vec<Outcomes> = stream::iter(jobs)
            .map(|job| self.spawn_job(job, canvas_id))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut slots: Vec<Option<ToolOutcome>> = vec![None; calls.len()];
        for (index, outcome) in finished.into_iter().flatten() {
            slots[index] = Some(outcome);
        }

        calls
            .iter()
            .zip(slots)
            .map(|(call, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    ToolFailure::new(ErrorKind::Internal, "Tool call produced no result").into()
                });
                ExecutionResult::new(call, outcome)
            })
            .collect()
    }

    async fn spawn_job(&self, job: Job, canvas_id: &str) -> Outcomes {
        let indices = job.indices();
        let dispatcher = Arc::clone(&self.dispatcher);
        let canvas_id = canvas_id.to_string();

        let handle = tokio::spawn(async move {
            match job {
                Job::Creation(calls) => run_creation_group(&dispatcher, &canvas_id, calls).await,
                Job::Individual(index, call) => {
                    vec![(index, dispatcher.execute(&canvas_id, &call).await)]
                }
            }
        });

        match handle.await {
            Ok(outcomes) => outcomes,
            Err(join_error) => {
                warn!(error = %join_error, "Tool job aborted");
                let failure = ToolFailure::new(
                    ErrorKind::Internal,
                    format!("Tool execution aborted: {}", join_error),
                );
                indices
                    .into_iter()
                    .map(|i| (i, ToolOutcome::from(failure.clone())))
                    .collect()
            }
        }
    }
}

/// Expand, insert atomically, then hand each call its slice of the objects
async fn run_creation_group(
    dispatcher: &ToolDispatcher,
    canvas_id: &str,
    calls: Vec<(usize, ToolCall)>,
) -> Outcomes {
    let mut attrs: Vec<CanvasObjectAttrs> = Vec::new();
    let mut spans = Vec::with_capacity(calls.len());

    for (position, (index, call)) in calls.iter().enumerate() {
        let Some(kind) = ToolKind::parse(&call.name) else {
            continue;
        };
        match creation_attrs(
            kind,
            &call.input,
            dispatcher.canvas_config(),
            dispatcher.execution_config(),
        ) {
            Ok(expanded) => {
                spans.push((*index, attrs.len(), expanded.len()));
                attrs.extend(expanded);
            }
            Err(failure) => {
                let reason = format!("call #{} ({}): {}", position, call.name, failure.message);
                return fail_group(&calls, reason);
            }
        }
    }

    match dispatcher.create(canvas_id, attrs).await {
        Ok(created) => spans
            .into_iter()
            .map(|(index, start, len)| {
                let slice = &created[start..start + len];
                (index, ToolOutcome::success(created_data(slice)))
            })
            .collect(),
        Err(err) => {
            let reason = match &err {
                crate::canvas::StoreError::InvalidAttributes { index, reason } => {
                    let owner = spans
                        .iter()
                        .find(|(_, start, len)| (*start..start + len).contains(index))
                        .map(|(i, _, _)| *i);
                    match owner {
                        Some(call_index) => format!(
                            "object {} of tool call {} rejected: {}",
                            index, call_index, reason
                        ),
                        None => err.to_string(),
                    }
                }
                other => other.to_string(),
            };
            fail_group(&calls, reason)
        }
    }
}

/// The whole creation group reports one shared failure
fn fail_group(calls: &[(usize, ToolCall)], reason: String) -> Outcomes {
    warn!(calls = calls.len(), %reason, "Creation batch rejected");
    let failure = ToolFailure::new(
        ErrorKind::BatchInsertFailed,
        format!("Creation batch rejected: {}", reason),
    );
    calls
        .iter()
        .map(|(index, _)| (*index, ToolOutcome::from(failure.clone())))
        .collect()
}

/// Objects returned for a successful creation result
pub fn created_objects(outcome: &ToolOutcome) -> Vec<Value> {
    match outcome {
        ToolOutcome::Success { data } => data
            .get("objects")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        ToolOutcome::Error { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CanvasEventBus, CanvasStore, MemoryCanvasStore};
    use crate::config::{CanvasConfig, ExecutionConfig};
    use crate::types::{Bounds, CanvasObject};
    use proptest::prelude::*;
    use serde_json::json;

    fn processor() -> (Arc<MemoryCanvasStore>, BatchProcessor) {
        let store = Arc::new(MemoryCanvasStore::new());
        store.insert_canvas("c1", "Board");
        let dispatcher = ToolDispatcher::new(
            store.clone(),
            CanvasEventBus::default(),
            CanvasConfig::default(),
            ExecutionConfig::default(),
        );
        (store, BatchProcessor::new(Arc::new(dispatcher)))
    }

    fn call(id: &str, name: &str, input: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: input.as_object().cloned().unwrap_or_default(),
        }
    }

    fn bounds(value: &Value) -> Bounds {
        let object: CanvasObject = serde_json::from_value(value.clone()).unwrap();
        object.bounds()
    }

    #[tokio::test]
    async fn test_mixed_calls_keep_order() {
        let (store, processor) = processor();
        let calls = vec![
            call("t1", "create_shape", json!({"shapeType": "rectangle", "x": 0, "y": 0})),
            call("t2", "move_object", json!({"objectId": "missing", "x": 1, "y": 1})),
            call("t3", "create_text", json!({"text": "Title", "x": 0, "y": 200})),
        ];

        let results = processor.execute(&calls, "c1").await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].tool, "create_shape");
        assert!(results[0].is_success());
        assert_eq!(results[1].result.error_kind(), Some(ErrorKind::ObjectNotFound));
        assert!(results[2].is_success());
        for (result, call) in results.iter().zip(&calls) {
            assert_eq!(result.input, call.input);
        }
        assert_eq!(store.object_count("c1"), 2);
    }

    #[tokio::test]
    async fn test_repeated_shapes_commit_at_fixed_step() {
        let (store, processor) = processor();
        let calls = vec![call(
            "t1",
            "create_shape",
            json!({"shapeType": "rectangle", "color": "red", "width": 50, "height": 30, "x": 0, "y": 0, "count": 5}),
        )];

        let results = processor.execute(&calls, "c1").await;
        let objects = created_objects(&results[0].result);
        assert_eq!(objects.len(), 5);
        let xs: Vec<f64> = objects.iter().map(|o| bounds(o).x).collect();
        assert!(xs.windows(2).all(|w| w[1] - w[0] == 75.0));
        assert_eq!(store.object_count("c1"), 5);
    }

    #[tokio::test]
    async fn test_one_bad_creation_fails_whole_group() {
        let (store, processor) = processor();
        let calls = vec![
            call("t1", "create_shape", json!({"shapeType": "rectangle"})),
            call("t2", "get_canvas_state", json!({})),
            call("t3", "create_shape", json!({"shapeType": "rectangle", "width": -5})),
            call("t4", "create_sticky_note", json!({"text": "note"})),
        ];

        let results = processor.execute(&calls, "c1").await;
        assert_eq!(results.len(), 4);
        for i in [0, 2, 3] {
            assert_eq!(results[i].result.error_kind(), Some(ErrorKind::BatchInsertFailed));
        }
        assert!(results[1].is_success());
        assert_eq!(store.object_count("c1"), 0);
    }

    #[tokio::test]
    async fn test_undecodable_creation_fails_group() {
        let (store, processor) = processor();
        let calls = vec![
            call("t1", "create_text", json!({"x": 0})),
            call("t2", "create_shape", json!({"shapeType": "ellipse"})),
        ];
        let results = processor.execute(&calls, "c1").await;
        assert!(results.iter().all(|r| r.result.error_kind() == Some(ErrorKind::BatchInsertFailed)));
        assert_eq!(store.object_count("c1"), 0);
    }

    #[tokio::test]
    async fn test_creation_group_is_one_event() {
        let (_, processor) = processor();
        let mut rx = processor.dispatcher().events().subscribe();
        let calls = vec![
            call("t1", "create_shape", json!({"shapeType": "rectangle", "count": 2})),
            call("t2", "create_frame", json!({"title": "Login"})),
        ];
        processor.execute(&calls, "c1").await;
        match rx.try_recv().unwrap() {
            crate::canvas::CanvasEvent::ObjectsCreated { objects, .. } => assert_eq!(objects.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (_, processor) = processor();
        assert!(processor.execute(&[], "c1").await.is_empty());
    }

    fn arb_call() -> impl Strategy<Value = ToolCall> {
        prop_oneof![
            (0i32..500, 1u32..4).prop_map(|(x, count)| call(
                "c",
                "create_shape",
                json!({"shapeType": "rectangle", "x": x, "count": count})
            )),
            "[a-z]{1,8}".prop_map(|id| call("m", "move_object", json!({"objectId": id, "x": 0, "y": 0}))),
            Just(call("s", "get_canvas_state", json!({}))),
            "[a-z]{1,8}".prop_map(|t| call("u", &format!("tool_{}", t), json!({"k": t}))),
            (1u32..40).prop_map(|n| call("t", "create_text", json!({"text": "x".repeat(n as usize)}))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_results_preserve_order(calls in prop::collection::vec(arb_call(), 0..12)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let results = runtime.block_on(async {
                let (_, processor) = processor();
                processor.execute(&calls, "c1").await
            });

            prop_assert_eq!(results.len(), calls.len());
            for (result, call) in results.iter().zip(&calls) {
                prop_assert_eq!(&result.tool, &call.name);
                prop_assert_eq!(&result.input, &call.input);
            }
        }

        #[test]
        fn prop_repetition_never_overlaps(
            count in 1u32..25,
            width in 1.0f64..300.0,
            height in 1.0f64..300.0,
            vertical in any::<bool>(),
        ) {
            let direction = if vertical { "vertical" } else { "horizontal" };
            let calls = vec![call(
                "t1",
                "create_shape",
                json!({"shapeType": "rectangle", "width": width, "height": height, "count": count, "direction": direction}),
            )];

            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (committed, results) = runtime.block_on(async {
                let (store, processor) = processor();
                let results = processor.execute(&calls, "c1").await;
                (store.list_objects("c1").await.unwrap(), results)
            });

            prop_assert_eq!(committed.len(), count as usize);
            let placed: Vec<Bounds> = created_objects(&results[0].result).iter().map(bounds).collect();
            prop_assert_eq!(placed.len(), count as usize);
            for i in 0..placed.len() {
                for j in (i + 1)..placed.len() {
                    prop_assert!(!placed[i].overlaps(&placed[j]));
                }
            }
        }
    }
}
