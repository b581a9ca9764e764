//! Typed run inputs stored in `Run.input`, one per task kind.

use relay_store::Run;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assistant::{AssistantContext, AssistantRequest};
use crate::capabilities::ReplyTarget;
use crate::executor::TaskError;

/// Input of a `thread_summary` run: the thread to summarize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummaryTask {
    pub channel_id: String,
    pub thread_ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Where the summary is posted. Absent on older runs, which reply in the thread itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyTarget>,
}

impl ThreadSummaryTask {
    pub fn reply_target(&self) -> ReplyTarget {
        self.reply.clone().unwrap_or_else(|| ReplyTarget {
            channel_id: self.channel_id.clone(),
            thread_ts: Some(self.thread_ts.clone()),
        })
    }
}

/// Input of an `assistant_reply` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReplyTask {
    pub request: AssistantRequest,
    #[serde(default)]
    pub context: AssistantContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyTarget>,
}

pub trait RunInput: Serialize + DeserializeOwned {
    fn to_input(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn from_run(run: &Run) -> Result<Self, TaskError> {
        serde_json::from_value(run.input.clone()).map_err(|error| TaskError::InvalidInput {
            run_id: run.id.clone(),
            message: error.to_string(),
        })
    }
}

impl RunInput for ThreadSummaryTask {}
impl RunInput for AssistantReplyTask {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_summary_reply_target_defaults_to_the_thread() {
        let task: ThreadSummaryTask =
            serde_json::from_value(json!({ "channel_id": "C1", "thread_ts": "1739999999.000100" }))
                .expect("parse");
        assert_eq!(
            task.reply_target(),
            ReplyTarget {
                channel_id: "C1".to_string(),
                thread_ts: Some("1739999999.000100".to_string()),
            }
        );
        assert_eq!(
            task.to_input().expect("input"),
            json!({ "channel_id": "C1", "thread_ts": "1739999999.000100" })
        );
    }
}
