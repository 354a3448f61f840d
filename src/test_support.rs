use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use crate::{
    config::ModelSet,
    gateway::{ChatRequest, GenerativeService, MessageContent, RawResponse, TransportError},
    pipeline::Orchestrator,
    retry::RetryPolicy,
};

pub enum Reply {
    Text(&'static str),
    Image(&'static str),
    Status(u16),
    Body(&'static str),
    Unreachable,
    /// Never answers.
    Hang,
}

/// In-memory gateway that answers calls in order from a script and records every request.
#[derive(Default)]
pub struct ScriptedService {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedService {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into_iter().collect()), calls: Mutex::default() })
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    /// Labels each recorded call by the stage that made it.
    pub fn call_labels(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(label_call).collect()
    }
}

pub fn models() -> ModelSet {
    ModelSet { vision: "vision-model".into(), text: "text-model".into(), image: "image-model".into() }
}

pub fn orchestrator(service: Arc<ScriptedService>) -> Orchestrator {
    Orchestrator::new(service, models(), RetryPolicy { max_attempts: 1, ..RetryPolicy::default() })
}

fn label_call(req: &ChatRequest) -> &'static str {
    match req.model.as_str() {
        "vision-model" => "vision",
        "image-model" => "image",
        _ => match req.messages.first().map(|m| &m.content) {
            Some(MessageContent::Text(system)) if system.contains("prompt engineer") => "prompt",
            Some(MessageContent::Text(system)) if system.contains("copywriter") => "caption",
            _ => "unknown",
        },
    }
}

fn ok_json(value: serde_json::Value) -> RawResponse {
    RawResponse { status: 200, body: Bytes::from(value.to_string()) }
}

#[async_trait]
impl GenerativeService for ScriptedService {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(request.clone());
        let reply = self.replies.lock().pop_front();
        match reply.unwrap_or_else(|| panic!("unscripted gateway call to {}", request.model)) {
            Reply::Text(text) => Ok(ok_json(json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] }))),
            Reply::Image(url) => Ok(ok_json(json!({ "choices": [{ "message": {
                "role": "assistant",
                "content": "Here is your image.",
                "images": [{ "type": "image_url", "image_url": { "url": url } }]
            } }] }))),
            Reply::Status(status) => Ok(RawResponse { status, body: Bytes::from_static(b"{\"error\":\"upstream\"}") }),
            Reply::Body(body) => Ok(RawResponse { status: 200, body: Bytes::from_static(body.as_bytes()) }),
            Reply::Unreachable => Err(TransportError::Connect("connection refused".into())),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
