//! Fake push channel for tests.

use async_trait::async_trait;
use herald_core::types::DeviceToken;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::channel::{PushChannel, PushError, PushMessage};

/// Records every successful send. Tokens can be scripted to fail.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, PushMessage)>>,
    failures: Mutex<HashMap<String, PushError>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every future send to `token` fails with `error`.
    pub fn fail_token(&self, token: &str, error: PushError) {
        self.failures.lock().unwrap().insert(token.to_string(), error);
    }

    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn send(&self, token: &DeviceToken, message: &PushMessage) -> Result<(), PushError> {
        if let Some(error) = self.failures.lock().unwrap().get(&token.token) {
            return Err(error.clone());
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.token.clone(), message.clone()));
        Ok(())
    }
}
