//! Scripted broker transport for driving the session without a broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{SessionError, SessionResult};
use crate::session::{BrokerTransport, TransportEvent};

pub fn conn_ack() -> SessionResult<TransportEvent> {
    Ok(TransportEvent::ConnAck { accepted: true })
}

pub fn sub_ack(granted: bool) -> SessionResult<TransportEvent> {
    Ok(TransportEvent::SubAck { granted })
}

pub fn publish(topic: &str, payload: &[u8]) -> SessionResult<TransportEvent> {
    Ok(TransportEvent::Publish {
        topic: topic.to_string(),
        payload: Bytes::copy_from_slice(payload),
    })
}

#[derive(Default)]
struct RecorderState {
    subscribes: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
    fail_subscribe: AtomicBool,
    fail_disconnect: AtomicBool,
}

/// Observes and steers a [`ScriptedTransport`] after it moved into a session
#[derive(Clone, Default)]
pub struct TransportRecorder {
    state: Arc<RecorderState>,
}

impl TransportRecorder {
    pub fn subscribes(&self) -> Vec<String> {
        self.state.subscribes.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn fail_subscribe(&self) {
        self.state.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self) {
        self.state.fail_disconnect.store(true, Ordering::SeqCst);
    }
}

/// Replays a fixed list of events, then behaves like an idle broker
pub struct ScriptedTransport {
    script: VecDeque<SessionResult<TransportEvent>>,
    recorder: TransportRecorder,
}

impl ScriptedTransport {
    pub fn new(script: Vec<SessionResult<TransportEvent>>) -> (Self, TransportRecorder) {
        let recorder = TransportRecorder::default();
        let transport = Self {
            script: script.into(),
            recorder: recorder.clone(),
        };
        (transport, recorder)
    }
}

#[async_trait]
impl BrokerTransport for ScriptedTransport {
    async fn next_event(&mut self) -> SessionResult<TransportEvent> {
        match self.script.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    fn request_subscribe(&mut self, topic: &str) -> SessionResult<()> {
        if self.recorder.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SessionError::Subscribe("request queue full".to_string()));
        }
        self.recorder
            .state
            .subscribes
            .lock()
            .unwrap()
            .push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&mut self, _grace: Duration) -> SessionResult<()> {
        self.recorder.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.recorder.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(SessionError::Disconnect("client closed".to_string()));
        }
        Ok(())
    }
}
