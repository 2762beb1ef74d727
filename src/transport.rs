pub use voice_call_tokio_transport::{
    Transport, TransportEvent, TransportFactory, TransportOptions, WebSocketTransport,
    WebSocketTransportFactory,
};

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// A transport that records every frame it accepts.
    #[derive(Default)]
    pub struct MockTransport {
        open: AtomicBool,
        closed: AtomicBool,
        sent: Mutex<Vec<String>>,
        uris: Mutex<Vec<String>>,
        preferred_uri: Mutex<Option<String>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set_open(&self, open: bool) {
            self.open.store(open, Ordering::SeqCst);
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Parsed envelopes, oldest first.
        pub fn sent_envelopes(&self) -> Vec<Value> {
            self.sent()
                .iter()
                .map(|s| serde_json::from_str(s).unwrap())
                .collect()
        }

        /// The `type` tag of every envelope sent so far.
        pub fn sent_types(&self) -> Vec<String> {
            self.sent_envelopes()
                .iter()
                .map(|e| e["type"].as_str().unwrap().to_string())
                .collect()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }

        pub fn uris(&self) -> Vec<String> {
            self.uris.lock().unwrap().clone()
        }

        pub fn preferred_uri(&self) -> Option<String> {
            self.preferred_uri.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
            if !self.open.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("Socket is closed"));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
        }

        fn uri(&self) -> Option<String> {
            Some("wss://mock.invalid/signal".to_string())
        }

        fn update_uris(&self, uris: Vec<String>) {
            *self.uris.lock().unwrap() = uris;
        }

        fn update_preferred_uri(&self, uri: Option<String>) {
            *self.preferred_uri.lock().unwrap() = uri;
        }
    }

    /// Hands out one shared [`MockTransport`] and keeps the event sender so
    /// tests can inject transport events.
    pub struct MockTransportFactory {
        pub transport: Arc<MockTransport>,
        events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    }

    impl MockTransportFactory {
        pub fn new() -> Self {
            Self {
                transport: MockTransport::new(),
                events: Mutex::new(None),
            }
        }

        pub fn event_sender(&self) -> Option<mpsc::Sender<TransportEvent>> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let (tx, rx) = mpsc::channel(100);
            *self.events.lock().unwrap() = Some(tx);
            Ok((self.transport.clone(), rx))
        }
    }
}
