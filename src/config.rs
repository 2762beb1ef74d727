use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Duration;

use crate::calls::reconnect::BackoffConfig;

/// Version reported to the signaling server and in telemetry.
pub const RELEASE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client metadata advertised in the `listen` message.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub platform: String,
    pub user_agent: String,
    pub release: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            user_agent: format!("voice-call-client/{RELEASE_VERSION}"),
            release: RELEASE_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChannelOptions {
    /// How long the server should hold the call for us after the socket
    /// drops. Advertised in seconds, capped at 30.
    pub max_preferred_duration: Option<Duration>,
    pub client_info: ClientInfo,
}

#[derive(Clone, Debug)]
pub struct CallOptions {
    /// Parameters received with an inbound invite (`CallSid`, `StirStatus`, ...).
    pub call_parameters: HashMap<String, String>,
    /// Application parameters sent with an outbound invite, in order.
    pub custom_parameters: IndexMap<String, String>,
    /// Remote offer of an inbound call.
    pub offer_sdp: Option<String>,
    /// Reconnect token of a call being resumed.
    pub reconnect_token: Option<String>,
    /// Call id of a call being resumed. Forces an outgoing direction.
    pub reconnect_call_sid: Option<String>,
    pub preflight: bool,
    pub dscp: bool,
    pub gateway: Option<String>,
    pub backoff: BackoffConfig,
    pub metrics_batch_size: usize,
    /// Quality warnings are muted for this long after the session starts.
    pub warnings_delay: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            call_parameters: HashMap::new(),
            custom_parameters: IndexMap::new(),
            offer_sdp: None,
            reconnect_token: None,
            reconnect_call_sid: None,
            preflight: false,
            dscp: true,
            gateway: None,
            backoff: BackoffConfig::default(),
            metrics_batch_size: 10,
            warnings_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    /// Insights host, without scheme. Publishing is skipped when unset.
    pub host: Option<String>,
    pub token: String,
    pub product_name: String,
    pub metadata: HashMap<String, String>,
    pub enabled: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: String::new(),
            product_name: "voice-call-client".to_string(),
            metadata: HashMap::new(),
            enabled: true,
        }
    }
}
