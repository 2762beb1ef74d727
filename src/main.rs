use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use serde_json::json;
use std::time::Duration;
use voice_call_client::calls::{CallDirection, IdGenerator, RandomIds};
use voice_call_client::config::{ChannelOptions, PublisherConfig};
use voice_call_client::signaling::{SignalChannel, SignalEvent};
use voice_call_client::telemetry::{CallContext, InsightsPublisher, Level, Publisher, TelemetryEvent};
use voice_call_client::transport::{TransportFactory, TransportOptions, WebSocketTransportFactory};

// Connects to a signaling server, registers for calls and logs everything
// the server says until Ctrl-C.
//
// Usage:
//   cargo run -- --uri wss://signal.example/signal --token <access-token>
//   cargo run -- --uri wss://a.example --uri wss://b.example --token <t> --max-preferred-duration 20

#[derive(Parser, Debug)]
#[command(name = "voice-call-client", version, about = "Voice signaling client")]
struct Args {
    /// Signaling endpoint. Repeat to add fallbacks, tried in order.
    #[arg(long = "uri", required = true)]
    uris: Vec<String>,

    /// Access token presented in the `listen` message.
    #[arg(long)]
    token: String,

    /// Seconds the server should hold a call after the socket drops.
    #[arg(long)]
    max_preferred_duration: Option<u64>,

    /// Insights host for telemetry, without scheme.
    #[arg(long)]
    insights_host: Option<String>,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build tokio runtime: {e}");
            return;
        }
    };

    rt.block_on(async move {
        if let Err(e) = run(args).await {
            error!("{e:?}");
        }
    });
}

async fn run(args: Args) -> anyhow::Result<()> {
    let factory = WebSocketTransportFactory::new(TransportOptions {
        uris: args.uris,
        ..Default::default()
    });
    let (transport, mut transport_events) = factory.create_transport().await?;

    let mut channel = SignalChannel::new(
        args.token.clone(),
        transport,
        ChannelOptions {
            max_preferred_duration: args.max_preferred_duration.map(Duration::from_secs),
            ..Default::default()
        },
    );
    let publisher = InsightsPublisher::new(PublisherConfig {
        host: args.insights_host,
        token: args.token,
        ..Default::default()
    });
    let context = CallContext {
        call_sid: None,
        temp_call_sid: RandomIds.temp_call_sid(),
        direction: CallDirection::Incoming,
        gateway: None,
    };

    // Queued until the socket opens.
    channel.register(json!({ "audio": true }));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            event = transport_events.recv() => {
                let Some(event) = event else {
                    warn!("Transport event stream ended");
                    break;
                };
                channel.handle_transport_event(event);
                for event in channel.drain_events() {
                    report(&event, &channel, &publisher, &context);
                }
            }
        }
    }

    channel.destroy();
    Ok(())
}

fn report(event: &SignalEvent, channel: &SignalChannel, publisher: &dyn Publisher, context: &CallContext) {
    match event {
        SignalEvent::Ready(_) => {
            info!(
                "Registered (region: {}, gateway: {})",
                channel.region().unwrap_or("-"),
                channel.gateway().unwrap_or("-")
            );
            publisher.post(TelemetryEvent {
                level: Level::Info,
                group: "registration".to_string(),
                name: "ready".to_string(),
                payload: None,
                force: false,
                context: CallContext {
                    gateway: channel.gateway().map(str::to_string),
                    ..context.clone()
                },
            });
        }
        SignalEvent::Invite(invite) => info!(
            "Incoming call {} with {} parameters",
            invite.callsid.as_deref().unwrap_or("<no callsid>"),
            invite.parameters.len()
        ),
        SignalEvent::Error(payload) => warn!("Signaling error: {:?}", payload.error),
        SignalEvent::Offline => warn!("Signaling channel offline"),
        other => info!("<- {}", other.tag()),
    }
}
