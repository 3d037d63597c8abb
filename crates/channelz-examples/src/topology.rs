use channelz::{
    CallCounters, ChannelArgs, ChannelNode, ConnectivityState, DataSink, DataSource,
    DataSourceHandle, ListenSocketNode, PropertyList, ServerNode, Severity, SocketNode,
    SubchannelNode, TimerEngine, TokioEngine, ZTrace, ZTraceArgs, ZTraceCallback,
};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::AnyResult;

/// Reports how many requests the demo load balancer has routed.
struct RouterStats {
    routed: Arc<CallCounters>,
}

impl DataSource for RouterStats {
    fn add_data(&self, sink: &mut DataSink) -> anyhow::Result<()> {
        let counts = self.routed.snapshot();
        sink.add_data(
            "router",
            PropertyList::new()
                .set("policy", "round_robin")
                .set("routed", counts.calls_started),
        );
        Ok(())
    }

    fn get_ztrace(&self, name: &str) -> Option<Box<dyn ZTrace>> {
        (name == "routed_calls").then(|| {
            Box::new(RoutedCalls {
                routed: Arc::clone(&self.routed),
            }) as Box<dyn ZTrace>
        })
    }
}

struct RoutedCalls {
    routed: Arc<CallCounters>,
}

impl ZTrace for RoutedCalls {
    fn run(
        self: Box<Self>,
        _deadline: Instant,
        _args: ZTraceArgs,
        engine: Arc<dyn TimerEngine>,
        callback: ZTraceCallback,
    ) {
        engine.run_after(
            Duration::from_millis(20),
            Box::new(move || {
                let counts = self.routed.snapshot();
                callback(json!({"routed": counts.calls_started}));
            }),
        );
    }
}

pub(crate) struct Topology {
    channels: Vec<ChannelNode>,
    subchannels: Vec<SubchannelNode>,
    server: ServerNode,
    listen_socket: ListenSocketNode,
    router: DataSourceHandle<RouterStats>,
}

impl Topology {
    pub(crate) fn build(channel_count: usize, args: &ChannelArgs) -> AnyResult<Self> {
        let server = channelz::new_server_from_args(args)
            .ok_or_else(|| "channelz is disabled for the server".to_owned())?;
        let listen_socket = ListenSocketNode::new("[::]:50051", Some("ipv6:[::]:50051".into()));
        server.add_child_listen_socket(&listen_socket);
        server.add_trace_event(Severity::Info, "Server started");

        let routed = Arc::new(CallCounters::default());
        let mut channels = Vec::with_capacity(channel_count);
        let mut subchannels = Vec::with_capacity(channel_count);
        for index in 0..channel_count {
            let channel = channelz::new_channel_from_args(format!("dns:///backend-{index}"), args)
                .ok_or_else(|| "channelz is disabled for channels".to_owned())?;
            let subchannel = SubchannelNode::from_args(format!("ipv4:10.0.0.{}:443", index + 1), args)
                .ok_or_else(|| "channelz is disabled for subchannels".to_owned())?;
            channel.set_connectivity_state(ConnectivityState::Connecting);
            channel.add_child_subchannel(&subchannel);
            channel.add_trace_event_with_reference(
                Severity::Info,
                "Created new subchannel",
                &subchannel,
            );

            let client = SocketNode::new(
                format!("backend-{index}"),
                Some(format!("ipv4:10.0.1.1:{}", 40000 + index)),
                Some(format!("ipv4:10.0.0.{}:443", index + 1)),
            );
            subchannel.add_child_socket(&client);
            subchannel.set_connectivity_state(ConnectivityState::Ready);
            channel.set_connectivity_state(ConnectivityState::Ready);

            let accepted = SocketNode::new(
                format!("peer-{index}"),
                Some("ipv6:[::1]:50051".into()),
                Some(format!("ipv4:10.0.1.1:{}", 40000 + index)),
            );
            server.add_child_socket(&accepted);

            for _ in 0..3 {
                channel.record_call_started();
                subchannel.record_call_started();
                routed.record_call_started();
                client.record_stream_started_from_local();
                client.record_messages_sent(1);
                accepted.record_stream_started_from_remote();
                accepted.record_message_received();
                server.record_call_started();
                server.record_call_succeeded();
                accepted.record_stream_succeeded();
                client.record_stream_succeeded();
                subchannel.record_call_succeeded();
                channel.record_call_succeeded();
            }
            channels.push(channel);
            subchannels.push(subchannel);
        }

        let router = match channels.first() {
            Some(channel) => channel.attach_data_source(RouterStats { routed }),
            None => server.attach_data_source(RouterStats { routed }),
        };
        info!(channels = channels.len(), "topology built");
        Ok(Self {
            channels,
            subchannels,
            server,
            listen_socket,
            router,
        })
    }

    /// Every node worth querying individually, in creation order.
    pub(crate) fn ids(&self) -> Vec<(&'static str, i64)> {
        let mut ids = vec![
            ("server", id_of(self.server.uuid())),
            ("listen_socket", id_of(self.listen_socket.uuid())),
        ];
        for (channel, subchannel) in self.channels.iter().zip(&self.subchannels) {
            ids.push(("channel", id_of(channel.uuid())));
            ids.push(("subchannel", id_of(subchannel.uuid())));
            for (uuid, _) in subchannel.children() {
                ids.push(("socket", id_of(uuid)));
            }
        }
        ids
    }

    pub(crate) async fn run_ztrace(&self, deadline: Instant) -> AnyResult<JsonValue> {
        let engine: Arc<dyn TimerEngine> = Arc::new(
            TokioEngine::current().ok_or_else(|| "no tokio runtime for ztrace".to_owned())?,
        );
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.router.node().run_ztrace(
            "routed_calls",
            deadline,
            ZTraceArgs::new(),
            engine,
            move |result| {
                let _ = tx.send(result);
            },
        );
        rx.await.map_err(|e| format!("ztrace never completed: {e}"))
    }

    /// Drops every handle; the registry empties as the last owners go.
    pub(crate) fn shutdown(self) {
        let Self {
            channels,
            subchannels,
            server,
            listen_socket,
            router,
        } = self;
        drop(router);
        drop(subchannels);
        drop(channels);
        drop(listen_socket);
        drop(server);
        info!("topology shut down");
    }
}

fn id_of(uuid: channelz::Uuid) -> i64 {
    i64::try_from(uuid.get()).unwrap_or(i64::MAX)
}
