use facet::Facet;
use figue as args;
use std::time::{Duration, Instant};

mod topology;

use topology::Topology;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Number of top-level channels to create.
    #[facet(args::named, default)]
    channels: Option<usize>,
    /// Per-node trace budget in bytes.
    #[facet(args::named, default)]
    trace_memory: Option<i64>,
    /// Print the strict form, without `additionalInfo`.
    #[facet(args::named, default)]
    strict: bool,
    /// Also print the structured entity records.
    #[facet(args::named, default)]
    entities: bool,
}

const DEFAULT_CHANNELS: usize = 2;
// Client socket ports are derived from the channel index.
const MAX_CHANNELS: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut channel_args = channelz::ChannelArgs::new();
    if let Some(bytes) = cli.trace_memory {
        channel_args = channel_args.set(channelz::MAX_CHANNEL_TRACE_EVENT_MEMORY_PER_NODE, bytes);
    }
    let topology = Topology::build(cli.channel_count()?, &channel_args)?;

    print_query("get_top_channels(0)", channelz::get_top_channels(0), cli.strict);
    print_query("get_servers(0)", channelz::get_servers(0), cli.strict);
    for (label, id) in topology.ids() {
        match label {
            "channel" => print_query(
                &format!("get_channel({id})"),
                channelz::get_channel(id),
                cli.strict,
            ),
            "subchannel" => print_query(
                &format!("get_subchannel({id})"),
                channelz::get_subchannel(id),
                cli.strict,
            ),
            "server" => {
                print_query(&format!("get_server({id})"), channelz::get_server(id), cli.strict);
                print_query(
                    &format!("get_server_sockets({id}, 0)"),
                    channelz::get_server_sockets(id, 0),
                    cli.strict,
                );
            }
            _ => print_query(&format!("get_socket({id})"), channelz::get_socket(id), cli.strict),
        }
    }

    if cli.entities {
        let (entities, end) = channelz::query_entities(None, 0).map_err(|e| e.to_string())?;
        for entity in &entities {
            let json = facet_json::to_string(entity).map_err(|e| e.to_string())?;
            println!("entity {}: {json}", entity.id);
        }
        println!("entities end={end}");
    }

    let result = topology
        .run_ztrace(Instant::now() + Duration::from_millis(500))
        .await?;
    println!("ztrace: {result}");

    topology.shutdown();
    print_query("get_top_channels(0) after shutdown", channelz::get_top_channels(0), cli.strict);
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let config = args::builder::<Cli>()
        .map_err(|e| format!("channelz-examples options are malformed: {e}"))?
        .cli(|cli| cli.strict())
        .help(|help| {
            help.program_name(env!("CARGO_PKG_NAME"))
                .description("Build a small channel topology and print every channelz query")
                .version(env!("CARGO_PKG_VERSION"))
        })
        .build();

    let parsed = args::Driver::new(config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(parsed.value)
}

impl Cli {
    fn channel_count(&self) -> AnyResult<usize> {
        match self.channels.unwrap_or(DEFAULT_CHANNELS) {
            0 => Err("--channels must be at least 1".to_owned()),
            count if count > MAX_CHANNELS => {
                Err(format!("--channels is capped at {MAX_CHANNELS}, got {count}"))
            }
            count => Ok(count),
        }
    }
}

fn print_query(label: &str, result: Result<String, channelz::ChannelzError>, strict: bool) {
    let text = match result {
        Ok(text) if strict => match serde_json::from_str(&text) {
            Ok(mut json) => {
                channelz::strip_additional_info(&mut json);
                json.to_string()
            }
            Err(_) => text,
        },
        other => channelz::query_result_json(other),
    };
    println!("{label}: {text}");
}
