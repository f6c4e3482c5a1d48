use anyhow::Context;
use clap::Parser;
use kafka_row_sink::pipeline::Input;
use kafka_row_sink::{Config, Pipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-row-sink")]
#[command(about = "Writes newline-delimited JSON rows to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "sink.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Topic for every row, overriding any topic attribute")]
    topic: Option<String>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(value_name = "INPUT", default_value = "-", help = "Row files, one partition each; '-' reads stdin")]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting kafka-row-sink");
    info!("Loading configuration from {:?}", args.config);

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    if args.topic.is_some() {
        config.sink.topic = args.topic;
    }

    info!(
        kafka_brokers = ?config.kafka.brokers,
        topic_override = ?config.sink.topic,
        schema_fields = config.schema.len(),
        "Configuration summary"
    );

    let pipeline = Arc::new(Pipeline::with_kafka(&config).context("invalid sink configuration")?);
    let inputs: Vec<Input> = args.inputs.into_iter().map(Input::from).collect();

    match pipeline.run(inputs).await {
        Ok(rows) => {
            info!(rows, "All rows written");
            Ok(())
        }
        Err(e) => {
            error!("Write failed: {}", e);
            Err(e.into())
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_row_sink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_row_sink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
