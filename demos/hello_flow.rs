//! Worked example: a flow that says hello five times. Demonstrates
//! replay after a simulated crash — re-driving the same flow id only
//! re-executes the steps that never completed.
//!
//! ```text
//! cargo run --example hello_flow -- run --name World
//! cargo run --example hello_flow -- run --name World --flow-id <uuid printed above> --crash-after 2
//! cargo run --example hello_flow -- run --name World --flow-id <uuid printed above>
//! ```

use clap::Parser;
use durable_flow::prelude::*;
use uuid::Uuid;

#[derive(Default)]
struct HelloFlow;

#[async_trait::async_trait]
impl Flow for HelloFlow {
    const TYPE: &'static str = "HelloFlow";
    type Input = String;
    type Output = ();

    async fn body(&self, ctx: &FlowContext, name: String) -> Result<(), FlowError> {
        for i in 0..5i64 {
            let name = name.clone();
            let said: i64 = ctx
                .step("Say", (name, i), |(name, i): (String, i64)| async move {
                    println!("{i}: hello {name}");
                    if std::env::var("HELLO_FLOW_CRASH_AFTER").ok().and_then(|s| s.parse::<i64>().ok()) == Some(i) {
                        std::process::exit(1);
                    }
                    Ok::<i64, std::convert::Infallible>(i)
                })
                .await?;
            debug_assert_eq!(said, i);
        }
        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "hello_flow")]
struct Cli {
    /// Name to greet.
    #[arg(long, default_value = "World")]
    name: String,

    /// Flow id to resume. Omit to start a new flow.
    #[arg(long)]
    flow_id: Option<Uuid>,

    /// Connection string for the log store.
    #[arg(long, default_value = "sqlite://hello_flow.db?mode=rwc")]
    database_url: String,

    /// Simulate a crash by exiting the process right after step `i`
    /// completes, so a second invocation with the same `--flow-id`
    /// demonstrates replay of steps 0..=i and execution of the rest.
    #[arg(long)]
    crash_after: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    // Plain `connect`, not `connect_with` — this demo never registers a
    // flow type for recovery, so there's nothing for `recover_on_startup`
    // to act on even if it were honored here.
    let engine = Engine::connect(EngineConfig::new(cli.database_url)).await?;

    if let Some(i) = cli.crash_after {
        std::env::set_var("HELLO_FLOW_CRASH_AFTER", i.to_string());
    }

    let flow_id = cli.flow_id.unwrap_or_else(Uuid::new_v4);
    println!("flow id: {flow_id}");

    let handle = engine.get_flow_default::<HelloFlow>(flow_id);
    handle.run(cli.name).await?;

    println!("flow finished (or is caught up to the crash point)");
    Ok(())
}
