//! Worked example: user signup with a delayed welcome email and an
//! await-step gating on email confirmation.
//!
//! ```text
//! cargo run --example signup_flow -- start --email a@example.com
//! # ... engine sleeps out the welcome-email delay, then pauses at
//! # ConfirmEmailAddress and the process exits ...
//! cargo run --example signup_flow -- confirm --flow-id <uuid> --at 2025-01-01T00:00:00Z
//! ```

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use durable_flow::prelude::*;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct SignupFlow;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SignupInput {
    name: String,
    email: String,
}

#[async_trait::async_trait]
impl Flow for SignupFlow {
    const TYPE: &'static str = "SignupFlow";
    type Input = SignupInput;
    type Output = i64;

    async fn body(&self, ctx: &FlowContext, input: SignupInput) -> Result<i64, FlowError> {
        let user_id: i64 = ctx
            .step("CreateUserRecord", (input.name.clone(), input.email.clone()), |(name, email)| async move {
                println!("creating user record for {name} <{email}>");
                Ok::<i64, std::convert::Infallible>(1234)
            })
            .await?;

        ctx.step_delayed(
            "SendWelcomeEmail",
            Duration::from_secs(10),
            (user_id, input.email.clone()),
            |(user_id, email)| async move {
                println!("sent welcome email to user {user_id} at {email}");
                Ok::<(), std::convert::Infallible>(())
            },
        )
        .await?;

        let default_time: DateTime<Utc> = Utc::now();
        let confirmed_at: DateTime<Utc> = ctx.await_signal("ConfirmEmailAddress", default_time).await?;
        println!("email confirmed at {confirmed_at}");

        ctx.step("FinalizeSignup", user_id, |user_id| async move {
            println!("signup finalized for user {user_id}");
            Ok::<(), std::convert::Infallible>(())
        })
        .await?;

        Ok(user_id)
    }
}

#[derive(Parser)]
#[command(name = "signup_flow")]
struct Cli {
    /// Connection string for the log store.
    #[arg(long, default_value = "sqlite://signup_flow.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new signup flow.
    Start {
        #[arg(long, default_value = "Ada Lovelace")]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Deliver the confirmation signal and resume the flow.
    Confirm {
        #[arg(long)]
        flow_id: Uuid,
        #[arg(long)]
        at: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    // Plain `connect`, not `connect_with` — this demo never registers a
    // flow type for recovery, so there's nothing for `recover_on_startup`
    // to act on even if it were honored here.
    let engine = Engine::connect(EngineConfig::new(cli.database_url)).await?;

    match cli.command {
        Command::Start { name, email } => {
            let flow_id = Uuid::new_v4();
            println!("flow id: {flow_id}");
            let handle = engine.get_flow_default::<SignupFlow>(flow_id);
            handle.run(SignupInput { name, email }).await?;
            println!("flow is awaiting email confirmation (or finished, if already confirmed)");
        }
        Command::Confirm { flow_id, at } => {
            let handle = engine.get_flow_default::<SignupFlow>(flow_id);
            let user_id = handle.resume(serde_json::to_value(at)?).await?;
            println!("signup complete for user {user_id}");
        }
    }

    Ok(())
}
