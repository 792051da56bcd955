// crates/bridge/src/main.rs
//! sync-bridge demo binary.
//!
//! Plays the legacy sync framework: issues one blocking sync request against
//! simulated sync work and reports where the job ended up. Ctrl-C interrupts
//! the wait; the job is left running until the process exits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use sync_bridge::config::parse_timeout_secs;
use sync_bridge::{
    job_name_for, AccountRef, AccountSettings, BridgeConfig, InMemoryAccounts, Interrupt,
    StaticNetwork, SyncBridge, SyncJobParams, SyncRequest, SyncWork, WifiConditions,
};
use sync_bridge_jobs::JobContext;
use sync_bridge_observability::{init_tracing, LogConfig};

#[derive(Debug, Parser)]
#[command(name = "sync-bridge", version, about = "Run one blocking sync request through the job bridge")]
struct Args {
    /// Account name.
    #[arg(long, default_value = "demo@example.com")]
    account: String,
    /// Account type.
    #[arg(long, default_value = "sync-bridge.demo")]
    account_type: String,
    /// Authority (data category) to sync.
    #[arg(long, default_value = "com.android.contacts")]
    authority: String,
    /// Ask for local changes to be uploaded.
    #[arg(long)]
    upload: bool,
    /// How long the simulated sync takes.
    #[arg(long, default_value_t = 500)]
    work_ms: u64,
    /// Make the simulated sync fail.
    #[arg(long)]
    fail: bool,
    /// Override the wait timeout (whole seconds, at least 1).
    #[arg(long, value_parser = parse_timeout_secs)]
    timeout_secs: Option<Duration>,
    /// Restrict the account to Wi-Fi.
    #[arg(long)]
    wifi_only: bool,
    /// Allowed SSID for the account (repeatable).
    #[arg(long = "allowed-ssid")]
    allowed_ssids: Vec<String>,
    /// Pretend the device is not on Wi-Fi.
    #[arg(long)]
    no_wifi: bool,
    /// SSID the device is connected to.
    #[arg(long)]
    ssid: Option<String>,
    /// Send the request for an account that does not exist.
    #[arg(long)]
    unknown_account: bool,
    /// Print the final job snapshot as JSON.
    #[arg(long)]
    json: bool,
}

/// Stand-in for real data synchronization.
struct SimulatedSync {
    duration: Duration,
    fail: bool,
}

#[async_trait]
impl SyncWork for SimulatedSync {
    async fn perform(&self, ctx: &JobContext, params: SyncJobParams) -> std::result::Result<(), String> {
        const STEPS: u32 = 4;
        for step in 1..=STEPS {
            ctx.set_message(format!("{} step {step}/{STEPS}", params.authority));
            tokio::time::sleep(self.duration / STEPS).await;
        }
        if self.fail {
            return Err(format!("simulated failure syncing {}", params.account));
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&LogConfig::from_env())?;

    let mut config = BridgeConfig::from_env();
    if let Some(timeout) = args.timeout_secs {
        config = config.with_wait_timeout(timeout);
    }

    // The request blocks this thread, so the runtime lives on worker threads
    // and main stays outside of it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sync-bridge-worker")
        .build()?;

    let account = AccountRef::new(args.account.clone(), args.account_type.clone());
    let accounts = Arc::new(InMemoryAccounts::new());
    if !args.unknown_account {
        accounts.insert(
            account.clone(),
            AccountSettings {
                wifi_only: args.wifi_only,
                allowed_ssids: args.allowed_ssids.clone(),
            },
        );
    }
    let conditions = Arc::new(WifiConditions::new(StaticNetwork {
        wifi: !args.no_wifi,
        ssid: args.ssid.clone(),
    }));
    let work = Arc::new(SimulatedSync {
        duration: Duration::from_millis(args.work_ms),
        fail: args.fail,
    });
    let bridge = SyncBridge::start(&config, runtime.handle().clone(), accounts, conditions, work)?;

    let interrupt = Interrupt::new();
    let on_ctrl_c = interrupt.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.interrupt();
        }
    });

    let request = SyncRequest {
        account: account.clone(),
        authority: args.authority.clone(),
        upload: args.upload,
    };
    let started = Instant::now();
    bridge.dispatcher().handle_interruptible(&request, &interrupt);
    let elapsed = started.elapsed();

    let job_name = job_name_for(&account, &args.authority);
    match bridge.runner().get(&job_name) {
        Some(job) if args.json => println!("{}", serde_json::to_string_pretty(&job.snapshot())?),
        Some(job) => println!(
            "{job_name}: {} after {:.2}s",
            job.current_state(),
            elapsed.as_secs_f64()
        ),
        None => println!("{job_name}: not enqueued"),
    }

    drop(bridge);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
