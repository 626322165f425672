use clap::Parser;
use crosspost_gateway::app_state::AppState;
use crosspost_gateway::config::AppConfig;
use crosspost_gateway::server::{periodic_sweep, startup};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "crosspost-gateway", about = "Post-rewrite and feed gateway")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let state = AppState::new(config)?;

    actix_web::rt::System::new().block_on(async move {
        if state.limiter.is_some() {
            actix_web::rt::spawn(periodic_sweep(state.clone()));
        }
        tokio::select! {
            res = startup(cli.host, cli.port, state) => {
                res?;
                Ok(())
            }
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down");
                Ok(())
            }
        }
    })
}
