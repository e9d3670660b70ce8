use anyhow::Result;
use clap::Parser;
use tracing::info;

use lastmile_client::cli::Cli;
use lastmile_client::config::GatewayConfig;
use lastmile_client::session::{Identity, RealtimeSession};
use lastmile_client::state::SessionState;
use lastmile_client::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(&cli.logging.to_config())?;

    let config = GatewayConfig::new(&cli.gateway_url)?;
    let session = RealtimeSession::new(config)?;

    let mut identity = Identity::new(cli.role.into(), cli.user_id.clone());
    if let Some(name) = cli.name.clone() {
        identity = identity.with_display_name(name);
    }
    session.set_identity(Some(identity));

    let mut updates = session.subscribe();
    info!(gateway = %cli.gateway_url, "session opened, waiting for events (ctrl-c to exit)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                report(&snapshot);
            }
        }
    }

    session.close();
    Ok(())
}

fn report(state: &SessionState) {
    info!(
        ready = state.ready,
        offers = state.offers.len(),
        rooms = state.rooms.len(),
        queue = state.queue.is_some(),
        "session state"
    );
    for offer in state.offers.values() {
        info!(
            rider = %offer.rider_id,
            name = %offer.rider_name,
            attempt = offer.attempt,
            total = offer.total,
            "pending offer"
        );
    }
    for room in state.rooms.values() {
        info!(trip = %room.trip_id, status = %room.status, "active room");
    }
    if let Some(status) = &state.rider_status {
        info!(status = %status.status, trip = ?status.trip_id, "rider status");
    }
    if let Some(approval) = &state.approval {
        info!(trip = %approval.trip_id, driver = ?approval.driver_name, "approval requested");
    }
    if let Some(error) = &state.last_error {
        info!(%error, "gateway notice");
    }
}
