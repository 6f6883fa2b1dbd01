//! Connectivity diagnostics: graph backend, audit store, each provider.

use crate::state::AppState;

pub async fn run(state: &AppState) -> anyhow::Result<()> {
    let mut healthy = true;

    match state.graph.health_check().await {
        Ok(()) => println!("graph backend     ok ({})", state.config.graph.base_url),
        Err(e) => {
            healthy = false;
            println!("graph backend     FAIL: {e}");
        }
    }

    match &state.audit {
        Some(audit) => match audit.usage_stat_count() {
            Ok(rows) => println!("audit store       ok ({rows} usage rows)"),
            Err(e) => {
                healthy = false;
                println!("audit store       FAIL: {e}");
            }
        },
        None => println!("audit store       disabled"),
    }

    for id in state.providers.list_providers() {
        let adapter = state.providers.get(&id).expect("listed provider exists");
        match adapter.health_check().await {
            Ok(()) => println!("provider {id:<9} ok ({})", adapter.auth_mode()),
            Err(e) => {
                healthy = false;
                println!("provider {id:<9} FAIL: {e}");
            }
        }
    }

    for init_error in state.providers.init_errors() {
        healthy = false;
        println!(
            "provider {:<9} NOT REGISTERED: {}",
            init_error.provider_id, init_error.error
        );
    }

    if healthy {
        println!("\nall checks passed");
        Ok(())
    } else {
        anyhow::bail!("one or more checks failed")
    }
}
