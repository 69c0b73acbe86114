use clap::Args;
use url::Url;

use leakcheck_daemon::http_server::api::client::ApiClient;
use leakcheck_daemon::state::{AppState, CONFIG_FILE_NAME, DB_FILE_NAME, KEY_FILE_NAME};

use crate::cli::op::local_url;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {}

/// One line per status route of the server at `base`
async fn probe_server(client: &ApiClient, base: &Url, lines: &mut Vec<String>) {
    for route in ["livez", "readyz"] {
        let path = format!("/_status/{}", route);
        let status = match client.probe(base, &path).await {
            Ok(status) if status.is_success() => "OK".to_string(),
            Ok(status) => format!("UNHEALTHY ({})", status),
            Err(_) => "NOT REACHABLE".to_string(),
        };
        lines.push(format!("  {:<7} {}", format!("{}:", route), status));
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        lines.push("Config:".to_string());
        let state = match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:        {}", state.leakcheck_dir.display()));
                lines.push(format!("  {:<17} OK", format!("{}:", CONFIG_FILE_NAME)));
                lines.push(format!("  {:<17} OK", format!("{}:", DB_FILE_NAME)));
                match state.load_secret() {
                    Ok(_) => lines.push(format!("  {:<17} OK", format!("{}:", KEY_FILE_NAME))),
                    Err(e) => lines.push(format!("  {:<17} {}", format!("{}:", KEY_FILE_NAME), e)),
                }
                lines.push(format!("  evaluate_port:    {}", state.config.evaluate_port));
                lines.push(format!("  api_port:         {}", state.config.api_port));
                lines.push(format!("  uniqueness_scope: {}", state.config.uniqueness_scope));
                Some(state)
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
                None
            }
        };

        let api = ctx.client.base_url().clone();
        lines.push(String::new());
        lines.push(format!("API server ({}):", api));
        probe_server(&ctx.client, &api, &mut lines).await;

        if let Some(state) = state {
            let evaluate = local_url(state.config.evaluate_port);
            lines.push(String::new());
            lines.push(format!("Evaluation server ({}):", evaluate));
            probe_server(&ctx.client, &evaluate, &mut lines).await;
        }

        Ok(lines.join("\n"))
    }
}
